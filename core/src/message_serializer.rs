//! Encode/decode capability for typed message payloads.
//!
//! Generated message types implement [`LcmEncode`] and [`LcmDecode`] over
//! the binary codec. The bus itself only moves opaque bytes; these traits are
//! the seam where a typed layer plugs in.

use crate::codec::{CodecError, LcmDataInput, LcmDataOutput};

/// Writes a value into an [`LcmDataOutput`].
pub trait LcmEncode {
	/// Appends the wire form of `self` to `out`.
	fn encode(&self, out: &mut LcmDataOutput) -> Result<(), CodecError>;
}

/// Reads a value from an [`LcmDataInput`].
pub trait LcmDecode: Sized {
	/// Consumes the wire form of one value from `input`.
	fn decode(input: &mut LcmDataInput<'_>) -> Result<Self, CodecError>;
}

macro_rules! impl_scalar {
	($($ty:ty => $write:ident, $read:ident);* $(;)?) => {
		$(
			impl LcmEncode for $ty {
				fn encode(
					&self,
					out: &mut LcmDataOutput,
				) -> Result<(), CodecError> {
					out.$write(*self);
					Ok(())
				}
			}

			impl LcmDecode for $ty {
				fn decode(
					input: &mut LcmDataInput<'_>,
				) -> Result<Self, CodecError> {
					input.$read()
				}
			}
		)*
	};
}

impl_scalar! {
	i8 => write_i8, read_i8;
	u8 => write_u8, read_u8;
	bool => write_bool, read_bool;
	i16 => write_i16, read_i16;
	u16 => write_u16, read_u16;
	i32 => write_i32, read_i32;
	u32 => write_u32, read_u32;
	i64 => write_i64, read_i64;
	f32 => write_f32, read_f32;
	f64 => write_f64, read_f64;
}

impl LcmEncode for String {
	fn encode(&self, out: &mut LcmDataOutput) -> Result<(), CodecError> {
		out.write_string_z(self)
	}
}

impl LcmEncode for str {
	fn encode(&self, out: &mut LcmDataOutput) -> Result<(), CodecError> {
		out.write_string_z(self)
	}
}

impl LcmDecode for String {
	fn decode(input: &mut LcmDataInput<'_>) -> Result<Self, CodecError> {
		input.read_string_z()
	}
}

impl<T: LcmEncode + ?Sized> LcmEncode for &T {
	fn encode(&self, out: &mut LcmDataOutput) -> Result<(), CodecError> {
		(**self).encode(out)
	}
}

/// Encodes `value` into a fresh byte vector.
pub fn encode_to_vec<T>(value: &T) -> Result<Vec<u8>, CodecError>
where T: LcmEncode + ?Sized {
	let mut out = LcmDataOutput::new();
	value.encode(&mut out)?;
	Ok(out.to_vec())
}

/// Decodes one `T` from the start of `bytes`. Trailing bytes are ignored.
pub fn decode_from_slice<T: LcmDecode>(bytes: &[u8]) -> Result<T, CodecError> {
	T::decode(&mut LcmDataInput::new(bytes))
}
