use super::error::CodecError;

/// Bounds-checked big-endian reader over a fixed byte range.
///
/// Every read first checks that enough bytes remain in
/// `[offset, offset + len)`. A failed read leaves the cursor where it was.
#[derive(Debug, Clone)]
pub struct LcmDataInput<'a> {
	buf: &'a [u8],
	start: usize,
	end: usize,
	pos: usize,
}

impl<'a> LcmDataInput<'a> {
	/// Reads the whole of `buf`.
	pub fn new(buf: &'a [u8]) -> Self {
		Self {
			buf,
			start: 0,
			end: buf.len(),
			pos: 0,
		}
	}

	/// Reads `len` bytes of `buf` starting at `offset`.
	pub fn with_range(
		buf: &'a [u8],
		offset: usize,
		len: usize,
	) -> Result<Self, CodecError> {
		let end = offset.checked_add(len).filter(|end| *end <= buf.len());
		match end {
			| Some(end) => Ok(Self {
				buf,
				start: offset,
				end,
				pos: offset,
			}),
			| None => Err(CodecError::invalid_length(
				len as i64,
				"range exceeds the underlying buffer",
			)),
		}
	}

	/// Unread bytes remaining in the declared range.
	pub fn available(&self) -> usize {
		self.end - self.pos
	}

	/// Cursor position relative to the start of the range.
	pub fn position(&self) -> usize {
		self.pos - self.start
	}

	/// Rewinds the cursor to the start of the range.
	pub fn reset(&mut self) {
		self.pos = self.start;
	}

	/// The unread part of the range, without consuming it.
	pub fn remaining(&self) -> &'a [u8] {
		&self.buf[self.pos .. self.end]
	}

	fn need(&self, requested: usize) -> Result<(), CodecError> {
		let available = self.available();
		if requested > available {
			return Err(CodecError::insufficient_data(requested, available));
		}
		Ok(())
	}

	/// Consumes and returns the next `n` bytes.
	pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
		self.need(n)?;
		let bytes = &self.buf[self.pos .. self.pos + n];
		self.pos += n;
		Ok(bytes)
	}

	fn read_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
		let mut out = [0u8; N];
		out.copy_from_slice(self.read_bytes(N)?);
		Ok(out)
	}

	/// Fills `out` completely or fails without consuming anything.
	pub fn read_fully(&mut self, out: &mut [u8]) -> Result<(), CodecError> {
		out.copy_from_slice(self.read_bytes(out.len())?);
		Ok(())
	}

	/// Advances the cursor by `n` bytes.
	pub fn skip(&mut self, n: usize) -> Result<(), CodecError> {
		self.read_bytes(n).map(|_| ())
	}

	pub fn read_u8(&mut self) -> Result<u8, CodecError> {
		Ok(self.read_array::<1>()?[0])
	}

	pub fn read_i8(&mut self) -> Result<i8, CodecError> {
		self.read_array().map(i8::from_be_bytes)
	}

	/// Any nonzero byte is `true`.
	pub fn read_bool(&mut self) -> Result<bool, CodecError> {
		Ok(self.read_u8()? != 0)
	}

	pub fn read_i16(&mut self) -> Result<i16, CodecError> {
		self.read_array().map(i16::from_be_bytes)
	}

	pub fn read_u16(&mut self) -> Result<u16, CodecError> {
		self.read_array().map(u16::from_be_bytes)
	}

	pub fn read_i32(&mut self) -> Result<i32, CodecError> {
		self.read_array().map(i32::from_be_bytes)
	}

	pub fn read_u32(&mut self) -> Result<u32, CodecError> {
		self.read_array().map(u32::from_be_bytes)
	}

	pub fn read_i64(&mut self) -> Result<i64, CodecError> {
		self.read_array().map(i64::from_be_bytes)
	}

	pub fn read_f32(&mut self) -> Result<f32, CodecError> {
		self.read_array().map(f32::from_be_bytes)
	}

	pub fn read_f64(&mut self) -> Result<f64, CodecError> {
		self.read_array().map(f64::from_be_bytes)
	}

	/// Reads bytes up to a zero terminator and consumes the terminator.
	///
	/// A range with no terminator fails with `InsufficientData` and leaves
	/// the cursor untouched.
	pub fn read_string_z(&mut self) -> Result<String, CodecError> {
		let remaining = self.remaining();
		let Some(nul) = remaining.iter().position(|b| *b == 0) else {
			return Err(CodecError::insufficient_data(
				remaining.len() + 1,
				remaining.len(),
			));
		};
		let s = std::str::from_utf8(&remaining[.. nul])
			.map_err(|e| CodecError::invalid_string(e.to_string()))?
			.to_owned();
		self.pos += nul + 1;
		Ok(s)
	}

	/// Length-prefixed "modified UTF-8" strings are not part of the LCM
	/// wire format. Always fails.
	pub fn read_utf(&mut self) -> Result<String, CodecError> {
		Err(CodecError::Unsupported("modified UTF-8 strings"))
	}
}
