use bytes::Bytes;

use super::error::CodecError;

const DEFAULT_CAPACITY: usize = 512;

/// Growable big-endian output buffer.
///
/// The logical write position is tracked separately from the allocated
/// capacity. When a write does not fit, the buffer grows to the next power
/// of two large enough to hold it. [`reset`](Self::reset) rewinds the write
/// position without releasing memory, so one instance can be reused across
/// many encodes.
#[derive(Debug, Clone)]
pub struct LcmDataOutput {
	buf: Vec<u8>,
	pos: usize,
}

impl Default for LcmDataOutput {
	fn default() -> Self {
		Self::new()
	}
}

impl LcmDataOutput {
	/// Creates an empty buffer with the default capacity.
	pub fn new() -> Self {
		Self::with_capacity(DEFAULT_CAPACITY)
	}

	/// Creates an empty buffer able to hold `capacity` bytes before growing.
	pub fn with_capacity(capacity: usize) -> Self {
		Self {
			buf: vec![0; capacity],
			pos: 0,
		}
	}

	/// Rewinds the write position to zero. Capacity is kept.
	pub fn reset(&mut self) {
		self.pos = 0;
	}

	/// Number of bytes written since the last reset.
	pub fn len(&self) -> usize {
		self.pos
	}

	pub fn is_empty(&self) -> bool {
		self.pos == 0
	}

	/// Currently allocated size of the backing buffer.
	pub fn capacity(&self) -> usize {
		self.buf.len()
	}

	/// Exactly the written prefix of the buffer.
	pub fn as_bytes(&self) -> &[u8] {
		&self.buf[.. self.pos]
	}

	/// Copies the written prefix into a new vector.
	pub fn to_vec(&self) -> Vec<u8> {
		self.as_bytes().to_vec()
	}

	/// Copies the written prefix into an immutable [`Bytes`] handle.
	pub fn to_bytes(&self) -> Bytes {
		Bytes::copy_from_slice(self.as_bytes())
	}

	fn ensure_space(&mut self, needed: usize) {
		let required = self.pos + needed;
		if required > self.buf.len() {
			let new_len = required.next_power_of_two();
			self.buf.resize(new_len, 0);
		}
	}

	fn put(&mut self, bytes: &[u8]) {
		self.ensure_space(bytes.len());
		self.buf[self.pos .. self.pos + bytes.len()].copy_from_slice(bytes);
		self.pos += bytes.len();
	}

	/// Appends raw bytes.
	pub fn write_bytes(&mut self, bytes: &[u8]) {
		self.put(bytes);
	}

	pub fn write_u8(&mut self, v: u8) {
		self.put(&[v]);
	}

	pub fn write_i8(&mut self, v: i8) {
		self.put(&v.to_be_bytes());
	}

	/// Writes a boolean as a single byte, `1` or `0`.
	pub fn write_bool(&mut self, v: bool) {
		self.put(&[u8::from(v)]);
	}

	pub fn write_i16(&mut self, v: i16) {
		self.put(&v.to_be_bytes());
	}

	pub fn write_u16(&mut self, v: u16) {
		self.put(&v.to_be_bytes());
	}

	pub fn write_i32(&mut self, v: i32) {
		self.put(&v.to_be_bytes());
	}

	pub fn write_u32(&mut self, v: u32) {
		self.put(&v.to_be_bytes());
	}

	pub fn write_i64(&mut self, v: i64) {
		self.put(&v.to_be_bytes());
	}

	pub fn write_f32(&mut self, v: f32) {
		self.put(&v.to_be_bytes());
	}

	pub fn write_f64(&mut self, v: f64) {
		self.put(&v.to_be_bytes());
	}

	/// Writes the bytes of `s` followed by a zero terminator.
	///
	/// Fails if `s` contains an interior NUL, since the terminator would
	/// truncate it on the reading side.
	pub fn write_string_z(&mut self, s: &str) -> Result<(), CodecError> {
		if s.as_bytes().contains(&0) {
			return Err(CodecError::invalid_string(format!(
				"interior NUL in {s:?}"
			)));
		}
		self.ensure_space(s.len() + 1);
		self.put(s.as_bytes());
		self.write_u8(0);
		Ok(())
	}

	/// Length-prefixed "modified UTF-8" strings are not part of the LCM
	/// wire format. Always fails.
	pub fn write_utf(&mut self, _s: &str) -> Result<(), CodecError> {
		Err(CodecError::Unsupported("modified UTF-8 strings"))
	}
}
