use thiserror::Error;

/// Errors raised while encoding or decoding LCM wire data
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
	/// A read asked for more bytes than remain in the input range
	#[error(
		"Insufficient data: needed {requested} bytes, only {available} \
		 available"
	)]
	InsufficientData {
		/// Bytes requested by the read
		requested: usize,
		/// Bytes left in the input range
		available: usize,
	},

	/// A declared length or range is out of bounds
	#[error("Invalid length {length}: {reason}")]
	InvalidLength {
		/// The offending length
		length: i64,
		/// Why the length was rejected
		reason: &'static str,
	},

	/// The requested encoding is not supported by this codec
	#[error("Unsupported encoding: {0}")]
	Unsupported(&'static str),

	/// A string could not be encoded or decoded
	#[error("Invalid string: {0}")]
	InvalidString(String),
}

impl CodecError {
	/// Creates a new InsufficientData error
	pub fn insufficient_data(requested: usize, available: usize) -> Self {
		Self::InsufficientData {
			requested,
			available,
		}
	}

	/// Creates a new InvalidLength error
	pub fn invalid_length(length: impl Into<i64>, reason: &'static str) -> Self {
		Self::InvalidLength {
			length: length.into(),
			reason,
		}
	}

	/// Creates a new InvalidString error
	pub fn invalid_string(details: impl Into<String>) -> Self {
		Self::InvalidString(details.into())
	}
}
