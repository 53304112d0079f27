//! Binary codec for LCM wire data
//!
//! All multi-byte scalars are big-endian, booleans occupy one byte (nonzero
//! is `true`) and strings are zero-terminated byte sequences. The output
//! side is a growable buffer with a logical write position, the input side a
//! bounds-checked cursor over a fixed byte range.

/// Codec error types
pub mod error;
/// Bounds-checked reader
pub mod input;
/// Growable writer
pub mod output;


pub use error::CodecError;
pub use input::LcmDataInput;
pub use output::LcmDataOutput;
