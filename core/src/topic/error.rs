use thiserror::Error;

/// Errors raised while compiling a channel pattern
#[derive(Error, Debug, Clone)]
pub enum ChannelPatternError {
	/// The pattern is not a valid regular expression
	#[error("Invalid channel pattern '{pattern}': {source}")]
	Invalid {
		/// The rejected pattern
		pattern: String,
		/// Underlying regex compile error
		#[source]
		source: regex::Error,
	},
}

impl ChannelPatternError {
	/// Creates a new Invalid error
	pub fn invalid(pattern: impl Into<String>, source: regex::Error) -> Self {
		Self::Invalid {
			pattern: pattern.into(),
			source,
		}
	}
}
