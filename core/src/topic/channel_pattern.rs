use std::fmt::{self, Display};

use arcstr::ArcStr;
use regex::Regex;

use super::error::ChannelPatternError;

/// A compiled channel-name regular expression.
///
/// The pattern is anchored on both ends, so `"FOO"` matches only the channel
/// `FOO` and `"SENSOR_.*"` matches every channel starting with `SENSOR_`.
/// Explicit `^`/`$` anchors in the source pattern are harmless.
#[derive(Debug, Clone)]
pub struct ChannelPattern {
	pattern: ArcStr,
	regex: Regex,
}

impl ChannelPattern {
	/// Pattern matching every channel.
	pub const MATCH_ALL: &'static str = ".*";

	pub fn new(pattern: impl Into<ArcStr>) -> Result<Self, ChannelPatternError> {
		let pattern = pattern.into();
		let regex = Regex::new(&format!("^(?:{pattern})$"))
			.map_err(|e| ChannelPatternError::invalid(pattern.as_str(), e))?;
		Ok(Self { pattern, regex })
	}

	/// Whether `channel` matches the pattern in full.
	pub fn is_match(&self, channel: &str) -> bool {
		self.regex.is_match(channel)
	}

	/// The pattern as written by the subscriber.
	pub fn as_str(&self) -> &str {
		&self.pattern
	}

	pub fn as_arcstr(&self) -> &ArcStr {
		&self.pattern
	}
}

impl Display for ChannelPattern {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.pattern)
	}
}

impl TryFrom<&str> for ChannelPattern {
	type Error = ChannelPatternError;

	fn try_from(value: &str) -> Result<Self, Self::Error> {
		Self::new(value)
	}
}

impl TryFrom<String> for ChannelPattern {
	type Error = ChannelPatternError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		Self::new(value)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_match_all() {
		let pattern = ChannelPattern::new(ChannelPattern::MATCH_ALL).unwrap();
		for channel in ["", "FOO", "a/b/c", "TEMPERATURE"] {
			assert!(pattern.is_match(channel), "{channel}");
		}
	}

	#[test]
	fn test_full_string_match() {
		let pattern = ChannelPattern::new("^FOO$").unwrap();
		assert!(pattern.is_match("FOO"));
		assert!(!pattern.is_match("FOOBAR"));

		let bare = ChannelPattern::new("FOO").unwrap();
		assert!(bare.is_match("FOO"));
		assert!(!bare.is_match("FOOBAR"));
		assert!(!bare.is_match("XFOO"));
	}

	#[test]
	fn test_alternation_is_anchored_as_a_whole() {
		let pattern = ChannelPattern::new("A|B").unwrap();
		assert!(pattern.is_match("A"));
		assert!(pattern.is_match("B"));
		assert!(!pattern.is_match("AB"));
		assert!(!pattern.is_match("xB"));
	}

	#[test]
	fn test_prefix_pattern() {
		let pattern = ChannelPattern::new("TEMP.*").unwrap();
		assert!(pattern.is_match("TEMPERATURE"));
		assert!(!pattern.is_match("ATEMP"));
		assert_eq!(pattern.as_str(), "TEMP.*");
	}

	#[test]
	fn test_invalid_pattern() {
		let err = ChannelPattern::new("(unclosed").unwrap_err();
		assert!(err.to_string().contains("(unclosed"));
	}
}
