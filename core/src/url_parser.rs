//! Connection URL parsing
//!
//! Transports are configured with strings of the form
//! `protocol://[network][?key=value[&key=value...]]`.

use std::collections::HashMap;
use std::str::FromStr;

use thiserror::Error;
use tracing::warn;

/// Errors raised while parsing or reading a connection URL
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UrlError {
	/// The URL has no `://` separator or an empty protocol
	#[error("Invalid URL '{url}': {reason}")]
	InvalidUrl {
		/// The rejected URL
		url: String,
		/// What is wrong with it
		reason: &'static str,
	},

	/// A parameter is present but cannot be read as the requested type
	#[error("Invalid value '{value}' for '{key}': expected {expected}")]
	InvalidValue {
		/// Parameter name
		key: String,
		/// Raw parameter value
		value: String,
		/// Name of the requested type
		expected: &'static str,
	},
}

impl UrlError {
	/// Creates a new InvalidUrl error
	pub fn invalid_url(url: impl Into<String>, reason: &'static str) -> Self {
		Self::InvalidUrl {
			url: url.into(),
			reason,
		}
	}

	/// Creates a new InvalidValue error
	pub fn invalid_value(
		key: impl Into<String>,
		value: impl Into<String>,
		expected: &'static str,
	) -> Self {
		Self::InvalidValue {
			key: key.into(),
			value: value.into(),
			expected,
		}
	}
}

const PROTOCOL_KEY: &str = "protocol";
const NETWORK_KEY: &str = "network";

/// Parameter bag produced from a connection URL.
///
/// `protocol` is always present; `network` is present when the URL has a
/// non-empty section between `://` and `?`. Every `key=value` pair from the
/// query part is stored as-is, later duplicates replacing earlier ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlParser {
	url: String,
	params: HashMap<String, String>,
}

impl FromStr for UrlParser {
	type Err = UrlError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::parse(s)
	}
}

impl UrlParser {
	/// Parses `url`. Malformed `key=value` pairs are logged and skipped.
	pub fn parse(url: &str) -> Result<Self, UrlError> {
		let Some((protocol, rest)) = url.split_once("://") else {
			return Err(UrlError::invalid_url(url, "missing '://' separator"));
		};
		if protocol.is_empty() {
			return Err(UrlError::invalid_url(url, "empty protocol"));
		}

		let mut params = HashMap::new();
		params.insert(PROTOCOL_KEY.to_string(), protocol.to_string());

		let (network, query) = match rest.split_once('?') {
			| Some((network, query)) => (network, Some(query)),
			| None => (rest, None),
		};
		if !network.is_empty() {
			params.insert(NETWORK_KEY.to_string(), network.to_string());
		}

		for pair in query.into_iter().flat_map(|q| q.split('&')) {
			if pair.is_empty() {
				continue;
			}
			let parts: Vec<&str> = pair.split('=').collect();
			let [key, value] = parts.as_slice() else {
				warn!(url = %url, pair = %pair, "Ignoring malformed URL parameter");
				continue;
			};
			if *key == PROTOCOL_KEY {
				warn!(url = %url, "Ignoring reserved URL parameter 'protocol'");
				continue;
			}
			params.insert(key.to_string(), value.to_string());
		}

		Ok(Self {
			url: url.to_string(),
			params,
		})
	}

	/// The URL this bag was parsed from.
	pub fn url(&self) -> &str {
		&self.url
	}

	/// The scheme in front of `://`.
	pub fn protocol(&self) -> &str {
		self.params
			.get(PROTOCOL_KEY)
			.map(String::as_str)
			.unwrap_or_default()
	}

	/// The section between `://` and `?`, if non-empty.
	pub fn network(&self) -> Option<&str> {
		self.get(NETWORK_KEY)
	}

	pub fn contains(&self, key: &str) -> bool {
		self.params.contains_key(key)
	}

	pub fn get(&self, key: &str) -> Option<&str> {
		self.params.get(key).map(String::as_str)
	}

	pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
		self.get(key).unwrap_or(default)
	}

	fn get_parsed<T: FromStr>(
		&self,
		key: &str,
		default: T,
		expected: &'static str,
	) -> Result<T, UrlError> {
		match self.get(key) {
			| None => Ok(default),
			| Some(raw) => raw
				.trim()
				.parse()
				.map_err(|_| UrlError::invalid_value(key, raw, expected)),
		}
	}

	/// Integer parameter. `default` applies only when the key is absent.
	pub fn get_int(&self, key: &str, default: i64) -> Result<i64, UrlError> {
		self.get_parsed(key, default, "integer")
	}

	/// Floating point parameter. `default` applies only when the key is
	/// absent.
	pub fn get_f64(&self, key: &str, default: f64) -> Result<f64, UrlError> {
		self.get_parsed(key, default, "number")
	}

	/// Boolean parameter, accepting `true`/`false`/`1`/`0` (case-insensitive
	/// for the words). `default` applies only when the key is absent.
	pub fn get_bool(&self, key: &str, default: bool) -> Result<bool, UrlError> {
		match self.get(key) {
			| None => Ok(default),
			| Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
				| "true" | "1" => Ok(true),
				| "false" | "0" => Ok(false),
				| _ => Err(UrlError::invalid_value(key, raw, "boolean")),
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_udpm_url_with_ttl() {
		let url = UrlParser::parse("udpm://239.255.76.67:7667?ttl=1").unwrap();
		assert_eq!(url.protocol(), "udpm");
		assert_eq!(url.network(), Some("239.255.76.67:7667"));
		assert_eq!(url.get_int("ttl", 0).unwrap(), 1);
	}

	#[test]
	fn test_missing_separator_is_invalid() {
		assert!(matches!(
			UrlParser::parse("bad-url"),
			Err(UrlError::InvalidUrl { .. })
		));
		assert!(matches!(
			UrlParser::parse("://host"),
			Err(UrlError::InvalidUrl { .. })
		));
	}

	#[test]
	fn test_empty_network_is_absent() {
		let url = UrlParser::parse("tcpq://").unwrap();
		assert_eq!(url.protocol(), "tcpq");
		assert_eq!(url.network(), None);

		let url = UrlParser::parse("udpm://?ttl=3").unwrap();
		assert_eq!(url.network(), None);
		assert_eq!(url.get("ttl"), Some("3"));
	}

	#[test]
	fn test_malformed_pairs_are_skipped() {
		let url =
			UrlParser::parse("udpm://h:1?a=1&broken&b=2&c=3=4&&d=").unwrap();
		assert_eq!(url.get("a"), Some("1"));
		assert_eq!(url.get("b"), Some("2"));
		assert_eq!(url.get("d"), Some(""));
		assert!(!url.contains("broken"));
		assert!(!url.contains("c"));
	}

	#[test]
	fn test_later_duplicate_wins_and_protocol_is_reserved() {
		let url =
			UrlParser::parse("memq://?k=first&k=second&protocol=udpm").unwrap();
		assert_eq!(url.get("k"), Some("second"));
		assert_eq!(url.protocol(), "memq");
	}

	#[test]
	fn test_default_applies_only_when_absent() {
		let url =
			UrlParser::parse("udpm://h:1?ttl=abc&loop=yes&rate=2.5").unwrap();
		assert_eq!(url.get_int("missing", 7).unwrap(), 7);
		assert!(matches!(
			url.get_int("ttl", 0),
			Err(UrlError::InvalidValue { ref key, .. }) if key == "ttl"
		));
		assert!(url.get_bool("loop", true).is_err());
		assert_eq!(url.get_f64("rate", 0.0).unwrap(), 2.5);
		assert_eq!(url.get_or("missing", "fallback"), "fallback");
	}

	#[test]
	fn test_bool_spellings() {
		let url = UrlParser::parse("x://?a=TRUE&b=0&c=1&d=false").unwrap();
		assert!(url.get_bool("a", false).unwrap());
		assert!(!url.get_bool("b", true).unwrap());
		assert!(url.get_bool("c", false).unwrap());
		assert!(!url.get_bool("d", true).unwrap());
	}
}
