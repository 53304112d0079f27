use thiserror::Error;

use crate::url_parser::UrlError;

/// Errors raised by transport providers
#[derive(Debug, Error)]
pub enum ProviderError {
	/// Socket level failure
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	/// The payload needs more UDP fragments than the 16-bit count allows
	#[error(
		"Message of {size} bytes needs {fragments} fragments, at most 65535 \
		 allowed"
	)]
	MessageTooLarge {
		/// Payload size in bytes
		size: usize,
		/// Fragments the payload would need
		fragments: usize,
	},

	/// The channel name cannot be put on the wire
	#[error("Invalid channel '{channel}': {reason}")]
	InvalidChannel {
		/// The rejected channel
		channel: String,
		/// Why it was rejected
		reason: &'static str,
	},

	/// No provider is registered for the URL's protocol
	#[error("Unknown protocol '{0}'")]
	UnknownProtocol(String),

	/// The `network` parameter is not a usable `host:port`
	#[error("Invalid network '{network}': {reason}")]
	InvalidNetwork {
		/// The rejected network string
		network: String,
		/// Why it was rejected
		reason: String,
	},

	/// Malformed URL or parameter value
	#[error("URL error: {0}")]
	Url(#[from] UrlError),
}

impl ProviderError {
	/// Creates a new InvalidChannel error
	pub fn invalid_channel(
		channel: impl Into<String>,
		reason: &'static str,
	) -> Self {
		Self::InvalidChannel {
			channel: channel.into(),
			reason,
		}
	}

	/// Creates a new InvalidNetwork error
	pub fn invalid_network(
		network: impl Into<String>,
		reason: impl Into<String>,
	) -> Self {
		Self::InvalidNetwork {
			network: network.into(),
			reason: reason.into(),
		}
	}
}
