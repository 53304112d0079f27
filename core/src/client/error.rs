use crate::codec::CodecError;
use crate::provider::ProviderError;
use crate::routing::SubscriptionError;
use crate::topic::ChannelPatternError;
use crate::url_parser::UrlError;

/// Errors returned by [`Lcm`](super::Lcm) operations
#[derive(Debug, thiserror::Error)]
pub enum LcmError {
	/// The bus was closed; every operation fails from then on
	#[error("LCM bus is closed")]
	Closed,

	/// Encoding a typed message failed
	#[error("Codec error: {0}")]
	Codec(#[from] CodecError),

	/// A provider URL could not be parsed
	#[error("URL error: {0}")]
	Url(#[from] UrlError),

	/// A subscription pattern is not a valid regular expression
	#[error("Invalid channel pattern: {0}")]
	Pattern(#[from] ChannelPatternError),

	/// A provider failed in a way the caller has to handle
	#[error("Provider error: {0}")]
	Provider(#[from] ProviderError),

	/// None of the configured URLs produced a provider
	#[error("No usable provider among {urls:?}")]
	NoProviders {
		/// The URLs that were tried
		urls: Vec<String>,
	},

	/// Invalid configuration parameter value
	#[error("Invalid configuration value: {0}")]
	ConfigurationValue(String),
}

impl LcmError {
	pub fn configuration_value(reason: impl Into<String>) -> Self {
		Self::ConfigurationValue(reason.into())
	}
}

impl From<SubscriptionError> for LcmError {
	fn from(err: SubscriptionError) -> Self {
		match err {
			| SubscriptionError::Closed => Self::Closed,
		}
	}
}
