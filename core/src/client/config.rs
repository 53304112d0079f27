//! Configuration for bus construction

use std::num::NonZeroUsize;
use std::time::Duration;

use super::error::LcmError;
use crate::routing::CacheStrategy;

/// Environment variable consulted when no URL is given
pub const DEFAULT_URL_ENV: &str = "LCM_DEFAULT_URL";
/// URL used when neither an explicit URL nor the environment provides one
pub const DEFAULT_URL: &str = "udpm://239.255.76.67:7667?ttl=0";

/// Bus-level tuning shared by every provider
#[derive(Debug, Clone)]
pub struct ClientSettings {
	/// Channels remembered by the dispatch cache (must be > 0)
	pub channel_cache_size: usize,
	/// Pause between failed connection attempts to a hub
	pub hub_reconnect_delay: Duration,
	/// Limit on connecting to a hub and exchanging greetings
	pub hub_handshake_timeout: Duration,
	/// Requested kernel receive buffer for UDP sockets
	pub udp_recv_buffer_size: usize,
}

impl Default for ClientSettings {
	fn default() -> Self {
		Self {
			channel_cache_size: 1000,
			hub_reconnect_delay: Duration::from_millis(500),
			hub_handshake_timeout: Duration::from_secs(5),
			udp_recv_buffer_size: 2 * 1024 * 1024,
		}
	}
}

impl ClientSettings {
	pub(crate) fn cache_strategy(&self) -> Result<CacheStrategy, LcmError> {
		NonZeroUsize::new(self.channel_cache_size)
			.map(CacheStrategy::Lru)
			.ok_or_else(|| {
				LcmError::configuration_value(
					"channel_cache_size must be greater than 0",
				)
			})
	}
}

/// Everything needed to construct an [`Lcm`](super::Lcm) bus
#[derive(Debug, Clone)]
pub struct LcmConfig {
	/// Provider URLs, e.g. `udpm://239.255.76.67:7667?ttl=1`
	pub urls: Vec<String>,
	/// Bus-level tuning
	pub settings: ClientSettings,
}

impl LcmConfig {
	/// Config for the given URLs. An empty list falls back to
	/// [`from_env`](Self::from_env).
	pub fn new<I, S>(urls: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		let urls: Vec<String> = urls.into_iter().map(Into::into).collect();
		if urls.is_empty() {
			return Self::from_env();
		}
		Self {
			urls,
			settings: ClientSettings::default(),
		}
	}

	/// Single URL from `LCM_DEFAULT_URL`, or the local multicast default.
	pub fn from_env() -> Self {
		let url = std::env::var(DEFAULT_URL_ENV)
			.ok()
			.filter(|url| !url.trim().is_empty())
			.unwrap_or_else(|| DEFAULT_URL.to_string());
		Self {
			urls: vec![url],
			settings: ClientSettings::default(),
		}
	}

	/// Replaces the settings.
	pub fn with_settings(mut self, settings: ClientSettings) -> Self {
		self.settings = settings;
		self
	}
}
