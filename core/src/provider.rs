//! Transport providers
//!
//! A provider moves `(channel, bytes)` messages over one transport. The bus
//! owns any number of them, fans every publish out to all, and receives from
//! all of them through one [`SubscriptionManager`]. Providers are selected by
//! the protocol of their connection URL:
//!
//! - `udpm://group:port?ttl=N` broadcasts over UDP multicast
//! - `tcpq://host:port` relays through a hub process
//! - `memq://` loops messages back inside the current process

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

pub mod error;
pub mod fragment;
pub mod memq;
pub mod task;
pub mod tcpq;
pub mod udpm;

#[cfg(test)]
mod tcpq_tests;

pub use error::ProviderError;
pub use memq::MemqProvider;
pub use task::ReceiveTask;
pub use tcpq::TcpqProvider;
pub use udpm::UdpmProvider;

use crate::client::config::ClientSettings;
use crate::routing::SubscriptionManager;
use crate::url_parser::UrlParser;

/// One transport plugged into a bus.
///
/// Received messages are handed to the [`SubscriptionManager`] the provider
/// was created with. `subscribe`/`unsubscribe` are transport hints; their
/// effect depends on the provider.
#[async_trait]
pub trait Provider: Send + Sync {
	/// Short transport name, used in logs.
	fn name(&self) -> &'static str;

	async fn publish(
		&self,
		channel: &str,
		data: &[u8],
	) -> Result<(), ProviderError>;

	async fn subscribe(&self, pattern: &str) -> Result<(), ProviderError>;

	async fn unsubscribe(&self, pattern: &str) -> Result<(), ProviderError>;

	/// Stops background work and releases sockets. Returns after the last
	/// delivery from this provider has finished.
	async fn close(&self);
}

/// Builds the provider selected by `url`'s protocol.
///
/// Returns `Ok(None)` for an unknown protocol, after logging it.
pub async fn create_provider(
	url: &UrlParser,
	dispatcher: Arc<SubscriptionManager>,
	settings: &ClientSettings,
) -> Result<Option<Box<dyn Provider>>, ProviderError> {
	let provider: Box<dyn Provider> = match url.protocol() {
		| "udpm" => Box::new(UdpmProvider::new(url, dispatcher, settings).await?),
		| "tcpq" => Box::new(TcpqProvider::new(url, dispatcher, settings).await?),
		| "memq" => Box::new(MemqProvider::new(dispatcher)),
		| other => {
			warn!(protocol = %other, url = %url.url(), "Unknown LCM provider protocol, skipping");
			return Ok(None);
		}
	};
	Ok(Some(provider))
}

/// Resolves a `host[:port]` network string to one socket address.
///
/// IPv4 results are preferred. `default_port` is used when the port is
/// omitted; without it a missing port is an error.
pub(crate) async fn resolve_network(
	network: &str,
	default_port: Option<u16>,
) -> Result<SocketAddr, ProviderError> {
	let (host, port) = match network.rsplit_once(':') {
		| Some((host, port)) => {
			let port = port.parse::<u16>().map_err(|_| {
				ProviderError::invalid_network(network, "port is not a number")
			})?;
			(host, port)
		}
		| None => match default_port {
			| Some(port) => (network, port),
			| None => {
				return Err(ProviderError::invalid_network(
					network,
					"expected host:port",
				));
			}
		},
	};
	let addrs: Vec<SocketAddr> =
		tokio::net::lookup_host((host, port)).await?.collect();
	addrs
		.iter()
		.find(|addr| addr.is_ipv4())
		.or_else(|| addrs.first())
		.copied()
		.ok_or_else(|| {
			ProviderError::invalid_network(network, "host did not resolve")
		})
}
