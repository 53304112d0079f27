//! # LCM Bus
//!
//! Lightweight publish/subscribe messaging over interchangeable transports.
//! Messages are `(channel, bytes)` pairs; subscriptions are regular
//! expressions matched against the full channel name.
//!
//! ## Features
//!
//! - **UDP multicast** (`udpm://`): fire-and-forget broadcast with
//!   fragmentation of messages larger than one datagram
//! - **TCP hub** (`tcpq://`): relay through a central [`hub`] process, with
//!   automatic reconnect and resubscribe
//! - **In-process loopback** (`memq://`)
//! - **Typed messages** through [`LcmEncode`]/[`LcmDecode`] over the binary
//!   [`codec`]
//! - **Polling consumers** through [`MessageAggregator`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use lcm_bus_core::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), LcmError> {
//!     let lcm = Lcm::connect(&["udpm://239.255.76.67:7667?ttl=1"]).await?;
//!
//!     // Callback delivery, on the provider's receive task
//!     lcm.subscribe_fn("TEMP.*", |channel, data| {
//!         println!("{channel}: {} bytes", data.len());
//!     })
//!     .await?;
//!
//!     // Queued delivery for a polling consumer
//!     let aggregator = Arc::new(MessageAggregator::new());
//!     lcm.subscribe(".*", aggregator.clone()).await?;
//!
//!     let publisher = lcm.publisher::<f64>("TEMPERATURE")?;
//!     publisher.publish(&21.5).await?;
//!
//!     if let Some(message) =
//!         aggregator.next_message(Some(Duration::from_secs(1))).await
//!     {
//!         println!("queued message on {}", message.channel);
//!     }
//!
//!     lcm.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Channel patterns
//!
//! Patterns are anchored: `"FOO"` matches only the channel `FOO`, while
//! `"FOO.*"` matches `FOO`, `FOOBAR` and so on. `".*"` matches everything.

pub mod client;
pub mod codec;
pub mod hub;
pub mod message_serializer;
pub mod provider;
pub mod routing;
pub mod topic;
pub mod url_parser;

// === Core Public API ===
pub use client::{
	ClientSettings, IncomingMessage, Lcm, LcmConfig, LcmError, LcmPublisher,
	Message, MessageAggregator,
};
pub use codec::{CodecError, LcmDataInput, LcmDataOutput};
pub use message_serializer::{LcmDecode, LcmEncode};
pub use routing::{MessageHandler, SharedHandler, SubscriptionId};
// === Advanced API ===
pub use hub::{HubConfig, HubHandle, HubService};
pub use provider::{Provider, ProviderError};
pub use routing::{CacheStrategy, SubscriptionManager};
pub use topic::ChannelPattern;
pub use url_parser::{UrlError, UrlParser};

/// Result type alias for bus operations
pub type Result<T> = std::result::Result<T, LcmError>;

/// Essential types for most applications.
///
/// ```rust
/// use lcm_bus_core::prelude::*;
/// ```
pub mod prelude {
	pub use crate::{
		ClientSettings, IncomingMessage, Lcm, LcmConfig, LcmDecode, LcmEncode,
		LcmError, LcmPublisher, Message, MessageAggregator, MessageHandler,
		SharedHandler, SubscriptionId,
	};
}

/// All error types in one place.
///
/// ```rust
/// use lcm_bus_core::errors::*;
/// ```
pub mod errors {
	pub use crate::codec::CodecError;
	pub use crate::hub::HubError;
	pub use crate::provider::ProviderError;
	pub use crate::provider::fragment::DatagramError;
	pub use crate::routing::SubscriptionError;
	pub use crate::topic::ChannelPatternError;
	pub use crate::url_parser::UrlError;
	pub use crate::LcmError;
}
