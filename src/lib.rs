//! # lcm-bus
//!
//! Publish/subscribe message bus over UDP multicast, a TCP hub relay, or
//! in-process loopback.
//!
//! This crate re-exports [`lcm_bus_core`] and ships the `lcm-hub` relay
//! binary.
//!
//! ```rust,no_run
//! use lcm_bus::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), LcmError> {
//!     let lcm = Lcm::connect(&["tcpq://127.0.0.1:7700"]).await?;
//!     lcm.subscribe_fn("STATUS", |channel, data| {
//!         println!("{channel}: {data:?}");
//!     })
//!     .await?;
//!     lcm.publish_str("STATUS", "ready").await?;
//!     lcm.close().await?;
//!     Ok(())
//! }
//! ```

pub use lcm_bus_core::*;

/// Essential types for most applications.
pub mod prelude {
	pub use lcm_bus_core::prelude::*;
}
