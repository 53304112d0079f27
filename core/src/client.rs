//! Application-facing bus
//!
//! [`Lcm`] owns the providers and the subscription registry. Typed
//! publishing and subscribing build on the encode/decode traits in
//! [`message_serializer`](crate::message_serializer), and
//! [`MessageAggregator`] turns callback delivery into a pollable queue.

pub mod aggregator;
/// The message bus
pub mod async_client;
pub mod config;
/// Bus error types
pub mod error;
/// Typed publisher
pub mod publisher;
/// Typed subscription handler
pub mod subscriber;

pub use aggregator::{Message, MessageAggregator};
pub use async_client::Lcm;
pub use config::{ClientSettings, LcmConfig};
pub use error::LcmError;
pub use publisher::LcmPublisher;
pub use subscriber::{IncomingMessage, TypedHandler};
