//! Subscription registry and dispatch
//!
//! Holds every subscription of a bus together with a per-channel cache of
//! matching subscriptions, and delivers received messages to them.

pub mod error;
pub mod subscriber;
pub mod subscription_manager;

#[cfg(test)]
mod subscription_manager_tests;

pub use error::SubscriptionError;
pub use subscriber::{
	MessageHandler, SharedHandler, SubscriptionId, SubscriptionRecord,
};
pub use subscription_manager::{CacheStrategy, SubscriptionManager};
