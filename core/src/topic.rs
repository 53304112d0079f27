//! Channel pattern handling
//!
//! Subscriptions select channels with regular expressions that must match
//! the whole channel name.

pub mod channel_pattern;
pub mod error;

pub use channel_pattern::ChannelPattern;
pub use error::ChannelPatternError;
