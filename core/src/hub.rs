//! TCP relay for environments without multicast.
//!
//! Clients connect with `tcpq://host:port`, register channel patterns and
//! publish through the relay, which forwards each message to the other
//! clients whose patterns match its channel.

pub mod protocol;
pub mod service;

#[cfg(test)]
mod service_tests;

pub use protocol::{Frame, HubError, MessageType};
pub use service::{DEFAULT_PORT, HubConfig, HubHandle, HubService};
