use thiserror::Error;

/// Errors during subscription operations
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionError {
	/// The registry was closed together with its bus
	#[error("Subscription manager is closed")]
	Closed,
}
