use std::fmt::{self, Display};
use std::sync::Arc;

use crate::topic::ChannelPattern;

/// Receiver of messages delivered by a bus.
///
/// Called synchronously on the delivering provider's task while the
/// subscription lock is held. Implementations must not call back into
/// subscribe, unsubscribe or close on the same bus; doing so deadlocks.
pub trait MessageHandler: Send + Sync + 'static {
	fn message_received(&self, channel: &str, data: &[u8]);
}

impl<F> MessageHandler for F
where F: Fn(&str, &[u8]) + Send + Sync + 'static
{
	fn message_received(&self, channel: &str, data: &[u8]) {
		self(channel, data)
	}
}

/// Reference-counted handler, compared by identity.
pub type SharedHandler = Arc<dyn MessageHandler>;

/// Whether two handles refer to the same handler instance.
pub fn same_handler(a: &SharedHandler, b: &SharedHandler) -> bool {
	std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// A subscription identifier.
///
/// Unique within one bus. Two subscriptions with the same pattern and
/// handler still get distinct ids.
#[derive(Debug, Eq, PartialEq, Hash, Copy, Clone, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
	pub(crate) fn new(raw: u64) -> Self {
		Self(raw)
	}
}

impl Display for SubscriptionId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "SubscriptionId({})", self.0)
	}
}

/// One registered subscription.
pub struct SubscriptionRecord {
	pub(crate) id: SubscriptionId,
	pub(crate) pattern: ChannelPattern,
	pub(crate) handler: SharedHandler,
}

impl SubscriptionRecord {
	pub fn id(&self) -> SubscriptionId {
		self.id
	}

	pub fn pattern(&self) -> &ChannelPattern {
		&self.pattern
	}

	pub(crate) fn deliver(&self, channel: &str, data: &[u8]) {
		self.handler.message_received(channel, data)
	}
}

impl fmt::Debug for SubscriptionRecord {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("SubscriptionRecord")
			.field("id", &self.id)
			.field("pattern", &self.pattern.as_str())
			.finish_non_exhaustive()
	}
}
