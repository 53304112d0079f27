//! Bounded message queue for polling consumers.
//!
//! Subscribe a [`MessageAggregator`] like any other handler and drain it from
//! whichever task suits the application, instead of processing messages on
//! the provider's receive task.

use std::collections::VecDeque;
use std::time::Duration;

use arcstr::ArcStr;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::trace;

use crate::routing::MessageHandler;

/// Default limit on queued payload bytes (100 MiB)
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 100 * 1024 * 1024;

/// One queued message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
	pub channel: ArcStr,
	pub data: Bytes,
}

#[derive(Debug)]
struct Queue {
	messages: VecDeque<Message>,
	queued_bytes: usize,
	max_bytes: usize,
	max_messages: usize,
}

impl Queue {
	/// Drops the oldest messages until both limits hold.
	fn evict(&mut self) {
		while self.queued_bytes > self.max_bytes
			|| self.messages.len() > self.max_messages
		{
			let Some(evicted) = self.messages.pop_front() else {
				break;
			};
			self.queued_bytes -= evicted.data.len();
			trace!(channel = %evicted.channel, size = evicted.data.len(), "Evicted queued message");
		}
	}
}

/// FIFO of received messages, bounded by total payload size and by count.
///
/// When a new message pushes the queue over either limit, the oldest
/// messages are dropped.
#[derive(Debug)]
pub struct MessageAggregator {
	queue: Mutex<Queue>,
	available: Notify,
}

impl Default for MessageAggregator {
	fn default() -> Self {
		Self::new()
	}
}

impl MessageAggregator {
	/// Empty queue with a 100 MiB byte limit and no count limit.
	pub fn new() -> Self {
		Self {
			queue: Mutex::new(Queue {
				messages: VecDeque::new(),
				queued_bytes: 0,
				max_bytes: DEFAULT_MAX_BUFFER_SIZE,
				max_messages: usize::MAX,
			}),
			available: Notify::new(),
		}
	}

	/// Appends a message and evicts from the front as needed.
	pub fn enqueue(&self, channel: impl Into<ArcStr>, data: Bytes) {
		{
			let mut queue = self.queue.lock();
			queue.queued_bytes += data.len();
			queue.messages.push_back(Message {
				channel: channel.into(),
				data,
			});
			queue.evict();
		}
		self.available.notify_waiters();
	}

	/// Oldest queued message, without waiting.
	pub fn try_next_message(&self) -> Option<Message> {
		let mut queue = self.queue.lock();
		let message = queue.messages.pop_front()?;
		queue.queued_bytes -= message.data.len();
		Some(message)
	}

	/// Oldest queued message, waiting for one to arrive if the queue is
	/// empty.
	///
	/// `None` waits indefinitely; `Some(Duration::ZERO)` never waits.
	/// Returns `None` if the timeout expires with nothing queued.
	pub async fn next_message(&self, timeout: Option<Duration>) -> Option<Message> {
		let deadline = timeout.map(|timeout| Instant::now() + timeout);
		loop {
			let notified = self.available.notified();
			tokio::pin!(notified);
			// registered before the check so an enqueue in between is not missed
			notified.as_mut().enable();

			if let Some(message) = self.try_next_message() {
				return Some(message);
			}
			match deadline {
				| None => notified.await,
				| Some(deadline) => {
					if tokio::time::timeout_at(deadline, notified).await.is_err() {
						return self.try_next_message();
					}
				}
			}
		}
	}

	/// Number of queued messages.
	pub fn messages_available(&self) -> usize {
		self.queue.lock().messages.len()
	}

	/// Total payload bytes currently queued.
	pub fn queued_bytes(&self) -> usize {
		self.queue.lock().queued_bytes
	}

	pub fn max_buffer_size(&self) -> usize {
		self.queue.lock().max_bytes
	}

	/// Sets the payload byte limit, evicting immediately if it is exceeded.
	pub fn set_max_buffer_size(&self, max_bytes: usize) {
		let mut queue = self.queue.lock();
		queue.max_bytes = max_bytes;
		queue.evict();
	}

	pub fn max_messages(&self) -> usize {
		self.queue.lock().max_messages
	}

	/// Sets the message count limit, evicting immediately if it is exceeded.
	pub fn set_max_messages(&self, max_messages: usize) {
		let mut queue = self.queue.lock();
		queue.max_messages = max_messages;
		queue.evict();
	}
}

impl MessageHandler for MessageAggregator {
	fn message_received(&self, channel: &str, data: &[u8]) {
		self.enqueue(channel, Bytes::copy_from_slice(data));
	}
}
