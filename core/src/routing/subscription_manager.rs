use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arcstr::ArcStr;
use lru::LruCache;
use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::{debug, trace};

use super::error::SubscriptionError;
use super::subscriber::{
	SharedHandler, SubscriptionId, SubscriptionRecord, same_handler,
};
use crate::topic::ChannelPattern;

/// Caching strategy for per-channel subscription lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStrategy {
	/// Keep the match list of up to N most recently seen channels
	Lru(NonZeroUsize),
	/// Match every pattern on every message
	NoCache,
}

impl Default for CacheStrategy {
	fn default() -> Self {
		Self::Lru(NonZeroUsize::new(1000).unwrap_or(NonZeroUsize::MIN))
	}
}

type MatchList = SmallVec<[Arc<SubscriptionRecord>; 4]>;

/// Subscription list plus the channel match cache.
///
/// A cached entry always equals the set of subscriptions whose pattern
/// matches that channel, in registration order. Evicting an entry is always
/// safe; it is rebuilt on the next message for that channel.
struct SubscriptionTable {
	subscriptions: Vec<Arc<SubscriptionRecord>>,
	channel_cache: Option<LruCache<ArcStr, MatchList>>,
	next_id: u64,
}

impl SubscriptionTable {
	fn new(cache_strategy: CacheStrategy) -> Self {
		let channel_cache = match cache_strategy {
			| CacheStrategy::Lru(capacity) => Some(LruCache::new(capacity)),
			| CacheStrategy::NoCache => None,
		};
		Self {
			subscriptions: Vec::new(),
			channel_cache,
			next_id: 0,
		}
	}

	fn add(
		&mut self,
		pattern: ChannelPattern,
		handler: SharedHandler,
	) -> SubscriptionId {
		let id = SubscriptionId::new(self.next_id);
		self.next_id = self.next_id.wrapping_add(1);
		let record = Arc::new(SubscriptionRecord {
			id,
			pattern,
			handler,
		});

		// Ids grow monotonically, so appending keeps registration order.
		if let Some(cache) = self.channel_cache.as_mut() {
			for (channel, matches) in cache.iter_mut() {
				if record.pattern.is_match(channel) {
					matches.push(Arc::clone(&record));
				}
			}
		}
		self.subscriptions.push(record);
		id
	}

	fn remove_where<P>(&mut self, predicate: P) -> Vec<Arc<SubscriptionRecord>>
	where P: Fn(&SubscriptionRecord) -> bool {
		let mut removed = Vec::new();
		self.subscriptions.retain(|record| {
			if predicate(record) {
				removed.push(Arc::clone(record));
				false
			} else {
				true
			}
		});
		if !removed.is_empty() {
			if let Some(cache) = self.channel_cache.as_mut() {
				for (_, matches) in cache.iter_mut() {
					matches.retain(|record| !predicate(record));
				}
			}
		}
		removed
	}

	fn matches(&mut self, channel: &str) -> MatchList {
		let Some(cache) = self.channel_cache.as_mut() else {
			return Self::compute_matches(&self.subscriptions, channel);
		};
		if let Some(matches) = cache.get(channel) {
			return matches.clone();
		}
		let matches = Self::compute_matches(&self.subscriptions, channel);
		trace!(channel = %channel, count = matches.len(), "Built channel match cache entry");
		cache.put(ArcStr::from(channel), matches.clone());
		matches
	}

	fn compute_matches(
		subscriptions: &[Arc<SubscriptionRecord>],
		channel: &str,
	) -> MatchList {
		subscriptions
			.iter()
			.filter(|record| record.pattern.is_match(channel))
			.cloned()
			.collect()
	}

	fn clear(&mut self) {
		self.subscriptions.clear();
		if let Some(cache) = self.channel_cache.as_mut() {
			cache.clear();
		}
	}
}

/// Thread-safe subscription registry and message dispatcher of one bus.
///
/// Subscription changes, cache maintenance and dispatch all run under one
/// lock. Handlers are therefore never invoked concurrently with a
/// subscription change, and once [`unsubscribe`](Self::unsubscribe) or
/// [`close`](Self::close) returns the removed handlers are never called
/// again.
pub struct SubscriptionManager {
	table: Mutex<SubscriptionTable>,
	closed: AtomicBool,
}

impl SubscriptionManager {
	pub fn new(cache_strategy: CacheStrategy) -> Self {
		Self {
			table: Mutex::new(SubscriptionTable::new(cache_strategy)),
			closed: AtomicBool::new(false),
		}
	}

	fn ensure_open(&self) -> Result<(), SubscriptionError> {
		if self.closed.load(Ordering::Acquire) {
			return Err(SubscriptionError::Closed);
		}
		Ok(())
	}

	/// Registers `handler` for every channel matching `pattern`.
	///
	/// Channels already in the cache pick up the new subscription
	/// immediately.
	pub fn subscribe(
		&self,
		pattern: ChannelPattern,
		handler: SharedHandler,
	) -> Result<SubscriptionId, SubscriptionError> {
		self.ensure_open()?;
		let mut table = self.table.lock();
		let id = table.add(pattern, handler);
		debug!(subscription_id = %id, "Subscription added");
		Ok(id)
	}

	/// Removes subscriptions by pattern text and/or handler identity.
	///
	/// `None` for either filter matches anything, so `(None, None)` removes
	/// every subscription. Returns the removed records.
	pub fn unsubscribe(
		&self,
		pattern: Option<&str>,
		handler: Option<&SharedHandler>,
	) -> Result<Vec<Arc<SubscriptionRecord>>, SubscriptionError> {
		self.ensure_open()?;
		let removed = self.table.lock().remove_where(|record| {
			pattern.is_none_or(|p| record.pattern.as_str() == p)
				&& handler.is_none_or(|h| same_handler(&record.handler, h))
		});
		debug!(removed = removed.len(), "Subscriptions removed");
		Ok(removed)
	}

	/// Removes the subscription with the given id, if present.
	pub fn unsubscribe_id(
		&self,
		id: SubscriptionId,
	) -> Result<Option<Arc<SubscriptionRecord>>, SubscriptionError> {
		self.ensure_open()?;
		let mut removed = self.table.lock().remove_where(|r| r.id == id);
		Ok(removed.pop())
	}

	/// Number of registered subscriptions.
	pub fn len(&self) -> Result<usize, SubscriptionError> {
		self.ensure_open()?;
		Ok(self.table.lock().subscriptions.len())
	}

	pub fn is_closed(&self) -> bool {
		self.closed.load(Ordering::Acquire)
	}

	/// Delivers one message to every matching subscription in registration
	/// order, on the calling task. Messages arriving after close are
	/// dropped.
	pub fn receive_message(&self, channel: &str, data: &[u8]) {
		if self.is_closed() {
			trace!(channel = %channel, "Dropping message received after close");
			return;
		}
		let mut table = self.table.lock();
		// Re-checked under the lock: close() clears the table while holding it.
		if self.is_closed() {
			return;
		}
		let matches = table.matches(channel);
		trace!(channel = %channel, size = data.len(), subscribers = matches.len(), "Dispatching message");
		for record in &matches {
			record.deliver(channel, data);
		}
	}

	/// Drops every subscription and rejects further operations. Waits for an
	/// in-flight dispatch to finish.
	pub fn close(&self) {
		self.closed.store(true, Ordering::Release);
		self.table.lock().clear();
	}
}

impl std::fmt::Debug for SubscriptionManager {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SubscriptionManager")
			.field("closed", &self.is_closed())
			.finish_non_exhaustive()
	}
}
