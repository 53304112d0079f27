//! Tests for the subscription registry

use std::num::NonZeroUsize;
use std::sync::Arc;

use parking_lot::Mutex;

use super::*;
use crate::topic::ChannelPattern;

type Log = Arc<Mutex<Vec<(String, String)>>>;

fn recorder(tag: &'static str, log: &Log) -> SharedHandler {
	let log = Arc::clone(log);
	Arc::new(move |channel: &str, _data: &[u8]| {
		log.lock().push((tag.to_string(), channel.to_string()));
	})
}

fn pattern(p: &str) -> ChannelPattern {
	ChannelPattern::new(p).expect("pattern should compile")
}

fn tags(log: &Log) -> Vec<String> {
	log.lock().iter().map(|(tag, _)| tag.clone()).collect()
}

fn strategies() -> [CacheStrategy; 3] {
	[
		CacheStrategy::default(),
		CacheStrategy::Lru(NonZeroUsize::new(1).unwrap()),
		CacheStrategy::NoCache,
	]
}

#[test]
fn test_dispatch_in_registration_order() {
	for strategy in strategies() {
		let manager = SubscriptionManager::new(strategy);
		let log = Log::default();
		manager.subscribe(pattern(".*"), recorder("a", &log)).unwrap();
		manager.subscribe(pattern("FOO"), recorder("b", &log)).unwrap();
		manager.subscribe(pattern("F.*"), recorder("c", &log)).unwrap();

		manager.receive_message("FOO", b"x");
		manager.receive_message("BAR", b"x");
		assert_eq!(tags(&log), ["a", "b", "c", "a"]);
	}
}

#[test]
fn test_subscribe_reaches_already_cached_channel() {
	for strategy in strategies() {
		let manager = SubscriptionManager::new(strategy);
		let log = Log::default();
		manager.subscribe(pattern("OTHER"), recorder("early", &log)).unwrap();
		// builds the cache entry for FOO with no matches
		manager.receive_message("FOO", b"1");
		assert!(log.lock().is_empty());

		manager.subscribe(pattern("FO+"), recorder("late", &log)).unwrap();
		manager.receive_message("FOO", b"2");
		assert_eq!(tags(&log), ["late"]);
	}
}

#[test]
fn test_unsubscribe_scrubs_cached_channels() {
	for strategy in strategies() {
		let manager = SubscriptionManager::new(strategy);
		let log = Log::default();
		let handler = recorder("h", &log);
		manager.subscribe(pattern(".*"), Arc::clone(&handler)).unwrap();
		manager.receive_message("A", b"");
		assert_eq!(tags(&log).len(), 1);

		let removed = manager.unsubscribe(None, Some(&handler)).unwrap();
		assert_eq!(removed.len(), 1);
		manager.receive_message("A", b"");
		assert_eq!(tags(&log).len(), 1);
		assert_eq!(manager.len().unwrap(), 0);
	}
}

#[test]
fn test_unsubscribe_filters() {
	let manager = SubscriptionManager::new(CacheStrategy::default());
	let log = Log::default();
	let h1 = recorder("h1", &log);
	let h2 = recorder("h2", &log);
	manager.subscribe(pattern("A"), Arc::clone(&h1)).unwrap();
	manager.subscribe(pattern("B"), Arc::clone(&h1)).unwrap();
	manager.subscribe(pattern("A"), Arc::clone(&h2)).unwrap();
	manager.subscribe(pattern("B"), Arc::clone(&h2)).unwrap();

	// by pattern only
	let removed = manager.unsubscribe(Some("A"), None).unwrap();
	assert_eq!(removed.len(), 2);
	assert_eq!(manager.len().unwrap(), 2);

	// by pattern and handler
	let removed = manager.unsubscribe(Some("B"), Some(&h1)).unwrap();
	assert_eq!(removed.len(), 1);
	manager.receive_message("B", b"");
	assert_eq!(tags(&log), ["h2"]);

	// everything
	manager.unsubscribe(None, None).unwrap();
	assert_eq!(manager.len().unwrap(), 0);
}

#[test]
fn test_identical_subscriptions_are_distinct() {
	let manager = SubscriptionManager::new(CacheStrategy::default());
	let log = Log::default();
	let handler = recorder("h", &log);
	let first = manager.subscribe(pattern("X"), Arc::clone(&handler)).unwrap();
	let second = manager.subscribe(pattern("X"), Arc::clone(&handler)).unwrap();
	assert_ne!(first, second);

	manager.receive_message("X", b"");
	assert_eq!(tags(&log).len(), 2);

	let removed = manager.unsubscribe_id(first).unwrap();
	assert_eq!(removed.map(|r| r.id()), Some(first));
	assert!(manager.unsubscribe_id(first).unwrap().is_none());
	manager.receive_message("X", b"");
	assert_eq!(tags(&log).len(), 3);
}

#[test]
fn test_handler_receives_payload() {
	let manager = SubscriptionManager::new(CacheStrategy::NoCache);
	let seen = Arc::new(Mutex::new(Vec::new()));
	let sink = Arc::clone(&seen);
	manager
		.subscribe(
			pattern("DATA"),
			Arc::new(move |_: &str, data: &[u8]| sink.lock().push(data.to_vec())),
		)
		.unwrap();
	manager.receive_message("DATA", &[1, 2, 3]);
	assert_eq!(*seen.lock(), vec![vec![1u8, 2, 3]]);
}

#[test]
fn test_close_rejects_operations_and_drops_messages() {
	let manager = SubscriptionManager::new(CacheStrategy::default());
	let log = Log::default();
	manager.subscribe(pattern(".*"), recorder("h", &log)).unwrap();
	manager.close();

	manager.receive_message("A", b"");
	assert!(log.lock().is_empty());
	assert_eq!(
		manager.subscribe(pattern(".*"), recorder("x", &log)).unwrap_err(),
		SubscriptionError::Closed
	);
	assert!(manager.len().is_err());
	assert!(manager.unsubscribe(None, None).is_err());
}

#[test]
fn test_concurrent_dispatch_and_mutation() {
	let manager = Arc::new(SubscriptionManager::new(CacheStrategy::default()));
	let log = Log::default();
	let handler = recorder("h", &log);

	let dispatcher = {
		let manager = Arc::clone(&manager);
		std::thread::spawn(move || {
			for i in 0 .. 2000 {
				manager.receive_message(&format!("CH{}", i % 7), b"");
			}
		})
	};
	for _ in 0 .. 200 {
		let id = manager.subscribe(pattern("CH.*"), Arc::clone(&handler)).unwrap();
		manager.unsubscribe_id(id).unwrap();
	}
	dispatcher.join().unwrap();
	assert_eq!(manager.len().unwrap(), 0);
}
