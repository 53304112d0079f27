//! Helpers shared by the integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use lcm_bus::SharedHandler;
use tokio::sync::mpsc;

pub type Received = (String, Vec<u8>);

/// Handler forwarding every message into a channel the test can await.
pub fn channel_sink() -> (SharedHandler, mpsc::UnboundedReceiver<Received>) {
	let (tx, rx) = mpsc::unbounded_channel();
	let handler: SharedHandler = Arc::new(move |channel: &str, data: &[u8]| {
		let _ = tx.send((channel.to_string(), data.to_vec()));
	});
	(handler, rx)
}

/// Next message, or `None` after two seconds.
pub async fn recv(rx: &mut mpsc::UnboundedReceiver<Received>) -> Option<Received> {
	tokio::time::timeout(Duration::from_secs(2), rx.recv())
		.await
		.ok()
		.flatten()
}

/// Whether nothing arrives within a short window.
pub async fn recv_nothing(rx: &mut mpsc::UnboundedReceiver<Received>) -> bool {
	!matches!(
		tokio::time::timeout(Duration::from_millis(300), rx.recv()).await,
		Ok(Some(_))
	)
}

pub async fn wait_until(mut condition: impl FnMut() -> bool) {
	for _ in 0 .. 500 {
		if condition() {
			return;
		}
		tokio::time::sleep(Duration::from_millis(10)).await;
	}
	panic!("condition not reached in time");
}
