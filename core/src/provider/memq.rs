use std::sync::Arc;

use arcstr::ArcStr;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::error::ProviderError;
use super::task::ReceiveTask;
use super::Provider;
use crate::routing::SubscriptionManager;

type QueuedMessage = (ArcStr, Bytes);

/// In-process loopback transport for `memq://` URLs.
///
/// Every publish is copied onto a queue and delivered back to the owning bus
/// from a background task, in publish order. Nothing leaves the process.
pub struct MemqProvider {
	queue_tx: mpsc::UnboundedSender<QueuedMessage>,
	receiver: Mutex<Option<ReceiveTask>>,
}

impl MemqProvider {
	pub fn new(dispatcher: Arc<SubscriptionManager>) -> Self {
		let (queue_tx, queue_rx) = mpsc::unbounded_channel();
		let task = ReceiveTask::spawn("memq", move |shutdown_rx| {
			Self::run(queue_rx, dispatcher, shutdown_rx)
		});
		info!("Started in-process message queue");
		Self {
			queue_tx,
			receiver: Mutex::new(Some(task)),
		}
	}

	async fn run(
		mut queue_rx: mpsc::UnboundedReceiver<QueuedMessage>,
		dispatcher: Arc<SubscriptionManager>,
		mut shutdown_rx: tokio::sync::oneshot::Receiver<()>,
	) {
		loop {
			tokio::select! {
				biased;
				_ = &mut shutdown_rx => break,
				message = queue_rx.recv() => match message {
					| Some((channel, data)) => {
						dispatcher.receive_message(&channel, &data);
					}
					| None => break,
				},
			}
		}
		debug!("memq delivery loop stopped");
	}
}

#[async_trait]
impl Provider for MemqProvider {
	fn name(&self) -> &'static str {
		"memq"
	}

	async fn publish(
		&self,
		channel: &str,
		data: &[u8],
	) -> Result<(), ProviderError> {
		let message = (ArcStr::from(channel), Bytes::copy_from_slice(data));
		if self.queue_tx.send(message).is_err() {
			debug!(channel = %channel, "memq queue closed, message dropped");
		}
		Ok(())
	}

	async fn subscribe(&self, _pattern: &str) -> Result<(), ProviderError> {
		Ok(())
	}

	async fn unsubscribe(&self, _pattern: &str) -> Result<(), ProviderError> {
		Ok(())
	}

	async fn close(&self) {
		let task = self.receiver.lock().take();
		if let Some(task) = task {
			let _ = task.shutdown().await;
		}
	}
}
