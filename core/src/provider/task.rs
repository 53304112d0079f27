use std::future::Future;

use tokio::sync::oneshot;
use tokio::task::{JoinError, JoinHandle};
use tracing::warn;

/// Owned background receive loop.
///
/// The spawned future is handed a shutdown receiver and must return soon
/// after it resolves. [`shutdown`](Self::shutdown) signals and then waits for
/// the task, so nothing the task does can happen after it returns.
pub struct ReceiveTask {
	name: &'static str,
	shutdown_tx: oneshot::Sender<()>,
	join_handle: JoinHandle<()>,
}

impl ReceiveTask {
	pub fn spawn<F, Fut>(name: &'static str, run: F) -> Self
	where
		F: FnOnce(oneshot::Receiver<()>) -> Fut,
		Fut: Future<Output = ()> + Send + 'static,
	{
		let (shutdown_tx, shutdown_rx) = oneshot::channel();
		let join_handle = tokio::spawn(run(shutdown_rx));
		Self {
			name,
			shutdown_tx,
			join_handle,
		}
	}

	pub fn is_finished(&self) -> bool {
		self.join_handle.is_finished()
	}

	pub async fn shutdown(self) -> Result<(), JoinError> {
		let name = self.name;
		let _ = self.shutdown_tx.send(()).inspect_err(|_| {
			warn!(task = name, "Receive task already stopped");
		});
		self.join_handle.await.inspect_err(|e| {
			warn!(task = name, error = ?e, "Receive task failed");
		})
	}
}

impl std::fmt::Debug for ReceiveTask {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ReceiveTask")
			.field("name", &self.name)
			.field("finished", &self.is_finished())
			.finish()
	}
}
