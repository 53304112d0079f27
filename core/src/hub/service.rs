use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use super::protocol::{self, Frame, HubError};
use crate::topic::ChannelPattern;

/// Default relay port
pub const DEFAULT_PORT: u16 = 7700;

/// Relay settings
#[derive(Debug, Clone)]
pub struct HubConfig {
	/// Address the relay listens on
	pub listen_addr: SocketAddr,
	/// How often throughput is logged; `None` disables the report
	pub stats_interval: Option<Duration>,
	/// Outbound frames buffered per client before relaying waits on it
	pub client_queue_capacity: usize,
}

impl Default for HubConfig {
	fn default() -> Self {
		Self {
			listen_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
			stats_interval: Some(Duration::from_secs(1)),
			client_queue_capacity: 1024,
		}
	}
}

impl HubConfig {
	/// Listen on every interface at `port`.
	pub fn with_port(port: u16) -> Self {
		Self {
			listen_addr: SocketAddr::from(([0, 0, 0, 0], port)),
			..Self::default()
		}
	}
}

type ClientId = u64;

struct ClientEntry {
	addr: SocketAddr,
	patterns: Vec<ChannelPattern>,
	outbound: mpsc::Sender<Bytes>,
}

#[derive(Default)]
struct HubState {
	clients: Mutex<HashMap<ClientId, ClientEntry>>,
	bytes_relayed: AtomicU64,
	bytes_since_report: AtomicU64,
	next_client_id: AtomicU64,
}

impl HubState {
	/// Sends one PUBLISH to every other client with a matching pattern. A
	/// client gets at most one copy however many of its patterns match.
	async fn relay(&self, from: ClientId, channel: &str, data: &[u8]) {
		let recipients: Vec<(ClientId, mpsc::Sender<Bytes>)> = self
			.clients
			.lock()
			.iter()
			.filter(|(id, entry)| {
				**id != from && entry.patterns.iter().any(|p| p.is_match(channel))
			})
			.map(|(id, entry)| (*id, entry.outbound.clone()))
			.collect();

		let counted = (channel.len() + data.len() + 8) as u64;
		self.bytes_relayed.fetch_add(counted, Ordering::Relaxed);
		self.bytes_since_report.fetch_add(counted, Ordering::Relaxed);
		if recipients.is_empty() {
			return;
		}

		let frame = protocol::encode_publish(channel, data);
		for (id, outbound) in recipients {
			if outbound.send(frame.clone()).await.is_err() {
				debug!(client_id = id, channel = %channel, "Client went away during relay");
			}
		}
	}

	fn update_patterns(&self, id: ClientId, frame: Frame) {
		let mut clients = self.clients.lock();
		let Some(entry) = clients.get_mut(&id) else {
			return;
		};
		match frame {
			| Frame::Subscribe(pattern) => match ChannelPattern::new(pattern) {
				| Ok(pattern) => {
					debug!(client_id = id, pattern = %pattern, "Client subscribed");
					entry.patterns.push(pattern);
				}
				| Err(err) => {
					warn!(client_id = id, error = %err, "Ignoring invalid subscription");
				}
			},
			| Frame::Unsubscribe(pattern) => {
				// first exact match only
				if let Some(pos) =
					entry.patterns.iter().position(|p| p.as_str() == pattern)
				{
					entry.patterns.remove(pos);
					debug!(client_id = id, pattern = %pattern, "Client unsubscribed");
				}
			}
			| Frame::Publish { .. } => {}
		}
	}
}

/// TCP relay for `tcpq://` clients.
///
/// Every PUBLISH a client sends is forwarded to each other client holding
/// a matching subscription. Subscriptions live with the connection and
/// disappear when it closes.
pub struct HubService;

impl HubService {
	/// Binds the listener and starts accepting clients.
	pub async fn start(config: HubConfig) -> Result<HubHandle, HubError> {
		let listener = TcpListener::bind(config.listen_addr).await?;
		let local_addr = listener.local_addr()?;
		let state = Arc::new(HubState::default());
		let (shutdown_tx, _) = broadcast::channel(1);
		info!(listen_addr = %local_addr, "LCM hub listening");

		let accept_task = tokio::spawn(Self::accept_loop(
			listener,
			Arc::clone(&state),
			config.client_queue_capacity.max(1),
			shutdown_tx.subscribe(),
		));
		let stats_task = config.stats_interval.map(|period| {
			tokio::spawn(Self::report_loop(
				Arc::clone(&state),
				period,
				shutdown_tx.subscribe(),
			))
		});

		Ok(HubHandle {
			local_addr,
			state,
			shutdown_tx,
			accept_task: Some(accept_task),
			stats_task,
		})
	}

	async fn accept_loop(
		listener: TcpListener,
		state: Arc<HubState>,
		queue_capacity: usize,
		mut shutdown_rx: broadcast::Receiver<()>,
	) {
		let mut connections = JoinSet::new();
		loop {
			tokio::select! {
				_ = shutdown_rx.recv() => break,
				Some(finished) = connections.join_next(), if !connections.is_empty() => {
					if let Err(err) = finished {
						error!(error = ?err, "Client task failed");
					}
				}
				accepted = listener.accept() => match accepted {
					| Ok((stream, addr)) => {
						let id = state.next_client_id.fetch_add(1, Ordering::Relaxed);
						connections.spawn(Self::serve_client(
							id,
							stream,
							addr,
							Arc::clone(&state),
							queue_capacity,
							shutdown_rx.resubscribe(),
						));
					}
					| Err(err) => {
						warn!(error = %err, "Accept failed");
					}
				},
			}
		}
		drop(listener);
		while let Some(finished) = connections.join_next().await {
			if let Err(err) = finished {
				error!(error = ?err, "Client task failed");
			}
		}
		info!("LCM hub stopped accepting clients");
	}

	async fn serve_client(
		id: ClientId,
		mut stream: TcpStream,
		addr: SocketAddr,
		state: Arc<HubState>,
		queue_capacity: usize,
		mut shutdown_rx: broadcast::Receiver<()>,
	) {
		let handshake = async {
			protocol::write_greeting(&mut stream, protocol::MAGIC_SERVER).await?;
			protocol::read_greeting(&mut stream, protocol::MAGIC_CLIENT).await
		};
		let version = tokio::select! {
			_ = shutdown_rx.recv() => return,
			result = handshake => match result {
				| Ok(version) => version,
				| Err(err) => {
					warn!(client_id = id, peer = %addr, error = %err, "Client handshake failed");
					return;
				}
			},
		};
		info!(client_id = id, peer = %addr, version, "Client connected");

		let (mut reader, writer) = stream.into_split();
		let (outbound, outbound_rx) = mpsc::channel(queue_capacity);
		state.clients.lock().insert(id, ClientEntry {
			addr,
			patterns: Vec::new(),
			outbound,
		});
		let writer_task = tokio::spawn(Self::write_loop(
			id,
			writer,
			outbound_rx,
			shutdown_rx.resubscribe(),
		));

		loop {
			let frame = tokio::select! {
				_ = shutdown_rx.recv() => break,
				frame = Frame::read(&mut reader) => frame,
			};
			match frame {
				| Ok(Frame::Publish { channel, data }) => {
					state.relay(id, &channel, &data).await;
				}
				| Ok(frame) => state.update_patterns(id, frame),
				| Err(err) if err.is_disconnect() => {
					debug!(client_id = id, "Client closed connection");
					break;
				}
				| Err(err) => {
					warn!(client_id = id, peer = %addr, error = %err, "Dropping client after protocol error");
					break;
				}
			}
		}

		let removed = state.clients.lock().remove(&id);
		if let Some(entry) = removed {
			info!(client_id = id, peer = %entry.addr, "Client disconnected");
		}
		// the writer ends once no relay holds a sender for this client
		if let Err(err) = writer_task.await {
			error!(client_id = id, error = ?err, "Client writer failed");
		}
	}

	async fn write_loop(
		id: ClientId,
		mut writer: OwnedWriteHalf,
		mut outbound_rx: mpsc::Receiver<Bytes>,
		mut shutdown_rx: broadcast::Receiver<()>,
	) {
		loop {
			let frame = tokio::select! {
				_ = shutdown_rx.recv() => break,
				frame = outbound_rx.recv() => match frame {
					| Some(frame) => frame,
					| None => break,
				},
			};
			let written = tokio::select! {
				_ = shutdown_rx.recv() => break,
				written = writer.write_all(&frame) => written,
			};
			if let Err(err) = written {
				debug!(client_id = id, error = %err, "Write to client failed");
				break;
			}
		}
		let _ = writer.shutdown().await;
	}

	async fn report_loop(
		state: Arc<HubState>,
		period: Duration,
		mut shutdown_rx: broadcast::Receiver<()>,
	) {
		let started = Instant::now();
		let mut ticker = tokio::time::interval(period);
		ticker.tick().await;
		let mut last = Instant::now();
		loop {
			tokio::select! {
				_ = shutdown_rx.recv() => break,
				_ = ticker.tick() => {
					let now = Instant::now();
					let elapsed = now.duration_since(last).as_secs_f64();
					last = now;
					let bytes = state.bytes_since_report.swap(0, Ordering::Relaxed);
					let kbps = if elapsed > 0.0 {
						bytes as f64 / 1024.0 / elapsed
					} else {
						0.0
					};
					let clients = state.clients.lock().len();
					info!(
						uptime_s = now.duration_since(started).as_secs(),
						clients,
						"{kbps:10.1} kB/s"
					);
				}
			}
		}
	}
}

/// Handle to a running relay.
///
/// Call [`shutdown`](Self::shutdown) and await it before dropping.
pub struct HubHandle {
	local_addr: SocketAddr,
	state: Arc<HubState>,
	shutdown_tx: broadcast::Sender<()>,
	accept_task: Option<JoinHandle<()>>,
	stats_task: Option<JoinHandle<()>>,
}

impl HubHandle {
	/// Address the relay is listening on.
	pub fn local_addr(&self) -> SocketAddr {
		self.local_addr
	}

	/// Number of clients past the handshake.
	pub fn client_count(&self) -> usize {
		self.state.clients.lock().len()
	}

	/// Patterns registered across all clients.
	pub fn subscription_count(&self) -> usize {
		self.state
			.clients
			.lock()
			.values()
			.map(|entry| entry.patterns.len())
			.sum()
	}

	/// Bytes received in PUBLISH frames since start (channel + data + 8 per
	/// frame).
	pub fn bytes_relayed(&self) -> u64 {
		self.state.bytes_relayed.load(Ordering::Relaxed)
	}

	/// Stops accepting, disconnects every client and waits for all
	/// connection tasks to end.
	pub async fn shutdown(mut self) {
		let _ = self.shutdown_tx.send(());
		if let Some(task) = self.accept_task.take() {
			if let Err(err) = task.await {
				warn!(error = ?err, "Hub accept task failed");
			}
		}
		if let Some(task) = self.stats_task.take() {
			if let Err(err) = task.await {
				warn!(error = ?err, "Hub stats task failed");
			}
		}
		info!("LCM hub shut down");
	}
}

impl Drop for HubHandle {
	fn drop(&mut self) {
		if self.accept_task.is_some() {
			error!(
				"HubHandle dropped without calling shutdown(). Please call \
				 shutdown() and await its completion before dropping."
			);
			let _ = self.shutdown_tx.send(());
		}
	}
}
