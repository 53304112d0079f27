use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{Mutex as AsyncMutex, oneshot, watch};
use tracing::{debug, info, warn};

use super::error::ProviderError;
use super::task::ReceiveTask;
use super::{Provider, resolve_network};
use crate::client::config::ClientSettings;
use crate::hub::protocol::{self, Frame, HubError, MessageType};
use crate::routing::SubscriptionManager;
use crate::url_parser::UrlParser;

/// Default hub address
pub const DEFAULT_NETWORK: &str = "127.0.0.1:7700";
/// Port used when the network string has none
pub const DEFAULT_PORT: u16 = 7700;

/// Connection state shared by the caller side and the connection task.
struct HubLink {
	/// Present while a handshaken connection is up
	writer: Option<OwnedWriteHalf>,
	/// Every pattern subscribed through this provider, resent after each
	/// reconnect
	patterns: Vec<String>,
	/// Flips to `true` when the provider closes
	closing: watch::Receiver<bool>,
}

impl HubLink {
	fn new(closing: watch::Receiver<bool>) -> Self {
		Self {
			writer: None,
			patterns: Vec::new(),
			closing,
		}
	}

	/// Best-effort write. Without a connection the frame is dropped; on a
	/// write failure the connection is abandoned.
	///
	/// A write the hub stops draining is abandoned as soon as the provider
	/// closes, so the lock is never held past `close()`.
	async fn send(&mut self, frame: &Bytes) -> Result<(), ProviderError> {
		let closing = self.closing.clone();
		if *closing.borrow() {
			return Ok(());
		}
		let Some(writer) = self.writer.as_mut() else {
			return Ok(());
		};
		let written = tokio::select! {
			written = writer.write_all(frame) => Some(written),
			_ = closed(closing) => None,
		};
		match written {
			| Some(Ok(())) => Ok(()),
			| Some(Err(err)) => {
				self.writer = None;
				Err(err.into())
			}
			| None => {
				// a partial frame is on the wire, the connection is unusable
				self.writer = None;
				debug!("Abandoned hub write on close");
				Ok(())
			}
		}
	}
}

/// Resolves once the provider starts closing or is dropped.
async fn closed(mut closing: watch::Receiver<bool>) {
	let _ = closing.wait_for(|closing| *closing).await;
}

#[derive(Debug, Clone, Copy)]
struct LinkTiming {
	reconnect_delay: Duration,
	handshake_timeout: Duration,
}

/// Hub client transport for `tcpq://` URLs.
///
/// Keeps one connection to the relay alive in the background, reconnecting
/// after a fixed delay whenever it drops. Publish and subscribe write to
/// the current connection and are silently dropped while disconnected.
/// Subscriptions are replayed on every new connection.
///
/// Not meant for high-rate traffic: every message is a separate framed
/// write through the relay.
pub struct TcpqProvider {
	hub_addr: SocketAddr,
	link: Arc<AsyncMutex<HubLink>>,
	closing: watch::Sender<bool>,
	receiver: Mutex<Option<ReceiveTask>>,
}

impl TcpqProvider {
	pub async fn new(
		url: &UrlParser,
		dispatcher: Arc<SubscriptionManager>,
		settings: &ClientSettings,
	) -> Result<Self, ProviderError> {
		let network = url.network().unwrap_or(DEFAULT_NETWORK);
		let hub_addr = resolve_network(network, Some(DEFAULT_PORT)).await?;
		let (closing, closing_rx) = watch::channel(false);
		let link = Arc::new(AsyncMutex::new(HubLink::new(closing_rx)));

		let task_link = Arc::clone(&link);
		let timing = LinkTiming {
			reconnect_delay: settings.hub_reconnect_delay,
			handshake_timeout: settings.hub_handshake_timeout,
		};
		let task = ReceiveTask::spawn("tcpq", move |shutdown_rx| {
			Self::run(hub_addr, task_link, dispatcher, timing, shutdown_rx)
		});
		Ok(Self {
			hub_addr,
			link,
			closing,
			receiver: Mutex::new(Some(task)),
		})
	}

	/// Address of the relay this provider talks to.
	pub fn hub_addr(&self) -> SocketAddr {
		self.hub_addr
	}

	/// Whether a handshaken connection is currently up.
	pub async fn is_connected(&self) -> bool {
		self.link.lock().await.writer.is_some()
	}

	/// Connects and exchanges greetings, giving up after `handshake_timeout`.
	async fn connect(
		hub_addr: SocketAddr,
		handshake_timeout: Duration,
	) -> Result<(TcpStream, u32), HubError> {
		let handshake = async {
			let mut stream = TcpStream::connect(hub_addr).await?;
			stream.set_nodelay(true)?;
			protocol::write_greeting(&mut stream, protocol::MAGIC_CLIENT).await?;
			let version =
				protocol::read_greeting(&mut stream, protocol::MAGIC_SERVER).await?;
			Ok((stream, version))
		};
		tokio::time::timeout(handshake_timeout, handshake)
			.await
			.map_err(|_| HubError::HandshakeTimeout(handshake_timeout))?
	}

	async fn run(
		hub_addr: SocketAddr,
		link: Arc<AsyncMutex<HubLink>>,
		dispatcher: Arc<SubscriptionManager>,
		timing: LinkTiming,
		mut shutdown_rx: oneshot::Receiver<()>,
	) {
		let mut failures = 0u32;
		'connection: loop {
			let connected = tokio::select! {
				_ = &mut shutdown_rx => break 'connection,
				connected = Self::connect(hub_addr, timing.handshake_timeout) => connected,
			};
			match connected {
				| Ok((stream, version)) => {
					failures = 0;
					let (mut reader, writer) = stream.into_split();
					let resubscribed = {
						let mut link = link.lock().await;
						link.writer = Some(writer);
						let frames: Vec<Bytes> = link
							.patterns
							.iter()
							.map(|p| protocol::encode_pattern(MessageType::Subscribe, p))
							.collect();
						let mut sent = 0;
						for frame in &frames {
							if link.send(frame).await.is_err() {
								break;
							}
							sent += 1;
						}
						sent
					};
					info!(hub = %hub_addr, version, resubscribed, "Connected to LCM hub");

					loop {
						let frame = tokio::select! {
							_ = &mut shutdown_rx => break 'connection,
							frame = Frame::read(&mut reader) => frame,
						};
						match frame {
							| Ok(Frame::Publish { channel, data }) => {
								dispatcher.receive_message(&channel, &data);
							}
							| Ok(other) => {
								warn!(hub = %hub_addr, frame = ?other, "Ignoring unexpected frame from hub");
							}
							| Err(err) if err.is_disconnect() => {
								info!(hub = %hub_addr, "LCM hub closed the connection");
								break;
							}
							| Err(err) => {
								warn!(hub = %hub_addr, error = %err, "LCM hub connection failed");
								break;
							}
						}
					}
					link.lock().await.writer = None;
				}
				| Err(err) => {
					failures += 1;
					if failures == 1 {
						warn!(hub = %hub_addr, error = %err, "Unable to connect to LCM hub, retrying");
					} else {
						debug!(hub = %hub_addr, error = %err, failures, "Still unable to connect to LCM hub");
					}
				}
			}

			tokio::select! {
				_ = &mut shutdown_rx => break 'connection,
				_ = tokio::time::sleep(timing.reconnect_delay) => {}
			}
		}
		if let Some(mut writer) = link.lock().await.writer.take() {
			let _ = writer.shutdown().await;
		}
		debug!(hub = %hub_addr, "tcpq connection task stopped");
	}
}

#[async_trait]
impl Provider for TcpqProvider {
	fn name(&self) -> &'static str {
		"tcpq"
	}

	async fn publish(
		&self,
		channel: &str,
		data: &[u8],
	) -> Result<(), ProviderError> {
		let frame = protocol::encode_publish(channel, data);
		self.link.lock().await.send(&frame).await
	}

	async fn subscribe(&self, pattern: &str) -> Result<(), ProviderError> {
		let frame = protocol::encode_pattern(MessageType::Subscribe, pattern);
		let mut link = self.link.lock().await;
		link.patterns.push(pattern.to_string());
		link.send(&frame).await
	}

	async fn unsubscribe(&self, pattern: &str) -> Result<(), ProviderError> {
		let frame = protocol::encode_pattern(MessageType::Unsubscribe, pattern);
		let mut link = self.link.lock().await;
		if let Some(pos) = link.patterns.iter().position(|p| p == pattern) {
			link.patterns.remove(pos);
		}
		link.send(&frame).await
	}

	async fn close(&self) {
		// releases any write stalled on an unresponsive hub
		self.closing.send_replace(true);
		let task = self.receiver.lock().take();
		if let Some(task) = task {
			let _ = task.shutdown().await;
		}
	}
}
