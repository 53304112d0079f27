use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::{Mutex as AsyncMutex, oneshot};
use tracing::{debug, error, info, trace, warn};

use super::error::ProviderError;
use super::fragment::{self, Reassembler};
use super::task::ReceiveTask;
use super::{Provider, resolve_network};
use crate::client::config::ClientSettings;
use crate::routing::SubscriptionManager;
use crate::url_parser::UrlParser;

/// Default multicast group and port
pub const DEFAULT_NETWORK: &str = "239.255.76.67:7667";
/// Default multicast TTL; keeps traffic on the local host
pub const DEFAULT_TTL: i64 = 0;

const MAX_DATAGRAM_SIZE: usize = 65_536;

/// UDP multicast transport for `udpm://` URLs.
///
/// Every message goes to the whole group, so subscribe and unsubscribe do
/// not filter anything; the first subscribe starts the receive task. When
/// the network host is not a multicast address the group join is skipped
/// and messages are sent unicast to that address instead.
pub struct UdpmProvider {
	socket: Arc<UdpSocket>,
	destination: SocketAddr,
	dispatcher: Arc<SubscriptionManager>,
	/// Sequence number of the next message. Held for the whole send so the
	/// fragments of concurrent publishes never interleave.
	send_seq: AsyncMutex<u32>,
	receiver: Mutex<Option<ReceiveTask>>,
	closed: AtomicBool,
}

impl UdpmProvider {
	pub async fn new(
		url: &UrlParser,
		dispatcher: Arc<SubscriptionManager>,
		settings: &ClientSettings,
	) -> Result<Self, ProviderError> {
		let network = url.network().unwrap_or(DEFAULT_NETWORK);
		let destination = match resolve_network(network, None).await? {
			| SocketAddr::V4(addr) => addr,
			| SocketAddr::V6(_) => {
				return Err(ProviderError::invalid_network(
					network,
					"only IPv4 groups are supported",
				));
			}
		};

		let ttl = url.get_int("ttl", DEFAULT_TTL)?;
		let ttl = u32::try_from(ttl)
			.ok()
			.filter(|ttl| *ttl <= 255)
			.ok_or_else(|| {
				ProviderError::Url(crate::url_parser::UrlError::invalid_value(
					"ttl",
					ttl.to_string(),
					"integer in 0..=255",
				))
			})?;
		match ttl {
			| 0 => {
				warn!("LCM: TTL set to zero, traffic will not leave localhost")
			}
			| 1 => info!("LCM: TTL set to 1"),
			| _ => warn!(ttl, "LCM: TTL set to > 1, that is almost never correct"),
		}

		let socket = Self::open_socket(destination, ttl, settings)?;
		info!(
			destination = %destination,
			multicast = destination.ip().is_multicast(),
			"udpm provider bound"
		);
		Ok(Self {
			socket: Arc::new(socket),
			destination: SocketAddr::V4(destination),
			dispatcher,
			send_seq: AsyncMutex::new(0),
			receiver: Mutex::new(None),
			closed: AtomicBool::new(false),
		})
	}

	fn open_socket(
		destination: SocketAddrV4,
		ttl: u32,
		settings: &ClientSettings,
	) -> Result<UdpSocket, ProviderError> {
		let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
		socket.set_reuse_address(true)?;
		#[cfg(all(unix, not(any(target_os = "solaris", target_os = "illumos"))))]
		socket.set_reuse_port(true)?;
		if let Err(err) = socket.set_recv_buffer_size(settings.udp_recv_buffer_size)
		{
			warn!(
				requested = settings.udp_recv_buffer_size,
				error = %err,
				"Could not set UDP receive buffer size"
			);
		}
		socket.set_nonblocking(true)?;
		let bind_addr =
			SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, destination.port());
		socket.bind(&SocketAddr::V4(bind_addr).into())?;

		if destination.ip().is_multicast() {
			socket.join_multicast_v4(destination.ip(), &Ipv4Addr::UNSPECIFIED)?;
			socket.set_multicast_ttl_v4(ttl)?;
			socket.set_multicast_loop_v4(true)?;
		}
		Ok(UdpSocket::from_std(socket.into())?)
	}

	fn ensure_receiver(&self) {
		let mut receiver = self.receiver.lock();
		if receiver.is_some() || self.closed.load(Ordering::Acquire) {
			return;
		}
		let socket = Arc::clone(&self.socket);
		let dispatcher = Arc::clone(&self.dispatcher);
		*receiver = Some(ReceiveTask::spawn("udpm", move |shutdown_rx| {
			Self::run(socket, dispatcher, shutdown_rx)
		}));
		debug!("udpm receive task started");
	}

	async fn run(
		socket: Arc<UdpSocket>,
		dispatcher: Arc<SubscriptionManager>,
		mut shutdown_rx: oneshot::Receiver<()>,
	) {
		let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
		let mut reassembler = Reassembler::new();
		loop {
			let received = tokio::select! {
				biased;
				_ = &mut shutdown_rx => break,
				received = socket.recv_from(&mut buf) => received,
			};
			let (len, from) = match received {
				| Ok(received) => received,
				| Err(err) => {
					error!(error = %err, "udpm receive failed");
					continue;
				}
			};
			match reassembler.handle_datagram(from, &buf[.. len]) {
				| Ok(Some((channel, data))) => {
					dispatcher.receive_message(&channel, &data);
				}
				| Ok(None) => {
					trace!(from = %from, size = len, "Buffered fragment");
				}
				| Err(err) => {
					error!(from = %from, size = len, error = %err, "Dropping malformed datagram");
				}
			}
		}
		debug!("udpm receive task stopped");
	}
}

#[async_trait]
impl Provider for UdpmProvider {
	fn name(&self) -> &'static str {
		"udpm"
	}

	async fn publish(
		&self,
		channel: &str,
		data: &[u8],
	) -> Result<(), ProviderError> {
		let mut seq = self.send_seq.lock().await;
		let datagrams = fragment::encode_message(*seq, channel, data)?;
		for datagram in &datagrams {
			self.socket.send_to(datagram, self.destination).await?;
		}
		trace!(channel = %channel, seq = *seq, fragments = datagrams.len(), "Published");
		*seq = seq.wrapping_add(1);
		Ok(())
	}

	async fn subscribe(&self, _pattern: &str) -> Result<(), ProviderError> {
		self.ensure_receiver();
		Ok(())
	}

	async fn unsubscribe(&self, _pattern: &str) -> Result<(), ProviderError> {
		Ok(())
	}

	async fn close(&self) {
		self.closed.store(true, Ordering::Release);
		let task = self.receiver.lock().take();
		if let Some(task) = task {
			let _ = task.shutdown().await;
		}
	}
}
