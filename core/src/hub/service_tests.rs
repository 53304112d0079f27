use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use super::protocol::{self, Frame};
use super::service::{HubConfig, HubHandle, HubService};

struct RawClient {
	stream: TcpStream,
}

impl RawClient {
	async fn connect(addr: SocketAddr) -> Self {
		let mut stream = TcpStream::connect(addr).await.unwrap();
		protocol::read_greeting(&mut stream, protocol::MAGIC_SERVER)
			.await
			.unwrap();
		protocol::write_greeting(&mut stream, protocol::MAGIC_CLIENT)
			.await
			.unwrap();
		Self { stream }
	}

	async fn send(&mut self, frame: Frame) {
		self.stream.write_all(&frame.encode()).await.unwrap();
	}

	async fn subscribe(&mut self, pattern: &str) {
		self.send(Frame::Subscribe(pattern.to_string())).await;
	}

	async fn publish(&mut self, channel: &str, data: &'static [u8]) {
		self.send(Frame::Publish {
			channel: channel.to_string(),
			data: Bytes::from_static(data),
		})
		.await;
	}

	/// Next frame, or `None` if nothing arrives within a short window.
	async fn next_frame(&mut self) -> Option<Frame> {
		tokio::time::timeout(
			Duration::from_millis(300),
			Frame::read(&mut self.stream),
		)
		.await
		.ok()
		.map(|frame| frame.unwrap())
	}
}

async fn start_hub() -> HubHandle {
	let config = HubConfig {
		listen_addr: "127.0.0.1:0".parse().unwrap(),
		stats_interval: None,
		..HubConfig::default()
	};
	HubService::start(config).await.unwrap()
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
	for _ in 0 .. 300 {
		if condition() {
			return;
		}
		tokio::time::sleep(Duration::from_millis(10)).await;
	}
	panic!("condition not reached in time");
}

fn publish_frame(channel: &str, data: &'static [u8]) -> Frame {
	Frame::Publish {
		channel: channel.to_string(),
		data: Bytes::from_static(data),
	}
}

#[tokio::test]
async fn test_relay_to_matching_clients_only() {
	let hub = start_hub().await;
	let mut a = RawClient::connect(hub.local_addr()).await;
	let mut b = RawClient::connect(hub.local_addr()).await;
	let mut c = RawClient::connect(hub.local_addr()).await;
	wait_until(|| hub.client_count() == 3).await;

	a.subscribe("TEMP.*").await;
	c.subscribe("HUMIDITY").await;
	wait_until(|| hub.subscription_count() == 2).await;

	b.publish("TEMPERATURE", b"21.5").await;
	assert_eq!(
		a.next_frame().await,
		Some(publish_frame("TEMPERATURE", b"21.5"))
	);
	assert_eq!(c.next_frame().await, None);
	assert_eq!(b.next_frame().await, None);

	hub.shutdown().await;
}

#[tokio::test]
async fn test_sender_does_not_receive_own_message() {
	let hub = start_hub().await;
	let mut a = RawClient::connect(hub.local_addr()).await;
	let mut b = RawClient::connect(hub.local_addr()).await;
	wait_until(|| hub.client_count() == 2).await;

	a.subscribe(".*").await;
	b.subscribe(".*").await;
	wait_until(|| hub.subscription_count() == 2).await;

	a.publish("STATUS", b"ok").await;
	assert_eq!(b.next_frame().await, Some(publish_frame("STATUS", b"ok")));
	assert_eq!(a.next_frame().await, None);

	hub.shutdown().await;
}

#[tokio::test]
async fn test_one_copy_per_client() {
	let hub = start_hub().await;
	let mut a = RawClient::connect(hub.local_addr()).await;
	let mut b = RawClient::connect(hub.local_addr()).await;
	wait_until(|| hub.client_count() == 2).await;

	a.subscribe("FOO").await;
	a.subscribe("F.*").await;
	wait_until(|| hub.subscription_count() == 2).await;

	b.publish("FOO", b"1").await;
	b.publish("FIZZ", b"2").await;
	assert_eq!(a.next_frame().await, Some(publish_frame("FOO", b"1")));
	assert_eq!(a.next_frame().await, Some(publish_frame("FIZZ", b"2")));
	assert_eq!(a.next_frame().await, None);

	hub.shutdown().await;
}

#[tokio::test]
async fn test_unsubscribe_removes_one_registration() {
	let hub = start_hub().await;
	let mut a = RawClient::connect(hub.local_addr()).await;
	let mut b = RawClient::connect(hub.local_addr()).await;
	wait_until(|| hub.client_count() == 2).await;

	a.subscribe("FOO").await;
	a.subscribe("FOO").await;
	a.send(Frame::Unsubscribe("FOO".to_string())).await;
	wait_until(|| hub.subscription_count() == 1).await;

	b.publish("FOO", b"still").await;
	assert_eq!(a.next_frame().await, Some(publish_frame("FOO", b"still")));

	a.send(Frame::Unsubscribe("FOO".to_string())).await;
	wait_until(|| hub.subscription_count() == 0).await;
	b.publish("FOO", b"gone").await;
	assert_eq!(a.next_frame().await, None);

	hub.shutdown().await;
}

#[tokio::test]
async fn test_invalid_pattern_is_ignored() {
	let hub = start_hub().await;
	let mut a = RawClient::connect(hub.local_addr()).await;
	let mut b = RawClient::connect(hub.local_addr()).await;
	wait_until(|| hub.client_count() == 2).await;

	a.subscribe("(unclosed").await;
	a.subscribe("OK").await;
	wait_until(|| hub.subscription_count() == 1).await;

	b.publish("OK", b"x").await;
	assert_eq!(a.next_frame().await, Some(publish_frame("OK", b"x")));
	assert_eq!(hub.client_count(), 2);

	hub.shutdown().await;
}

#[tokio::test]
async fn test_bad_client_magic_is_dropped() {
	let hub = start_hub().await;
	let mut stream = TcpStream::connect(hub.local_addr()).await.unwrap();
	protocol::read_greeting(&mut stream, protocol::MAGIC_SERVER)
		.await
		.unwrap();
	protocol::write_greeting(&mut stream, 0xdead_beef).await.unwrap();

	let read = tokio::time::timeout(
		Duration::from_secs(2),
		Frame::read(&mut stream),
	)
	.await
	.unwrap();
	assert!(read.unwrap_err().is_disconnect());
	assert_eq!(hub.client_count(), 0);

	hub.shutdown().await;
}

#[tokio::test]
async fn test_disconnect_drops_client_state() {
	let hub = start_hub().await;
	let mut a = RawClient::connect(hub.local_addr()).await;
	a.subscribe(".*").await;
	wait_until(|| hub.subscription_count() == 1).await;

	drop(a);
	wait_until(|| hub.client_count() == 0).await;
	assert_eq!(hub.subscription_count(), 0);

	hub.shutdown().await;
}

#[tokio::test]
async fn test_bytes_relayed_counts_every_publish() {
	let hub = start_hub().await;
	let mut a = RawClient::connect(hub.local_addr()).await;
	let mut b = RawClient::connect(hub.local_addr()).await;
	wait_until(|| hub.client_count() == 2).await;
	b.subscribe("ABC").await;
	wait_until(|| hub.subscription_count() == 1).await;

	// counted whether or not anyone receives it
	a.publish("XYZ", b"12345").await;
	a.publish("ABC", b"1").await;
	assert_eq!(b.next_frame().await, Some(publish_frame("ABC", b"1")));
	assert_eq!(hub.bytes_relayed(), (3 + 5 + 8) + (3 + 1 + 8));

	hub.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_with_connected_clients() {
	let hub = start_hub().await;
	let mut a = RawClient::connect(hub.local_addr()).await;
	wait_until(|| hub.client_count() == 1).await;

	tokio::time::timeout(Duration::from_secs(5), hub.shutdown())
		.await
		.unwrap();
	let read = Frame::read(&mut a.stream).await;
	assert!(read.unwrap_err().is_disconnect());
}
