use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{Instant, timeout};

use super::tcpq::TcpqProvider;
use super::Provider;
use crate::client::config::ClientSettings;
use crate::hub::protocol;
use crate::routing::{CacheStrategy, SubscriptionManager};
use crate::url_parser::UrlParser;

const WAIT: Duration = Duration::from_secs(2);

async fn provider_for(hub: SocketAddr, settings: ClientSettings) -> TcpqProvider {
	let url = UrlParser::parse(&format!("tcpq://{hub}")).unwrap();
	let dispatcher = Arc::new(SubscriptionManager::new(CacheStrategy::default()));
	TcpqProvider::new(&url, dispatcher, &settings).await.unwrap()
}

fn settings(reconnect_delay: Duration) -> ClientSettings {
	ClientSettings {
		hub_reconnect_delay: reconnect_delay,
		..ClientSettings::default()
	}
}

async fn accept(listener: &TcpListener) -> TcpStream {
	let (stream, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
	stream
}

async fn wait_until_connected(provider: &TcpqProvider) {
	timeout(WAIT, async {
		while !provider.is_connected().await {
			tokio::time::sleep(Duration::from_millis(10)).await;
		}
	})
	.await
	.unwrap();
}

#[tokio::test]
async fn test_close_abandons_write_to_stalled_hub() {
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let provider = Arc::new(
		provider_for(listener.local_addr().unwrap(), settings(Duration::from_millis(50)))
			.await,
	);
	// greets, then never reads
	let mut hub_side = accept(&listener).await;
	protocol::write_greeting(&mut hub_side, protocol::MAGIC_SERVER)
		.await
		.unwrap();
	wait_until_connected(&provider).await;

	let publisher = Arc::clone(&provider);
	let publish = tokio::spawn(async move {
		let data = vec![0u8; 64 * 1024 * 1024];
		publisher.publish("BIG", &data).await
	});
	tokio::time::sleep(Duration::from_millis(200)).await;
	assert!(!publish.is_finished(), "write should be blocked on the hub");

	assert!(
		timeout(Duration::from_secs(5), provider.close()).await.is_ok(),
		"close waited for the stalled write"
	);
	let published = timeout(WAIT, publish).await.unwrap().unwrap();
	assert!(published.is_ok());
	assert!(!provider.is_connected().await);

	// frames after close are dropped without touching the socket
	assert!(provider.publish("AFTER", b"x").await.is_ok());
	drop(hub_side);
}

#[tokio::test]
async fn test_bad_server_magic_reconnects_after_delay() {
	let delay = Duration::from_millis(100);
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let provider = provider_for(listener.local_addr().unwrap(), settings(delay)).await;

	let mut first = accept(&listener).await;
	let greeted = Instant::now();
	protocol::write_greeting(&mut first, protocol::MAGIC_CLIENT)
		.await
		.unwrap();

	// the client sends its own greeting, then hangs up on the mismatch
	let mut received = Vec::new();
	timeout(WAIT, first.read_to_end(&mut received))
		.await
		.unwrap()
		.unwrap();
	assert_eq!(received.len(), 8);
	assert_eq!(received[.. 4], protocol::MAGIC_CLIENT.to_be_bytes());
	assert!(!provider.is_connected().await);

	let _second = accept(&listener).await;
	assert!(greeted.elapsed() >= delay);
	assert!(!provider.is_connected().await);

	timeout(WAIT, provider.close()).await.unwrap();
}

#[tokio::test]
async fn test_silent_hub_times_out_handshake() {
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let provider = provider_for(
		listener.local_addr().unwrap(),
		ClientSettings {
			hub_reconnect_delay: Duration::from_millis(50),
			hub_handshake_timeout: Duration::from_millis(100),
			..ClientSettings::default()
		},
	)
	.await;

	// accepts but never greets
	let _first = accept(&listener).await;
	let stalled = Instant::now();
	let _second = accept(&listener).await;
	assert!(stalled.elapsed() >= Duration::from_millis(100));
	assert!(!provider.is_connected().await);

	timeout(WAIT, provider.close()).await.unwrap();
}
