//! `lcm-hub [port]`: TCP relay for `tcpq://` clients.
//!
//! Logging follows `RUST_LOG` (default `info`); the relay reports throughput
//! once per second at `info`. Stops on Ctrl-C.

use lcm_bus::hub::{DEFAULT_PORT, HubConfig, HubService};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn setup_tracing() {
	let filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| "info".into());
	tracing_subscriber::registry()
		.with(filter)
		.with(
			tracing_subscriber::fmt::layer()
				.with_target(false)
				.with_thread_ids(false)
				.with_file(false)
				.with_line_number(false)
				.compact(),
		)
		.init();
}

fn parse_port(arg: Option<String>) -> Result<u16, String> {
	match arg {
		| None => Ok(DEFAULT_PORT),
		| Some(arg) => arg
			.parse::<u16>()
			.map_err(|_| format!("invalid port {arg:?}, expected 0-65535")),
	}
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	setup_tracing();

	let port = parse_port(std::env::args().nth(1)).inspect_err(|err| {
		error!(error = %err, "usage: lcm-hub [port]");
	})?;
	let hub = HubService::start(HubConfig::with_port(port)).await?;
	info!(listen_addr = %hub.local_addr(), "Press Ctrl-C to stop");

	if let Err(err) = tokio::signal::ctrl_c().await {
		error!(error = %err, "Unable to listen for Ctrl-C");
	}
	hub.shutdown().await;
	Ok(())
}
