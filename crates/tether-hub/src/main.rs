//! # tether-hub
//!
//! Tether hub binary: reads configuration, installs logging and metrics,
//! and serves agents and operators until Ctrl-C.

#![deny(unsafe_code)]

use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tether_core::logging;
use tether_server::config::ServerConfig;
use tether_server::server::TetherServer;
use tether_server::telemetry;

/// How long in-flight work gets after Ctrl-C.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Log output format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Compact,
    Json,
}

/// Command-and-control hub for remote agents.
#[derive(Parser, Debug)]
#[command(name = "tether-hub", about = "Command-and-control hub for remote agents")]
struct Cli {
    /// Host to bind. Read from `TETHER_HOST`, not the generic `HOST`.
    #[arg(long, env = "TETHER_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to bind (0 for auto-assign).
    #[arg(long, env = "PORT", default_value_t = ServerConfig::DEFAULT_PORT)]
    port: u16,

    /// Log filter when `RUST_LOG` is unset.
    #[arg(long, env = "TETHER_LOG", default_value = "info")]
    log_level: String,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Compact)]
    log_format: LogFormat,

    /// Maximum concurrent agent sockets.
    #[arg(long)]
    max_connections: Option<usize>,

    /// Per-agent outbound queue capacity.
    #[arg(long)]
    send_queue_capacity: Option<usize>,

    /// Seconds between WebSocket pings.
    #[arg(long)]
    ping_interval_secs: Option<u64>,

    /// Extra seconds of silence tolerated after a ping.
    #[arg(long)]
    pong_timeout_secs: Option<u64>,

    /// Do not install the Prometheus recorder.
    #[arg(long)]
    no_metrics: bool,
}

impl Cli {
    fn server_config(&self) -> ServerConfig {
        let defaults = ServerConfig::default();
        ServerConfig {
            host: self.host.clone(),
            port: self.port,
            max_connections: self.max_connections.unwrap_or(defaults.max_connections),
            send_queue_capacity: self
                .send_queue_capacity
                .unwrap_or(defaults.send_queue_capacity),
            ping_interval_secs: self.ping_interval_secs.unwrap_or(defaults.ping_interval_secs),
            pong_timeout_secs: self.pong_timeout_secs.unwrap_or(defaults.pong_timeout_secs),
            ..defaults
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.log_format {
        LogFormat::Compact => logging::init_subscriber(&cli.log_level),
        LogFormat::Json => logging::init_json_subscriber(&cli.log_level),
    }

    let config = cli.server_config();
    let mut server = TetherServer::new(config);
    if !cli.no_metrics {
        let handle = telemetry::install_recorder().context("Failed to install metrics recorder")?;
        server = server.with_metrics(handle);
    }

    let (addr, handle) = server
        .listen()
        .await
        .with_context(|| format!("Failed to bind {}", server.config().bind_addr()))?;

    tracing::info!("Tether hub listening on http://{addr} (agents connect to ws://{addr}/ws)");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!(
        sessions = server.registry().count(),
        connections = server.connection_count(),
        "Shutting down..."
    );
    server
        .shutdown()
        .graceful_shutdown(vec![handle], Some(SHUTDOWN_GRACE))
        .await;

    tracing::info!("Shutdown complete");
    Ok(())
}
