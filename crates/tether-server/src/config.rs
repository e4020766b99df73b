//! Server configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the Tether server.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind (default `"0.0.0.0"`).
    pub host: String,
    /// Port to bind (default `3000`; `0` auto-assigns).
    pub port: u16,
    /// Maximum concurrent agent sockets. Upgrades beyond this get 503.
    pub max_connections: usize,
    /// Capacity of each connection's outbound queue.
    pub send_queue_capacity: usize,
    /// Interval between server-initiated Ping frames, in seconds.
    pub ping_interval_secs: u64,
    /// Grace period after a missed ping before the socket is closed.
    pub pong_timeout_secs: u64,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
}

impl ServerConfig {
    /// Port used when neither a flag nor `PORT` is given.
    pub const DEFAULT_PORT: u16 = 3000;

    /// Ping cadence as a `Duration`.
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs.max(1))
    }

    /// How long a socket may stay silent before it is considered dead.
    pub fn idle_timeout(&self) -> Duration {
        self.ping_interval() + Duration::from_secs(self.pong_timeout_secs)
    }

    /// `host:port` string for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: Self::DEFAULT_PORT,
            max_connections: 1024,
            send_queue_capacity: 256,
            ping_interval_secs: 25,
            pong_timeout_secs: 20,
            max_message_size: 1024 * 1024, // 1 MiB
        }
    }
}
