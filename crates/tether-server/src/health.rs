//! `/health` endpoint.
//!
//! Sockets and sessions are counted separately: a socket that has not sent
//! `register` yet, or whose identity was taken over by a newer socket, is
//! open but not addressable.

use serde::Serialize;
use std::time::Instant;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Open agent sockets, registered or not.
    pub connections: usize,
    /// Bound agent identities.
    pub sessions: usize,
    /// Open sockets no command can currently reach.
    pub unbound_connections: usize,
    /// Upgrades beyond this many open sockets are refused.
    pub connection_limit: usize,
}

/// Build a health response from live counters.
pub fn health_check(
    start_time: Instant,
    connections: usize,
    sessions: usize,
    connection_limit: usize,
) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
        sessions,
        unbound_connections: connections.saturating_sub(sessions),
        connection_limit,
    }
}
