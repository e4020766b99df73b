//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render `/metrics`. Fails if a
/// global recorder is already installed.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

/// WebSocket connections accepted (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Open WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Connection lifetime in seconds (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Successful `register` events (counter).
pub const SESSIONS_REGISTERED_TOTAL: &str = "sessions_registered_total";
/// Commands handed to a connection (counter).
pub const COMMANDS_DISPATCHED_TOTAL: &str = "commands_dispatched_total";
/// Commands refused (counter, labels: reason).
pub const COMMANDS_REJECTED_TOTAL: &str = "commands_rejected_total";
/// `heartbeat` events answered (counter).
pub const HEARTBEATS_TOTAL: &str = "heartbeats_total";
/// `command_result` events received (counter).
pub const COMMAND_RESULTS_TOTAL: &str = "command_results_total";
/// Inbound frames that failed to decode (counter).
pub const MALFORMED_EVENTS_TOTAL: &str = "malformed_events_total";
