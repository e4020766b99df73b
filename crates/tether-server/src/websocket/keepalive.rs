//! Transport liveness monitoring.

use std::time::Duration;

use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::connection::ConnectionHandle;

/// Outcome of the keepalive loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepaliveResult {
    /// Nothing arrived on the socket within the idle timeout.
    TimedOut,
    /// The loop was cancelled externally.
    Cancelled,
}

/// Watch a connection until it goes silent or `cancel` fires.
///
/// Every `interval` the time since the last inbound frame is compared with
/// `idle_timeout`. Pongs, data frames and application heartbeats all reset
/// the clock through [`AgentConnection::mark_alive`].
///
/// [`AgentConnection::mark_alive`]: crate::connection::AgentConnection::mark_alive
pub async fn run_keepalive(
    connection: ConnectionHandle,
    interval: Duration,
    idle_timeout: Duration,
    cancel: CancellationToken,
) -> KeepaliveResult {
    let mut check = time::interval(interval);
    check.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
    // Skip the immediate first tick
    let _ = check.tick().await;

    loop {
        tokio::select! {
            _ = check.tick() => {
                if connection.idle_for() > idle_timeout {
                    return KeepaliveResult::TimedOut;
                }
            }
            () = cancel.cancelled() => {
                return KeepaliveResult::Cancelled;
            }
        }
    }
}
