//! Live agent connection handle.
//!
//! An [`AgentConnection`] is the transport-side endpoint the rest of the hub
//! pushes messages through. It is shared as a [`ConnectionHandle`]
//! (`Arc<AgentConnection>`): the socket task owns the actual WebSocket, and
//! the registry and dispatcher only hold clones of the handle. Dropping a
//! handle never closes the socket.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tether_core::ids::ConnectionId;
use tether_core::protocol::{self, OutboundEvent};
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Shared, non-owning reference to a live connection.
pub type ConnectionHandle = Arc<AgentConnection>;

/// Why a message could not be queued for an agent.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// The outbound queue is at capacity.
    #[error("outbound queue full")]
    Full,
    /// The socket task has exited.
    #[error("connection closed")]
    Closed,
    /// The event could not be serialized.
    #[error(transparent)]
    Encode(#[from] protocol::ProtocolError),
}

/// A connected agent socket.
#[derive(Debug)]
pub struct AgentConnection {
    /// Server-assigned connection ID.
    pub id: ConnectionId,
    /// Send channel to the socket's write task.
    tx: mpsc::Sender<String>,
    /// When this connection was established.
    pub connected_at: Instant,
    /// Last time any frame (data, ping or pong) arrived.
    last_activity: Mutex<Instant>,
    /// Count of messages dropped due to a full or closed channel.
    dropped_messages: AtomicU64,
}

impl AgentConnection {
    /// Create a new connection.
    pub fn new(id: ConnectionId, tx: mpsc::Sender<String>) -> Self {
        let now = Instant::now();
        Self {
            id,
            tx,
            connected_at: now,
            last_activity: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Create a connection with a fresh ID and its outbound receiver.
    pub fn channel(capacity: usize) -> (ConnectionHandle, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Arc::new(Self::new(ConnectionId::new(), tx)), rx)
    }

    /// Queue a pre-encoded text frame without waiting.
    pub fn send_text(&self, text: String) -> Result<(), SendError> {
        self.tx.try_send(text).map_err(|err| {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            match err {
                mpsc::error::TrySendError::Full(_) => SendError::Full,
                mpsc::error::TrySendError::Closed(_) => SendError::Closed,
            }
        })
    }

    /// Serialize an event and queue it.
    pub fn send(&self, event: &OutboundEvent) -> Result<(), SendError> {
        let text = protocol::encode(event)?;
        self.send_text(text)
    }

    /// Whether the write side is gone.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Total messages that could not be queued.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Record inbound activity (any frame, including Pong).
    pub fn mark_alive(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    /// Time since the last inbound frame.
    pub fn idle_for(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn make_connection(capacity: usize) -> (ConnectionHandle, mpsc::Receiver<String>) {
        AgentConnection::channel(capacity)
    }

    #[tokio::test]
    async fn send_event_success() {
        let (conn, mut rx) = make_connection(8);
        conn.send(&OutboundEvent::registered()).unwrap();
        let msg = rx.recv().await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&msg).unwrap();
        assert_eq!(parsed["event"], "registered");
        assert_eq!(parsed["data"]["status"], "success");
    }

    #[tokio::test]
    async fn send_to_closed_channel() {
        let (conn, rx) = make_connection(8);
        drop(rx);
        assert!(conn.is_closed());
        assert_matches!(conn.send_text("hello".into()), Err(SendError::Closed));
        assert_eq!(conn.drop_count(), 1);
    }

    #[tokio::test]
    async fn send_to_full_channel() {
        let (conn, _rx) = make_connection(1);
        conn.send_text("msg1".into()).unwrap();
        assert_matches!(conn.send_text("msg2".into()), Err(SendError::Full));
        assert_eq!(conn.drop_count(), 1);
    }

    #[tokio::test]
    async fn messages_arrive_in_order() {
        let (conn, mut rx) = make_connection(8);
        for i in 0..5 {
            conn.send_text(format!("msg_{i}")).unwrap();
        }
        for i in 0..5 {
            assert_eq!(rx.recv().await.unwrap(), format!("msg_{i}"));
        }
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let (conn, _rx) = make_connection(0);
        conn.send_text("fits".into()).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn mark_alive_resets_idle() {
        let (conn, _rx) = make_connection(1);
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(conn.idle_for() >= Duration::from_secs(10));
        conn.mark_alive();
        assert!(conn.idle_for() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn age_increases() {
        let (conn, _rx) = make_connection(1);
        let age1 = conn.age();
        tokio::time::advance(Duration::from_millis(50)).await;
        assert!(conn.age() > age1);
    }

    #[test]
    fn each_channel_gets_a_fresh_id() {
        let (a, _rx1) = make_connection(1);
        let (b, _rx2) = make_connection(1);
        assert_ne!(a.id, b.id);
    }
}
