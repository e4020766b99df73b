//! WebSocket session: one agent socket from upgrade through disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::keepalive::{KeepaliveResult, run_keepalive};
use crate::connection::ConnectionHandle;
use crate::lifecycle::ConnectionLifecycle;
use crate::registry::SessionRegistry;
use crate::telemetry::{
    MALFORMED_EVENTS_TOTAL, WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE,
    WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL,
};

/// Timing knobs for one socket.
#[derive(Debug, Clone, Copy)]
pub struct SessionTiming {
    /// Interval between server-initiated Ping frames.
    pub ping_interval: Duration,
    /// Silence after which the socket is closed.
    pub idle_timeout: Duration,
}

/// Why a session loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Peer sent Close, the stream ended, or a read failed.
    Transport,
    /// Keepalive saw no traffic within the idle timeout.
    TimedOut,
    /// Server shutdown.
    Shutdown,
}

/// What an inbound frame means to the session loop.
#[derive(Debug, PartialEq, Eq)]
enum Frame {
    Text(String),
    Control,
    Close,
    NonUtf8(usize),
}

fn classify(msg: Message) -> Frame {
    match msg {
        Message::Text(t) => Frame::Text(t.as_str().to_owned()),
        // Some agents send JSON as binary frames
        Message::Binary(data) => match String::from_utf8(data.to_vec()) {
            Ok(s) => Frame::Text(s),
            Err(_) => Frame::NonUtf8(data.len()),
        },
        Message::Ping(_) | Message::Pong(_) => Frame::Control,
        Message::Close(_) => Frame::Close,
    }
}

/// Run one agent socket.
///
/// The outbound half is drained by a forwarder task that also sends Ping
/// frames. Inbound frames are fed to a [`ConnectionLifecycle`] in arrival
/// order and any reply is queued on the same channel as dispatched
/// commands. However the loop ends, the lifecycle is closed so the
/// registry entry for this socket is removed.
#[instrument(skip_all, fields(conn_id = %connection.id))]
pub async fn run_ws_session(
    ws: WebSocket,
    connection: ConnectionHandle,
    mut send_rx: mpsc::Receiver<String>,
    registry: Arc<SessionRegistry>,
    timing: SessionTiming,
    cancel: CancellationToken,
) -> CloseReason {
    let (mut ws_tx, mut ws_rx) = ws.split();

    info!("agent connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    let outbound = tokio::spawn(async move {
        let mut ping = tokio::time::interval(timing.ping_interval);
        // Skip the immediate first tick
        let _ = ping.tick().await;

        loop {
            tokio::select! {
                msg = send_rx.recv() => {
                    let Some(text) = msg else { break };
                    if ws_tx.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = ping.tick() => {
                    if ws_tx.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
        let _ = ws_tx.close().await;
    });

    let keepalive = run_keepalive(
        connection.clone(),
        timing.ping_interval,
        timing.idle_timeout,
        cancel,
    );
    tokio::pin!(keepalive);

    let mut lifecycle = ConnectionLifecycle::new(connection.clone(), registry);

    let reason = loop {
        tokio::select! {
            frame = ws_rx.next() => {
                let msg = match frame {
                    Some(Ok(msg)) => msg,
                    Some(Err(error)) => {
                        debug!(%error, "socket read failed");
                        break CloseReason::Transport;
                    }
                    None => break CloseReason::Transport,
                };
                connection.mark_alive();

                let text = match classify(msg) {
                    Frame::Text(text) => text,
                    Frame::Control => continue,
                    Frame::Close => {
                        info!("agent sent close frame");
                        break CloseReason::Transport;
                    }
                    Frame::NonUtf8(len) => {
                        counter!(MALFORMED_EVENTS_TOTAL).increment(1);
                        warn!(len, "ignoring non-UTF8 binary frame");
                        continue;
                    }
                };

                if let Some(reply) = lifecycle.handle_text(&text) {
                    if let Err(error) = connection.send(&reply) {
                        warn!(event = reply.name(), %error, "failed to queue reply");
                    }
                }
            }
            result = &mut keepalive => {
                break match result {
                    KeepaliveResult::TimedOut => {
                        warn!(idle_timeout = ?timing.idle_timeout, "agent unresponsive, disconnecting");
                        CloseReason::TimedOut
                    }
                    KeepaliveResult::Cancelled => CloseReason::Shutdown,
                };
            }
        }
    };

    let _ = lifecycle.close();
    outbound.abort();

    info!(?reason, "agent socket closed");
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(connection.age().as_secs_f64());
    reason
}
