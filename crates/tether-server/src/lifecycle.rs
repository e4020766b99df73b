//! Per-connection state machine.
//!
//! ```text
//! Connected ──register──▶ Registered ──register──▶ Registered (rebind)
//!     │                        │
//!     └──────── close ─────────┴──▶ Closed (terminal)
//! ```
//!
//! The lifecycle owns nothing but its state: the socket task feeds it frames
//! and sends back whatever reply it returns, and calls [`close`] exactly
//! once when the transport goes away.
//!
//! [`close`]: ConnectionLifecycle::close

use std::sync::Arc;

use metrics::counter;
use serde_json::Value;
use tether_core::ids::ClientId;
use tether_core::protocol::{self, InboundEvent, OutboundEvent, RegisterPayload};
use tether_core::time::now_millis;
use tracing::{debug, info, warn};

use crate::connection::ConnectionHandle;
use crate::registry::{Session, SessionRegistry};
use crate::telemetry::{
    COMMAND_RESULTS_TOTAL, HEARTBEATS_TOTAL, MALFORMED_EVENTS_TOTAL, SESSIONS_REGISTERED_TOTAL,
};

/// Where a connection is in its life.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Socket open, no identity announced yet.
    Connected,
    /// Bound (or last bound) to this identity.
    Registered(ClientId),
    /// Transport gone; nothing more is processed.
    Closed,
}

/// Drives one connection's events against the registry.
#[derive(Debug)]
pub struct ConnectionLifecycle {
    connection: ConnectionHandle,
    registry: Arc<SessionRegistry>,
    state: ConnectionState,
}

impl ConnectionLifecycle {
    /// Start a lifecycle in `Connected`.
    pub fn new(connection: ConnectionHandle, registry: Arc<SessionRegistry>) -> Self {
        Self {
            connection,
            registry,
            state: ConnectionState::Connected,
        }
    }

    /// Current state.
    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Identity this connection is still reachable under.
    ///
    /// `None` before registration, after close, or once another connection
    /// has taken the identity over.
    pub fn bound_identity(&self) -> Option<&ClientId> {
        let ConnectionState::Registered(client_id) = &self.state else {
            return None;
        };
        self.registry
            .lookup(client_id)
            .filter(|bound| bound.id == self.connection.id)
            .map(|_| client_id)
    }

    /// The connection this lifecycle drives.
    pub fn connection(&self) -> &ConnectionHandle {
        &self.connection
    }

    /// Decode and handle one text frame.
    ///
    /// Undecodable frames are logged and dropped; the connection stays open.
    pub fn handle_text(&mut self, text: &str) -> Option<OutboundEvent> {
        if self.state == ConnectionState::Closed {
            return None;
        }
        match protocol::decode(text) {
            Ok(event) => self.handle_event(event),
            Err(error) => {
                counter!(MALFORMED_EVENTS_TOTAL).increment(1);
                warn!(
                    conn_id = %self.connection.id,
                    %error,
                    len = text.len(),
                    "ignoring malformed event"
                );
                None
            }
        }
    }

    /// Handle a decoded event, returning the reply to send, if any.
    pub fn handle_event(&mut self, event: InboundEvent) -> Option<OutboundEvent> {
        if self.state == ConnectionState::Closed {
            debug!(conn_id = %self.connection.id, event = event.name(), "event after close ignored");
            return None;
        }
        match event {
            InboundEvent::Register(payload) => Some(self.on_register(payload)),
            InboundEvent::Heartbeat(_) => Some(self.on_heartbeat()),
            InboundEvent::CommandResult(result) => {
                self.on_command_result(&result);
                None
            }
        }
    }

    /// Move to `Closed` and drop this connection's registry entry.
    ///
    /// Returns the identity that was removed. Idempotent.
    pub fn close(&mut self) -> Option<ClientId> {
        if self.state == ConnectionState::Closed {
            return None;
        }
        self.state = ConnectionState::Closed;
        let removed = self.registry.remove(&self.connection.id);
        match &removed {
            Some(client_id) => info!(
                %client_id,
                conn_id = %self.connection.id,
                "client disconnected"
            ),
            None => debug!(conn_id = %self.connection.id, "unregistered connection closed"),
        }
        removed
    }

    fn on_register(&mut self, payload: RegisterPayload) -> OutboundEvent {
        let client_id = payload.client_id.clone();
        let session = Session::new(payload.client_id, self.connection.clone())
            .with_metadata(payload.computer_name, payload.os);
        let computer_name = session.computer_name.clone().unwrap_or_default();
        let os = session.os.clone().unwrap_or_default();

        let outcome = self.registry.register_session(session);
        counter!(SESSIONS_REGISTERED_TOTAL).increment(1);

        if let Some(displaced) = &outcome.displaced {
            info!(
                %client_id,
                conn_id = %self.connection.id,
                displaced_conn_id = %displaced,
                "identity taken over by new connection"
            );
        }
        if let Some(previous) = &outcome.renamed_from {
            info!(
                %client_id,
                previous_client_id = %previous,
                conn_id = %self.connection.id,
                "connection re-registered under new identity"
            );
        }
        info!(
            %client_id,
            computer_name = computer_name.as_str(),
            os = os.as_str(),
            conn_id = %self.connection.id,
            "client registered"
        );

        self.state = ConnectionState::Registered(client_id);
        OutboundEvent::registered()
    }

    fn on_heartbeat(&self) -> OutboundEvent {
        self.connection.mark_alive();
        counter!(HEARTBEATS_TOTAL).increment(1);
        debug!(conn_id = %self.connection.id, "heartbeat");
        OutboundEvent::heartbeat_ack(now_millis())
    }

    fn on_command_result(&self, result: &Value) {
        counter!(COMMAND_RESULTS_TOTAL).increment(1);
        match (&self.state, self.bound_identity()) {
            (_, Some(client_id)) => info!(
                %client_id,
                conn_id = %self.connection.id,
                %result,
                "command result received"
            ),
            (ConnectionState::Registered(last), None) => info!(
                last_client_id = %last,
                conn_id = %self.connection.id,
                %result,
                "command result received on displaced connection"
            ),
            _ => info!(
                conn_id = %self.connection.id,
                %result,
                "command result received before register"
            ),
        }
    }
}
