//! Operator command dispatch.
//!
//! The dispatcher turns "send command X to agent Y" into a single enqueue on
//! Y's outbound channel. It never waits for the agent, never retries, and
//! never touches the registry except to look up the target.

use std::sync::Arc;

use metrics::counter;
use serde_json::Value;
use tether_core::ids::{ClientId, ConnectionId};
use tether_core::protocol::{OutboundEvent, ProtocolError};
use tracing::{debug, info, warn};

use crate::connection::SendError;
use crate::registry::SessionRegistry;
use crate::telemetry::{COMMANDS_DISPATCHED_TOTAL, COMMANDS_REJECTED_TOTAL};

/// Why a command was not handed to an agent.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Target identity or command name is empty.
    #[error("clientId and command are required")]
    Validation,

    /// No live connection is bound to the identity.
    #[error("client `{client_id}` not found")]
    NotFound {
        /// Requested identity.
        client_id: String,
    },

    /// The agent's outbound queue is full.
    #[error("send queue for client `{client_id}` is full")]
    Backpressure {
        /// Requested identity.
        client_id: String,
    },

    /// The command could not be serialized.
    #[error(transparent)]
    Encode(#[from] ProtocolError),
}

impl DispatchError {
    /// Short label for logs and the `reason` metric label.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::NotFound { .. } => "not_found",
            Self::Backpressure { .. } => "backpressure",
            Self::Encode(_) => "encode",
        }
    }
}

/// Proof that a command was queued on a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchAck {
    /// Target identity.
    pub client_id: ClientId,
    /// Command name as sent.
    pub command: String,
    /// Connection the command was queued on.
    pub connection_id: ConnectionId,
}

/// Routes commands to registered agents.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<SessionRegistry>,
}

impl Dispatcher {
    /// Create a dispatcher over `registry`.
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// Queue `command` for the agent bound to `client_id`.
    pub fn dispatch(
        &self,
        client_id: &str,
        command: &str,
        parameters: Value,
    ) -> Result<DispatchAck, DispatchError> {
        let result = self.try_dispatch(client_id, command, parameters);
        match &result {
            Ok(ack) => {
                counter!(COMMANDS_DISPATCHED_TOTAL).increment(1);
                info!(
                    client_id,
                    command,
                    conn_id = %ack.connection_id,
                    "command sent"
                );
            }
            Err(err) => {
                counter!(COMMANDS_REJECTED_TOTAL, "reason" => err.reason()).increment(1);
                match err {
                    DispatchError::Validation | DispatchError::NotFound { .. } => {
                        debug!(client_id, command, reason = err.reason(), "command rejected");
                    }
                    _ => warn!(client_id, command, error = %err, "command rejected"),
                }
            }
        }
        result
    }

    fn try_dispatch(
        &self,
        client_id: &str,
        command: &str,
        parameters: Value,
    ) -> Result<DispatchAck, DispatchError> {
        if client_id.is_empty() || command.is_empty() {
            return Err(DispatchError::Validation);
        }

        let Some(connection) = self.registry.lookup(client_id) else {
            return Err(DispatchError::NotFound {
                client_id: client_id.to_owned(),
            });
        };

        let event = OutboundEvent::Command {
            command: command.to_owned(),
            parameters,
        };
        match connection.send(&event) {
            Ok(()) => Ok(DispatchAck {
                client_id: ClientId::from(client_id),
                command: command.to_owned(),
                connection_id: connection.id.clone(),
            }),
            // The socket task exited between lookup and send.
            Err(SendError::Closed) => Err(DispatchError::NotFound {
                client_id: client_id.to_owned(),
            }),
            Err(SendError::Full) => Err(DispatchError::Backpressure {
                client_id: client_id.to_owned(),
            }),
            Err(SendError::Encode(e)) => Err(DispatchError::Encode(e)),
        }
    }
}
