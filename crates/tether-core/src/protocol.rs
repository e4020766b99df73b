//! Event envelope exchanged with agents over their persistent connection.
//!
//! Every frame is a JSON object `{"event": "<name>", "data": <payload>}`.
//!
//! | Direction | Event            | Payload                                   |
//! |-----------|------------------|-------------------------------------------|
//! | in        | `register`       | `{clientId, computerName?, os?}`          |
//! | in        | `command_result` | opaque                                    |
//! | in        | `heartbeat`      | opaque                                    |
//! | out       | `registered`     | `{status: "success"}`                     |
//! | out       | `heartbeat_ack`  | `{timestamp: <epoch millis>}`             |
//! | out       | `command`        | `{command, parameters}`                   |
//!
//! Decoding is split from dispatch: [`decode`] turns raw text
//! into an [`InboundEvent`] or a [`ProtocolError`] describing exactly what
//! was wrong, and the connection handler decides to log and skip it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::ClientId;

/// Inbound event names.
pub const EVENT_REGISTER: &str = "register";
/// Inbound command result.
pub const EVENT_COMMAND_RESULT: &str = "command_result";
/// Inbound liveness signal.
pub const EVENT_HEARTBEAT: &str = "heartbeat";

/// Why an inbound frame could not be turned into an event.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The frame is not a JSON envelope object.
    #[error("invalid envelope: {0}")]
    InvalidEnvelope(#[source] serde_json::Error),

    /// The envelope names an event this server does not handle.
    #[error("unknown event `{0}`")]
    UnknownEvent(String),

    /// The payload does not have the shape the event requires.
    #[error("invalid `{event}` payload: {source}")]
    InvalidPayload {
        /// Event whose payload failed to decode.
        event: &'static str,
        /// Underlying decode error.
        #[source]
        source: serde_json::Error,
    },

    /// A required payload field is present but empty.
    #[error("`{event}` requires a non-empty `{field}`")]
    MissingField {
        /// Event that was rejected.
        event: &'static str,
        /// Wire name of the missing field.
        field: &'static str,
    },

    /// An outbound event could not be serialized.
    #[error("failed to encode event: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Payload of a `register` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPayload {
    /// Identity the agent wants to be addressed by.
    pub client_id: ClientId,
    /// Host name reported by the agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub computer_name: Option<String>,
    /// Operating system reported by the agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
}

/// Event received from an agent.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// Bind this connection to an identity.
    Register(RegisterPayload),
    /// Output of a previously sent command. Not correlated to any request.
    CommandResult(Value),
    /// Liveness signal; answered with `heartbeat_ack`.
    Heartbeat(Value),
}

impl InboundEvent {
    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Register(_) => EVENT_REGISTER,
            Self::CommandResult(_) => EVENT_COMMAND_RESULT,
            Self::Heartbeat(_) => EVENT_HEARTBEAT,
        }
    }
}

/// Event sent to an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum OutboundEvent {
    /// Reply to a successful `register`.
    Registered {
        /// Always `"success"`.
        status: String,
    },
    /// Reply to `heartbeat`.
    HeartbeatAck {
        /// Server time in milliseconds since the Unix epoch.
        timestamp: i64,
    },
    /// Command pushed by an operator.
    Command {
        /// Command name.
        command: String,
        /// Opaque command parameters.
        parameters: Value,
    },
}

impl OutboundEvent {
    /// The `registered` acknowledgment.
    pub fn registered() -> Self {
        Self::Registered {
            status: "success".into(),
        }
    }

    /// A `heartbeat_ack` stamped with the given epoch-millis time.
    pub fn heartbeat_ack(timestamp: i64) -> Self {
        Self::HeartbeatAck { timestamp }
    }

    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Registered { .. } => "registered",
            Self::HeartbeatAck { .. } => "heartbeat_ack",
            Self::Command { .. } => "command",
        }
    }
}

#[derive(Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: Value,
}

/// Decode one inbound text frame.
pub fn decode(text: &str) -> Result<InboundEvent, ProtocolError> {
    let envelope: Envelope = serde_json::from_str(text).map_err(ProtocolError::InvalidEnvelope)?;

    match envelope.event.as_str() {
        EVENT_REGISTER => {
            let payload: RegisterPayload =
                serde_json::from_value(envelope.data).map_err(|source| {
                    ProtocolError::InvalidPayload {
                        event: EVENT_REGISTER,
                        source,
                    }
                })?;
            if payload.client_id.is_empty() {
                return Err(ProtocolError::MissingField {
                    event: EVENT_REGISTER,
                    field: "clientId",
                });
            }
            Ok(InboundEvent::Register(payload))
        }
        EVENT_COMMAND_RESULT => Ok(InboundEvent::CommandResult(envelope.data)),
        EVENT_HEARTBEAT => Ok(InboundEvent::Heartbeat(envelope.data)),
        _ => Err(ProtocolError::UnknownEvent(envelope.event)),
    }
}

/// Serialize an outbound event to a text frame.
pub fn encode(event: &OutboundEvent) -> Result<String, ProtocolError> {
    serde_json::to_string(event).map_err(ProtocolError::Encode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn decode_register_with_metadata() {
        let text = r#"{"event":"register","data":{"clientId":"agent-1","computerName":"WS-04","os":"windows"}}"#;
        let event = decode(text).unwrap();
        assert_matches!(event, InboundEvent::Register(p) => {
            assert_eq!(p.client_id.as_str(), "agent-1");
            assert_eq!(p.computer_name.as_deref(), Some("WS-04"));
            assert_eq!(p.os.as_deref(), Some("windows"));
        });
    }

    #[test]
    fn decode_register_without_metadata() {
        let event = decode(r#"{"event":"register","data":{"clientId":"a"}}"#).unwrap();
        assert_matches!(event, InboundEvent::Register(p) => {
            assert!(p.computer_name.is_none());
            assert!(p.os.is_none());
        });
    }

    #[test]
    fn decode_register_missing_client_id() {
        let err = decode(r#"{"event":"register","data":{"computerName":"x"}}"#).unwrap_err();
        assert_matches!(err, ProtocolError::InvalidPayload { event: "register", .. });
    }

    #[test]
    fn decode_register_empty_client_id() {
        let err = decode(r#"{"event":"register","data":{"clientId":""}}"#).unwrap_err();
        assert_matches!(
            err,
            ProtocolError::MissingField {
                event: "register",
                field: "clientId"
            }
        );
    }

    #[test]
    fn decode_register_whitespace_client_id_is_accepted() {
        let event = decode(r#"{"event":"register","data":{"clientId":" "}}"#).unwrap();
        assert_matches!(event, InboundEvent::Register(p) => {
            assert_eq!(p.client_id.as_str(), " ");
        });
    }

    #[test]
    fn decode_register_without_data() {
        let err = decode(r#"{"event":"register"}"#).unwrap_err();
        assert_matches!(err, ProtocolError::InvalidPayload { .. });
    }

    #[test]
    fn decode_heartbeat_without_data() {
        let event = decode(r#"{"event":"heartbeat"}"#).unwrap();
        assert_eq!(event, InboundEvent::Heartbeat(Value::Null));
    }

    #[test]
    fn decode_command_result_keeps_payload() {
        let event =
            decode(r#"{"event":"command_result","data":{"exitCode":0,"stdout":"ok"}}"#).unwrap();
        assert_matches!(event, InboundEvent::CommandResult(v) => {
            assert_eq!(v["exitCode"], 0);
            assert_eq!(v["stdout"], "ok");
        });
    }

    #[test]
    fn decode_unknown_event() {
        let err = decode(r#"{"event":"reboot","data":{}}"#).unwrap_err();
        assert_matches!(err, ProtocolError::UnknownEvent(name) if name == "reboot");
    }

    #[test]
    fn decode_invalid_json() {
        assert_matches!(decode("not json"), Err(ProtocolError::InvalidEnvelope(_)));
        assert_matches!(decode(""), Err(ProtocolError::InvalidEnvelope(_)));
        assert_matches!(decode("[1,2]"), Err(ProtocolError::InvalidEnvelope(_)));
    }

    #[test]
    fn encode_command() {
        let text = encode(&OutboundEvent::Command {
            command: "shutdown".into(),
            parameters: json!({"delay": 5}),
        })
        .unwrap();
        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["event"], "command");
        assert_eq!(parsed["data"]["command"], "shutdown");
        assert_eq!(parsed["data"]["parameters"]["delay"], 5);
    }

    #[test]
    fn encode_registered() {
        let text = encode(&OutboundEvent::registered()).unwrap();
        assert_eq!(text, r#"{"event":"registered","data":{"status":"success"}}"#);
    }

    #[test]
    fn encode_heartbeat_ack() {
        let text = encode(&OutboundEvent::heartbeat_ack(1_700_000_000_000)).unwrap();
        assert_eq!(
            text,
            r#"{"event":"heartbeat_ack","data":{"timestamp":1700000000000}}"#
        );
    }

    #[test]
    fn event_names_match_wire() {
        assert_eq!(OutboundEvent::registered().name(), "registered");
        assert_eq!(OutboundEvent::heartbeat_ack(0).name(), "heartbeat_ack");
        assert_eq!(InboundEvent::Heartbeat(Value::Null).name(), "heartbeat");
    }
}
