//! Operator-facing HTTP routes under `/api`.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::{Value, json};
use tether_core::ids::ClientId;
use tether_core::time::now_iso;

use crate::dispatcher::DispatchError;
use crate::registry::SessionInfo;
use crate::server::AppState;

/// `GET /api/status` body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    /// Always `"online"`.
    pub status: &'static str,
    /// Number of bound agent identities.
    pub connected_clients: usize,
    /// Server time, ISO-8601 UTC with milliseconds.
    pub timestamp: String,
}

/// `POST /api/command` success body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandAccepted {
    /// Always `"command sent"`.
    pub status: &'static str,
    /// Target identity.
    pub client_id: ClientId,
    /// Command name as sent.
    pub command: String,
}

/// `GET /api/clients` body.
#[derive(Debug, Clone, Serialize)]
pub struct ClientsResponse {
    /// Bound sessions sorted by identity.
    pub clients: Vec<SessionInfo>,
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::Validation => (StatusCode::BAD_REQUEST, "clientId and command are required"),
            Self::NotFound { .. } => (StatusCode::NOT_FOUND, "Client not found"),
            Self::Backpressure { .. } => (StatusCode::SERVICE_UNAVAILABLE, "Client send queue full"),
            Self::Encode(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode command"),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// GET /api/status
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "online",
        connected_clients: state.registry.count(),
        timestamp: now_iso(),
    })
}

/// GET /api/clients
pub async fn get_clients(State(state): State<AppState>) -> Json<ClientsResponse> {
    Json(ClientsResponse {
        clients: state.registry.sessions(),
    })
}

/// POST /api/command
///
/// The body is read leniently: anything that is not a JSON object, or an
/// object without string `clientId` and `command`, is a validation error
/// rather than an extractor rejection.
pub async fn post_command(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<CommandAccepted>, DispatchError> {
    let request = CommandRequest::parse(&body);
    let ack = state
        .dispatcher
        .dispatch(&request.client_id, &request.command, request.parameters)?;
    Ok(Json(CommandAccepted {
        status: "command sent",
        client_id: ack.client_id,
        command: ack.command,
    }))
}

#[derive(Debug, Default)]
struct CommandRequest {
    client_id: String,
    command: String,
    parameters: Value,
}

impl CommandRequest {
    /// Pull the three fields out of a raw body; anything missing is empty.
    fn parse(body: &[u8]) -> Self {
        let Ok(Value::Object(mut obj)) = serde_json::from_slice::<Value>(body) else {
            return Self::default();
        };
        let mut take_str = |key: &str| match obj.remove(key) {
            Some(Value::String(s)) => s,
            _ => String::new(),
        };
        let client_id = take_str("clientId");
        let command = take_str("command");
        Self {
            client_id,
            command,
            parameters: obj.remove("parameters").unwrap_or(Value::Null),
        }
    }
}
