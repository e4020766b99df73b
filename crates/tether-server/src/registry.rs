//! Session registry: agent identity → live connection.
//!
//! The registry is the only place that decides whether an agent is
//! reachable. It keeps two maps under one lock:
//!
//! - `sessions`: identity → [`Session`]
//! - `by_connection`: connection ID → identity (reverse index)
//!
//! Both are updated in the same critical section, so they always agree.
//! Removal goes through the reverse index because a disconnect only knows
//! which socket went away, not which identity it last announced.
//!
//! Registration is last-writer-wins. When a second connection registers an
//! identity that is already bound, the earlier connection is *not* closed or
//! notified; it simply stops being reachable by lookup and its later
//! disconnect removes nothing.

use std::collections::HashMap;

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tether_core::ids::{ClientId, ConnectionId};

use crate::connection::ConnectionHandle;

/// One identity bound to one live connection.
#[derive(Debug, Clone)]
pub struct Session {
    /// Identity announced by the agent.
    pub client_id: ClientId,
    /// Connection the identity is bound to.
    pub connection: ConnectionHandle,
    /// Host name reported at registration.
    pub computer_name: Option<String>,
    /// Operating system reported at registration.
    pub os: Option<String>,
    /// When the binding was made.
    pub registered_at: DateTime<Utc>,
}

impl Session {
    /// Bind `client_id` to `connection`, stamped now.
    pub fn new(client_id: ClientId, connection: ConnectionHandle) -> Self {
        Self {
            client_id,
            connection,
            computer_name: None,
            os: None,
            registered_at: Utc::now(),
        }
    }

    /// Attach the descriptive fields an agent sends with `register`.
    #[must_use]
    pub fn with_metadata(mut self, computer_name: Option<String>, os: Option<String>) -> Self {
        self.computer_name = computer_name;
        self.os = os;
        self
    }

    fn info(&self) -> SessionInfo {
        SessionInfo {
            client_id: self.client_id.clone(),
            computer_name: self.computer_name.clone(),
            os: self.os.clone(),
            connection_id: self.connection.id.clone(),
            registered_at: self
                .registered_at
                .to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

/// Serializable snapshot of a session for status listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    /// Agent identity.
    pub client_id: ClientId,
    /// Reported host name.
    pub computer_name: Option<String>,
    /// Reported operating system.
    pub os: Option<String>,
    /// Connection currently serving the identity.
    pub connection_id: ConnectionId,
    /// ISO-8601 registration time.
    pub registered_at: String,
}

/// What a registration changed, for logging.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterOutcome {
    /// Another connection that held this identity and is now unreachable.
    pub displaced: Option<ConnectionId>,
    /// Identity this connection was bound to before re-registering.
    pub renamed_from: Option<ClientId>,
}

#[derive(Debug, Default)]
struct Inner {
    sessions: HashMap<ClientId, Session>,
    by_connection: HashMap<ConnectionId, ClientId>,
}

/// Thread-safe identity → connection map.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    inner: Mutex<Inner>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `client_id` to `connection`, overwriting any existing binding.
    pub fn register(&self, client_id: ClientId, connection: ConnectionHandle) -> RegisterOutcome {
        self.register_session(Session::new(client_id, connection))
    }

    /// Insert a fully built session, overwriting any existing binding.
    pub fn register_session(&self, session: Session) -> RegisterOutcome {
        let conn_id = session.connection.id.clone();
        let client_id = session.client_id.clone();
        let mut outcome = RegisterOutcome::default();

        let mut inner = self.inner.lock();

        // A connection answers to its latest identity only.
        if let Some(previous) = inner.by_connection.get(&conn_id).cloned() {
            if previous != client_id {
                let _ = inner.sessions.remove(&previous);
                outcome.renamed_from = Some(previous);
            }
        }

        if let Some(old) = inner.sessions.insert(client_id.clone(), session) {
            if old.connection.id != conn_id {
                let _ = inner.by_connection.remove(&old.connection.id);
                outcome.displaced = Some(old.connection.id.clone());
            }
        }
        let _ = inner.by_connection.insert(conn_id, client_id);

        outcome
    }

    /// The connection currently bound to `client_id`, if any.
    pub fn lookup(&self, client_id: &str) -> Option<ConnectionHandle> {
        self.inner
            .lock()
            .sessions
            .get(client_id)
            .map(|s| s.connection.clone())
    }

    /// Remove the session bound to `connection`, returning its identity.
    ///
    /// No-op when the connection never registered or was displaced by a
    /// newer connection with the same identity.
    pub fn remove(&self, connection: &ConnectionId) -> Option<ClientId> {
        let mut inner = self.inner.lock();
        let client_id = inner.by_connection.remove(connection)?;
        let bound_here = inner
            .sessions
            .get(&client_id)
            .is_some_and(|s| &s.connection.id == connection);
        if bound_here {
            let _ = inner.sessions.remove(&client_id);
            Some(client_id)
        } else {
            None
        }
    }

    /// Number of bound identities.
    pub fn count(&self) -> usize {
        self.inner.lock().sessions.len()
    }

    /// Whether `client_id` is currently bound.
    pub fn contains(&self, client_id: &str) -> bool {
        self.inner.lock().sessions.contains_key(client_id)
    }

    /// Snapshot of all sessions, sorted by identity.
    pub fn sessions(&self) -> Vec<SessionInfo> {
        let mut list: Vec<SessionInfo> = self
            .inner
            .lock()
            .sessions
            .values()
            .map(Session::info)
            .collect();
        list.sort_by(|a, b| a.client_id.cmp(&b.client_id));
        list
    }
}
