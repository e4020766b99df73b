//! # tether-core
//!
//! Foundation types shared by the Tether hub crates.
//!
//! - [`protocol`]: the event envelope spoken over each agent's WebSocket
//! - [`ids`]: branded ID newtypes for connections and agent identities
//! - [`logging`]: `tracing` subscriber initialisation
//! - [`time`]: wall-clock helpers used in acknowledgments and status replies

#![deny(unsafe_code)]

pub mod ids;
pub mod logging;
pub mod protocol;
pub mod time;

pub use ids::{ClientId, ConnectionId};
pub use protocol::{InboundEvent, OutboundEvent, ProtocolError, RegisterPayload};
