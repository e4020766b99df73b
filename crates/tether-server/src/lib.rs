//! # tether-server
//!
//! Axum HTTP + `WebSocket` hub for remote agents.
//!
//! - [`registry`]: identity → live connection map, the single source of
//!   truth for "is agent X reachable"
//! - [`dispatcher`]: validates operator commands and hands them to the
//!   target agent's connection (fire-and-forget)
//! - [`lifecycle`]: per-connection state machine (`Connected` →
//!   `Registered` → `Closed`)
//! - [`websocket`]: socket session loop and transport keepalive
//! - [`api`]: operator-facing `/api/*` routes
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod api;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod health;
pub mod lifecycle;
pub mod registry;
pub mod server;
pub mod shutdown;
pub mod telemetry;
pub mod websocket;

pub use config::ServerConfig;
pub use server::TetherServer;
