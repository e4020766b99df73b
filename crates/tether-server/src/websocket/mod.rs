//! Agent `WebSocket` transport: per-socket session loop and keepalive.

pub mod keepalive;
pub mod session;
