//! WebSocket session server.
//!
//! Exposes the turn engine to clients over a socket per session.
//!
//! # Endpoints
//!
//! - `GET /health` — Liveness probe
//! - `GET /ws`     — Session event stream (WebSocket upgrade)

pub mod routes;

pub use routes::{app_router, AppState};
