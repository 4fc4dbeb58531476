//! hub-api: HTTP API for schedule-hub
//!
//! Exposes the scheduling service over REST endpoints.
//! Built with axum for async HTTP handling.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod server;

pub use error::{ApiError, Result};
pub use server::{AppState, app, start_server};
