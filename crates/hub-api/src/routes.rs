//! Route definitions
//!
//! Defines all HTTP API endpoints.

use axum::{
    Router,
    routing::{get, post},
};

use crate::handlers::{health, schedule_meeting};
use crate::server::AppState;

/// Create the API router
pub fn routes() -> Router<AppState> {
    Router::new()
        // Health check
        .route("/api/health", get(health))
        // Natural-language scheduling
        .route("/api/scheduleMeeting", post(schedule_meeting))
}
