//! HTTP API handlers

use axum::{Json, extract::State, http::HeaderMap};
use serde::Deserialize;
use tracing::{debug, info};

use hub_core::{ScheduleResponse, UserId};

use crate::error::{ApiError, Result};
use crate::server::AppState;

/// Header carrying the calendar owner
pub const USER_ID_HEADER: &str = "X-User-Id";
pub(crate) const USER_ID_HEADER_LOWER: &str = "x-user-id";

/// Scheduling request payload
#[derive(Debug, Deserialize)]
pub struct ScheduleRequest {
    /// Natural-language request
    #[serde(default)]
    pub text: String,
}

/// Health check endpoint
pub async fn health() -> &'static str {
    "Service is running"
}

fn user_from_headers(headers: &HeaderMap) -> Result<UserId> {
    let raw = headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            ApiError::InvalidRequest(format!(
                "User ID is required. Please provide {} header with a valid user email or object ID (e.g., user@example.com)",
                USER_ID_HEADER
            ))
        })?;
    Ok(UserId::parse(raw)?)
}

/// Scheduling endpoint - run a natural-language request for the header user
pub async fn schedule_meeting(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ScheduleRequest>,
) -> Result<Json<ScheduleResponse>> {
    let user = user_from_headers(&headers)?;
    let text = req.text.trim();
    if text.is_empty() {
        return Err(ApiError::InvalidRequest("Request text is required".to_string()));
    }

    info!(user = %user, "Received schedule request");
    debug!(text, "Request text");

    Ok(Json(state.service.process(text, &user).await))
}
