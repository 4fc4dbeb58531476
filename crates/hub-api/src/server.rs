//! HTTP API Server
//!
//! Starts and manages the axum-based HTTP server.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use http::{HeaderName, HeaderValue, Method, header};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use hub_core::{ApiConfig, ScheduleService};

use crate::handlers::USER_ID_HEADER_LOWER;
use crate::routes::routes;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ScheduleService>,
}

/// 設定されたオリジンのみ許可する CORS レイヤー
///
/// 未設定の場合は localhost のみ
fn cors_layer(config: &ApiConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = match &config.allowed_origins {
        Some(origins) => origins
            .iter()
            .filter_map(|o| match o.parse() {
                Ok(v) => Some(v),
                Err(_) => {
                    warn!(origin = %o, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect(),
        None => vec![
            HeaderValue::from_static("http://localhost:3000"),
            HeaderValue::from_static("http://127.0.0.1:3000"),
        ],
    };

    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static(USER_ID_HEADER_LOWER),
        ])
}

/// Build the application router
pub fn app(service: Arc<ScheduleService>, config: &ApiConfig) -> Router {
    Router::new()
        .merge(routes())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(config))
        .with_state(AppState { service })
}

/// Start the HTTP API server
pub async fn start_server(service: Arc<ScheduleService>, config: &ApiConfig) -> anyhow::Result<()> {
    let app = app(service, config);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("HTTP API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
