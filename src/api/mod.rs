//! Bookcast HTTP API
//!
//! HTTP layer for Bookcast, built with Axum.
//!
//! # Endpoints
//!
//! ## WebSocket
//! - `GET /` or `GET /ws` - Subscriber connection
//!
//! ## Publish
//! - `POST /api/v1/publish` - Publish a payload to a topic
//! - `GET /api/v1/topics` - List live topics
//!
//! ## Health
//! - `GET /health/live` - Liveness probe
//! - `GET /health` - Full health status
//!
//! # Example
//!
//! ```rust,ignore
//! use bookcast::api::{build_router, AppState};
//! use bookcast::config::ServerConfig;
//! use bookcast::websocket::ConnectionHub;
//! use std::sync::Arc;
//!
//! let hub = Arc::new(ConnectionHub::new());
//! let router = build_router(AppState::new(hub, ServerConfig::default()));
//! ```

pub mod dto;
pub mod error;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::AppState;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::websocket::websocket_handler;

/// Slack for JSON framing around the payload
const BODY_OVERHEAD: usize = 64 * 1024;

/// Build the router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.max_payload_bytes.saturating_add(BODY_OVERHEAD);

    let api_routes = Router::new()
        .route("/publish", post(routes::publish::publish))
        .route("/topics", get(routes::publish::list_topics))
        .layer(DefaultBodyLimit::max(body_limit));

    let health_routes = Router::new()
        .route("/live", get(routes::health::liveness))
        .route("/", get(routes::health::full_health));

    let shared_state = Arc::new(state);

    Router::new()
        .route("/", get(websocket_handler))
        .route("/ws", get(websocket_handler))
        .nest("/api/v1", api_routes)
        .nest("/health", health_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(shared_state)
}
