//! Publish Routes
//!
//! Producer-facing endpoints for pushing payloads to subscribers.
//!
//! - POST /api/v1/publish - Publish a payload to a topic
//! - GET /api/v1/topics - List live topics

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use crate::api::dto::{PublishRequest, PublishResponse, TopicInfo, TopicsResponse};
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;

/// POST /api/v1/publish
///
/// Broadcast a payload to every current subscriber of a topic. Delivery is
/// best effort; the counts in the response are informational.
pub async fn publish(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PublishRequest>,
) -> ApiResult<(StatusCode, Json<PublishResponse>)> {
    if state.hub.is_shutting_down() {
        return Err(ApiError::ServiceUnavailable(
            "Server is shutting down".to_string(),
        ));
    }

    let max = state.config.max_payload_bytes;
    if req.payload.len() > max {
        return Err(ApiError::Validation(format!(
            "Payload exceeds maximum of {} bytes",
            max
        )));
    }

    let report = state.hub.publish(&req.topic, req.payload).await;

    Ok((
        StatusCode::ACCEPTED,
        Json(PublishResponse {
            status: "accepted".to_string(),
            topic: report.topic,
            delivered: report.delivered,
            failed: report.failed,
        }),
    ))
}

/// GET /api/v1/topics
///
/// List topics that currently have subscribers.
pub async fn list_topics(State(state): State<Arc<AppState>>) -> Json<TopicsResponse> {
    let topics = state
        .hub
        .topics()
        .await
        .into_iter()
        .map(|(topic, subscribers)| TopicInfo { topic, subscribers })
        .collect();

    Json(TopicsResponse { topics })
}
