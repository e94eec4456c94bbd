//! Data Transfer Objects
//!
//! Request and response types for the API endpoints.
//! These types are serialized/deserialized to/from JSON.

use serde::{Deserialize, Serialize};

// ============================================
// PUBLISH DTOs
// ============================================

/// Publish request from an external producer
#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    /// Topic to publish to (taken as-is)
    pub topic: String,
    /// Opaque payload delivered verbatim to subscribers
    pub payload: String,
}

/// Publish response
#[derive(Debug, Serialize)]
pub struct PublishResponse {
    /// Status: "accepted"
    pub status: String,
    pub topic: String,
    /// Number of subscribers the payload was queued for
    pub delivered: usize,
    /// Number of subscribers that had already disconnected
    pub failed: usize,
}

// ============================================
// TOPIC DTOs
// ============================================

/// A live topic and its subscriber count
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TopicInfo {
    pub topic: String,
    pub subscribers: usize,
}

/// Topic list response
#[derive(Debug, Serialize, Deserialize)]
pub struct TopicsResponse {
    pub topics: Vec<TopicInfo>,
}

// ============================================
// HEALTH DTOs
// ============================================

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Overall status: healthy or shutting_down
    pub status: String,
    /// Open WebSocket connections
    pub connections: usize,
    /// Topics with at least one subscriber
    pub topics: usize,
    /// Server uptime in seconds
    pub uptime_seconds: u64,
    /// Application version
    pub version: String,
}
