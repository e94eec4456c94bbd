//! Order Book Feed
//!
//! Market-data producers that fetch order books from an exchange and
//! publish them to WebSocket subscribers:
//! - Deribit JSON-RPC REST client
//! - Periodic poller publishing each instrument under its own topic

mod deribit;
mod poller;

pub use deribit::{DeribitClient, DeribitConfig};
pub use poller::FeedPoller;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Common trait for all order book sources
#[async_trait]
pub trait OrderBookSource: Send + Sync {
    /// Unique name for this source
    fn name(&self) -> &str;

    /// Fetch the current order book for an instrument
    async fn fetch(&self, instrument: &str) -> Result<OrderBookSnapshot, FeedError>;
}

/// One price level of an order book side
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: f64,
    pub amount: f64,
}

/// Order book at a point in time; serialized as the broadcast payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    pub instrument: String,
    /// Best first
    pub bids: Vec<PriceLevel>,
    /// Best first
    pub asks: Vec<PriceLevel>,
    pub last_price: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl OrderBookSnapshot {
    pub fn best_bid(&self) -> Option<PriceLevel> {
        self.bids.first().copied()
    }

    pub fn best_ask(&self) -> Option<PriceLevel> {
        self.asks.first().copied()
    }

    /// Serialize as the JSON payload sent to subscribers
    pub fn to_payload(&self) -> Result<String, FeedError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Errors that can occur while fetching market data
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Response to {0} carried no result")]
    MissingResult(String),

    #[error("Not configured: {0}")]
    NotConfigured(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
