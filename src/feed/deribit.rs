//! Deribit Order Book Client
//!
//! JSON-RPC over HTTP client for the Deribit API. Requests are POSTed to
//! `<base_url>/<method>` with a JSON-RPC 2.0 envelope.

use super::*;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

use crate::config::FeedConfig;

/// Deribit REST API client
pub struct DeribitClient {
    client: Client,
    config: DeribitConfig,
    access_token: RwLock<Option<String>>,
    next_id: AtomicU64,
}

/// Configuration for the Deribit client
#[derive(Debug, Clone)]
pub struct DeribitConfig {
    /// Base URL, e.g. "https://test.deribit.com/api/v2"
    pub base_url: String,
    /// Request timeout in milliseconds
    pub request_timeout_ms: u64,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

impl Default for DeribitConfig {
    fn default() -> Self {
        Self::from(&FeedConfig::default())
    }
}

impl From<&FeedConfig> for DeribitConfig {
    fn from(feed: &FeedConfig) -> Self {
        Self {
            base_url: feed.base_url.trim_end_matches('/').to_string(),
            request_timeout_ms: feed.request_timeout_ms,
            client_id: feed.client_id.clone(),
            client_secret: feed.client_secret.clone(),
        }
    }
}

/// JSON-RPC response envelope
#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

impl<T> RpcResponse<T> {
    fn into_result(self, method: &str) -> Result<T, FeedError> {
        if let Some(error) = self.error {
            return Err(FeedError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        self.result
            .ok_or_else(|| FeedError::MissingResult(method.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct AuthResult {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// `public/get_order_book` result
#[derive(Debug, Deserialize)]
struct BookResult {
    instrument_name: Option<String>,
    #[serde(default)]
    bids: Vec<(f64, f64)>,
    #[serde(default)]
    asks: Vec<(f64, f64)>,
    last_price: Option<f64>,
    timestamp: Option<i64>,
}

impl BookResult {
    fn into_snapshot(self, instrument: &str) -> OrderBookSnapshot {
        let level = |(price, amount): (f64, f64)| PriceLevel { price, amount };

        OrderBookSnapshot {
            instrument: self
                .instrument_name
                .unwrap_or_else(|| instrument.to_string()),
            bids: self.bids.into_iter().map(level).collect(),
            asks: self.asks.into_iter().map(level).collect(),
            last_price: self.last_price,
            timestamp: self
                .timestamp
                .and_then(DateTime::from_timestamp_millis)
                .unwrap_or_else(Utc::now),
        }
    }
}

impl DeribitClient {
    /// Create a new client with the given configuration
    pub fn new(config: DeribitConfig) -> Result<Self, FeedError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .user_agent(concat!("bookcast/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            config,
            access_token: RwLock::new(None),
            next_id: AtomicU64::new(0),
        })
    }

    /// Get the current configuration
    pub fn config(&self) -> &DeribitConfig {
        &self.config
    }

    pub async fn is_authenticated(&self) -> bool {
        self.access_token.read().await.is_some()
    }

    /// Exchange client credentials for an access token
    ///
    /// The token is attached as a bearer token to subsequent requests.
    pub async fn authenticate(&self) -> Result<(), FeedError> {
        let (Some(client_id), Some(client_secret)) =
            (&self.config.client_id, &self.config.client_secret)
        else {
            return Err(FeedError::NotConfigured(
                "client_id and client_secret are required".to_string(),
            ));
        };

        let auth: AuthResult = self
            .call(
                "public/auth",
                json!({
                    "grant_type": "client_credentials",
                    "client_id": client_id,
                    "client_secret": client_secret,
                }),
            )
            .await?;

        tracing::info!(expires_in = ?auth.expires_in, "Authenticated with Deribit");
        *self.access_token.write().await = Some(auth.access_token);
        Ok(())
    }

    /// Send one JSON-RPC request and unwrap its result
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T, FeedError> {
        let url = format!("{}/{}", self.config.base_url, method);
        let body = json!({
            "jsonrpc": "2.0",
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
            "method": method,
            "params": params,
        });

        let mut request = self.client.post(&url).json(&body);
        if let Some(token) = self.access_token.read().await.as_deref() {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        // Deribit reports RPC errors with a 4xx status and a JSON body
        match serde_json::from_str::<RpcResponse<T>>(&text) {
            Ok(envelope) => envelope.into_result(method),
            Err(_) if !status.is_success() => Err(FeedError::Api {
                status: status.as_u16(),
                message: text,
            }),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl OrderBookSource for DeribitClient {
    fn name(&self) -> &str {
        "deribit"
    }

    async fn fetch(&self, instrument: &str) -> Result<OrderBookSnapshot, FeedError> {
        let book: BookResult = self
            .call(
                "public/get_order_book",
                json!({ "instrument_name": instrument }),
            )
            .await?;

        Ok(book.into_snapshot(instrument))
    }
}
