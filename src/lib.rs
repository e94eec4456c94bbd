//! # Bookcast
//!
//! Real-time order book broadcast server. Clients connect over WebSocket,
//! subscribe to topics, and receive every payload published to those topics.
//!
//! ## Features
//!
//! - **Topic subscriptions**: Plain-text `subscribe:<topic>` protocol
//! - **Fan-out**: Best-effort delivery isolated per subscriber
//! - **Publishing**: From in-process producers or `POST /api/v1/publish`
//! - **Market data**: Optional Deribit order book feed
//! - **Graceful shutdown**: Every connection is closed and unregistered
//!
//! ## Modules
//!
//! - [`websocket`]: Connection hub, subscription registry and frame protocol
//! - [`server`]: Listener lifecycle and shutdown coordination
//! - [`api`]: HTTP routes with Axum
//! - [`feed`]: Exchange order book sources and the poller
//! - [`config`]: TOML configuration with environment overrides
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bookcast::{BroadcastServer, ConnectionHub, ServerConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let hub = Arc::new(ConnectionHub::new());
//!     let server = BroadcastServer::bind(ServerConfig::new("127.0.0.1", 8080), Arc::clone(&hub)).await?;
//!
//!     // Producers publish through the shared hub
//!     let producer = Arc::clone(&hub);
//!     tokio::spawn(async move {
//!         producer.publish("BTC-PERPETUAL", r#"{"bids":[],"asks":[]}"#).await;
//!     });
//!
//!     server.run(bookcast::server::shutdown_signal()).await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod feed;
pub mod server;
pub mod websocket;

pub use api::{build_router, ApiError, AppState};

pub use config::{Config, ConfigError, ConfigSource, FeedConfig, LoggingConfig, ServerConfig};

pub use feed::{
    DeribitClient, DeribitConfig, FeedError, FeedPoller, OrderBookSnapshot, OrderBookSource,
    PriceLevel,
};

pub use server::{BroadcastServer, ServerError};

pub use websocket::{
    websocket_handler, ClientCommand, ConnectionHub, ConnectionId, HubError, PublishReport,
    ServerFrame, SubscriptionRegistry,
};
