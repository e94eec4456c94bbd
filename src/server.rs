//! Broadcast Server
//!
//! Binds the listening socket, accepts connections and upgrades them to
//! WebSocket through the router, and coordinates shutdown so that no
//! connection is left registered when [`BroadcastServer::run`] returns.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;

use crate::api::{build_router, AppState};
use crate::config::ServerConfig;
use crate::websocket::ConnectionHub;

/// Errors that stop the server
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A bound, not yet running broadcast server
pub struct BroadcastServer {
    listener: TcpListener,
    state: AppState,
}

impl BroadcastServer {
    /// Bind the configured address. Port 0 picks a free port.
    pub async fn bind(config: ServerConfig, hub: Arc<ConnectionHub>) -> Result<Self, ServerError> {
        let addr = config.addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;

        Ok(Self {
            listener,
            state: AppState::new(hub, config),
        })
    }

    /// Address the server is listening on
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn hub(&self) -> Arc<ConnectionHub> {
        Arc::clone(&self.state.hub)
    }

    /// Accept connections until `signal` resolves, then close every live
    /// connection and wait for their handlers to clean up.
    pub async fn run<F>(self, signal: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.local_addr()?;
        let hub = Arc::clone(&self.state.hub);
        let drain_timeout = Duration::from_secs(self.state.config.shutdown_timeout_secs);
        let router = build_router(self.state);

        tracing::info!("Bookcast listening on {}", addr);

        let hub_for_signal = Arc::clone(&hub);
        axum::serve(
            self.listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            signal.await;
            hub_for_signal.shutdown();
        })
        .await?;

        // Upgraded connections outlive the HTTP server; wait for their handlers
        if tokio::time::timeout(drain_timeout, hub.drained()).await.is_err() {
            let remaining = hub.connection_count().await;
            tracing::warn!(
                remaining,
                "Connections still open after shutdown timeout, forcing cleanup"
            );
            hub.close_all().await;
        }

        tracing::info!("Bookcast shut down gracefully");
        Ok(())
    }
}

/// Wait for Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
