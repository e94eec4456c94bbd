//! Bookcast Server
//!
//! Run with: cargo run -- serve
//!
//! # Configuration
//!
//! Settings are read from `--config <path>` or the default locations
//! (`~/.config/bookcast/config.toml`, `/etc/bookcast/config.toml`,
//! `./bookcast.toml`), then overridden by `BOOKCAST_*` environment variables.
//! `RUST_LOG` takes precedence over the configured log level.

use bookcast::config::{generate_default_config, Config, ConfigSource, LoggingConfig};
use bookcast::feed::{DeribitClient, DeribitConfig, FeedPoller};
use bookcast::server::{shutdown_signal, BroadcastServer};
use bookcast::websocket::ConnectionHub;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "bookcast")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Real-time order book broadcast server")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the broadcast server (default)
    Serve {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
        /// Disable the order book feed
        #[arg(long)]
        no_feed: bool,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let command = cli.command.unwrap_or(Commands::Serve {
        host: None,
        port: None,
        no_feed: false,
    });

    match command {
        Commands::Config { output } => {
            let config = generate_default_config();

            match output {
                Some(path) => {
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(&path, &config)?;
                    println!("Config written to {:?}", path);
                }
                None => {
                    print!("{}", config);
                }
            }
        }

        Commands::Serve {
            host,
            port,
            no_feed,
        } => {
            let (mut config, source) = match &cli.config {
                Some(path) => (
                    Config::load_with_env(path)?,
                    ConfigSource::File(path.clone()),
                ),
                None => Config::load_default(),
            };

            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if no_feed {
                config.feed.enabled = false;
            }

            init_tracing(&config.logging);
            source.log();
            serve(config).await?;
        }
    }

    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("bookcast={},tower_http=info", logging.level).into());

    let json = logging.format.eq_ignore_ascii_case("json");

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .init();
}

async fn serve(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!("Starting Bookcast v{}", env!("CARGO_PKG_VERSION"));

    let hub = Arc::new(ConnectionHub::new());
    let server = BroadcastServer::bind(config.server.clone(), Arc::clone(&hub)).await?;

    let poller = if config.feed.enabled {
        let client = DeribitClient::new(DeribitConfig::from(&config.feed))?;
        tracing::info!("Order book feed enabled: {}", client.config().base_url);

        if config.feed.client_id.is_some() {
            match client.authenticate().await {
                Ok(()) => tracing::info!("Feed credentials verified"),
                Err(e) => tracing::warn!("Feed authentication failed: {} (using public access)", e),
            }
        }

        Some(FeedPoller::from_config(Arc::new(client), Arc::clone(&hub), &config.feed).start())
    } else {
        tracing::info!("Order book feed disabled (set BOOKCAST_FEED_URL or [feed] enabled = true)");
        None
    };

    server.run(shutdown_signal()).await?;

    if let Some(handle) = poller {
        if let Err(e) = handle.await {
            tracing::warn!("Feed poller ended abnormally: {}", e);
        }
    }

    tracing::info!("Bookcast stopped");
    Ok(())
}
