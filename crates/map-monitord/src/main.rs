//! MAP Monitor service
//!
//! Loads configuration from the environment (and `.env`), connects the
//! SurrealDB store and the Redis rate counter, then serves the HTTP trigger.

mod server;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use map_monitor_core::telemetry::init_tracing;
use map_monitor_core::{build_pipeline, MonitorConfig};
use map_state::{RedisRateCounter, SurrealMonitorStore};
use tokio::net::TcpListener;
use tracing::{info, Level};

use crate::server::AppState;

#[derive(Parser)]
#[command(name = "map-monitord")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "MAP Monitor scrape trigger service", long_about = None)]
struct Args {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, env = "LOG_JSON")]
    json: bool,

    /// Bind address (port comes from PORT)
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_tracing(args.json, if args.verbose { Level::DEBUG } else { Level::INFO });

    let config = MonitorConfig::from_env().context("invalid configuration")?;

    let store = SurrealMonitorStore::from_env()
        .await
        .context("failed to connect to SurrealDB")?;
    let counter =
        RedisRateCounter::open(&config.redis_url).context("failed to open Redis client")?;
    let pipeline = build_pipeline(&config, Arc::new(store), Arc::new(counter))
        .context("failed to build scrape pipeline")?;

    let addr = format!("{}:{}", args.host, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!(environment = ?config.environment, "map-monitord starting");
    let state = AppState {
        pipeline: Arc::new(pipeline),
        environment: config.environment,
    };
    server::serve(listener, state, async {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received");
    })
    .await
}
