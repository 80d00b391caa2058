//! MAP Monitor CLI
//!
//! The `map-monitor` command seeds reference data, runs one-shot scrapes and
//! inspects recorded violations.
//!
//! ## Commands
//!
//! - `init`: Connect to the store and create the schema
//! - `product add` / `listing add`: Seed products and retailer listings
//! - `scrape`: Run the pipeline once for a product
//! - `detect`: Classify a price against a MAP offline
//! - `violations`: List recorded violations, newest first

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use map_monitor_core::telemetry::init_tracing;
use map_monitor_core::{build_pipeline, detect, MonitorConfig, CRITICAL_THRESHOLD_PCT};
use map_state::{
    Listing, MonitorStore, Product, ProductId, RedisRateCounter, SurrealMonitorStore, Violation,
    ViolationStatus,
};
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "map-monitor")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Minimum advertised price monitor", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the store and initialise the schema
    Init,

    /// Manage tracked products
    Product {
        #[command(subcommand)]
        action: ProductAction,
    },

    /// Manage retailer listings
    Listing {
        #[command(subcommand)]
        action: ListingAction,
    },

    /// Run the scrape pipeline once for a product
    Scrape {
        /// Product identifier
        product_id: String,
    },

    /// Classify an observed price against a MAP without touching storage
    Detect {
        /// Observed listing price
        #[arg(long)]
        price: f64,

        /// Minimum advertised price
        #[arg(long)]
        map: f64,
    },

    /// List recorded violations (newest first)
    Violations {
        /// Only show violations with this status
        #[arg(long, value_enum)]
        status: Option<StatusArg>,

        /// Print as JSON
        #[arg(long = "as-json")]
        as_json: bool,
    },
}

#[derive(Subcommand)]
enum ProductAction {
    /// Add or replace a product
    Add {
        #[arg(long)]
        id: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        brand: String,
        /// Minimum advertised price (must be > 0)
        #[arg(long)]
        map_price: f64,
        #[arg(long, default_value = "uncategorized")]
        category: String,
    },
}

#[derive(Subcommand)]
enum ListingAction {
    /// Add or replace a listing for an existing product
    Add {
        #[arg(long)]
        id: String,
        #[arg(long)]
        product: String,
        /// Retailer domain, e.g. shop.example.com
        #[arg(long)]
        domain: String,
        #[arg(long)]
        url: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum StatusArg {
    Active,
    Resolved,
}

impl From<StatusArg> for ViolationStatus {
    fn from(s: StatusArg) -> Self {
        match s {
            StatusArg::Active => ViolationStatus::Active,
            StatusArg::Resolved => ViolationStatus::Resolved,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };
    init_tracing(cli.json, level);

    // Offline command: no store needed
    if let Commands::Detect { price, map } = cli.command {
        println!("{}", render_detection(price, map));
        return Ok(());
    }

    let store = SurrealMonitorStore::from_env()
        .await
        .context("Failed to connect to MAP Monitor database")?;

    match cli.command {
        Commands::Init => cmd_init(),
        Commands::Product { action } => match action {
            ProductAction::Add {
                id,
                name,
                brand,
                map_price,
                category,
            } => cmd_product_add(&store, &id, &name, &brand, map_price, &category).await,
        },
        Commands::Listing { action } => match action {
            ListingAction::Add {
                id,
                product,
                domain,
                url,
            } => cmd_listing_add(&store, &id, &product, &domain, &url).await,
        },
        Commands::Scrape { product_id } => cmd_scrape(store, &product_id).await,
        Commands::Violations { status, as_json } => {
            cmd_violations(&store, status.map(Into::into), as_json).await
        }
        Commands::Detect { .. } => Ok(()),
    }
}

/// Schema creation happens on connect; just report success.
fn cmd_init() -> Result<()> {
    println!("MAP Monitor store initialised");
    Ok(())
}

async fn cmd_product_add(
    store: &dyn MonitorStore,
    id: &str,
    name: &str,
    brand: &str,
    map_price: f64,
    category: &str,
) -> Result<()> {
    let product = Product::new(id, name, brand, map_price, category)
        .context("Invalid product")?;
    store
        .put_product(&product)
        .await
        .with_context(|| format!("Failed to save product '{id}'"))?;

    println!("Saved product {} ({} {}) MAP ${:.2}", id, brand, name, map_price);
    Ok(())
}

async fn cmd_listing_add(
    store: &dyn MonitorStore,
    id: &str,
    product: &str,
    domain: &str,
    url: &str,
) -> Result<()> {
    let listing = Listing::new(id, &ProductId::from(product), domain, url);
    store
        .put_listing(&listing)
        .await
        .with_context(|| format!("Failed to save listing '{id}'"))?;

    println!("Saved listing {} for product {} -> {}", id, product, url);
    Ok(())
}

async fn cmd_scrape(store: SurrealMonitorStore, product_id: &str) -> Result<()> {
    let config = MonitorConfig::from_env().context("Invalid configuration")?;
    let counter = RedisRateCounter::open(&config.redis_url).context("Failed to open Redis client")?;
    let pipeline = build_pipeline(&config, Arc::new(store), Arc::new(counter))?;

    info!(product_id = %product_id, "running one-shot scrape");
    let outcome = pipeline
        .run(&ProductId::from(product_id))
        .await
        .with_context(|| format!("Scrape failed for product '{product_id}'"))?;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

async fn cmd_violations(
    store: &dyn MonitorStore,
    status: Option<ViolationStatus>,
    as_json: bool,
) -> Result<()> {
    let violations = store.list_violations(status).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&violations)?);
        return Ok(());
    }
    if violations.is_empty() {
        println!("No violations recorded.");
        return Ok(());
    }
    for v in &violations {
        println!("{}", format_violation_row(v));
    }
    Ok(())
}

fn format_violation_row(v: &Violation) -> String {
    format!(
        "{}  {:<8}  {:<8}  -${:.2}  {:>5.1}%  {}",
        v.detected_at.format("%Y-%m-%d %H:%M:%S"),
        v.severity.as_str(),
        v.status.as_str(),
        v.price_difference,
        v.confidence * 100.0,
        v.listing_id
    )
}

fn render_detection(price: f64, map: f64) -> String {
    match detect(price, map) {
        None if map <= 0.0 || !map.is_finite() => {
            format!("MAP must be a positive amount, got {map}")
        }
        None => format!("No violation: ${price:.2} is at or above MAP ${map:.2}"),
        Some(v) => format!(
            "{} violation: ${:.2} below MAP ({:.1}% shortfall, critical at {:.0}%)",
            v.severity,
            v.price_difference,
            v.price_difference * 100.0 / map,
            CRITICAL_THRESHOLD_PCT
        ),
    }
}
