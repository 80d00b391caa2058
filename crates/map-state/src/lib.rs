//! MAP-State: persistence backend for MAP Monitor
//!
//! This crate owns every piece of shared state the scrape pipeline touches:
//! the product/listing/violation tables and the per-product request counter
//! used for rate limiting.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: point lookups, last-write-wins listing updates, append-only
//! violation inserts, and atomic increment-with-expiry counters.
//!
//! ## Key Components
//!
//! - `MonitorStore`: product/listing/violation storage contract
//! - `RateCounter`: shared counter with atomic increment-with-expiry
//! - `SurrealMonitorStore`: SurrealDB implementation of `MonitorStore`
//! - `RedisRateCounter`: Redis implementation of `RateCounter`
//! - `fakes`: in-memory implementations of both traits

mod error;
pub mod fakes;
mod handle;
mod migrations;
mod redis_counter;
mod schema;
pub mod storage_traits;
pub mod surreal_store;

pub use error::{StateError, StorageError};
pub use handle::{connect_from_env, connect_in_memory, CloudConfig};
pub use migrations::init_schema;
pub use redis_counter::RedisRateCounter;
pub use storage_traits::{
    Listing, ListingContext, ListingId, ListingUpdate, MonitorStore, Product, ProductId,
    RateCounter, Severity, StorageResult, Violation, ViolationId, ViolationStatus,
};
pub use surreal_store::SurrealMonitorStore;

/// Result type for connection and schema operations
pub type Result<T> = std::result::Result<T, StateError>;
