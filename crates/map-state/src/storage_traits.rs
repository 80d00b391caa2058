//! Storage trait definitions for MAP Monitor
//!
//! These traits define the shared state the scrape pipeline depends on:
//! - `MonitorStore`: products, listings and violations
//! - `RateCounter`: per-key counters with atomic increment-with-expiry
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Identifier of a tracked product
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductId(pub String);

impl ProductId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProductId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ProductId {
    fn from(s: &str) -> Self {
        ProductId(s.to_string())
    }
}

/// Identifier of a retailer listing
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListingId(pub String);

impl ListingId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ListingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ListingId {
    fn from(s: &str) -> Self {
        ListingId(s.to_string())
    }
}

/// Identifier of a recorded violation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ViolationId(pub String);

impl ViolationId {
    /// Generate a new random ViolationId
    pub fn new() -> Self {
        ViolationId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ViolationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ViolationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A tracked product and its minimum advertised price.
///
/// Reference data: the scrape pipeline only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub brand: String,
    /// Minimum advertised price; always finite and > 0 when built via `new`
    pub map_price: f64,
    pub category: String,
}

impl Product {
    /// Build a product, rejecting MAP prices that are not strictly positive.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        brand: impl Into<String>,
        map_price: f64,
        category: impl Into<String>,
    ) -> StorageResult<Self> {
        if !map_price.is_finite() || map_price <= 0.0 {
            return Err(StorageError::InvalidRecord(format!(
                "MAP price must be a positive amount, got {map_price}"
            )));
        }
        Ok(Product {
            id: ProductId(id.into()),
            name: name.into(),
            brand: brand.into(),
            map_price,
            category: category.into(),
        })
    }
}

/// A retailer's page for a tracked product.
///
/// The observation fields stay `None` until the first successful scrape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: ListingId,
    pub product_id: ProductId,
    pub retailer_domain: String,
    pub url: String,
    pub last_price: Option<f64>,
    pub last_scraped: Option<DateTime<Utc>>,
    pub confidence: Option<f64>,
    pub anomalies: Option<Vec<String>>,
}

impl Listing {
    /// A listing that has never been scraped.
    pub fn new(
        id: impl Into<String>,
        product_id: &ProductId,
        retailer_domain: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Listing {
            id: ListingId(id.into()),
            product_id: product_id.clone(),
            retailer_domain: retailer_domain.into(),
            url: url.into(),
            last_price: None,
            last_scraped: None,
            confidence: None,
            anomalies: None,
        }
    }

    /// Return a copy with the observation fields replaced by `update`.
    pub fn with_update(&self, update: &ListingUpdate) -> Self {
        Listing {
            last_price: Some(update.price),
            last_scraped: Some(update.scraped_at),
            confidence: Some(update.confidence),
            anomalies: update.anomalies.clone(),
            ..self.clone()
        }
    }
}

/// Fields written back to a listing after a successful scrape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingUpdate {
    pub price: f64,
    pub scraped_at: DateTime<Utc>,
    pub confidence: f64,
    pub anomalies: Option<Vec<String>>,
}

/// Lifecycle of a violation. Only `Active` is ever written by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationStatus {
    Active,
    Resolved,
}

impl ViolationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationStatus::Active => "ACTIVE",
            ViolationStatus::Resolved => "RESOLVED",
        }
    }
}

impl std::fmt::Display for ViolationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ViolationStatus {
    type Err = StorageError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ACTIVE" => Ok(ViolationStatus::Active),
            "RESOLVED" => Ok(ViolationStatus::Resolved),
            other => Err(StorageError::InvalidRecord(format!(
                "unknown violation status: {other}"
            ))),
        }
    }
}

/// How far below MAP a listing was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    /// Shortfall of at least 15% below MAP
    Critical,
    Minor,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "CRITICAL",
            Severity::Minor => "MINOR",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = StorageError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CRITICAL" => Ok(Severity::Critical),
            "MINOR" => Ok(Severity::Minor),
            other => Err(StorageError::InvalidRecord(format!(
                "unknown severity: {other}"
            ))),
        }
    }
}

/// A recorded instance of a listing priced below MAP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub id: ViolationId,
    pub listing_id: ListingId,
    /// MAP minus observed price; always > 0 for a stored violation
    pub price_difference: f64,
    pub detected_at: DateTime<Utc>,
    pub status: ViolationStatus,
    pub severity: Severity,
    /// Extraction confidence copied from the listing snapshot (0.0 - 1.0)
    pub confidence: f64,
    pub anomalies: Option<Vec<String>>,
}

/// Listing joined with its owning product, used to format notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingContext {
    pub listing: Listing,
    pub product: Product,
}

// ---------------------------------------------------------------------------
// MonitorStore: products, listings, violations
// ---------------------------------------------------------------------------

/// Product/listing/violation storage.
///
/// Guarantees:
/// - `get_product` returns `StorageError::ProductNotFound` for unknown ids.
/// - `update_listing` is last-write-wins; it never creates a listing.
/// - `insert_violation` is append-only.
#[async_trait]
pub trait MonitorStore: Send + Sync {
    /// Point lookup of a product.
    async fn get_product(&self, id: &ProductId) -> StorageResult<Product>;

    /// All listings owned by a product (empty if none).
    async fn listings_for_product(&self, id: &ProductId) -> StorageResult<Vec<Listing>>;

    /// Overwrite a listing's observation fields.
    async fn update_listing(&self, id: &ListingId, update: &ListingUpdate) -> StorageResult<()>;

    /// Record a new violation.
    async fn insert_violation(&self, violation: &Violation) -> StorageResult<()>;

    /// Join a listing with its product.
    async fn listing_context(&self, id: &ListingId) -> StorageResult<ListingContext>;

    /// Create or replace a product.
    async fn put_product(&self, product: &Product) -> StorageResult<()>;

    /// Create or replace a listing. Fails if the owning product is unknown.
    async fn put_listing(&self, listing: &Listing) -> StorageResult<()>;

    /// Violations newest first, optionally filtered by status.
    async fn list_violations(
        &self,
        status: Option<ViolationStatus>,
    ) -> StorageResult<Vec<Violation>>;
}

// ---------------------------------------------------------------------------
// RateCounter: shared request counters
// ---------------------------------------------------------------------------

/// Counter store shared by every process running the pipeline.
///
/// `incr_with_expiry` increments `key` and, when the increment created the
/// key (count == 1), arms an expiry of `window`. Both steps happen atomically
/// so concurrent callers never observe a counter without an expiry.
#[async_trait]
pub trait RateCounter: Send + Sync {
    /// Increment `key` and return the post-increment count.
    async fn incr_with_expiry(&self, key: &str, window: Duration) -> StorageResult<u64>;
}
