//! In-memory fakes for storage traits (testing and single-process use)
//!
//! Provides `MemoryMonitorStore` and `MemoryRateCounter` that satisfy the
//! trait contracts without any external dependencies.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::error::StorageError;
use crate::storage_traits::*;

fn lock<T>(mutex: &Mutex<T>) -> StorageResult<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| StorageError::Backend("in-memory store lock poisoned".to_string()))
}

// ---------------------------------------------------------------------------
// MemoryMonitorStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Tables {
    products: HashMap<String, Product>,
    listings: HashMap<String, Listing>,
    /// Insertion order, oldest first
    violations: Vec<Violation>,
}

/// In-memory product/listing/violation store.
///
/// Listing updates and violation inserts can be made to fail on demand so
/// callers can exercise their persistence-failure paths.
#[derive(Debug, Default)]
pub struct MemoryMonitorStore {
    tables: Mutex<Tables>,
    failing_updates: Mutex<HashSet<String>>,
    failing_inserts: Mutex<HashSet<String>>,
}

impl MemoryMonitorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `update_listing` call for `id` fail with a backend error.
    pub fn fail_updates_for(&self, id: &ListingId) {
        if let Ok(mut set) = self.failing_updates.lock() {
            set.insert(id.0.clone());
        }
    }

    /// Make every `insert_violation` call for listing `id` fail.
    pub fn fail_violation_inserts_for(&self, id: &ListingId) {
        if let Ok(mut set) = self.failing_inserts.lock() {
            set.insert(id.0.clone());
        }
    }

    /// Current state of a listing, if present.
    pub fn listing(&self, id: &ListingId) -> Option<Listing> {
        self.tables
            .lock()
            .ok()
            .and_then(|t| t.listings.get(&id.0).cloned())
    }

    /// Every violation inserted so far, oldest first.
    pub fn violations(&self) -> Vec<Violation> {
        self.tables
            .lock()
            .map(|t| t.violations.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl MonitorStore for MemoryMonitorStore {
    async fn get_product(&self, id: &ProductId) -> StorageResult<Product> {
        let tables = lock(&self.tables)?;
        tables
            .products
            .get(&id.0)
            .cloned()
            .ok_or_else(|| StorageError::ProductNotFound {
                product_id: id.0.clone(),
            })
    }

    async fn listings_for_product(&self, id: &ProductId) -> StorageResult<Vec<Listing>> {
        let tables = lock(&self.tables)?;
        let mut listings: Vec<Listing> = tables
            .listings
            .values()
            .filter(|l| l.product_id == *id)
            .cloned()
            .collect();
        listings.sort_by(|a, b| a.id.0.cmp(&b.id.0));
        Ok(listings)
    }

    async fn update_listing(&self, id: &ListingId, update: &ListingUpdate) -> StorageResult<()> {
        if lock(&self.failing_updates)?.contains(&id.0) {
            return Err(StorageError::Backend(format!(
                "injected update failure for listing {id}"
            )));
        }
        let mut tables = lock(&self.tables)?;
        let listing = tables
            .listings
            .get_mut(&id.0)
            .ok_or_else(|| StorageError::ListingNotFound {
                listing_id: id.0.clone(),
            })?;
        *listing = listing.with_update(update);
        Ok(())
    }

    async fn insert_violation(&self, violation: &Violation) -> StorageResult<()> {
        if lock(&self.failing_inserts)?.contains(&violation.listing_id.0) {
            return Err(StorageError::Backend(format!(
                "injected insert failure for listing {}",
                violation.listing_id
            )));
        }
        let mut tables = lock(&self.tables)?;
        tables.violations.push(violation.clone());
        Ok(())
    }

    async fn listing_context(&self, id: &ListingId) -> StorageResult<ListingContext> {
        let tables = lock(&self.tables)?;
        let listing = tables
            .listings
            .get(&id.0)
            .cloned()
            .ok_or_else(|| StorageError::ListingNotFound {
                listing_id: id.0.clone(),
            })?;
        let product = tables
            .products
            .get(&listing.product_id.0)
            .cloned()
            .ok_or_else(|| StorageError::ProductNotFound {
                product_id: listing.product_id.0.clone(),
            })?;
        Ok(ListingContext { listing, product })
    }

    async fn put_product(&self, product: &Product) -> StorageResult<()> {
        let mut tables = lock(&self.tables)?;
        tables
            .products
            .insert(product.id.0.clone(), product.clone());
        Ok(())
    }

    async fn put_listing(&self, listing: &Listing) -> StorageResult<()> {
        let mut tables = lock(&self.tables)?;
        if !tables.products.contains_key(&listing.product_id.0) {
            return Err(StorageError::ProductNotFound {
                product_id: listing.product_id.0.clone(),
            });
        }
        tables
            .listings
            .insert(listing.id.0.clone(), listing.clone());
        Ok(())
    }

    async fn list_violations(
        &self,
        status: Option<ViolationStatus>,
    ) -> StorageResult<Vec<Violation>> {
        let tables = lock(&self.tables)?;
        let mut violations: Vec<Violation> = tables
            .violations
            .iter()
            .filter(|v| status.map(|s| v.status == s).unwrap_or(true))
            .cloned()
            .collect();
        violations.reverse(); // newest first
        Ok(violations)
    }
}

// ---------------------------------------------------------------------------
// MemoryRateCounter
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Window {
    count: u64,
    expires_at: Instant,
}

/// In-memory counter store with per-key expiry.
///
/// Uses `tokio::time::Instant`, so tests can drive expiry with a paused
/// clock. Only shared within one process.
#[derive(Debug, Default)]
pub struct MemoryRateCounter {
    windows: Mutex<HashMap<String, Window>>,
}

impl MemoryRateCounter {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateCounter for MemoryRateCounter {
    async fn incr_with_expiry(&self, key: &str, window: Duration) -> StorageResult<u64> {
        let now = Instant::now();
        let mut windows = lock(&self.windows)?;
        if windows
            .get(key)
            .map(|w| now >= w.expires_at)
            .unwrap_or(false)
        {
            windows.remove(key);
        }
        let entry = windows.entry(key.to_string()).or_insert(Window {
            count: 0,
            expires_at: now + window,
        });
        entry.count += 1;
        Ok(entry.count)
    }
}
