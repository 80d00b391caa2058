//! SurrealDB-backed MonitorStore implementation
//!
//! Products and listings are keyed by their domain ids (`products:<id>`,
//! `listings:<id>`), so point lookups and last-write-wins updates go straight
//! to the record. Violations are keyed by their generated id.

use async_trait::async_trait;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, instrument};

use crate::handle;
use crate::schema::{ListingPatch, ListingRow, ProductRow, ViolationRow};
use crate::storage_traits::{
    Listing, ListingContext, ListingId, ListingUpdate, MonitorStore, Product, ProductId,
    StorageResult, Violation, ViolationStatus,
};
use crate::StorageError;

const PRODUCTS: &str = "products";
const LISTINGS: &str = "listings";
const VIOLATIONS: &str = "violations";

/// SurrealDB-backed implementation of [`MonitorStore`].
#[derive(Clone)]
pub struct SurrealMonitorStore {
    db: Surreal<Any>,
}

impl SurrealMonitorStore {
    /// Wrap an already-initialised connection.
    pub fn new(db: Surreal<Any>) -> Self {
        Self { db }
    }

    /// Create an in-memory instance for testing.
    pub async fn in_memory() -> crate::Result<Self> {
        Ok(Self::new(handle::connect_in_memory().await?))
    }

    /// Create from environment variables (see [`handle::connect_from_env`]).
    pub async fn from_env() -> crate::Result<Self> {
        Ok(Self::new(handle::connect_from_env().await?))
    }

    async fn fetch_listing(&self, id: &ListingId) -> StorageResult<Listing> {
        let row: Option<ListingRow> = self.db.select((LISTINGS, id.0.as_str())).await?;
        row.map(Listing::from)
            .ok_or_else(|| StorageError::ListingNotFound {
                listing_id: id.0.clone(),
            })
    }
}

#[async_trait]
impl MonitorStore for SurrealMonitorStore {
    #[instrument(skip(self), fields(product_id = %id))]
    async fn get_product(&self, id: &ProductId) -> StorageResult<Product> {
        let row: Option<ProductRow> = self.db.select((PRODUCTS, id.0.as_str())).await?;
        row.map(Product::from)
            .ok_or_else(|| StorageError::ProductNotFound {
                product_id: id.0.clone(),
            })
    }

    async fn listings_for_product(&self, id: &ProductId) -> StorageResult<Vec<Listing>> {
        let pid = id.0.clone();
        let mut res = self
            .db
            .query("SELECT * FROM listings WHERE product_id = $pid ORDER BY listing_id ASC")
            .bind(("pid", pid))
            .await?;

        let rows: Vec<ListingRow> = res.take(0)?;
        Ok(rows.into_iter().map(Listing::from).collect())
    }

    async fn update_listing(&self, id: &ListingId, update: &ListingUpdate) -> StorageResult<()> {
        debug!(listing_id = %id, price = update.price, "updating listing");

        let updated: Option<ListingRow> = self
            .db
            .update((LISTINGS, id.0.as_str()))
            .merge(ListingPatch::from(update))
            .await?;

        match updated {
            Some(_) => Ok(()),
            None => Err(StorageError::ListingNotFound {
                listing_id: id.0.clone(),
            }),
        }
    }

    async fn insert_violation(&self, violation: &Violation) -> StorageResult<()> {
        debug!(
            violation_id = %violation.id,
            listing_id = %violation.listing_id,
            "inserting violation"
        );

        let _created: Option<ViolationRow> = self
            .db
            .create((VIOLATIONS, violation.id.0.as_str()))
            .content(ViolationRow::from(violation))
            .await?;

        Ok(())
    }

    async fn listing_context(&self, id: &ListingId) -> StorageResult<ListingContext> {
        let listing = self.fetch_listing(id).await?;
        let product = self.get_product(&listing.product_id).await?;
        Ok(ListingContext { listing, product })
    }

    async fn put_product(&self, product: &Product) -> StorageResult<()> {
        if !product.map_price.is_finite() || product.map_price <= 0.0 {
            return Err(StorageError::InvalidRecord(format!(
                "MAP price must be a positive amount, got {}",
                product.map_price
            )));
        }

        let _stored: Option<ProductRow> = self
            .db
            .upsert((PRODUCTS, product.id.0.as_str()))
            .content(ProductRow::from(product))
            .await?;

        Ok(())
    }

    async fn put_listing(&self, listing: &Listing) -> StorageResult<()> {
        // Enforce the listing -> product relation before writing.
        self.get_product(&listing.product_id).await?;

        let _stored: Option<ListingRow> = self
            .db
            .upsert((LISTINGS, listing.id.0.as_str()))
            .content(ListingRow::from(listing))
            .await?;

        Ok(())
    }

    async fn list_violations(
        &self,
        status: Option<ViolationStatus>,
    ) -> StorageResult<Vec<Violation>> {
        let rows: Vec<ViolationRow> = if let Some(status) = status {
            let st = status.as_str().to_string();
            let mut res = self
                .db
                .query("SELECT * FROM violations WHERE status = $st ORDER BY detected_at DESC")
                .bind(("st", st))
                .await?;
            res.take(0)?
        } else {
            let mut res = self
                .db
                .query("SELECT * FROM violations ORDER BY detected_at DESC")
                .await?;
            res.take(0)?
        };

        rows.into_iter().map(Violation::try_from).collect()
    }
}
