//! SurrealDB schema initialization
//!
//! Defines the `products`, `listings` and `violations` tables with their
//! lookup indexes. Every statement uses `IF NOT EXISTS`, so running
//! `init_schema` on an already-initialised database is a no-op.

use crate::error::StateError;
use crate::Result;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

/// Initialize all MAP Monitor tables.
pub async fn init_schema(db: &Surreal<Any>) -> Result<()> {
    info!("Initializing MAP Monitor schema");

    init_products_table(db).await?;
    init_listings_table(db).await?;
    init_violations_table(db).await?;

    info!("MAP Monitor schema initialization complete");
    Ok(())
}

/// Initialize `products` table
///
/// Schema:
/// ```text
/// TABLE products {
///   product_id:  STRING (unique, also the record key)
///   name:        STRING
///   brand:       STRING
///   map_price:   FLOAT (> 0, validated before insert)
///   category:    STRING
/// }
/// ```
async fn init_products_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing products table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS products SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_product_id ON TABLE products COLUMNS product_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_brand ON TABLE products COLUMNS brand;
    "#;

    run(db, sql).await?;
    info!("✓ products table initialized");
    Ok(())
}

/// Initialize `listings` table
///
/// Schema:
/// ```text
/// TABLE listings {
///   listing_id:       STRING (unique, also the record key)
///   product_id:       STRING (indexed, many-to-one)
///   retailer_domain:  STRING
///   url:              STRING
///   last_price:       FLOAT?
///   last_scraped:     DATETIME?
///   confidence:       FLOAT?
///   anomalies:        ARRAY<STRING>?
/// }
/// ```
///
/// Observation fields are last-write-wins.
async fn init_listings_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing listings table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS listings SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_listing_id ON TABLE listings COLUMNS listing_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_listing_product ON TABLE listings COLUMNS product_id;
    "#;

    run(db, sql).await?;
    info!("✓ listings table initialized");
    Ok(())
}

/// Initialize `violations` table
///
/// Schema:
/// ```text
/// TABLE violations {
///   violation_id:      STRING (unique)
///   listing_id:        STRING (indexed)
///   price_difference:  FLOAT
///   detected_at:       DATETIME
///   status:            STRING (ACTIVE | RESOLVED)
///   severity:          STRING (CRITICAL | MINOR)
///   confidence:        FLOAT
///   anomalies:         ARRAY<STRING>?
/// }
/// ```
async fn init_violations_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing violations table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS violations SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_violation_id ON TABLE violations COLUMNS violation_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_violation_listing ON TABLE violations COLUMNS listing_id;
        DEFINE INDEX IF NOT EXISTS idx_violation_status ON TABLE violations COLUMNS status, detected_at;
    "#;

    run(db, sql).await?;
    info!("✓ violations table initialized");
    Ok(())
}

async fn run(db: &Surreal<Any>, sql: &str) -> Result<()> {
    db.query(sql)
        .await
        .map_err(|e| StateError::SchemaSetup(e.to_string()))?
        .check()
        .map_err(|e| StateError::SchemaSetup(e.to_string()))?;
    Ok(())
}
