//! Row types for the MAP Monitor SurrealDB tables
//!
//! Tables:
//! - products: tracked products and their MAP
//! - listings: retailer pages per product
//! - violations: below-MAP observations
//!
//! Rows are converted to/from the `storage_traits` records at the boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::storage_traits::{
    Listing, ListingId, ListingUpdate, Product, ProductId, Violation, ViolationId,
};

/// Module for serializing chrono DateTime to SurrealDB datetime format
mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let sd = SurrealDatetime::from(*date);
        serde::Serialize::serialize(&sd, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}

/// Module for serializing optional chrono DateTime to SurrealDB datetime format
mod surreal_datetime_opt {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match date {
            Some(d) => {
                let sd = SurrealDatetime::from(*d);
                serde::Serialize::serialize(&Some(sd), serializer)
            }
            None => serde::Serialize::serialize(&None::<SurrealDatetime>, serializer),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = Option::<SurrealDatetime>::deserialize(deserializer)?;
        Ok(sd.map(DateTime::from))
    }
}

// ---------------------------------------------------------------------------
// products
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ProductRow {
    /// SurrealDB record ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub product_id: String,
    pub name: String,
    pub brand: String,
    pub map_price: f64,
    pub category: String,
}

impl From<&Product> for ProductRow {
    fn from(p: &Product) -> Self {
        ProductRow {
            id: None,
            product_id: p.id.0.clone(),
            name: p.name.clone(),
            brand: p.brand.clone(),
            map_price: p.map_price,
            category: p.category.clone(),
        }
    }
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product {
            id: ProductId(row.product_id),
            name: row.name,
            brand: row.brand,
            map_price: row.map_price,
            category: row.category,
        }
    }
}

// ---------------------------------------------------------------------------
// listings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ListingRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub listing_id: String,
    pub product_id: String,
    pub retailer_domain: String,
    pub url: String,
    #[serde(default)]
    pub last_price: Option<f64>,
    #[serde(default, with = "surreal_datetime_opt")]
    pub last_scraped: Option<DateTime<Utc>>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub anomalies: Option<Vec<String>>,
}

impl From<&Listing> for ListingRow {
    fn from(l: &Listing) -> Self {
        ListingRow {
            id: None,
            listing_id: l.id.0.clone(),
            product_id: l.product_id.0.clone(),
            retailer_domain: l.retailer_domain.clone(),
            url: l.url.clone(),
            last_price: l.last_price,
            last_scraped: l.last_scraped,
            confidence: l.confidence,
            anomalies: l.anomalies.clone(),
        }
    }
}

impl From<ListingRow> for Listing {
    fn from(row: ListingRow) -> Self {
        Listing {
            id: ListingId(row.listing_id),
            product_id: ProductId(row.product_id),
            retailer_domain: row.retailer_domain,
            url: row.url,
            last_price: row.last_price,
            last_scraped: row.last_scraped,
            confidence: row.confidence,
            anomalies: row.anomalies,
        }
    }
}

/// Partial document merged into a listing after a scrape
#[derive(Debug, Clone, Serialize)]
pub(crate) struct ListingPatch {
    pub last_price: f64,
    #[serde(with = "surreal_datetime")]
    pub last_scraped: DateTime<Utc>,
    pub confidence: f64,
    pub anomalies: Option<Vec<String>>,
}

impl From<&ListingUpdate> for ListingPatch {
    fn from(u: &ListingUpdate) -> Self {
        ListingPatch {
            last_price: u.price,
            last_scraped: u.scraped_at,
            confidence: u.confidence,
            anomalies: u.anomalies.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// violations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ViolationRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<surrealdb::sql::Thing>,
    pub violation_id: String,
    pub listing_id: String,
    pub price_difference: f64,
    #[serde(with = "surreal_datetime")]
    pub detected_at: DateTime<Utc>,
    /// "ACTIVE" | "RESOLVED"
    pub status: String,
    /// "CRITICAL" | "MINOR"
    pub severity: String,
    pub confidence: f64,
    #[serde(default)]
    pub anomalies: Option<Vec<String>>,
}

impl From<&Violation> for ViolationRow {
    fn from(v: &Violation) -> Self {
        ViolationRow {
            id: None,
            violation_id: v.id.0.clone(),
            listing_id: v.listing_id.0.clone(),
            price_difference: v.price_difference,
            detected_at: v.detected_at,
            status: v.status.as_str().to_string(),
            severity: v.severity.as_str().to_string(),
            confidence: v.confidence,
            anomalies: v.anomalies.clone(),
        }
    }
}

impl TryFrom<ViolationRow> for Violation {
    type Error = StorageError;

    fn try_from(row: ViolationRow) -> Result<Self, Self::Error> {
        Ok(Violation {
            id: ViolationId(row.violation_id),
            listing_id: ListingId(row.listing_id),
            price_difference: row.price_difference,
            detected_at: row.detected_at,
            status: row.status.parse()?,
            severity: row.severity.parse()?,
            confidence: row.confidence,
            anomalies: row.anomalies,
        })
    }
}
