//! Error types for map-state

use thiserror::Error;

/// Errors raised while connecting to or preparing the database
#[derive(Error, Debug)]
pub enum StateError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// Database query error
    #[error("Database query failed: {0}")]
    Query(String),

    /// Schema setup error
    #[error("Schema setup failed: {0}")]
    SchemaSetup(String),
}

impl From<surrealdb::Error> for StateError {
    fn from(err: surrealdb::Error) -> Self {
        StateError::Query(err.to_string())
    }
}

/// Errors returned by `MonitorStore` and `RateCounter` implementations
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("product not found: {product_id}")]
    ProductNotFound { product_id: String },

    #[error("listing not found: {listing_id}")]
    ListingNotFound { listing_id: String },

    /// A record failed validation before it reached the backend
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<surrealdb::Error> for StorageError {
    fn from(err: surrealdb::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}

impl From<redis::RedisError> for StorageError {
    fn from(err: redis::RedisError) -> Self {
        StorageError::Backend(format!("redis: {err}"))
    }
}
