//! Error types for the MAP Monitor core.
//!
//! Each adapter has its own error enum. Only [`PipelineError`] surfaces from a
//! scrape run; the rest are isolated per listing or per channel and logged.

use map_state::{StateError, StorageError};

/// Failure fetching a listing page from the scraping provider.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("fetch request failed: {0}")]
    Transport(String),

    #[error("fetch timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("scraping provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed scraping provider response: {0}")]
    Decode(String),

    #[error("scraper client configuration error: {0}")]
    Config(String),
}

/// Transport-level failure talking to the completion provider.
#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("completion request failed: {0}")]
    Transport(String),

    #[error("completion provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("completion response carried no choices")]
    EmptyResponse,

    #[error("malformed completion response: {0}")]
    Decode(String),

    #[error("completion client configuration error: {0}")]
    Config(String),
}

/// AI extraction failure. Malformed model output never produces one of these.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("AI analysis failed: {0}")]
    Completion(#[from] CompletionError),
}

/// A single notification channel failed to deliver.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("{channel} delivery failed: {detail}")]
    Transport { channel: String, detail: String },

    #[error("{channel} endpoint returned {status}")]
    Status { channel: String, status: u16 },

    #[error("{channel} client configuration error: {detail}")]
    Config { channel: String, detail: String },
}

/// Invalid or incomplete environment configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variables: {}", .0.join(", "))]
    MissingVar(Vec<String>),

    #[error("invalid value {value:?} for {var}: {reason}")]
    Invalid {
        var: String,
        value: String,
        reason: String,
    },
}

/// Run-level failures of a scrape pipeline run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("rate limit exceeded for product {product_id}")]
    RateLimitExceeded { product_id: String },

    #[error("product not found: {product_id}")]
    ProductNotFound { product_id: String },

    #[error("storage error: {0}")]
    Storage(StorageError),
}

impl From<StorageError> for PipelineError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::ProductNotFound { product_id } => {
                PipelineError::ProductNotFound { product_id }
            }
            other => PipelineError::Storage(other),
        }
    }
}

/// Umbrella error for process entry points.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("state initialisation failed: {0}")]
    State(#[from] StateError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Completion(#[from] CompletionError),

    #[error(transparent)]
    Notify(#[from] NotifyError),
}

/// Result type for entry-point operations.
pub type Result<T> = std::result::Result<T, MonitorError>;
