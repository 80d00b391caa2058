//! Per-product admission throttle.
//!
//! Fixed-window counter: the first admission in a window arms its expiry and
//! later admissions do not extend it. This approximates a sliding window and
//! can admit up to twice the limit across a window boundary.

use std::sync::Arc;
use std::time::Duration;

use map_state::{ProductId, RateCounter, StorageResult};
use tracing::debug;

/// Admissions allowed per window per product.
pub const DEFAULT_MAX_REQUESTS: u64 = 10;

/// Window length.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub max_requests: u64,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_MAX_REQUESTS,
            window: DEFAULT_WINDOW,
        }
    }
}

/// Gate in front of every pipeline run, backed by a shared [`RateCounter`].
#[derive(Clone)]
pub struct RateLimiter {
    counter: Arc<dyn RateCounter>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(counter: Arc<dyn RateCounter>, config: RateLimitConfig) -> Self {
        Self { counter, config }
    }

    /// Counter key for a product.
    pub fn key(product_id: &ProductId) -> String {
        format!("ratelimit:{product_id}")
    }

    /// Count one admission for `product_id` and report whether it is allowed.
    ///
    /// Rejected admissions are still counted.
    pub async fn admit(&self, product_id: &ProductId) -> StorageResult<bool> {
        let count = self
            .counter
            .incr_with_expiry(&Self::key(product_id), self.config.window)
            .await?;
        let allowed = count <= self.config.max_requests;
        debug!(product_id = %product_id, count, allowed, "rate limit check");
        Ok(allowed)
    }
}
