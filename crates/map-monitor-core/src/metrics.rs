//! Global atomic counters for MAP Monitor observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. at the end of a scrape run).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters, no allocations and no locking.
pub struct Metrics {
    listings_scraped: AtomicU64,
    listings_discarded: AtomicU64,
    listings_failed: AtomicU64,
    violations_recorded: AtomicU64,
    notifications_sent: AtomicU64,
    runs_rate_limited: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            listings_scraped: AtomicU64::new(0),
            listings_discarded: AtomicU64::new(0),
            listings_failed: AtomicU64::new(0),
            violations_recorded: AtomicU64::new(0),
            notifications_sent: AtomicU64::new(0),
            runs_rate_limited: AtomicU64::new(0),
        }
    }

    fn bump(counter: &AtomicU64, name: &'static str) {
        counter.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = name, "counter incremented");
    }

    /// A listing passed the confidence filter.
    pub fn inc_listings_scraped(&self) {
        Self::bump(&self.listings_scraped, "listings_scraped");
    }

    /// A listing was dropped for low confidence or product mismatch.
    pub fn inc_listings_discarded(&self) {
        Self::bump(&self.listings_discarded, "listings_discarded");
    }

    /// A listing fetch or extraction failed.
    pub fn inc_listings_failed(&self) {
        Self::bump(&self.listings_failed, "listings_failed");
    }

    pub fn inc_violations_recorded(&self) {
        Self::bump(&self.violations_recorded, "violations_recorded");
    }

    pub fn inc_notifications_sent(&self) {
        Self::bump(&self.notifications_sent, "notifications_sent");
    }

    pub fn inc_runs_rate_limited(&self) {
        Self::bump(&self.runs_rate_limited, "runs_rate_limited");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            listings_scraped = self.listings_scraped(),
            listings_discarded = self.listings_discarded(),
            listings_failed = self.listings_failed(),
            violations_recorded = self.violations_recorded(),
            notifications_sent = self.notifications_sent(),
            runs_rate_limited = self.runs_rate_limited(),
        );
    }

    pub fn listings_scraped(&self) -> u64 {
        self.listings_scraped.load(Ordering::Relaxed)
    }

    pub fn listings_discarded(&self) -> u64 {
        self.listings_discarded.load(Ordering::Relaxed)
    }

    pub fn listings_failed(&self) -> u64 {
        self.listings_failed.load(Ordering::Relaxed)
    }

    pub fn violations_recorded(&self) -> u64 {
        self.violations_recorded.load(Ordering::Relaxed)
    }

    pub fn notifications_sent(&self) -> u64 {
        self.notifications_sent.load(Ordering::Relaxed)
    }

    pub fn runs_rate_limited(&self) -> u64 {
        self.runs_rate_limited.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        for counter in [
            &self.listings_scraped,
            &self.listings_discarded,
            &self.listings_failed,
            &self.violations_recorded,
            &self.notifications_sent,
            &self.runs_rate_limited,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
