//! Structured observability hooks for scrape run lifecycle events.
//!
//! This module provides:
//! - A product-scoped tracing span for a scrape run via [`scrape_span`]
//! - Emission functions for run start/finish, per-listing outcomes,
//!   recorded violations and notification dispatch
//!
//! Events are emitted at `info!` level unless noted. Filter with `RUST_LOG`.

use map_state::{ListingId, ProductId, Violation};
use tracing::{info, warn};

/// Span covering one scrape run, tagged with the product id.
///
/// Attach it with `tracing::Instrument::instrument` so it follows the run
/// across await points.
pub fn scrape_span(product_id: &ProductId) -> tracing::Span {
    tracing::info_span!("map.scrape", product_id = %product_id)
}

/// Emit event: run admitted and listings loaded.
pub fn emit_scrape_started(product_id: &ProductId, total_listings: usize) {
    info!(
        event = "scrape.started",
        product_id = %product_id,
        total_listings = total_listings,
    );
}

/// Emit event: run rejected before any listing work (warning level).
pub fn emit_scrape_rejected(product_id: &ProductId, reason: &dyn std::fmt::Display) {
    warn!(event = "scrape.rejected", product_id = %product_id, reason = %reason);
}

/// Emit event: listing dropped by the confidence filter (warning level).
pub fn emit_listing_discarded(listing_id: &ListingId, confidence: f64, is_valid_product: bool) {
    warn!(
        event = "scrape.listing_discarded",
        listing_id = %listing_id,
        confidence = confidence,
        is_valid_product = is_valid_product,
    );
}

/// Emit event: a listing step failed and the listing was skipped (error level).
///
/// `stage` is one of `fetch`, `extract`, `update`, `insert_violation`, `task`.
pub fn emit_listing_failed(listing_id: &ListingId, stage: &str, error: &dyn std::fmt::Display) {
    tracing::error!(
        event = "scrape.listing_failed",
        listing_id = %listing_id,
        stage = stage,
        error = %error,
    );
}

/// Emit event: violation persisted.
pub fn emit_violation_recorded(violation: &Violation) {
    info!(
        event = "violation.recorded",
        violation_id = %violation.id,
        listing_id = %violation.listing_id,
        severity = %violation.severity,
        price_difference = violation.price_difference,
        confidence = violation.confidence,
    );
}

/// Emit event: run finished with duration and counts.
pub fn emit_scrape_finished(
    product_id: &ProductId,
    duration_ms: u64,
    scraped_count: usize,
    total_listings: usize,
) {
    info!(
        event = "scrape.finished",
        product_id = %product_id,
        duration_ms = duration_ms,
        scraped_count = scraped_count,
        total_listings = total_listings,
    );
}

/// Emit event: notification fan-out finished for a violation.
pub fn emit_notify_dispatched(violation: &Violation, delivered: usize, failed: usize) {
    info!(
        event = "notify.dispatched",
        violation_id = %violation.id,
        listing_id = %violation.listing_id,
        severity = %violation.severity,
        delivered = delivered,
        failed = failed,
    );
}
