//! Violation detection and the notification gate.
//!
//! Both functions are pure: no I/O, no clock other than the detection
//! timestamp. Confidence is attached by the caller from the extraction that
//! produced the observed price.

use chrono::{DateTime, Utc};
use map_state::{ListingId, Severity, Violation, ViolationId, ViolationStatus};
use tracing::warn;

/// Shortfall percentage at or above which a violation is CRITICAL.
pub const CRITICAL_THRESHOLD_PCT: f64 = 15.0;

/// Minimum confidence for a CRITICAL violation to trigger notification.
pub const NOTIFY_MIN_CONFIDENCE: f64 = 0.8;

/// A detected below-MAP observation, before it is tied to a listing.
#[derive(Debug, Clone, PartialEq)]
pub struct ViolationCandidate {
    /// `map_price - observed_price`, always positive.
    pub price_difference: f64,
    pub detected_at: DateTime<Utc>,
    pub status: ViolationStatus,
    pub severity: Severity,
}

impl ViolationCandidate {
    /// Bind the candidate to a listing, copying confidence and anomalies from
    /// the extraction snapshot.
    pub fn into_violation(
        self,
        listing_id: ListingId,
        confidence: f64,
        anomalies: Option<Vec<String>>,
    ) -> Violation {
        Violation {
            id: ViolationId::new(),
            listing_id,
            price_difference: self.price_difference,
            detected_at: self.detected_at,
            status: self.status,
            severity: self.severity,
            confidence,
            anomalies,
        }
    }
}

/// Compare an observed price against the MAP threshold.
///
/// Returns `None` when the price is at or above MAP. A non-positive or
/// non-finite MAP has no meaningful shortfall percentage and is refused.
pub fn detect(observed_price: f64, map_price: f64) -> Option<ViolationCandidate> {
    if !map_price.is_finite() || map_price <= 0.0 {
        warn!(map_price, "refusing to classify against a non-positive MAP");
        return None;
    }
    if !observed_price.is_finite() {
        return None;
    }

    let diff = map_price - observed_price;
    if diff <= 0.0 {
        return None;
    }

    Some(ViolationCandidate {
        price_difference: diff,
        detected_at: Utc::now(),
        status: ViolationStatus::Active,
        severity: classify(diff, map_price),
    })
}

fn classify(diff: f64, map_price: f64) -> Severity {
    // Multiply first so an exact 15% shortfall is not lost to rounding.
    if diff * 100.0 / map_price >= CRITICAL_THRESHOLD_PCT {
        Severity::Critical
    } else {
        Severity::Minor
    }
}

/// The sole notification gate: CRITICAL and confidence >= 0.8.
pub fn should_notify(violation: &Violation) -> bool {
    violation.severity == Severity::Critical && violation.confidence >= NOTIFY_MIN_CONFIDENCE
}
