//! Trait contract tests for MonitorStore and RateCounter.
//!
//! Each MonitorStore contract runs against both the in-memory fake and the
//! SurrealDB store on the embedded `mem://` engine. Any conforming
//! implementation must pass these.

use std::time::Duration;

use chrono::Utc;
use map_state::fakes::{MemoryMonitorStore, MemoryRateCounter};
use map_state::storage_traits::*;
use map_state::{StorageError, SurrealMonitorStore};

async fn stores() -> Vec<(&'static str, Box<dyn MonitorStore>)> {
    let memory: Box<dyn MonitorStore> = Box::new(MemoryMonitorStore::new());
    let surreal: Box<dyn MonitorStore> =
        Box::new(SurrealMonitorStore::in_memory().await.unwrap());
    vec![("memory", memory), ("surreal", surreal)]
}

fn sample_product() -> Product {
    Product::new("prod-1", "Trail Runner 2", "Acme", 100.0, "footwear").unwrap()
}

fn sample_violation(listing: &str, status: ViolationStatus) -> Violation {
    Violation {
        id: ViolationId::new(),
        listing_id: ListingId::from(listing),
        price_difference: 20.0,
        detected_at: Utc::now(),
        status,
        severity: Severity::Critical,
        confidence: 0.9,
        anomalies: Some(vec!["coupon applied".to_string()]),
    }
}

async fn seed(store: &dyn MonitorStore) -> (Product, Vec<Listing>) {
    let product = sample_product();
    store.put_product(&product).await.unwrap();
    let listings = vec![
        Listing::new("lst-a", &product.id, "a.example", "https://a.example/p"),
        Listing::new("lst-b", &product.id, "b.example", "https://b.example/p"),
    ];
    for l in &listings {
        store.put_listing(l).await.unwrap();
    }
    (product, listings)
}

// ===========================================================================
// MonitorStore contract tests
// ===========================================================================

#[tokio::test]
async fn store_get_product_round_trip() {
    for (name, store) in stores().await {
        let product = sample_product();
        store.put_product(&product).await.unwrap();

        let loaded = store.get_product(&product.id).await.unwrap();
        assert_eq!(loaded, product, "backend {name}");
    }
}

#[tokio::test]
async fn store_get_product_not_found() {
    for (name, store) in stores().await {
        let err = store
            .get_product(&ProductId::from("missing"))
            .await
            .unwrap_err();
        assert!(
            matches!(err, StorageError::ProductNotFound { .. }),
            "backend {name}: {err}"
        );
    }
}

#[tokio::test]
async fn store_listings_scoped_to_product() {
    for (name, store) in stores().await {
        let (product, listings) = seed(store.as_ref()).await;

        let other = Product::new("prod-2", "Other", "Acme", 10.0, "misc").unwrap();
        store.put_product(&other).await.unwrap();
        store
            .put_listing(&Listing::new("lst-z", &other.id, "z.example", "https://z"))
            .await
            .unwrap();

        let loaded = store.listings_for_product(&product.id).await.unwrap();
        let ids: Vec<&str> = loaded.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["lst-a", "lst-b"], "backend {name}");
        assert_eq!(loaded, listings, "backend {name}");
    }
}

#[tokio::test]
async fn store_listings_empty_for_product_without_listings() {
    for (name, store) in stores().await {
        let product = sample_product();
        store.put_product(&product).await.unwrap();
        let loaded = store.listings_for_product(&product.id).await.unwrap();
        assert!(loaded.is_empty(), "backend {name}");
    }
}

#[tokio::test]
async fn store_put_listing_requires_product() {
    for (name, store) in stores().await {
        let orphan = Listing::new("lst-x", &ProductId::from("ghost"), "x.example", "https://x");
        let err = store.put_listing(&orphan).await.unwrap_err();
        assert!(
            matches!(err, StorageError::ProductNotFound { .. }),
            "backend {name}: {err}"
        );
    }
}

#[tokio::test]
async fn store_update_listing_is_last_write_wins() {
    for (name, store) in stores().await {
        let (_, listings) = seed(store.as_ref()).await;
        let id = &listings[0].id;

        let first = ListingUpdate {
            price: 90.0,
            scraped_at: Utc::now(),
            confidence: 0.75,
            anomalies: Some(vec!["bundle".to_string()]),
        };
        let second = ListingUpdate {
            price: 85.5,
            scraped_at: Utc::now(),
            confidence: 0.92,
            anomalies: None,
        };
        store.update_listing(id, &first).await.unwrap();
        store.update_listing(id, &second).await.unwrap();

        let ctx = store.listing_context(id).await.unwrap();
        assert_eq!(ctx.listing.last_price, Some(85.5), "backend {name}");
        assert_eq!(ctx.listing.confidence, Some(0.92), "backend {name}");
        assert!(ctx.listing.last_scraped.is_some(), "backend {name}");
        assert!(ctx.listing.anomalies.is_none(), "backend {name}");
        assert_eq!(ctx.listing.url, listings[0].url, "backend {name}");
    }
}

#[tokio::test]
async fn store_update_missing_listing_fails() {
    for (name, store) in stores().await {
        let update = ListingUpdate {
            price: 1.0,
            scraped_at: Utc::now(),
            confidence: 0.9,
            anomalies: None,
        };
        let err = store
            .update_listing(&ListingId::from("nope"), &update)
            .await
            .unwrap_err();
        assert!(
            matches!(err, StorageError::ListingNotFound { .. }),
            "backend {name}: {err}"
        );
    }
}

#[tokio::test]
async fn store_listing_context_joins_product() {
    for (name, store) in stores().await {
        let (product, listings) = seed(store.as_ref()).await;

        let ctx = store.listing_context(&listings[1].id).await.unwrap();
        assert_eq!(ctx.product, product, "backend {name}");
        assert_eq!(ctx.listing.id, listings[1].id, "backend {name}");

        let err = store
            .listing_context(&ListingId::from("nope"))
            .await
            .unwrap_err();
        assert!(
            matches!(err, StorageError::ListingNotFound { .. }),
            "backend {name}"
        );
    }
}

#[tokio::test]
async fn store_violations_newest_first_and_filtered() {
    for (name, store) in stores().await {
        let older = sample_violation("lst-a", ViolationStatus::Active);
        let resolved = sample_violation("lst-b", ViolationStatus::Resolved);
        let mut newer = sample_violation("lst-b", ViolationStatus::Active);
        newer.detected_at = older.detected_at + chrono::Duration::seconds(5);

        store.insert_violation(&older).await.unwrap();
        store.insert_violation(&resolved).await.unwrap();
        store.insert_violation(&newer).await.unwrap();

        let active = store
            .list_violations(Some(ViolationStatus::Active))
            .await
            .unwrap();
        let ids: Vec<&ViolationId> = active.iter().map(|v| &v.id).collect();
        assert_eq!(ids, vec![&newer.id, &older.id], "backend {name}");
        assert_eq!(active[1].severity, Severity::Critical, "backend {name}");
        assert_eq!(
            active[1].anomalies,
            Some(vec!["coupon applied".to_string()]),
            "backend {name}"
        );

        let all = store.list_violations(None).await.unwrap();
        assert_eq!(all.len(), 3, "backend {name}");
    }
}

#[tokio::test]
async fn store_put_product_rejects_invalid_map_price() {
    let store = SurrealMonitorStore::in_memory().await.unwrap();
    let mut product = sample_product();
    product.map_price = 0.0;

    let err = store.put_product(&product).await.unwrap_err();
    assert!(matches!(err, StorageError::InvalidRecord(_)));
}

// ===========================================================================
// Fake failure injection
// ===========================================================================

#[tokio::test]
async fn memory_store_injected_failures() {
    let store = MemoryMonitorStore::new();
    let (_, listings) = seed(&store).await;
    store.fail_updates_for(&listings[0].id);
    store.fail_violation_inserts_for(&listings[1].id);

    let update = ListingUpdate {
        price: 5.0,
        scraped_at: Utc::now(),
        confidence: 0.8,
        anomalies: None,
    };
    assert!(store.update_listing(&listings[0].id, &update).await.is_err());
    assert!(store.update_listing(&listings[1].id, &update).await.is_ok());
    assert!(store
        .insert_violation(&sample_violation("lst-b", ViolationStatus::Active))
        .await
        .is_err());
    assert!(store.violations().is_empty());
}

// ===========================================================================
// RateCounter contract tests
// ===========================================================================

#[tokio::test(start_paused = true)]
async fn counter_increments_within_window() {
    let counter = MemoryRateCounter::new();
    let window = Duration::from_secs(60);

    for expected in 1..=5u64 {
        let count = counter.incr_with_expiry("ratelimit:p1", window).await.unwrap();
        assert_eq!(count, expected);
    }
}

#[tokio::test(start_paused = true)]
async fn counter_keys_are_independent() {
    let counter = MemoryRateCounter::new();
    let window = Duration::from_secs(60);

    counter.incr_with_expiry("ratelimit:p1", window).await.unwrap();
    counter.incr_with_expiry("ratelimit:p1", window).await.unwrap();
    let other = counter.incr_with_expiry("ratelimit:p2", window).await.unwrap();

    assert_eq!(other, 1);
}

#[tokio::test(start_paused = true)]
async fn counter_resets_after_window_expiry() {
    let counter = MemoryRateCounter::new();
    let window = Duration::from_secs(60);

    counter.incr_with_expiry("k", window).await.unwrap();
    tokio::time::advance(Duration::from_secs(30)).await;
    // Later hits do not extend the window armed by the first hit.
    assert_eq!(counter.incr_with_expiry("k", window).await.unwrap(), 2);

    tokio::time::advance(Duration::from_secs(30)).await;
    assert_eq!(counter.incr_with_expiry("k", window).await.unwrap(), 1);
}
