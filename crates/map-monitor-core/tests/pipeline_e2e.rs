//! End-to-end pipeline scenarios against in-memory collaborators.

use std::sync::Arc;

use map_monitor_core::testing::{RecordingChannel, ScriptedCompletion, ScriptedFetcher};
use map_monitor_core::{
    run_scrape, AiExtractor, Environment, NotificationDispatcher, PipelineConfig, PipelineError,
    RateLimitConfig, RateLimiter, ScrapePipeline, TriggerStatus,
};
use map_state::fakes::{MemoryMonitorStore, MemoryRateCounter};
use map_state::{Listing, ListingId, MonitorStore, Product, ProductId, Severity, SurrealMonitorStore};

struct Harness {
    store: Arc<MemoryMonitorStore>,
    channel: Arc<RecordingChannel>,
    completion: Arc<ScriptedCompletion>,
    pipeline: ScrapePipeline,
}

async fn seed(store: &dyn MonitorStore, listings: &[(&str, &str)]) -> ProductId {
    let product = Product::new("prod-1", "Trail Runner 2", "Acme", 100.0, "footwear").unwrap();
    store.put_product(&product).await.unwrap();
    for (id, url) in listings {
        let listing = Listing::new(*id, &product.id, "shop.example", *url);
        store.put_listing(&listing).await.unwrap();
    }
    product.id
}

fn build(
    store: Arc<dyn MonitorStore>,
    fetcher: ScriptedFetcher,
    completion: Arc<ScriptedCompletion>,
    channel: Arc<RecordingChannel>,
    rate_limit: RateLimitConfig,
) -> ScrapePipeline {
    let dispatcher = NotificationDispatcher::new(Arc::clone(&store)).with_channel(channel);
    ScrapePipeline::new(
        store,
        RateLimiter::new(Arc::new(MemoryRateCounter::new()), rate_limit),
        Arc::new(fetcher),
        AiExtractor::new(completion),
        Arc::new(dispatcher),
        PipelineConfig::default(),
    )
}

async fn harness(fetcher: ScriptedFetcher, completion: ScriptedCompletion, listings: &[(&str, &str)]) -> (Harness, ProductId) {
    let store = Arc::new(MemoryMonitorStore::new());
    let product_id = seed(store.as_ref(), listings).await;
    let channel = Arc::new(RecordingChannel::new("chat"));
    let completion = Arc::new(completion);
    let pipeline = build(
        store.clone(),
        fetcher,
        completion.clone(),
        channel.clone(),
        RateLimitConfig::default(),
    );
    (
        Harness {
            store,
            channel,
            completion,
            pipeline,
        },
        product_id,
    )
}

fn reply(price: f64, confidence: f64) -> String {
    format!(r#"{{"price":{price},"isValidProduct":true,"confidence":{confidence},"anomalies":["clearance banner"]}}"#)
}

#[tokio::test]
async fn critical_violation_is_recorded_and_notified() {
    let fetcher = ScriptedFetcher::new().page("https://shop.example/a", "<span class=price>$80</span> PAGE-A");
    let completion = ScriptedCompletion::new().reply_when("PAGE-A", &reply(80.0, 0.9));
    let (h, pid) = harness(fetcher, completion, &[("lst-a", "https://shop.example/a")]).await;

    let outcome = h.pipeline.run(&pid).await.unwrap();
    assert_eq!(outcome.scraped_count, 1);
    assert_eq!(outcome.total_listings, 1);
    assert_eq!(outcome.violations_recorded, 1);
    assert_eq!(outcome.notifications_dispatched, 1);

    let listing = h.store.listing(&ListingId::from("lst-a")).unwrap();
    assert_eq!(listing.last_price, Some(80.0));
    assert_eq!(listing.confidence, Some(0.9));
    assert!(listing.last_scraped.is_some());

    let violations = h.store.violations();
    assert_eq!(violations.len(), 1);
    let v = &violations[0];
    assert_eq!(v.price_difference, 20.0);
    assert_eq!(v.severity, Severity::Critical);
    assert_eq!(v.confidence, 0.9);
    assert_eq!(v.anomalies, Some(vec!["clearance banner".to_string()]));

    let sent = h.channel.messages();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].text.contains("🚨 CRITICAL"));
    assert!(sent[0].text.contains("Price Difference: $20.00"));
    assert!(sent[0].text.contains("Retailer URL: https://shop.example/a"));
}

#[tokio::test]
async fn minor_violation_is_recorded_without_notification() {
    let fetcher = ScriptedFetcher::new().page("https://shop.example/a", "PAGE-A");
    let completion = ScriptedCompletion::new().reply_when("PAGE-A", &reply(95.0, 0.9));
    let (h, pid) = harness(fetcher, completion, &[("lst-a", "https://shop.example/a")]).await;

    let outcome = h.pipeline.run(&pid).await.unwrap();
    assert_eq!(outcome.violations_recorded, 1);
    assert_eq!(outcome.notifications_dispatched, 0);

    let violations = h.store.violations();
    assert_eq!(violations[0].severity, Severity::Minor);
    assert!((violations[0].price_difference - 5.0).abs() < 1e-9);
    assert_eq!(h.channel.attempts(), 0);
}

#[tokio::test]
async fn one_failing_fetch_does_not_stop_siblings() {
    let fetcher = ScriptedFetcher::new()
        .page("https://a.example/p", "PAGE-A")
        .failing("https://b.example/p", "connection reset")
        .page("https://c.example/p", "PAGE-C");
    let completion = ScriptedCompletion::new()
        .reply_when("PAGE-A", &reply(100.0, 0.9))
        .reply_when("PAGE-C", &reply(120.0, 0.85));
    let (h, pid) = harness(
        fetcher,
        completion,
        &[
            ("lst-1", "https://a.example/p"),
            ("lst-2", "https://b.example/p"),
            ("lst-3", "https://c.example/p"),
        ],
    )
    .await;

    let outcome = h.pipeline.run(&pid).await.unwrap();
    assert_eq!(outcome.scraped_count, 2);
    assert_eq!(outcome.total_listings, 3);
    assert_eq!(outcome.violations_recorded, 0);

    assert!(h.store.listing(&ListingId::from("lst-2")).unwrap().last_price.is_none());
    assert_eq!(h.store.listing(&ListingId::from("lst-3")).unwrap().last_price, Some(120.0));
}

#[tokio::test]
async fn extraction_failure_and_low_confidence_are_isolated() {
    let fetcher = ScriptedFetcher::new()
        .page("https://a.example/p", "PAGE-A")
        .page("https://b.example/p", "PAGE-B")
        .page("https://c.example/p", "PAGE-C");
    let completion = ScriptedCompletion::new()
        .fail_when("PAGE-A", "503 upstream")
        .reply_when("PAGE-B", &reply(50.0, 0.69))
        .reply_when("PAGE-C", "price: 60 confidence: 0.95 valid: true");
    let (h, pid) = harness(
        fetcher,
        completion,
        &[
            ("lst-1", "https://a.example/p"),
            ("lst-2", "https://b.example/p"),
            ("lst-3", "https://c.example/p"),
        ],
    )
    .await;

    let outcome = h.pipeline.run(&pid).await.unwrap();
    assert_eq!(outcome.scraped_count, 1);
    assert_eq!(outcome.total_listings, 3);

    let violations = h.store.violations();
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].listing_id, ListingId::from("lst-3"));
    assert_eq!(violations[0].anomalies, Some(vec![]));
}

#[tokio::test]
async fn reply_without_usable_price_never_raises_a_violation() {
    let fetcher = ScriptedFetcher::new()
        .page("https://a.example/p", "PAGE-A")
        .page("https://b.example/p", "PAGE-B")
        .page("https://c.example/p", "PAGE-C");
    let completion = ScriptedCompletion::new()
        .reply_when("PAGE-A", r#"{"isValidProduct":true,"confidence":0.95}"#)
        .reply_when("PAGE-B", r#"{"price":"$79.99","isValidProduct":true,"confidence":0.95}"#)
        .reply_when("PAGE-C", r#"{"price":-5,"isValidProduct":true,"confidence":0.95}"#);
    let (h, pid) = harness(
        fetcher,
        completion,
        &[
            ("lst-1", "https://a.example/p"),
            ("lst-2", "https://b.example/p"),
            ("lst-3", "https://c.example/p"),
        ],
    )
    .await;

    let outcome = h.pipeline.run(&pid).await.unwrap();
    assert_eq!(outcome.scraped_count, 0);
    assert_eq!(outcome.total_listings, 3);
    assert_eq!(outcome.violations_recorded, 0);
    assert_eq!(outcome.notifications_dispatched, 0);

    assert!(h.store.violations().is_empty());
    assert_eq!(h.channel.attempts(), 0);
    for id in ["lst-1", "lst-2", "lst-3"] {
        assert!(h.store.listing(&ListingId::from(id)).unwrap().last_price.is_none());
    }
}

#[tokio::test]
async fn extraction_request_uses_low_temperature_and_token_cap() {
    let fetcher = ScriptedFetcher::new().page("https://shop.example/a", "PAGE-A");
    let completion = ScriptedCompletion::new().reply_when("PAGE-A", &reply(100.0, 0.9));
    let (h, pid) = harness(fetcher, completion, &[("lst-a", "https://shop.example/a")]).await;

    h.pipeline.run(&pid).await.unwrap();

    let requests = h.completion.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].max_tokens, 500);
    assert!((requests[0].temperature - 0.1).abs() < f32::EPSILON);
    assert!(requests[0].messages[0].content.contains("Trail Runner 2, Acme"));
}

#[tokio::test]
async fn persistence_failures_do_not_abort_the_batch() {
    let fetcher = ScriptedFetcher::new()
        .page("https://a.example/p", "PAGE-A")
        .page("https://b.example/p", "PAGE-B")
        .page("https://c.example/p", "PAGE-C");
    let completion = ScriptedCompletion::new()
        .reply_when("PAGE-A", &reply(70.0, 0.9))
        .reply_when("PAGE-B", &reply(70.0, 0.9))
        .reply_when("PAGE-C", &reply(70.0, 0.9));
    let (h, pid) = harness(
        fetcher,
        completion,
        &[
            ("lst-1", "https://a.example/p"),
            ("lst-2", "https://b.example/p"),
            ("lst-3", "https://c.example/p"),
        ],
    )
    .await;
    h.store.fail_updates_for(&ListingId::from("lst-1"));
    h.store.fail_violation_inserts_for(&ListingId::from("lst-2"));

    let outcome = h.pipeline.run(&pid).await.unwrap();
    assert_eq!(outcome.scraped_count, 3);
    assert_eq!(outcome.violations_recorded, 1);

    let violations = h.store.violations();
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].listing_id, ListingId::from("lst-3"));
    assert_eq!(h.store.listing(&ListingId::from("lst-2")).unwrap().last_price, Some(70.0));
}

#[tokio::test]
async fn unknown_product_aborts_before_listing_work() {
    let fetcher = ScriptedFetcher::new().page("https://shop.example/a", "PAGE-A");
    let completion = ScriptedCompletion::new().reply_when("PAGE-A", &reply(80.0, 0.9));
    let (h, _) = harness(fetcher, completion, &[("lst-a", "https://shop.example/a")]).await;

    let err = h.pipeline.run(&ProductId::from("nope")).await.unwrap_err();
    assert!(matches!(err, PipelineError::ProductNotFound { .. }));
    assert!(h.completion.requests().is_empty());
    assert!(h.store.violations().is_empty());
}

#[tokio::test(start_paused = true)]
async fn rate_limited_run_fails_fast() {
    let fetcher = ScriptedFetcher::new().page("https://shop.example/a", "PAGE-A");
    let completion = ScriptedCompletion::new().reply_when("PAGE-A", &reply(100.0, 0.9));
    let (h, pid) = harness(fetcher, completion, &[("lst-a", "https://shop.example/a")]).await;

    for _ in 0..10 {
        h.pipeline.run(&pid).await.unwrap();
    }
    let err = h.pipeline.run(&pid).await.unwrap_err();
    assert!(matches!(err, PipelineError::RateLimitExceeded { .. }));
    assert_eq!(h.completion.requests().len(), 10);

    tokio::time::advance(std::time::Duration::from_secs(60)).await;
    assert!(h.pipeline.run(&pid).await.is_ok());
}

// ===========================================================================
// Trigger mapping
// ===========================================================================

#[tokio::test]
async fn trigger_reports_counts_on_success() {
    let fetcher = ScriptedFetcher::new().page("https://shop.example/a", "PAGE-A");
    let completion = ScriptedCompletion::new().reply_when("PAGE-A", &reply(100.0, 0.9));
    let (h, _) = harness(fetcher, completion, &[("lst-a", "https://shop.example/a")]).await;

    let resp = run_scrape(&h.pipeline, "prod-1", Environment::Production).await;
    assert_eq!(resp.status, TriggerStatus::Ok);
    assert_eq!(resp.status.http_status(), 200);
    assert_eq!(resp.body["success"], true);
    assert_eq!(resp.body["scrapedCount"], 1);
    assert_eq!(resp.body["totalListings"], 1);
}

#[tokio::test]
async fn trigger_maps_unknown_product_to_client_error() {
    let (h, _) = harness(ScriptedFetcher::new(), ScriptedCompletion::new(), &[]).await;

    for id in ["missing", "   "] {
        let resp = run_scrape(&h.pipeline, id, Environment::Development).await;
        assert_eq!(resp.status, TriggerStatus::InvalidProduct);
        assert_eq!(resp.status.http_status(), 400);
        assert_eq!(resp.body["error"], "Invalid product ID");
    }
}

#[tokio::test(start_paused = true)]
async fn trigger_hides_failure_detail_in_production() {
    let store: Arc<dyn MonitorStore> = Arc::new(MemoryMonitorStore::new());
    seed(store.as_ref(), &[]).await;
    let pipeline = build(
        store,
        ScriptedFetcher::new(),
        Arc::new(ScriptedCompletion::new()),
        Arc::new(RecordingChannel::new("chat")),
        RateLimitConfig {
            max_requests: 1,
            ..RateLimitConfig::default()
        },
    );

    let ok = run_scrape(&pipeline, "prod-1", Environment::Production).await;
    assert_eq!(ok.status, TriggerStatus::Ok);

    let dev = run_scrape(&pipeline, "prod-1", Environment::Development).await;
    assert_eq!(dev.status, TriggerStatus::Failed);
    assert_eq!(dev.status.http_status(), 500);
    assert!(dev.body["details"].as_str().unwrap().contains("rate limit exceeded"));

    let prod = run_scrape(&pipeline, "prod-1", Environment::Production).await;
    assert_eq!(prod.status, TriggerStatus::Failed);
    assert_eq!(prod.body["error"], "Internal Server Error");
    assert!(prod.body.get("details").is_none());
}

// ===========================================================================
// SurrealDB-backed run
// ===========================================================================

#[tokio::test]
async fn pipeline_runs_against_surreal_store() {
    let store: Arc<dyn MonitorStore> = Arc::new(SurrealMonitorStore::in_memory().await.unwrap());
    let pid = seed(store.as_ref(), &[("lst-a", "https://shop.example/a")]).await;
    let fetcher = ScriptedFetcher::new().page("https://shop.example/a", "PAGE-A");
    let completion = Arc::new(ScriptedCompletion::new().reply_when("PAGE-A", &reply(80.0, 0.9)));
    let channel = Arc::new(RecordingChannel::new("chat"));
    let pipeline = build(
        Arc::clone(&store),
        fetcher,
        completion,
        channel.clone(),
        RateLimitConfig::default(),
    );

    let outcome = pipeline.run(&pid).await.unwrap();
    assert_eq!(outcome.violations_recorded, 1);
    assert_eq!(outcome.notifications_dispatched, 1);

    let ctx = store.listing_context(&ListingId::from("lst-a")).await.unwrap();
    assert_eq!(ctx.listing.last_price, Some(80.0));
    let violations = store.list_violations(None).await.unwrap();
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].severity, Severity::Critical);
    assert_eq!(channel.messages().len(), 1);
}
