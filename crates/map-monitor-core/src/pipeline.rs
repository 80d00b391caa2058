//! Scrape pipeline for a single product.
//!
//! admit -> load -> per-listing fan-out (fetch, extract, confidence filter)
//! -> sequential fold (update listing, detect, insert violation, notify).
//!
//! Only a rate-limit rejection or a product/listings load failure aborts a
//! run. Everything per listing is isolated: failures are logged and the
//! listing drops out of the counts.
//!
//! Two concurrent runs for the same product are not serialised; listing
//! writes are last-write-wins.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::future::join_all;
use map_state::{Listing, ListingUpdate, MonitorStore, Product, ProductId};
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{instrument, Instrument};

use crate::detector::detect;
use crate::error::PipelineError;
use crate::extraction::AiExtractor;
use crate::fetcher::PageFetcher;
use crate::metrics::METRICS;
use crate::notify::NotificationDispatcher;
use crate::obs;
use crate::rate_limit::RateLimiter;

/// Minimum extraction confidence for a listing to be kept.
pub const MIN_CONFIDENCE: f64 = 0.7;

/// Default cap on concurrent listing fetch+extract tasks.
pub const DEFAULT_MAX_CONCURRENT_LISTINGS: usize = 8;

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub max_concurrent_listings: usize,
    pub min_confidence: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_listings: DEFAULT_MAX_CONCURRENT_LISTINGS,
            min_confidence: MIN_CONFIDENCE,
        }
    }
}

/// Counts reported for a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeOutcome {
    /// Listings that passed the confidence filter.
    pub scraped_count: usize,
    pub total_listings: usize,
    pub violations_recorded: usize,
    pub notifications_dispatched: usize,
}

/// A listing that survived fetch, extraction and the confidence filter.
#[derive(Debug, Clone)]
struct ScrapedListing {
    listing: Listing,
    update: ListingUpdate,
}

/// Shared collaborators of a pipeline, cloned into each listing task.
#[derive(Clone)]
struct ListingWorker {
    fetcher: Arc<dyn PageFetcher>,
    extractor: AiExtractor,
    min_confidence: f64,
}

impl ListingWorker {
    async fn scrape(self, listing: Listing, name: Arc<str>, brand: Arc<str>) -> Option<ScrapedListing> {
        let content = match self.fetcher.fetch(&listing.url).await {
            Ok(c) => c,
            Err(e) => {
                METRICS.inc_listings_failed();
                obs::emit_listing_failed(&listing.id, "fetch", &e);
                return None;
            }
        };

        let analysis = match self.extractor.extract(&content, &name, &brand).await {
            Ok(a) => a,
            Err(e) => {
                METRICS.inc_listings_failed();
                obs::emit_listing_failed(&listing.id, "extract", &e);
                return None;
            }
        };

        if !analysis.is_valid_product || analysis.confidence < self.min_confidence {
            METRICS.inc_listings_discarded();
            obs::emit_listing_discarded(&listing.id, analysis.confidence, analysis.is_valid_product);
            return None;
        }

        METRICS.inc_listings_scraped();
        Some(ScrapedListing {
            update: ListingUpdate {
                price: analysis.price,
                scraped_at: Utc::now(),
                confidence: analysis.confidence,
                anomalies: analysis.anomalies,
            },
            listing,
        })
    }
}

/// The scrape orchestrator. Cheap to share behind an `Arc`.
pub struct ScrapePipeline {
    store: Arc<dyn MonitorStore>,
    limiter: RateLimiter,
    worker: ListingWorker,
    dispatcher: Arc<NotificationDispatcher>,
    max_concurrent: usize,
}

impl ScrapePipeline {
    pub fn new(
        store: Arc<dyn MonitorStore>,
        limiter: RateLimiter,
        fetcher: Arc<dyn PageFetcher>,
        extractor: AiExtractor,
        dispatcher: Arc<NotificationDispatcher>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            limiter,
            worker: ListingWorker {
                fetcher,
                extractor,
                min_confidence: config.min_confidence,
            },
            dispatcher,
            max_concurrent: config.max_concurrent_listings.max(1),
        }
    }

    /// Run the pipeline for one product.
    pub async fn run(&self, product_id: &ProductId) -> Result<ScrapeOutcome, PipelineError> {
        self.run_inner(product_id)
            .instrument(obs::scrape_span(product_id))
            .await
    }

    async fn run_inner(&self, product_id: &ProductId) -> Result<ScrapeOutcome, PipelineError> {
        let started = Instant::now();

        if !self.limiter.admit(product_id).await? {
            METRICS.inc_runs_rate_limited();
            let err = PipelineError::RateLimitExceeded {
                product_id: product_id.to_string(),
            };
            obs::emit_scrape_rejected(product_id, &err);
            return Err(err);
        }

        let product = match self.store.get_product(product_id).await {
            Ok(p) => p,
            Err(e) => {
                let err = PipelineError::from(e);
                obs::emit_scrape_rejected(product_id, &err);
                return Err(err);
            }
        };
        let listings = self.store.listings_for_product(product_id).await?;
        let total_listings = listings.len();
        obs::emit_scrape_started(product_id, total_listings);

        let scraped = self.fan_out(&product, listings).await;
        let mut outcome = ScrapeOutcome {
            scraped_count: scraped.len(),
            total_listings,
            ..ScrapeOutcome::default()
        };

        for item in scraped {
            self.fold_one(&product, item, &mut outcome).await;
        }

        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        obs::emit_scrape_finished(product_id, duration_ms, outcome.scraped_count, total_listings);
        METRICS.flush();
        Ok(outcome)
    }

    /// Fetch and extract every listing concurrently, bounded by the
    /// semaphore. Results come back in gathered order.
    async fn fan_out(&self, product: &Product, listings: Vec<Listing>) -> Vec<ScrapedListing> {
        let sem = Arc::new(Semaphore::new(self.max_concurrent));
        let name: Arc<str> = Arc::from(product.name.as_str());
        let brand: Arc<str> = Arc::from(product.brand.as_str());

        let tasks = listings.into_iter().map(|listing| {
            let sem = Arc::clone(&sem);
            let worker = self.worker.clone();
            let name = Arc::clone(&name);
            let brand = Arc::clone(&brand);
            let listing_id = listing.id.clone();
            let handle = tokio::spawn(
                async move {
                    let _permit = sem.acquire_owned().await.ok();
                    worker.scrape(listing, name, brand).await
                }
                .in_current_span(),
            );
            (listing_id, handle)
        });
        let (ids, handles): (Vec<_>, Vec<_>) = tasks.unzip();

        join_all(handles)
            .await
            .into_iter()
            .zip(ids)
            .filter_map(|(joined, listing_id)| match joined {
                Ok(result) => result,
                Err(e) => {
                    METRICS.inc_listings_failed();
                    obs::emit_listing_failed(&listing_id, "task", &e);
                    None
                }
            })
            .collect()
    }

    /// Persist one scraped listing and record any violation. Never fails.
    ///
    /// Dispatch is awaited before returning, so a slow channel (bounded by
    /// its 10s timeout) holds up every listing later in the fold.
    #[instrument(skip_all, fields(listing_id = %item.listing.id))]
    async fn fold_one(&self, product: &Product, item: ScrapedListing, outcome: &mut ScrapeOutcome) {
        let ScrapedListing { listing, update } = item;

        if let Err(e) = self.store.update_listing(&listing.id, &update).await {
            obs::emit_listing_failed(&listing.id, "update", &e);
            return;
        }

        if update.confidence < self.worker.min_confidence {
            return;
        }
        let Some(candidate) = detect(update.price, product.map_price) else {
            return;
        };

        let violation = candidate.into_violation(listing.id.clone(), update.confidence, update.anomalies);
        if let Err(e) = self.store.insert_violation(&violation).await {
            obs::emit_listing_failed(&listing.id, "insert_violation", &e);
            return;
        }
        METRICS.inc_violations_recorded();
        obs::emit_violation_recorded(&violation);
        outcome.violations_recorded += 1;

        if self.dispatcher.notify(&violation).await.delivered_any() {
            outcome.notifications_dispatched += 1;
        }
    }
}
