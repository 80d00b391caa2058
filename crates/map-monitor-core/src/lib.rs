//! MAP Monitor Core Library
//!
//! Scrape → AI-extract → validate → detect-violation → persist/notify
//! pipeline for minimum advertised price enforcement.

pub mod completion;
pub mod config;
pub mod detector;
pub mod error;
pub mod extraction;
pub mod fetcher;
pub mod metrics;
pub mod notify;
pub mod obs;
pub mod pipeline;
pub mod rate_limit;
pub mod telemetry;
pub mod testing;
pub mod trigger;

pub use completion::{AiConfig, CompletionProvider, CompletionRequest, OpenRouterClient};
pub use config::{Environment, MonitorConfig, NotifyConfig};
pub use detector::{detect, should_notify, ViolationCandidate, CRITICAL_THRESHOLD_PCT};
pub use error::{
    CompletionError, ConfigError, ExtractionError, FetchError, MonitorError, NotifyError,
    PipelineError, Result,
};
pub use extraction::{build_prompt, parse_analysis, AiAnalysis, AiExtractor, ParsedAnalysis};
pub use fetcher::{PageFetcher, ScraperConfig, ScrapingProviderClient};
pub use notify::{
    format_violation_message, ChatWebhookChannel, DispatchReport, EmailChannel,
    NotificationChannel, NotificationDispatcher, NotificationMessage,
};
pub use pipeline::{PipelineConfig, ScrapeOutcome, ScrapePipeline};
pub use rate_limit::{RateLimitConfig, RateLimiter};
pub use trigger::{run_scrape, TriggerResponse, TriggerStatus};

pub use map_state::{
    Listing, ListingContext, ListingId, MonitorStore, Product, ProductId, RateCounter, Severity,
    Violation, ViolationStatus,
};

use std::sync::Arc;

/// Build a pipeline with the production adapters described by `config`.
pub fn build_pipeline(
    config: &MonitorConfig,
    store: Arc<dyn MonitorStore>,
    counter: Arc<dyn RateCounter>,
) -> Result<ScrapePipeline> {
    let fetcher = ScrapingProviderClient::new(config.scraper.clone())?;
    let completion = OpenRouterClient::new(config.ai.clone())?;
    let extractor = AiExtractor::new(Arc::new(completion)).with_model(&config.ai.model);
    let dispatcher = NotificationDispatcher::from_config(Arc::clone(&store), &config.notify)?;

    Ok(ScrapePipeline::new(
        store,
        RateLimiter::new(counter, config.rate_limit.clone()),
        Arc::new(fetcher),
        extractor,
        Arc::new(dispatcher),
        config.pipeline.clone(),
    ))
}
