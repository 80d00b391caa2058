//! Maps a pipeline run to a transport-neutral trigger response.
//!
//! Invalid product ids become a client error. Any other run failure becomes a
//! generic server error whose detail is shown only outside production.

use map_state::ProductId;
use serde_json::{json, Value};
use tracing::error;

use crate::config::Environment;
use crate::error::PipelineError;
use crate::pipeline::ScrapePipeline;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerStatus {
    Ok,
    InvalidProduct,
    Failed,
}

impl TriggerStatus {
    pub fn http_status(&self) -> u16 {
        match self {
            TriggerStatus::Ok => 200,
            TriggerStatus::InvalidProduct => 400,
            TriggerStatus::Failed => 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TriggerResponse {
    pub status: TriggerStatus,
    pub body: Value,
}

impl TriggerResponse {
    fn invalid_product() -> Self {
        Self {
            status: TriggerStatus::InvalidProduct,
            body: json!({ "error": "Invalid product ID" }),
        }
    }
}

/// Run the pipeline for `product_id` and shape the result for the caller.
pub async fn run_scrape(
    pipeline: &ScrapePipeline,
    product_id: &str,
    environment: Environment,
) -> TriggerResponse {
    let product_id = product_id.trim();
    if product_id.is_empty() {
        return TriggerResponse::invalid_product();
    }

    match pipeline.run(&ProductId::from(product_id)).await {
        Ok(outcome) => TriggerResponse {
            status: TriggerStatus::Ok,
            body: json!({
                "success": true,
                "scrapedCount": outcome.scraped_count,
                "totalListings": outcome.total_listings,
                "violationsRecorded": outcome.violations_recorded,
                "notificationsDispatched": outcome.notifications_dispatched,
            }),
        },
        Err(PipelineError::ProductNotFound { .. }) => TriggerResponse::invalid_product(),
        Err(e) => {
            error!(product_id = %product_id, error = %e, "scrape run failed");
            let mut body = json!({ "error": "Internal Server Error" });
            if !environment.is_production() {
                body["details"] = Value::String(e.to_string());
            }
            TriggerResponse {
                status: TriggerStatus::Failed,
                body,
            }
        }
    }
}
