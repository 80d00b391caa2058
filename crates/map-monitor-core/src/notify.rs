//! Violation notification dispatch.
//!
//! [`NotificationDispatcher::notify`] never returns an error: gated
//! violations are skipped, a failed context join aborts dispatch for that
//! violation only, and every channel is attempted independently with its
//! failure logged.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use map_state::{ListingContext, MonitorStore, Severity, Violation};
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::config::NotifyConfig;
use crate::detector::should_notify;
use crate::error::NotifyError;
use crate::metrics::METRICS;
use crate::obs;

const CHANNEL_TIMEOUT: Duration = Duration::from_secs(10);

/// A formatted notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationMessage {
    pub subject: String,
    pub text: String,
}

/// An outbound delivery channel.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Short name used in logs (`email`, `chat`).
    fn name(&self) -> &str;

    async fn send(&self, message: &NotificationMessage) -> Result<(), NotifyError>;
}

/// Render the human-readable violation message.
pub fn format_violation_message(violation: &Violation, ctx: &ListingContext) -> NotificationMessage {
    let badge = match violation.severity {
        Severity::Critical => "🚨 CRITICAL",
        Severity::Minor => "⚠️ MINOR",
    };

    let mut lines = vec![
        format!("{badge} MAP Violation Detected"),
        String::new(),
        format!("Product: {}", ctx.product.name),
        format!("Brand: {}", ctx.product.brand),
        format!("Retailer URL: {}", ctx.listing.url),
        format!("Price Difference: ${:.2}", violation.price_difference),
        format!("Detection Confidence: {:.1}%", violation.confidence * 100.0),
    ];

    if let Some(anomalies) = violation.anomalies.as_ref().filter(|a| !a.is_empty()) {
        lines.push(String::new());
        lines.push("Anomalies Detected:".to_string());
        lines.extend(anomalies.iter().cloned());
    }

    lines.push(String::new());
    lines.push(format!(
        "Detected at: {}",
        violation.detected_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));

    NotificationMessage {
        subject: format!(
            "[{}] MAP violation: {} ({})",
            violation.severity, ctx.product.name, ctx.listing.retailer_domain
        ),
        text: lines.join("\n"),
    }
}

fn http_client(channel: &str) -> Result<reqwest::Client, NotifyError> {
    reqwest::Client::builder()
        .timeout(CHANNEL_TIMEOUT)
        .build()
        .map_err(|e| NotifyError::Config {
            channel: channel.to_string(),
            detail: e.to_string(),
        })
}

async fn post_json<T: Serialize + Sync>(
    http: &reqwest::Client,
    channel: &str,
    url: &str,
    body: &T,
) -> Result<(), NotifyError> {
    let response = http
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(|e| NotifyError::Transport {
            channel: channel.to_string(),
            detail: e.to_string(),
        })?;

    if !response.status().is_success() {
        return Err(NotifyError::Status {
            channel: channel.to_string(),
            status: response.status().as_u16(),
        });
    }
    Ok(())
}

/// Sends `{to, subject, text}` to an HTTP mail relay.
pub struct EmailChannel {
    http: reqwest::Client,
    endpoint: String,
    recipients: Vec<String>,
}

#[derive(Serialize)]
struct EmailPayload<'a> {
    to: &'a [String],
    subject: &'a str,
    text: &'a str,
}

impl EmailChannel {
    /// Fails with `NotifyError::Config` when `recipients` is empty.
    pub fn new(endpoint: &str, recipients: Vec<String>) -> Result<Self, NotifyError> {
        if recipients.is_empty() {
            return Err(NotifyError::Config {
                channel: "email".to_string(),
                detail: "no recipients configured".to_string(),
            });
        }
        Ok(Self {
            http: http_client("email")?,
            endpoint: endpoint.to_string(),
            recipients,
        })
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    fn name(&self) -> &str {
        "email"
    }

    async fn send(&self, message: &NotificationMessage) -> Result<(), NotifyError> {
        let payload = EmailPayload {
            to: &self.recipients,
            subject: &message.subject,
            text: &message.text,
        };
        post_json(&self.http, self.name(), &self.endpoint, &payload).await
    }
}

/// Posts `{text}` to a chat incoming-webhook URL.
pub struct ChatWebhookChannel {
    http: reqwest::Client,
    webhook_url: String,
}

#[derive(Serialize)]
struct ChatPayload<'a> {
    text: &'a str,
}

impl ChatWebhookChannel {
    pub fn new(webhook_url: &str) -> Result<Self, NotifyError> {
        Ok(Self {
            http: http_client("chat")?,
            webhook_url: webhook_url.to_string(),
        })
    }
}

#[async_trait]
impl NotificationChannel for ChatWebhookChannel {
    fn name(&self) -> &str {
        "chat"
    }

    async fn send(&self, message: &NotificationMessage) -> Result<(), NotifyError> {
        let payload = ChatPayload {
            text: &message.text,
        };
        post_json(&self.http, self.name(), &self.webhook_url, &payload).await
    }
}

/// What happened to one violation handed to the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchReport {
    /// Below the notification gate.
    Gated,
    /// Listing/product context could not be loaded.
    ContextUnavailable,
    /// Fan-out ran; channel names by outcome.
    Sent {
        delivered: Vec<String>,
        failed: Vec<String>,
    },
}

impl DispatchReport {
    /// True when at least one channel accepted the message.
    pub fn delivered_any(&self) -> bool {
        matches!(self, DispatchReport::Sent { delivered, .. } if !delivered.is_empty())
    }
}

/// Gates, formats and fans out violation notifications.
pub struct NotificationDispatcher {
    store: Arc<dyn MonitorStore>,
    channels: Vec<Arc<dyn NotificationChannel>>,
}

impl NotificationDispatcher {
    /// A dispatcher with no channels.
    pub fn new(store: Arc<dyn MonitorStore>) -> Self {
        Self {
            store,
            channels: Vec::new(),
        }
    }

    pub fn with_channel(mut self, channel: Arc<dyn NotificationChannel>) -> Self {
        self.channels.push(channel);
        self
    }

    /// Build with the channels enabled in `config`.
    pub fn from_config(
        store: Arc<dyn MonitorStore>,
        config: &NotifyConfig,
    ) -> Result<Self, NotifyError> {
        let mut dispatcher = Self::new(store);
        if config.email_enabled {
            match &config.email_endpoint {
                Some(_) if config.email_recipients.is_empty() => {
                    warn!("email notifications enabled without recipients, channel disabled")
                }
                Some(endpoint) => {
                    let channel = EmailChannel::new(endpoint, config.email_recipients.clone())?;
                    dispatcher = dispatcher.with_channel(Arc::new(channel));
                }
                None => warn!("email notifications enabled without an endpoint"),
            }
        }
        if config.chat_enabled {
            match &config.chat_webhook_url {
                Some(url) => {
                    dispatcher = dispatcher.with_channel(Arc::new(ChatWebhookChannel::new(url)?));
                }
                None => warn!("chat notifications enabled without a webhook URL"),
            }
        }
        Ok(dispatcher)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Notify about `violation` if it passes the gate.
    pub async fn notify(&self, violation: &Violation) -> DispatchReport {
        if !should_notify(violation) {
            debug!(
                violation_id = %violation.id,
                severity = %violation.severity,
                confidence = violation.confidence,
                "skipping notification below gate"
            );
            return DispatchReport::Gated;
        }

        let ctx = match self.store.listing_context(&violation.listing_id).await {
            Ok(ctx) => ctx,
            Err(e) => {
                error!(
                    violation_id = %violation.id,
                    listing_id = %violation.listing_id,
                    error = %e,
                    "failed to load notification context"
                );
                return DispatchReport::ContextUnavailable;
            }
        };

        let message = format_violation_message(violation, &ctx);
        let attempts = self.channels.iter().map(|channel| {
            let message = &message;
            async move { (channel.name().to_string(), channel.send(message).await) }
        });

        let mut delivered = Vec::new();
        let mut failed = Vec::new();
        for (name, result) in join_all(attempts).await {
            match result {
                Ok(()) => {
                    METRICS.inc_notifications_sent();
                    delivered.push(name);
                }
                Err(e) => {
                    error!(channel = %name, violation_id = %violation.id, error = %e, "notification channel failed");
                    failed.push(name);
                }
            }
        }

        obs::emit_notify_dispatched(violation, delivered.len(), failed.len());
        DispatchReport::Sent { delivered, failed }
    }
}
