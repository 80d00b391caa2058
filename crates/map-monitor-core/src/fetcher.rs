//! Page fetch adapter over the external scraping provider.
//!
//! One POST per listing URL. The provider renders the page (waiting for the
//! selector hint), rotates the client identity and keeps cookies across
//! redirects within the call; we get back the rendered HTML.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::FetchError;

/// Provider-side render timeout, also the client-side request bound.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Selector the provider waits for before returning the page.
pub const DEFAULT_SELECTOR: &str = ".price";

/// Fetches raw page content for a listing URL.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// Scraping provider connection settings.
#[derive(Debug, Clone)]
pub struct ScraperConfig {
    /// Provider host, e.g. `brd.superproxy.io`. A full `http(s)://` base is
    /// used as-is.
    pub host: String,
    pub username: String,
    pub password: String,
    pub selector: String,
    pub timeout: Duration,
}

impl ScraperConfig {
    pub fn new(host: &str, username: &str, password: &str) -> Self {
        Self {
            host: host.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            selector: DEFAULT_SELECTOR.to_string(),
            timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn with_selector(mut self, selector: &str) -> Self {
        self.selector = selector.to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Full URL of the scrape endpoint.
    pub fn endpoint(&self) -> String {
        let base = self.host.trim_end_matches('/');
        if base.starts_with("http://") || base.starts_with("https://") {
            format!("{base}/scrape")
        } else {
            format!("https://{base}/scrape")
        }
    }
}

#[derive(Debug, Serialize)]
struct ScrapeRequest<'a> {
    url: &'a str,
    options: ScrapeOptions<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScrapeOptions<'a> {
    wait_for_selector: &'a str,
    /// Milliseconds
    timeout: u64,
    user_agent: &'a str,
    cookies: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScrapeResponse {
    html_content: String,
}

/// HTTP client for the scraping provider.
#[derive(Debug, Clone)]
pub struct ScrapingProviderClient {
    http: reqwest::Client,
    config: ScraperConfig,
}

impl ScrapingProviderClient {
    pub fn new(config: ScraperConfig) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("map-monitor/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .cookie_store(true)
            .build()
            .map_err(|e| FetchError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, config })
    }

    fn timeout_ms(&self) -> u64 {
        u64::try_from(self.config.timeout.as_millis()).unwrap_or(u64::MAX)
    }
}

#[async_trait]
impl PageFetcher for ScrapingProviderClient {
    #[instrument(skip(self), fields(provider = %self.config.host))]
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let body = ScrapeRequest {
            url,
            options: ScrapeOptions {
                wait_for_selector: &self.config.selector,
                timeout: self.timeout_ms(),
                user_agent: "random",
                cookies: true,
            },
        };

        let response = self
            .http
            .post(self.config.endpoint())
            .basic_auth(&self.config.username, Some(&self.config.password))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout {
                        timeout_ms: self.timeout_ms(),
                    }
                } else {
                    FetchError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let payload: ScrapeResponse = response
            .json()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))?;

        debug!(bytes = payload.html_content.len(), "page fetched");
        Ok(payload.html_content)
    }
}
