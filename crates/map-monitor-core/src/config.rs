//! Environment configuration for MAP Monitor processes.
//!
//! [`MonitorConfig::from_env`] reads the process environment; every required
//! variable that is missing is reported in a single [`ConfigError::MissingVar`].
//! SurrealDB settings are read separately by `map_state::connect_from_env`.

use std::str::FromStr;
use std::time::Duration;

use crate::completion::{AiConfig, DEFAULT_BASE_URL, DEFAULT_MODEL};
use crate::error::ConfigError;
use crate::fetcher::{ScraperConfig, DEFAULT_SELECTOR};
use crate::pipeline::PipelineConfig;
use crate::rate_limit::RateLimitConfig;

pub const DEFAULT_PORT: u16 = 3000;

/// Deployment environment. Error details are hidden from trigger callers in
/// production.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Test,
    Production,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "test" => Ok(Environment::Test),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(ConfigError::Invalid {
                var: "APP_ENV".to_string(),
                value: other.to_string(),
                reason: "expected development, test or production".to_string(),
            }),
        }
    }
}

/// Outbound notification channel settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotifyConfig {
    pub email_enabled: bool,
    pub email_recipients: Vec<String>,
    /// HTTP mail relay accepting `{to, subject, text}`
    pub email_endpoint: Option<String>,
    pub chat_enabled: bool,
    pub chat_webhook_url: Option<String>,
}

impl NotifyConfig {
    pub fn with_email(mut self, endpoint: &str, recipients: &[&str]) -> Self {
        self.email_enabled = true;
        self.email_endpoint = Some(endpoint.to_string());
        self.email_recipients = recipients.iter().map(|r| r.to_string()).collect();
        self
    }

    pub fn with_chat_webhook(mut self, url: &str) -> Self {
        self.chat_enabled = true;
        self.chat_webhook_url = Some(url.to_string());
        self
    }
}

/// Full process configuration.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub port: u16,
    pub environment: Environment,
    pub redis_url: String,
    pub ai: AiConfig,
    pub scraper: ScraperConfig,
    pub notify: NotifyConfig,
    pub pipeline: PipelineConfig,
    pub rate_limit: RateLimitConfig,
}

impl MonitorConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` as the variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut missing = Vec::new();
        let mut require = |key: &str| {
            let value = get(key);
            if value.is_none() {
                missing.push(key.to_string());
            }
            value.unwrap_or_default()
        };

        let api_key = require("OPENROUTER_API_KEY");
        let redis_url = require("REDIS_URL");
        let bd_user = require("BRIGHTDATA_USERNAME");
        let bd_pass = require("BRIGHTDATA_PASSWORD");
        let bd_host = require("BRIGHTDATA_HOST");

        let notify = NotifyConfig {
            email_enabled: parse_or(&get, "NOTIFY_EMAIL_ENABLED", false, parse_bool)?,
            email_recipients: get("NOTIFY_EMAIL_RECIPIENTS")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|r| !r.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
            email_endpoint: get("NOTIFY_EMAIL_ENDPOINT"),
            chat_enabled: parse_or(&get, "NOTIFY_CHAT_ENABLED", false, parse_bool)?,
            chat_webhook_url: get("NOTIFY_CHAT_WEBHOOK_URL"),
        };
        if notify.email_enabled && notify.email_endpoint.is_none() {
            require("NOTIFY_EMAIL_ENDPOINT");
        }
        if notify.chat_enabled && notify.chat_webhook_url.is_none() {
            require("NOTIFY_CHAT_WEBHOOK_URL");
        }

        if !missing.is_empty() {
            return Err(ConfigError::MissingVar(missing));
        }

        let environment = match get("APP_ENV").or_else(|| get("NODE_ENV")) {
            Some(v) => v.parse()?,
            None => Environment::default(),
        };

        let ai = AiConfig::new(&api_key)
            .with_base_url(&get("AI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()))
            .with_model(&get("AI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()));

        let scraper = ScraperConfig::new(&bd_host, &bd_user, &bd_pass)
            .with_selector(&get("SCRAPER_SELECTOR").unwrap_or_else(|| DEFAULT_SELECTOR.to_string()));

        let defaults = PipelineConfig::default();
        let pipeline = PipelineConfig {
            max_concurrent_listings: parse_or(
                &get,
                "SCRAPE_MAX_CONCURRENT_LISTINGS",
                defaults.max_concurrent_listings,
                parse_positive,
            )?,
            ..defaults
        };

        let rl_defaults = RateLimitConfig::default();
        let rate_limit = RateLimitConfig {
            max_requests: parse_or(
                &get,
                "RATE_LIMIT_MAX_REQUESTS",
                rl_defaults.max_requests,
                parse_positive,
            )?,
            window: Duration::from_secs(parse_or(
                &get,
                "RATE_LIMIT_WINDOW_SECS",
                rl_defaults.window.as_secs(),
                parse_positive,
            )?),
        };

        Ok(Self {
            port: parse_or(&get, "PORT", DEFAULT_PORT, |v| {
                v.parse::<u16>().map_err(|e| e.to_string())
            })?,
            environment,
            redis_url,
            ai,
            scraper,
            notify,
            pipeline,
            rate_limit,
        })
    }
}

fn parse_or<T, G, P>(get: &G, key: &str, default: T, parse: P) -> Result<T, ConfigError>
where
    G: Fn(&str) -> Option<String>,
    P: Fn(&str) -> Result<T, String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => parse(raw.trim()).map_err(|reason| ConfigError::Invalid {
            var: key.to_string(),
            value: raw,
            reason,
        }),
    }
}

fn parse_bool(v: &str) -> Result<bool, String> {
    match v.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err("expected a boolean".to_string()),
    }
}

fn parse_positive<T>(v: &str) -> Result<T, String>
where
    T: FromStr + PartialOrd + Default,
    T::Err: std::fmt::Display,
{
    let n = v.parse::<T>().map_err(|e| e.to_string())?;
    if n > T::default() {
        Ok(n)
    } else {
        Err("must be greater than zero".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn required() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("OPENROUTER_API_KEY", "sk-test"),
            ("REDIS_URL", "redis://127.0.0.1:6379"),
            ("BRIGHTDATA_USERNAME", "user"),
            ("BRIGHTDATA_PASSWORD", "pass"),
            ("BRIGHTDATA_HOST", "brd.example.io"),
        ])
    }

    fn load(vars: &HashMap<&str, &str>) -> Result<MonitorConfig, ConfigError> {
        MonitorConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()))
    }

    #[test]
    fn defaults_apply_when_only_required_vars_set() {
        let cfg = load(&required()).unwrap();
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.environment, Environment::Development);
        assert_eq!(cfg.ai.model, DEFAULT_MODEL);
        assert_eq!(cfg.ai.base_url, DEFAULT_BASE_URL);
        assert_eq!(cfg.scraper.selector, ".price");
        assert_eq!(cfg.scraper.timeout, Duration::from_secs(30));
        assert_eq!(cfg.pipeline.max_concurrent_listings, 8);
        assert_eq!(cfg.rate_limit, RateLimitConfig::default());
        assert_eq!(cfg.notify, NotifyConfig::default());
    }

    #[test]
    fn all_missing_required_vars_are_reported() {
        let mut vars = required();
        vars.remove("REDIS_URL");
        vars.insert("BRIGHTDATA_HOST", "  ");

        match load(&vars) {
            Err(ConfigError::MissingVar(missing)) => {
                assert_eq!(missing, vec!["REDIS_URL", "BRIGHTDATA_HOST"]);
            }
            other => panic!("expected MissingVar, got {other:?}"),
        }
    }

    #[test]
    fn enabled_channel_requires_its_endpoint() {
        let mut vars = required();
        vars.insert("NOTIFY_CHAT_ENABLED", "true");

        match load(&vars) {
            Err(ConfigError::MissingVar(missing)) => {
                assert_eq!(missing, vec!["NOTIFY_CHAT_WEBHOOK_URL"]);
            }
            other => panic!("expected MissingVar, got {other:?}"),
        }
    }

    #[test]
    fn notify_settings_are_parsed() {
        let mut vars = required();
        vars.insert("NOTIFY_EMAIL_ENABLED", "yes");
        vars.insert("NOTIFY_EMAIL_ENDPOINT", "https://mail.example/send");
        vars.insert("NOTIFY_EMAIL_RECIPIENTS", "a@example.com, b@example.com,");
        vars.insert("NOTIFY_CHAT_ENABLED", "1");
        vars.insert("NOTIFY_CHAT_WEBHOOK_URL", "https://hooks.example/T1");

        let cfg = load(&vars).unwrap();
        assert_eq!(
            cfg.notify,
            NotifyConfig::default()
                .with_email("https://mail.example/send", &["a@example.com", "b@example.com"])
                .with_chat_webhook("https://hooks.example/T1")
        );
    }

    #[test]
    fn production_env_from_node_env_fallback() {
        let mut vars = required();
        vars.insert("NODE_ENV", "production");
        assert!(load(&vars).unwrap().environment.is_production());

        vars.insert("APP_ENV", "test");
        assert_eq!(load(&vars).unwrap().environment, Environment::Test);
    }

    #[test]
    fn invalid_numbers_are_rejected() {
        let mut vars = required();
        vars.insert("SCRAPE_MAX_CONCURRENT_LISTINGS", "0");
        assert!(matches!(load(&vars), Err(ConfigError::Invalid { .. })));

        let mut vars = required();
        vars.insert("PORT", "http");
        assert!(matches!(load(&vars), Err(ConfigError::Invalid { ref var, .. }) if var == "PORT"));
    }

    #[test]
    fn overrides_are_applied() {
        let mut vars = required();
        vars.insert("RATE_LIMIT_MAX_REQUESTS", "3");
        vars.insert("RATE_LIMIT_WINDOW_SECS", "5");
        vars.insert("AI_MODEL", "openai/gpt-4o-mini");
        vars.insert("SCRAPER_SELECTOR", "#price");

        let cfg = load(&vars).unwrap();
        assert_eq!(cfg.rate_limit.max_requests, 3);
        assert_eq!(cfg.rate_limit.window, Duration::from_secs(5));
        assert_eq!(cfg.ai.model, "openai/gpt-4o-mini");
        assert_eq!(cfg.scraper.selector, "#price");
    }
}
