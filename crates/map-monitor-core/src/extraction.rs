//! AI extraction adapter: page content -> price, product match, confidence.
//!
//! The model is asked for a strict JSON object. Its reply is parsed in two
//! explicit stages: a structured parse, then a pattern scan over free text.
//! Malformed output degrades to zero-valued, zero-confidence results; only
//! transport failures against the provider are errors.

use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::completion::{CompletionProvider, CompletionRequest, DEFAULT_MODEL};
use crate::error::ExtractionError;

/// Characters of page content embedded in the prompt.
pub const MAX_CONTENT_CHARS: usize = 2000;
pub const EXTRACTION_TEMPERATURE: f32 = 0.1;
pub const EXTRACTION_MAX_TOKENS: u32 = 500;

/// Result of analysing one fetched page.
#[derive(Debug, Clone, PartialEq)]
pub struct AiAnalysis {
    pub price: f64,
    pub is_valid_product: bool,
    /// In `[0, 1]`
    pub confidence: f64,
    /// `None` when the model's structured reply carried no anomaly array.
    pub anomalies: Option<Vec<String>>,
}

impl AiAnalysis {
    fn zero() -> Self {
        Self {
            price: 0.0,
            is_valid_product: false,
            confidence: 0.0,
            anomalies: Some(Vec::new()),
        }
    }
}

/// Which parse stage produced an analysis.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedAnalysis {
    Strict(AiAnalysis),
    Fallback(AiAnalysis),
}

impl ParsedAnalysis {
    pub fn is_strict(&self) -> bool {
        matches!(self, ParsedAnalysis::Strict(_))
    }

    pub fn analysis(&self) -> &AiAnalysis {
        match self {
            ParsedAnalysis::Strict(a) | ParsedAnalysis::Fallback(a) => a,
        }
    }

    pub fn into_analysis(self) -> AiAnalysis {
        match self {
            ParsedAnalysis::Strict(a) | ParsedAnalysis::Fallback(a) => a,
        }
    }
}

/// Build the extraction prompt for a page, truncating content to
/// [`MAX_CONTENT_CHARS`].
pub fn build_prompt(content: &str, product_name: &str, product_brand: &str) -> String {
    let excerpt: String = content.chars().take(MAX_CONTENT_CHARS).collect();
    format!(
        r#"You are a product price analyzer. Analyze this HTML content and extract the following information in JSON format:
1. Current price (number)
2. Whether this is the correct product based on these details: {product_name}, {product_brand} (true/false)
3. Confidence score between 0 and 1
4. List any pricing anomalies found (e.g., bundle deals, special offers)

Respond only with JSON in this format:
{{
    "price": number,
    "isValidProduct": boolean,
    "confidence": number,
    "anomalies": string[]
}}

HTML Content:
{excerpt}
"#
    )
}

/// Parse a model reply. Never fails.
pub fn parse_analysis(text: &str) -> ParsedAnalysis {
    match parse_strict(text) {
        Some(analysis) => ParsedAnalysis::Strict(analysis),
        None => ParsedAnalysis::Fallback(parse_fallback(text)),
    }
}

/// Structured stage: the reply (or the `{...}` span inside it) must be a
/// JSON object.
fn parse_strict(text: &str) -> Option<AiAnalysis> {
    let trimmed = text.trim();
    let object = json_object(trimmed).or_else(|| {
        let start = trimmed.find('{')?;
        let end = trimmed.rfind('}')?;
        (start < end)
            .then(|| json_object(&trimmed[start..=end]))
            .flatten()
    })?;

    let anomalies: Option<Vec<String>> = match object.get("anomalies") {
        Some(Value::Array(items)) => Some(items.iter().map(anomaly_text).collect()),
        _ => None,
    };

    // No usable price means nothing downstream may act on this reply.
    let Some(price) = number_field(&object, "price").filter(|p| *p >= 0.0) else {
        debug!("structured reply carried no usable price");
        return Some(AiAnalysis {
            anomalies,
            ..AiAnalysis::zero()
        });
    };

    Some(AiAnalysis {
        price,
        is_valid_product: bool_field(&object, "isValidProduct"),
        confidence: clamp_confidence(number_field(&object, "confidence").unwrap_or(0.0)),
        anomalies,
    })
}

fn json_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// A finite number, given either as a JSON number or a numeric string.
fn number_field(object: &Map<String, Value>, key: &str) -> Option<f64> {
    let n = match object.get(key) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    n.filter(|v| v.is_finite())
}

fn bool_field(object: &Map<String, Value>, key: &str) -> bool {
    match object.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.trim().eq_ignore_ascii_case("true"),
        Some(Value::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
        _ => false,
    }
}

fn anomaly_text(item: &Value) -> String {
    match item {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn clamp_confidence(c: f64) -> f64 {
    if c.is_nan() {
        0.0
    } else {
        c.clamp(0.0, 1.0)
    }
}

struct FallbackPatterns {
    price: Regex,
    confidence: Regex,
    valid: Regex,
}

fn fallback_patterns() -> Option<&'static FallbackPatterns> {
    static PATTERNS: OnceLock<Option<FallbackPatterns>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            let compiled = (|| -> Result<FallbackPatterns, regex::Error> {
                Ok(FallbackPatterns {
                    price: Regex::new(r"(?i)price:\s*(\d+\.?\d*)")?,
                    confidence: Regex::new(r"(?i)confidence:\s*(\d+\.?\d*)")?,
                    valid: Regex::new(r"(?i)valid:\s*(true|false)")?,
                })
            })();
            compiled
                .map_err(|e| warn!(error = %e, "fallback patterns failed to compile"))
                .ok()
        })
        .as_ref()
}

/// Pattern stage: scan free text for `price:`, `confidence:` and `valid:`.
fn parse_fallback(text: &str) -> AiAnalysis {
    let Some(p) = fallback_patterns() else {
        return AiAnalysis::zero();
    };
    let capture_f64 = |re: &Regex| {
        re.captures(text)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<f64>().ok())
    };

    let Some(price) = capture_f64(&p.price) else {
        return AiAnalysis::zero();
    };

    AiAnalysis {
        price,
        is_valid_product: p
            .valid
            .captures(text)
            .and_then(|c| c.get(1))
            .is_some_and(|m| m.as_str().eq_ignore_ascii_case("true")),
        confidence: clamp_confidence(capture_f64(&p.confidence).unwrap_or(0.0)),
        anomalies: Some(Vec::new()),
    }
}

/// Runs the extraction prompt against a [`CompletionProvider`].
#[derive(Clone)]
pub struct AiExtractor {
    provider: Arc<dyn CompletionProvider>,
    model: String,
}

impl AiExtractor {
    pub fn new(provider: Arc<dyn CompletionProvider>) -> Self {
        Self {
            provider,
            model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    /// Analyse fetched page content for the given product.
    pub async fn extract(
        &self,
        content: &str,
        product_name: &str,
        product_brand: &str,
    ) -> Result<AiAnalysis, ExtractionError> {
        let request =
            CompletionRequest::user_prompt(&self.model, build_prompt(content, product_name, product_brand))
                .with_temperature(EXTRACTION_TEMPERATURE)
                .with_max_tokens(EXTRACTION_MAX_TOKENS);

        let reply = self.provider.complete(&request).await?;
        let parsed = parse_analysis(&reply);
        if !parsed.is_strict() {
            debug!("model reply was not JSON, used pattern fallback");
        }
        Ok(parsed.into_analysis())
    }
}
