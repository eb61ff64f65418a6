//! Natural-language activity extraction.
//!
//! A chat message such as "ran 5km and read 40 pages" is sent to a language
//! model with a fixed instruction prompt; the JSON it returns becomes a list
//! of [`ParsedActivity`] values. Model output is treated as untrusted: fences
//! are stripped, malformed entries are dropped, and an unparseable reply
//! yields an empty list.

use std::env;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, instrument, warn};

use crate::{GroveError, Result};

/// Activities below this confidence are not logged.
pub const MIN_CONFIDENCE: f64 = 0.7;

pub const CATEGORIES: [&str; 7] = [
    "health",
    "relationships",
    "learning",
    "career",
    "finance",
    "mindfulness",
    "custom",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedActivity {
    pub metric: String,
    pub value: f64,
    #[serde(default)]
    pub unit: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub is_new_metric: bool,
}

fn default_category() -> String {
    "custom".to_string()
}

impl ParsedActivity {
    pub fn is_confident(&self) -> bool {
        self.confidence >= MIN_CONFIDENCE
    }
}

/// A text-in, text-out model endpoint.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
}

impl GeminiConfig {
    /// `GOOGLE_GEMINI_API_KEY` is required; `GEMINI_MODEL` and
    /// `GEMINI_API_URL` are optional.
    pub fn from_env() -> Option<Self> {
        let api_key = env::var("GOOGLE_GEMINI_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())?;
        Some(Self {
            api_url: env::var("GEMINI_API_URL")
                .unwrap_or_else(|_| "https://generativelanguage.googleapis.com".to_string()),
            api_key,
            model: env::var("GEMINI_MODEL").unwrap_or_else(|_| "gemini-pro".to_string()),
        })
    }
}

/// [`LanguageModel`] backed by the Gemini `generateContent` REST endpoint.
pub struct GeminiModel {
    http: reqwest::Client,
    config: GeminiConfig,
}

impl GeminiModel {
    pub fn new(http: reqwest::Client, config: GeminiConfig) -> Self {
        Self { http, config }
    }
}

#[async_trait]
impl LanguageModel for GeminiModel {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.api_url.trim_end_matches('/'),
            self.config.model
        );
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
        });

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GroveError::Model(format!("gemini request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(GroveError::Model(format!("gemini returned {status}: {text}")));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| GroveError::Model(format!("gemini response was not JSON: {e}")))?;
        candidate_text(&payload)
            .ok_or_else(|| GroveError::Model("gemini response had no candidate text".to_string()))
    }
}

fn candidate_text(payload: &Value) -> Option<String> {
    let parts = payload.pointer("/candidates/0/content/parts")?.as_array()?;
    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .collect();
    (!text.is_empty()).then_some(text)
}

#[derive(Clone)]
pub struct ActivityExtractor {
    model: Arc<dyn LanguageModel>,
}

impl ActivityExtractor {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    /// Extract trackable activities from `message`. Transport failures are
    /// errors; unusable model output is an empty list.
    #[instrument(skip(self, existing_metrics))]
    pub async fn parse_natural_language(
        &self,
        message: &str,
        existing_metrics: &[String],
    ) -> Result<Vec<ParsedActivity>> {
        let prompt = build_prompt(message, existing_metrics);
        let reply = self.model.generate(&prompt).await?;
        Ok(parse_model_output(&reply))
    }
}

pub fn build_prompt(message: &str, existing_metrics: &[String]) -> String {
    format!(
        "You are a life tracking assistant. Extract trackable activities from this message.\n\
        \n\
        The user already tracks: {existing}\n\
        \n\
        Message: \"{message}\"\n\
        \n\
        Return ONLY a JSON array. Each item needs:\n\
        - metric: snake_case name\n\
        - value: number\n\
        - unit: what's measured\n\
        - category: {categories}\n\
        - confidence: 0-1\n\
        - is_new_metric: boolean\n\
        \n\
        If nothing trackable, return []\n\
        Return ONLY valid JSON, no explanation.",
        existing = existing_metrics.join(", "),
        categories = CATEGORIES.join("/"),
    )
}

fn fence_pattern() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| Regex::new(r"```(?:json)?\n?").expect("fence pattern is valid"))
}

/// Remove markdown code fences the model wraps around its JSON.
pub fn strip_code_fences(text: &str) -> String {
    fence_pattern().replace_all(text, "").trim().to_string()
}

pub fn parse_model_output(text: &str) -> Vec<ParsedActivity> {
    let cleaned = strip_code_fences(text);
    let parsed: Value = match serde_json::from_str(&cleaned) {
        Ok(value) => value,
        Err(e) => {
            warn!(raw = %text, "failed to parse model response: {}", e);
            return Vec::new();
        }
    };

    let items = match parsed {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("activities") {
            Some(Value::Array(items)) => items,
            _ => {
                warn!(raw = %text, "model response object has no activities array");
                return Vec::new();
            }
        },
        _ => {
            warn!(raw = %text, "model response is not a JSON array");
            return Vec::new();
        }
    };

    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<ParsedActivity>(item.clone()) {
            Ok(activity) => Some(activity),
            Err(e) => {
                debug!(item = %item, "skipping malformed activity: {}", e);
                None
            }
        })
        .collect()
}
