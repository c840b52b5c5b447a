//! LLM price adjuster. The adjuster never fails a pricing run: any client
//! error, timeout, or unparseable answer folds into a fail-closed result
//! that keeps the candidate price with zero confidence. Quota reservation
//! happens upstream, before a call reaches this module.

use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use priceye_core::config::{LlmConfig, LlmProvider};

use crate::brief::ContextualBrief;

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Result of one adjustment. `available = false` marks the fail-closed path
/// so the combiner can skip the confidence averaging.
#[derive(Clone, Debug, PartialEq)]
pub struct AdjustedPrice {
    pub price: f64,
    /// 0..=100.
    pub confidence: f64,
    pub rationale: String,
    pub key_factors: Vec<String>,
    /// The model stepped outside the allowed band and was clamped.
    pub bound_limited: bool,
    pub available: bool,
}

impl AdjustedPrice {
    fn unavailable(candidate: f64) -> Self {
        Self {
            price: candidate,
            confidence: 0.0,
            rationale: "adjuster unavailable".to_string(),
            key_factors: Vec::new(),
            bound_limited: false,
            available: false,
        }
    }
}

pub struct LlmAdjuster {
    client: std::sync::Arc<dyn LlmClient>,
    bound_pct: f64,
}

impl LlmAdjuster {
    pub fn new(client: std::sync::Arc<dyn LlmClient>, bound_pct: f64) -> Self {
        Self { client, bound_pct }
    }

    pub async fn adjust(&self, candidate: f64, brief: &ContextualBrief) -> AdjustedPrice {
        let prompt = brief.render(candidate);
        let raw = match self.client.complete(&prompt).await {
            Ok(raw) => raw,
            Err(error) => {
                warn!(
                    event_name = "adjuster.call_failed",
                    date = %brief.date,
                    error = %error,
                    "falling back to the candidate price"
                );
                return AdjustedPrice::unavailable(candidate);
            }
        };

        let parsed = match parse_adjustment(&raw) {
            Some(parsed) => parsed,
            None => {
                warn!(
                    event_name = "adjuster.unparseable_answer",
                    date = %brief.date,
                    "falling back to the candidate price"
                );
                return AdjustedPrice::unavailable(candidate);
            }
        };

        let limit = candidate * self.bound_pct / 100.0;
        let clamped = parsed.adjusted_price.clamp(candidate - limit, candidate + limit);
        AdjustedPrice {
            price: clamped.max(0.0),
            confidence: parsed.confidence.unwrap_or(0.0).clamp(0.0, 100.0),
            rationale: parsed.rationale.unwrap_or_default(),
            key_factors: parsed.key_factors.unwrap_or_default(),
            bound_limited: (clamped - parsed.adjusted_price).abs() > f64::EPSILON,
            available: true,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawAdjustment {
    adjusted_price: f64,
    confidence: Option<f64>,
    rationale: Option<String>,
    key_factors: Option<Vec<String>>,
}

/// Extracts the first JSON object from a completion. Models occasionally
/// wrap the answer in prose or a code fence.
fn parse_adjustment(raw: &str) -> Option<RawAdjustment> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&raw[start..=end]).ok()
}

const OPENAI_BASE_URL: &str = "https://api.openai.com";
const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";

/// Provider-agnostic HTTP client. One request per completion; the deadline
/// from config covers the whole call.
pub struct HttpLlmClient {
    client: reqwest::Client,
    config: LlmConfig,
}

impl HttpLlmClient {
    pub fn new(config: LlmConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client, config }
    }

    fn base_url(&self) -> &str {
        match (&self.config.base_url, self.config.provider) {
            (Some(base), _) => base.as_str(),
            (None, LlmProvider::OpenAi) => OPENAI_BASE_URL,
            (None, LlmProvider::Anthropic) => ANTHROPIC_BASE_URL,
            // validated at config load; ollama always carries a base_url
            (None, LlmProvider::Ollama) => "http://localhost:11434",
        }
    }

    fn api_key(&self) -> Result<&str> {
        self.config
            .api_key
            .as_ref()
            .map(|key| key.expose_secret())
            .ok_or_else(|| anyhow!("llm api key is not configured"))
    }

    async fn complete_openai(&self, prompt: &str) -> Result<String> {
        let body = json!({
            "model": self.config.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": 0.2,
        });
        let payload: Value = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url()))
            .bearer_auth(self.api_key()?)
            .json(&body)
            .send()
            .await
            .context("openai request failed")?
            .error_for_status()
            .context("openai answered with an error status")?
            .json()
            .await
            .context("openai answer was not json")?;
        payload
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| anyhow!("openai answer had no message content"))
    }

    async fn complete_anthropic(&self, prompt: &str) -> Result<String> {
        let body = json!({
            "model": self.config.model,
            "max_tokens": 1024,
            "messages": [{ "role": "user", "content": prompt }],
        });
        let payload: Value = self
            .client
            .post(format!("{}/v1/messages", self.base_url()))
            .header("x-api-key", self.api_key()?)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await
            .context("anthropic request failed")?
            .error_for_status()
            .context("anthropic answered with an error status")?
            .json()
            .await
            .context("anthropic answer was not json")?;
        payload
            .pointer("/content/0/text")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| anyhow!("anthropic answer had no text content"))
    }

    async fn complete_ollama(&self, prompt: &str) -> Result<String> {
        let body = json!({
            "model": self.config.model,
            "prompt": prompt,
            "stream": false,
        });
        let payload: Value = self
            .client
            .post(format!("{}/api/generate", self.base_url()))
            .json(&body)
            .send()
            .await
            .context("ollama request failed")?
            .error_for_status()
            .context("ollama answered with an error status")?
            .json()
            .await
            .context("ollama answer was not json")?;
        payload
            .get("response")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| anyhow!("ollama answer had no response field"))
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        match self.config.provider {
            LlmProvider::OpenAi => self.complete_openai(prompt).await,
            LlmProvider::Anthropic => self.complete_anthropic(prompt).await,
            LlmProvider::Ollama => self.complete_ollama(prompt).await,
        }
    }
}

/// Test double answering from a primed queue. An exhausted queue errors,
/// which exercises the fail-closed path.
#[derive(Default)]
pub struct ScriptedLlmClient {
    script: Mutex<VecDeque<Result<String>>>,
    calls: Mutex<usize>,
}

impl ScriptedLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_response(&self, response: impl Into<String>) {
        self.lock_script().push_back(Ok(response.into()));
    }

    pub fn push_failure(&self, reason: impl Into<String>) {
        self.lock_script().push_back(Err(anyhow!(reason.into())));
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_script(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<String>>> {
        self.script.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, _prompt: &str) -> Result<String> {
        *self.calls.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) += 1;
        self.lock_script().pop_front().unwrap_or_else(|| Err(anyhow!("llm script exhausted")))
    }
}
