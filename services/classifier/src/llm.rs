//! LLM upstream client.
//!
//! Calls `<base>/v1/chat/completions` with a deadline, retries only on
//! retryable statuses ({408, 409, 425, 429, ≥500}) and network/timeout
//! errors, and digs a structured-risk draft out of whatever the model
//! returned: a clean JSON body first, then a fenced ```json block, then
//! the widest `{…}` span. A recovered object that resolves no field of
//! the alias table is rejected rather than trusted.

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use sr_retry::{is_retryable_status, RetryPolicy};
use sr_types::Signal;

const SYSTEM_PROMPT: &str = "You are a supply-chain risk analyst. Given an external signal, \
respond with a single JSON object containing: event_type, severity_level \
(LOW|MEDIUM|HIGH|CRITICAL), impact_region, expected_duration_hours, \
classification_confidence (0..1), model_version.";

#[derive(Debug, Clone)]
pub struct LlmClientConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout: Duration,
    /// Total attempts including the first.
    pub max_attempts: u32,
    pub retry_base_delay: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("upstream transport error: {0}")]
    Transport(String),
    #[error("upstream deadline exceeded")]
    Timeout,
    #[error("upstream HTTP {status}")]
    Http { status: u16 },
    #[error("unusable upstream response: {0}")]
    Parse(String),
}

impl LlmError {
    /// Timeouts surface to the retry policy like a 408.
    pub fn retryable(&self) -> bool {
        match self {
            LlmError::Transport(_) | LlmError::Timeout => true,
            LlmError::Http { status } => is_retryable_status(*status),
            LlmError::Parse(_) => false,
        }
    }
}

pub struct LlmClient {
    http: reqwest::Client,
    cfg: LlmClientConfig,
}

impl LlmClient {
    pub fn new(cfg: LlmClientConfig) -> Result<LlmClient, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .build()
            .map_err(|e| LlmError::Transport(e.to_string()))?;
        Ok(LlmClient { http, cfg })
    }

    pub fn base_url(&self) -> &str {
        &self.cfg.base_url
    }

    /// Classify one signal into a raw draft object (alias resolution is
    /// the caller's job, via `StructuredRisk::from_draft`).
    pub async fn classify_draft(
        &self,
        signal: &Signal,
        model: Option<&str>,
        instructions: Option<&str>,
    ) -> Result<Value, LlmError> {
        let policy = RetryPolicy::new(self.cfg.max_attempts, self.cfg.retry_base_delay);
        let mut attempt = 1u32;
        loop {
            match self.request_once(signal, model, instructions).await {
                Ok(draft) => return Ok(draft),
                Err(e) if e.retryable() && attempt < policy.attempts => {
                    let delay = policy.delay(attempt);
                    warn!(
                        attempt,
                        attempts = policy.attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "upstream call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn request_once(
        &self,
        signal: &Signal,
        model: Option<&str>,
        instructions: Option<&str>,
    ) -> Result<Value, LlmError> {
        let url = format!(
            "{}/v1/chat/completions",
            self.cfg.base_url.trim_end_matches('/')
        );
        let system = match instructions {
            Some(extra) => format!("{}\n\n{}", SYSTEM_PROMPT, extra),
            None => SYSTEM_PROMPT.to_owned(),
        };
        let body = json!({
            "model": model.unwrap_or(&self.cfg.model),
            "temperature": 0,
            "response_format": {"type": "json_object"},
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": serde_json::to_string(signal)
                    .map_err(|e| LlmError::Parse(e.to_string()))?},
            ],
        });

        let mut request = self.http.post(&url).json(&body);
        if let Some(key) = &self.cfg.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::Timeout
            } else {
                LlmError::Transport(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            return Err(LlmError::Http { status });
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;
        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| LlmError::Parse("no message content in response".to_owned()))?;

        let draft = extract_json_candidate(content)
            .ok_or_else(|| LlmError::Parse("no JSON object in message content".to_owned()))?;
        debug!(event_id = %signal.event_id, "draft extracted from upstream response");
        Ok(draft)
    }
}

/// Dig a JSON object out of model output.
///
/// Tries, in order: the whole content as JSON; a fenced ```json block;
/// the widest `{…}` span. Objects that resolve no structured-risk field
/// through the alias table are rejected — a coincidentally-parseable
/// substring must not become a classification.
pub fn extract_json_candidate(content: &str) -> Option<Value> {
    let trimmed = content.trim();
    if let Some(value) = parse_draft_object(trimmed) {
        return Some(value);
    }

    if let Some(block) = fenced_json_block(trimmed) {
        if let Some(value) = parse_draft_object(block) {
            return Some(value);
        }
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end > start {
        if let Some(value) = parse_draft_object(&trimmed[start..=end]) {
            return Some(value);
        }
    }
    None
}

fn parse_draft_object(candidate: &str) -> Option<Value> {
    let value: Value = serde_json::from_str(candidate).ok()?;
    let obj = value.as_object()?;
    sr_types::StructuredRisk::draft_has_known_field(obj).then_some(value)
}

fn fenced_json_block(content: &str) -> Option<&str> {
    let fence = content.find("```json")?;
    let after = &content[fence + 7..];
    let close = after.find("```")?;
    Some(after[..close].trim())
}

/// `Classifier` over the upstream client: draft out, alias resolution in.
pub struct LlmClassifier {
    client: Arc<LlmClient>,
}

impl LlmClassifier {
    pub fn new(client: Arc<LlmClient>) -> LlmClassifier {
        LlmClassifier { client }
    }
}

#[async_trait::async_trait]
impl crate::worker::Classifier for LlmClassifier {
    async fn classify(
        &self,
        signal: &Signal,
    ) -> Result<sr_types::StructuredRisk, crate::worker::ClassifyError> {
        let draft = self
            .client
            .classify_draft(signal, None, None)
            .await
            .map_err(|e| crate::worker::ClassifyError::Upstream(e.to_string()))?;
        sr_types::StructuredRisk::from_draft(&signal.event_id, &draft)
            .map_err(|e| crate::worker::ClassifyError::Draft(e.to_string()))
    }
}
