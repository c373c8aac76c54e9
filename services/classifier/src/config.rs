//! Classifier service configuration.
//!
//! | Variable | Default |
//! |---|---|
//! | `REDIS_URL` | `redis://127.0.0.1:6379` |
//! | `CLASSIFIER_MODE` | `RULE_BASED` (`RULE_BASED` or `LLM`) |
//! | `CONFIDENCE_THRESHOLD` | `0.65` |
//! | `MODEL_VERSION` | `rules-v1` |
//! | `LLM_ENDPOINT` | unset — required in LLM mode (fatal when missing) |
//! | `LLM_API_KEY` | unset |
//! | `LLM_MODEL` | `gpt-4o-mini` |
//! | `LLM_TIMEOUT_MS` | `8000` |
//! | `LLM_MAX_CONCURRENCY` | `8` |
//! | `LLM_MAX_QUEUE_SIZE` | `500` |
//! | `LLM_MAX_RETRIES` | `2` |
//! | `LLM_RETRY_BASE_DELAY_MS` | `150` |
//! | `ADAPTER_BIND` | `0.0.0.0:8081` |
//! | `CONSUMER_GROUP` | `classification` |
//! | `CONSUMER_NAME` | `<role>-<host>-<pid>` |
//! | `CONSUMER_BLOCK_MS` / `CONSUMER_BATCH_SIZE` / `MAX_DELIVERIES` | `5000` / `50` / `5` |
//! | `RETRY_KEY_TTL_SECONDS` | `86400` |

use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifierMode {
    RuleBased,
    Llm,
}

fn env_str(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_owned())
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: FromStr + Copy>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub redis_url: String,
    pub mode: ClassifierMode,
    pub confidence_threshold: f64,
    pub llm_endpoint: Option<String>,
    pub llm_api_key: Option<String>,
    pub llm_model: String,
    pub llm_timeout_ms: u64,
    pub llm_max_concurrency: usize,
    pub llm_max_queue_size: usize,
    pub llm_max_retries: u32,
    pub llm_retry_base_delay_ms: u64,
    pub adapter_bind: String,
    pub consumer_group: String,
    pub consumer_name: Option<String>,
    pub consumer_block_ms: u64,
    pub consumer_batch_size: usize,
    pub max_deliveries: u64,
    pub retry_key_ttl_seconds: u64,
}

/// Unrecoverable configuration; abort startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("CLASSIFIER_MODE must be RULE_BASED or LLM, got '{0}'")]
    BadMode(String),
    #[error("LLM_ENDPOINT is required when CLASSIFIER_MODE=LLM")]
    MissingLlmEndpoint,
}

impl ClassifierConfig {
    pub fn from_env() -> Result<ClassifierConfig, ConfigError> {
        let mode_raw = env_str("CLASSIFIER_MODE", "RULE_BASED");
        let mode = match mode_raw.to_ascii_uppercase().as_str() {
            "RULE_BASED" => ClassifierMode::RuleBased,
            "LLM" => ClassifierMode::Llm,
            _ => return Err(ConfigError::BadMode(mode_raw)),
        };
        let llm_endpoint = env_opt("LLM_ENDPOINT");
        if mode == ClassifierMode::Llm && llm_endpoint.is_none() {
            return Err(ConfigError::MissingLlmEndpoint);
        }

        Ok(ClassifierConfig {
            redis_url: env_str("REDIS_URL", "redis://127.0.0.1:6379"),
            mode,
            confidence_threshold: env_parse("CONFIDENCE_THRESHOLD", 0.65),
            llm_endpoint,
            llm_api_key: env_opt("LLM_API_KEY"),
            llm_model: env_str("LLM_MODEL", "gpt-4o-mini"),
            llm_timeout_ms: env_parse("LLM_TIMEOUT_MS", 8_000),
            llm_max_concurrency: env_parse("LLM_MAX_CONCURRENCY", 8),
            llm_max_queue_size: env_parse("LLM_MAX_QUEUE_SIZE", 500),
            llm_max_retries: env_parse("LLM_MAX_RETRIES", 2),
            llm_retry_base_delay_ms: env_parse("LLM_RETRY_BASE_DELAY_MS", 150),
            adapter_bind: env_str("ADAPTER_BIND", "0.0.0.0:8081"),
            consumer_group: env_str("CONSUMER_GROUP", "classification"),
            consumer_name: env_opt("CONSUMER_NAME"),
            consumer_block_ms: env_parse("CONSUMER_BLOCK_MS", 5_000),
            consumer_batch_size: env_parse("CONSUMER_BATCH_SIZE", 50),
            max_deliveries: env_parse("MAX_DELIVERIES", 5),
            retry_key_ttl_seconds: env_parse("RETRY_KEY_TTL_SECONDS", 86_400),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_rule_based() {
        let cfg = ClassifierConfig::from_env().unwrap();
        assert_eq!(cfg.mode, ClassifierMode::RuleBased);
        assert!((cfg.confidence_threshold - 0.65).abs() < f64::EPSILON);
        assert_eq!(cfg.llm_timeout_ms, 8_000);
        assert_eq!(cfg.llm_max_retries, 2);
    }
}
