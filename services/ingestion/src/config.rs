//! Ingestion service configuration.
//!
//! Environment variables with documented fallbacks; no config file.
//!
//! | Variable | Default |
//! |---|---|
//! | `REDIS_URL` | `redis://127.0.0.1:6379` |
//! | `STREAM_MAX_LEN` | `100000` |
//! | `DEDUP_TTL_SECONDS` | `604800` |
//! | `RETRY_KEY_TTL_SECONDS` | `86400` |
//! | `CONSUMER_BLOCK_MS` | `5000` |
//! | `CONSUMER_BATCH_SIZE` | `50` |
//! | `MAX_DELIVERIES` | `5` |
//! | `CONSUMER_GROUP` | `ingestion` |
//! | `CONSUMER_NAME` | `<role>-<host>-<pid>` |
//! | `MAX_PUBLISH_ATTEMPTS` | `4` |
//! | `PUBLISH_RETRY_BASE_DELAY_MS` | `50` |
//! | `GATEWAY_BIND` | `0.0.0.0:8080` |
//! | `GATEWAY_AUTH_TOKEN` | unset (auth disabled) |
//! | `MAX_REQUEST_BYTES` | `1048576` |
//! | `GATEWAY_MAX_CONCURRENCY` | `8` |
//! | `GATEWAY_MAX_QUEUE_SIZE` | `500` |

use std::str::FromStr;

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
pub struct IngestionConfig {
    pub redis_url: String,
    pub stream_max_len: usize,
    pub dedup_ttl_seconds: u64,
    pub retry_key_ttl_seconds: u64,
    pub consumer_block_ms: u64,
    pub consumer_batch_size: usize,
    pub max_deliveries: u64,
    pub consumer_group: String,
    pub consumer_name: Option<String>,
    pub max_publish_attempts: u32,
    pub publish_retry_base_delay_ms: u64,
    pub gateway_bind: String,
    pub gateway_auth_token: Option<String>,
    pub max_request_bytes: usize,
    pub gateway_max_concurrency: usize,
    pub gateway_max_queue_size: usize,
}

impl IngestionConfig {
    pub fn from_env() -> IngestionConfig {
        IngestionConfig {
            redis_url: env_str("REDIS_URL", "redis://127.0.0.1:6379"),
            stream_max_len: env_parse("STREAM_MAX_LEN", 100_000),
            dedup_ttl_seconds: env_parse("DEDUP_TTL_SECONDS", 604_800),
            retry_key_ttl_seconds: env_parse("RETRY_KEY_TTL_SECONDS", 86_400),
            consumer_block_ms: env_parse("CONSUMER_BLOCK_MS", 5_000),
            consumer_batch_size: env_parse("CONSUMER_BATCH_SIZE", 50),
            max_deliveries: env_parse("MAX_DELIVERIES", 5),
            consumer_group: env_str("CONSUMER_GROUP", "ingestion"),
            consumer_name: env_opt("CONSUMER_NAME"),
            max_publish_attempts: env_parse("MAX_PUBLISH_ATTEMPTS", 4),
            publish_retry_base_delay_ms: env_parse("PUBLISH_RETRY_BASE_DELAY_MS", 50),
            gateway_bind: env_str("GATEWAY_BIND", "0.0.0.0:8080"),
            gateway_auth_token: env_opt("GATEWAY_AUTH_TOKEN"),
            max_request_bytes: env_parse("MAX_REQUEST_BYTES", 1_048_576),
            gateway_max_concurrency: env_parse("GATEWAY_MAX_CONCURRENCY", 8),
            gateway_max_queue_size: env_parse("GATEWAY_MAX_QUEUE_SIZE", 500),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_env() {
        let cfg = IngestionConfig::from_env();
        assert_eq!(cfg.stream_max_len, 100_000);
        assert_eq!(cfg.dedup_ttl_seconds, 604_800);
        assert_eq!(cfg.max_publish_attempts, 4);
        assert_eq!(cfg.consumer_group, "ingestion");
    }
}
