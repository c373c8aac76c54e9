//! Shared state record shapes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Persisted connector cursor state: an opaque JSON blob (etags, cursors,
/// per-item version fingerprints), a last-saved timestamp, and a schema
/// version for forward compatibility of the blob itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorState {
    pub latest: Value,
    pub timestamp: String,
    pub version: u32,
}

impl ConnectorState {
    pub fn new(latest: Value) -> ConnectorState {
        ConnectorState {
            latest,
            timestamp: sr_core::now_rfc3339(),
            version: 1,
        }
    }
}

/// One poll observation fed to the metrics collector.
#[derive(Debug, Clone, Copy)]
pub struct PollRecord {
    pub fetched: u64,
    pub published: u64,
    pub failed: u64,
    pub latency: Duration,
}

impl PollRecord {
    /// A poll succeeded when nothing failed or something got through.
    pub fn successful(&self) -> bool {
        self.failed == 0 || self.published > 0
    }
}

/// Accumulated per-connector metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectorMetrics {
    pub last_poll_time: Option<String>,
    pub last_success_time: Option<String>,
    pub total_polls: u64,
    pub successful_polls: u64,
    pub failed_polls: u64,
    pub items_fetched: u64,
    pub items_published: u64,
    pub average_latency_ms: f64,
}

impl ConnectorMetrics {
    /// Fold one poll into the accumulated view (incremental mean).
    pub fn apply(&mut self, record: &PollRecord, now_utc: String) {
        self.total_polls += 1;
        if record.successful() {
            self.successful_polls += 1;
            self.last_success_time = Some(now_utc.clone());
        } else {
            self.failed_polls += 1;
        }
        self.last_poll_time = Some(now_utc);
        self.items_fetched += record.fetched;
        self.items_published += record.published;
        let latency_ms = record.latency.as_secs_f64() * 1000.0;
        self.average_latency_ms +=
            (latency_ms - self.average_latency_ms) / self.total_polls as f64;
    }
}
