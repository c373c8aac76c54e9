//! Gateway request metrics.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Shared counters surfaced on `/health`.
#[derive(Debug, Default)]
pub struct GatewayMetrics {
    requests_total: AtomicU64,
    requests_failed: AtomicU64,
    requests_in_flight: AtomicU64,
    queue_depth: AtomicU64,
    queue_overflow_rejections: AtomicU64,
}

/// Point-in-time view for serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GatewayMetricsSnapshot {
    pub requests_total: u64,
    pub requests_failed: u64,
    pub requests_in_flight: u64,
    pub queue_depth: u64,
    pub queue_overflow_rejections: u64,
}

impl GatewayMetrics {
    pub fn record_request(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.requests_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn slot_acquired(&self) {
        self.requests_in_flight.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn slot_released(&self) {
        self.requests_in_flight.fetch_sub(1, Ordering::Relaxed);
    }

    pub(crate) fn set_queue_depth(&self, depth: u64) {
        self.queue_depth.store(depth, Ordering::Relaxed);
    }

    pub(crate) fn record_overflow(&self) {
        self.queue_overflow_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> GatewayMetricsSnapshot {
        GatewayMetricsSnapshot {
            requests_total: self.requests_total.load(Ordering::Relaxed),
            requests_failed: self.requests_failed.load(Ordering::Relaxed),
            requests_in_flight: self.requests_in_flight.load(Ordering::Relaxed),
            queue_depth: self.queue_depth.load(Ordering::Relaxed),
            queue_overflow_rejections: self.queue_overflow_rejections.load(Ordering::Relaxed),
        }
    }
}
