//! The ingestion core: normalize, dedup, publish with retry, recover.
//!
//! # At-least-once publish, exactly-once effect
//! Each normalized signal is published to `external-signals` at most once
//! per dedup-TTL window: the idempotency mark is taken first, and a
//! publish that exhausts its retries clears the mark and parks the signal
//! on the in-memory pending queue for the next cycle. Crash recovery
//! relies on the upstream raw stream retaining the source record.

use serde::Serialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use crate::source::SignalSource;
use sr_bus::{publish_message, EventPublisher};
use sr_retry::{with_retry_notify, RetryPolicy};
use sr_state::IdempotencyStore;
use sr_types::{streams, Signal};

/// Outcome of one `ingest_signals` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub polled: u64,
    pub queued: u64,
    pub skipped_deduplicated: u64,
    pub published: u64,
    pub failed: u64,
    /// Signals still parked after this call (publish failed; retried next
    /// cycle).
    pub pending: u64,
}

pub struct IngestionService {
    sources: Vec<Arc<dyn SignalSource>>,
    publisher: Arc<dyn EventPublisher>,
    dedup: Arc<dyn IdempotencyStore>,
    retry: RetryPolicy,
    output_stream: String,
    pending: Mutex<VecDeque<Signal>>,
}

impl IngestionService {
    pub fn new(
        sources: Vec<Arc<dyn SignalSource>>,
        publisher: Arc<dyn EventPublisher>,
        dedup: Arc<dyn IdempotencyStore>,
        retry: RetryPolicy,
    ) -> IngestionService {
        IngestionService {
            sources,
            publisher,
            dedup,
            retry,
            output_stream: streams::EXTERNAL_SIGNALS.to_owned(),
            pending: Mutex::new(VecDeque::new()),
        }
    }

    /// Number of signals currently parked for retry.
    pub async fn pending_len(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Poll every source (failures isolated per source), then ingest
    /// whatever they produced plus anything already parked.
    pub async fn run_cycle(&self) -> IngestSummary {
        let mut raw_events = Vec::new();
        for source in &self.sources {
            match source.poll().await {
                Ok(events) => raw_events.extend(events),
                Err(e) => {
                    warn!(source = source.name(), error = %e, "source poll failed, skipping")
                }
            }
        }
        self.ingest_signals(&raw_events).await
    }

    /// Normalize, enqueue, dedup, and publish a batch of raw events.
    pub async fn ingest_signals(&self, raw_events: &[Value]) -> IngestSummary {
        let mut summary = IngestSummary {
            polled: raw_events.len() as u64,
            ..IngestSummary::default()
        };

        // Normalize into the pending queue, skipping event ids already
        // parked there.
        {
            let mut pending = self.pending.lock().await;
            for raw in raw_events {
                match Signal::normalize(raw) {
                    Ok(signal) => {
                        if pending.iter().any(|s| s.event_id == signal.event_id) {
                            continue;
                        }
                        pending.push_back(signal);
                        summary.queued += 1;
                    }
                    Err(e) => {
                        warn!(error = %e, "dropping unnormalizable raw event");
                        summary.failed += 1;
                    }
                }
            }
        }

        // Publish pending signals in FIFO order.
        let drained: Vec<Signal> = {
            let mut pending = self.pending.lock().await;
            pending.drain(..).collect()
        };
        let mut parked = VecDeque::new();

        for signal in drained {
            match self
                .dedup
                .mark_if_first_seen(&self.output_stream, &signal.event_id)
                .await
            {
                Ok(true) => {}
                Ok(false) => {
                    debug!(event_id = %signal.event_id, "duplicate within dedup window, skipping");
                    summary.skipped_deduplicated += 1;
                    continue;
                }
                Err(e) => {
                    // Dedup store unreachable: keep the signal parked and
                    // try again next cycle rather than risking duplicates.
                    warn!(event_id = %signal.event_id, error = %e, "dedup store unavailable");
                    summary.failed += 1;
                    parked.push_back(signal);
                    continue;
                }
            }

            let publisher = self.publisher.as_ref();
            let stream = self.output_stream.as_str();
            let event_id = signal.event_id.clone();
            let mut publish = || publish_message(publisher, stream, &signal);
            let result = with_retry_notify(
                self.retry,
                |ctx| {
                    warn!(
                        stream,
                        event_id = %event_id,
                        attempt = ctx.attempt,
                        attempts = ctx.attempts,
                        delay_ms = ctx.delay.as_millis() as u64,
                        error = %ctx.error,
                        "publish failed, retrying"
                    );
                },
                &mut publish,
            )
            .await;

            match result {
                Ok(record) => {
                    debug!(event_id = %event_id, id = %record.id, "signal published");
                    summary.published += 1;
                }
                Err(e) => {
                    error!(event_id = %event_id, error = %e, "publish exhausted retries");
                    summary.failed += 1;
                    // Clear the mark so the retry next cycle is not
                    // counted as a duplicate of itself.
                    if let Err(clear_err) =
                        self.dedup.clear(&self.output_stream, &event_id).await
                    {
                        warn!(event_id = %event_id, error = %clear_err, "dedup clear failed");
                    }
                    parked.push_back(signal);
                }
            }
        }

        let mut pending = self.pending.lock().await;
        pending.extend(parked);
        summary.pending = pending.len() as u64;
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::StaticSource;
    use serde_json::json;
    use sr_bus::{EventStreamReader, MemoryBus};
    use sr_state::MemoryStateStore;
    use std::time::Duration;

    fn service(bus: &MemoryBus, store: &MemoryStateStore) -> IngestionService {
        service_with_sources(bus, store, Vec::new())
    }

    fn service_with_sources(
        bus: &MemoryBus,
        store: &MemoryStateStore,
        sources: Vec<Arc<dyn SignalSource>>,
    ) -> IngestionService {
        IngestionService::new(
            sources,
            Arc::new(bus.clone()),
            Arc::new(store.clone()),
            RetryPolicy::new(4, Duration::from_millis(1)),
        )
    }

    fn raw(event_id: &str) -> Value {
        json!({
            "event_id": event_id,
            "source_type": "NEWS",
            "raw_content": "x",
            "source_reference": "r",
            "geographic_scope": "US-TX",
            "timestamp_utc": "2026-02-23T10:00:00Z",
            "signal_confidence": 0.8,
        })
    }

    #[tokio::test]
    async fn publishes_normalized_signal() {
        let bus = MemoryBus::new();
        let store = MemoryStateStore::new();
        let svc = service(&bus, &store);
        let summary = svc.ingest_signals(&[raw("e1")]).await;
        assert_eq!(summary.published, 1);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.pending, 0);

        let records = bus.read_recent("external-signals", 10).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message["event_id"], "e1");
        assert_eq!(records[0].message["source_type"], "NEWS");
    }

    #[tokio::test]
    async fn duplicate_within_window_is_skipped() {
        let bus = MemoryBus::new();
        let store = MemoryStateStore::new();
        let svc = service(&bus, &store);
        svc.ingest_signals(&[raw("e1")]).await;
        let second = svc.ingest_signals(&[raw("e1")]).await;
        assert_eq!(second.published, 0);
        assert_eq!(second.skipped_deduplicated, 1);
        assert_eq!(
            bus.read_recent("external-signals", 10).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn transient_publish_failures_retry_within_call() {
        let bus = MemoryBus::with_publish_failure_budget(2);
        let store = MemoryStateStore::new();
        let svc = service(&bus, &store);
        let summary = svc.ingest_signals(&[raw("e1")]).await;
        assert_eq!(summary.published, 1);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.pending, 0);
        assert_eq!(bus.publish_invocations().await, 3);
    }

    #[tokio::test]
    async fn terminal_failure_parks_and_clears_mark() {
        // Budget larger than the retry schedule: every attempt fails.
        let bus = MemoryBus::with_publish_failure_budget(4);
        let store = MemoryStateStore::new();
        let svc = service(&bus, &store);
        let summary = svc.ingest_signals(&[raw("e1")]).await;
        assert_eq!(summary.published, 0);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.pending, 1);

        // Next cycle retries the parked signal; the cleared mark lets it
        // through.
        let recovery = svc.ingest_signals(&[]).await;
        assert_eq!(recovery.published, 1);
        assert_eq!(recovery.skipped_deduplicated, 0);
        assert_eq!(recovery.pending, 0);
        assert_eq!(
            bus.read_recent("external-signals", 10).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn pending_queue_dedups_by_event_id() {
        let bus = MemoryBus::with_publish_failure_budget(4);
        let store = MemoryStateStore::new();
        let svc = service(&bus, &store);
        svc.ingest_signals(&[raw("e1")]).await;
        // Same event arrives again while parked: queued once only.
        let summary = svc.ingest_signals(&[raw("e1")]).await;
        assert_eq!(summary.queued, 0);
        assert_eq!(svc.pending_len().await, 0, "recovered on this call");
    }

    #[tokio::test]
    async fn run_cycle_isolates_failing_sources() {
        struct FailingSource;
        #[async_trait::async_trait]
        impl SignalSource for FailingSource {
            fn name(&self) -> &str {
                "broken"
            }
            async fn poll(&self) -> Result<Vec<Value>, crate::source::SourceError> {
                Err(crate::source::SourceError::new("connection refused"))
            }
        }

        let bus = MemoryBus::new();
        let store = MemoryStateStore::new();
        let svc = service_with_sources(
            &bus,
            &store,
            vec![
                Arc::new(FailingSource),
                Arc::new(StaticSource::new("ok", vec![raw("e1")])),
            ],
        );
        let summary = svc.run_cycle().await;
        assert_eq!(summary.published, 1, "healthy source still ran");
    }

    #[tokio::test]
    async fn unnormalizable_event_counts_failed() {
        let bus = MemoryBus::new();
        let store = MemoryStateStore::new();
        let svc = service(&bus, &store);
        let summary = svc.ingest_signals(&[json!(["not", "an", "object"])]).await;
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.published, 0);
    }
}
