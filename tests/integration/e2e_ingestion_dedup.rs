//! End-to-end ingestion dedup.
//!
//! The same raw signal posted to the gateway twice within the dedup
//! window is accepted twice at the HTTP edge, lands twice on the raw
//! stream, and is published to `external-signals` exactly once.

use std::sync::Arc;
use std::time::Duration;

use ingestion::http;
use ingestion::service::IngestionService;
use ingestion::worker::RawSignalHandler;
use serde_json::{json, Value};
use sr_bus::{EventStreamReader, MemoryBus};
use sr_retry::RetryPolicy;
use sr_state::MemoryStateStore;
use sr_worker::{StreamWorker, WorkerConfig};

fn raw_signal() -> Value {
    json!({
        "event_id": "e1",
        "source_type": "NEWS",
        "raw_content": "x",
        "source_reference": "r",
        "geographic_scope": "US-TX",
        "timestamp_utc": "2026-02-23T10:00:00Z",
        "signal_confidence": 0.8,
    })
}

fn ingest_worker(bus: &MemoryBus, store: &MemoryStateStore) -> (Arc<IngestionService>, StreamWorker) {
    let service = Arc::new(IngestionService::new(
        Vec::new(),
        Arc::new(bus.clone()),
        Arc::new(store.clone()),
        RetryPolicy::new(4, Duration::from_millis(1)),
    ));
    let mut cfg = WorkerConfig::new("raw-input-signals", "ingestion", "ingestion");
    cfg.block = Duration::from_millis(10);
    let worker = StreamWorker::new(
        Arc::new(bus.clone()),
        Arc::new(store.clone()),
        Arc::new(RawSignalHandler::new(service.clone())),
        cfg,
    );
    (service, worker)
}

#[tokio::test]
async fn duplicate_posts_reach_external_signals_once() {
    let bus = MemoryBus::new();
    let store = MemoryStateStore::new();
    let (_service, worker) = ingest_worker(&bus, &store);
    worker.init().await.unwrap();

    let router = http::build_router(Arc::new(bus.clone()), None, 4, 16, 64 * 1024);
    let addr = http::serve(router, "127.0.0.1:0").await.unwrap();
    let client = reqwest::Client::new();
    let url = format!("http://{}/signals", addr);

    // Two identical posts, both accepted at the edge.
    for _ in 0..2 {
        let response = client.post(&url).json(&raw_signal()).send().await.unwrap();
        assert_eq!(response.status(), 202);
    }
    assert_eq!(bus.stream_len("raw-input-signals").await, 2);

    // The worker drains both raw records; dedup collapses them.
    worker.run_once().await.unwrap();

    let external = bus.read_recent("external-signals", 10).await.unwrap();
    assert_eq!(external.len(), 1, "exactly one record on external-signals");
    assert_eq!(external[0].message["event_id"], "e1");
    assert_eq!(bus.pending_count("raw-input-signals", "ingestion").await, 0);
}

#[tokio::test]
async fn direct_ingest_reports_skipped_deduplicated() {
    let bus = MemoryBus::new();
    let store = MemoryStateStore::new();
    let (service, _worker) = ingest_worker(&bus, &store);

    let first = service.ingest_signals(&[raw_signal()]).await;
    assert_eq!(first.published, 1);

    let second = service.ingest_signals(&[raw_signal()]).await;
    assert_eq!(second.skipped_deduplicated, 1);
    assert_eq!(second.published, 0);
}

/// Retryable-publish scenario: a failure budget of 2 means the third
/// attempt lands, with exactly three publish invocations recorded.
#[tokio::test]
async fn transient_publish_failures_recover_within_one_cycle() {
    let bus = MemoryBus::with_publish_failure_budget(2);
    let store = MemoryStateStore::new();
    let (service, _worker) = ingest_worker(&bus, &store);

    let summary = service.ingest_signals(&[raw_signal()]).await;
    assert_eq!(summary.published, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.pending, 0);
    assert_eq!(bus.publish_invocations().await, 3);
}
