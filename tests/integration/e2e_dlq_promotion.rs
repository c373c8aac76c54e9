//! DLQ promotion after the delivery budget is spent.
//!
//! With `max_deliveries = 3` and a handler that always fails, three
//! worker iterations leave the source group with no pending messages and
//! exactly one DLQ record carrying the original payload.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use sr_bus::{publish_message, ConsumerMessage, EventStreamReader, MemoryBus};
use sr_state::MemoryStateStore;
use sr_test_utils::raw_signal;
use sr_worker::{HandlerError, MessageHandler, StreamWorker, WorkerConfig};

struct AlwaysFail;

#[async_trait]
impl MessageHandler for AlwaysFail {
    async fn handle(&self, _message: &ConsumerMessage) -> Result<(), HandlerError> {
        Err(HandlerError::new("handler rejects everything"))
    }
}

fn failing_worker(bus: &MemoryBus, store: &MemoryStateStore) -> StreamWorker {
    let mut cfg = WorkerConfig::new("external-signals", "classification", "classification");
    cfg.block = Duration::from_millis(10);
    cfg.max_deliveries = 3;
    cfg.retry_backoff = Duration::from_millis(1);
    StreamWorker::new(
        Arc::new(bus.clone()),
        Arc::new(store.clone()),
        Arc::new(AlwaysFail),
        cfg,
    )
}

#[tokio::test]
async fn third_failure_promotes_to_dlq_and_acks() {
    let bus = MemoryBus::new();
    let store = MemoryStateStore::new();
    let worker = failing_worker(&bus, &store);
    worker.init().await.unwrap();

    let payload = raw_signal("e1");
    publish_message(&bus, "external-signals", &payload)
        .await
        .unwrap();

    for _ in 0..3 {
        worker.run_once().await.unwrap();
    }

    assert_eq!(
        bus.pending_count("external-signals", "classification").await,
        0,
        "no pending messages after promotion"
    );

    let dlq = bus.read_recent("external-signals.dlq", 10).await.unwrap();
    assert_eq!(dlq.len(), 1, "exactly one DLQ record");
    assert_eq!(dlq[0].message["reason"], "MAX_DELIVERIES_EXCEEDED");
    assert_eq!(dlq[0].message["payload"], payload, "payload carried verbatim");
    assert_eq!(dlq[0].message["source_stream"], "external-signals");
    assert_eq!(dlq[0].message["metadata"]["group"], "classification");
}

#[tokio::test]
async fn earlier_failures_leave_message_pending() {
    let bus = MemoryBus::new();
    let store = MemoryStateStore::new();
    let worker = failing_worker(&bus, &store);
    worker.init().await.unwrap();

    publish_message(&bus, "external-signals", &json!({"event_id": "e1"}))
        .await
        .unwrap();

    worker.run_once().await.unwrap();
    worker.run_once().await.unwrap();

    assert_eq!(
        bus.pending_count("external-signals", "classification").await,
        1,
        "still pending before the budget is spent"
    );
    assert!(bus
        .read_recent("external-signals.dlq", 10)
        .await
        .unwrap()
        .is_empty());
}

/// A malformed envelope never reaches the handler; the driver routes it
/// to the DLQ with reason MALFORMED_PAYLOAD and acks it.
#[tokio::test]
async fn malformed_envelope_is_driver_routed() {
    let bus = MemoryBus::new();
    let store = MemoryStateStore::new();
    let worker = failing_worker(&bus, &store);
    worker.init().await.unwrap();

    let mut fields = std::collections::HashMap::new();
    fields.insert("payload".to_owned(), "{not valid".to_owned());
    bus.publish_raw_fields("external-signals", fields).await;

    assert_eq!(worker.run_once().await.unwrap(), 0);

    let dlq = bus.read_recent("external-signals.dlq", 10).await.unwrap();
    assert_eq!(dlq.len(), 1);
    assert_eq!(dlq[0].message["reason"], "MALFORMED_PAYLOAD");
    assert_eq!(
        bus.pending_count("external-signals", "classification").await,
        0
    );
}
