//! Full pipeline flow over the in-memory bus.
//!
//! raw-input-signals → external-signals → classified-events →
//! risk-evaluations → mitigation-plans → notifications, with the
//! planning-impact join fanning the plan out to at-risk shipments and
//! inventory exposures.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use classifier::rules::RuleBasedClassifier;
use classifier::worker::ClassificationHandler;
use ingestion::service::IngestionService;
use ingestion::worker::RawSignalHandler;
use mitigation::planner::TemplatePlanner;
use mitigation::worker::PlanHandler;
use notifier::router::SeverityRouter;
use notifier::worker::NotificationHandler;
use planning::impact::ImpactHandler;
use risk_engine::engine::WeightedEvaluator;
use risk_engine::worker::EvaluationHandler;
use sr_bus::{publish_message, EventStreamReader, MemoryBus};
use sr_retry::RetryPolicy;
use sr_state::{MemoryStateStore, PlanningStateStore};
use sr_types::{InventorySnapshot, ShipmentPlan};
use sr_worker::{MessageHandler, StreamWorker, WorkerConfig};

fn worker(
    bus: &MemoryBus,
    store: &MemoryStateStore,
    handler: Arc<dyn MessageHandler>,
    stream: &str,
    group: &str,
) -> StreamWorker {
    let mut cfg = WorkerConfig::new(stream, group, group);
    cfg.block = Duration::from_millis(10);
    cfg.retry_backoff = Duration::from_millis(1);
    StreamWorker::new(
        Arc::new(bus.clone()),
        Arc::new(store.clone()),
        handler,
        cfg,
    )
}

#[tokio::test]
async fn raw_signal_flows_to_notifications_and_planning_impact() {
    let bus = MemoryBus::new();
    let store = MemoryStateStore::new();

    // Planning state: one shipment into the affected region, one
    // inventory position inside it, plus unrelated records.
    store
        .upsert_shipment(&ShipmentPlan {
            shipment_id: "ship-1".to_owned(),
            lane_id: "USLAX-USDAL".to_owned(),
            origin_region: "US-CA".to_owned(),
            destination_region: "US-TX".to_owned(),
            carrier: Some("acme-freight".to_owned()),
            departure_utc: "2026-02-20T00:00:00Z".to_owned(),
            eta_utc: "2026-02-25T00:00:00Z".to_owned(),
            value_usd: 125_000.0,
        })
        .await
        .unwrap();
    store
        .upsert_shipment(&ShipmentPlan {
            shipment_id: "ship-2".to_owned(),
            lane_id: "DEHAM-FRPAR".to_owned(),
            origin_region: "DE".to_owned(),
            destination_region: "FR".to_owned(),
            carrier: None,
            departure_utc: "2026-02-20T00:00:00Z".to_owned(),
            eta_utc: "2026-02-25T00:00:00Z".to_owned(),
            value_usd: 80_000.0,
        })
        .await
        .unwrap();
    store
        .upsert_inventory(&InventorySnapshot {
            sku: "sku-1".to_owned(),
            site_id: "dc-7".to_owned(),
            region: "US-TX".to_owned(),
            quantity: 400,
            days_of_cover: 9.0,
        })
        .await
        .unwrap();

    // The worker chain, one group per stage.
    let ingestion_service = Arc::new(IngestionService::new(
        Vec::new(),
        Arc::new(bus.clone()),
        Arc::new(store.clone()),
        RetryPolicy::new(4, Duration::from_millis(1)),
    ));
    let stages: Vec<StreamWorker> = vec![
        worker(
            &bus,
            &store,
            Arc::new(RawSignalHandler::new(ingestion_service)),
            "raw-input-signals",
            "ingestion",
        ),
        worker(
            &bus,
            &store,
            Arc::new(ClassificationHandler::new(
                Arc::new(RuleBasedClassifier::new()),
                None,
                Arc::new(bus.clone()),
                0.65,
            )),
            "external-signals",
            "classification",
        ),
        worker(
            &bus,
            &store,
            Arc::new(EvaluationHandler::new(
                Arc::new(WeightedEvaluator::new()),
                Arc::new(bus.clone()),
            )),
            "classified-events",
            "risk-engine",
        ),
        worker(
            &bus,
            &store,
            Arc::new(PlanHandler::new(
                Arc::new(TemplatePlanner::new()),
                Arc::new(bus.clone()),
            )),
            "risk-evaluations",
            "mitigation",
        ),
        worker(
            &bus,
            &store,
            Arc::new(NotificationHandler::new(
                Arc::new(SeverityRouter::new()),
                Arc::new(bus.clone()),
            )),
            "mitigation-plans",
            "notifier",
        ),
        worker(
            &bus,
            &store,
            Arc::new(ImpactHandler::new(
                Arc::new(store.clone()),
                Arc::new(bus.clone()),
            )),
            "mitigation-plans",
            "planning-impact",
        ),
    ];
    for stage in &stages {
        stage.init().await.unwrap();
    }

    // One raw signal enters at the top.
    publish_message(
        &bus,
        "raw-input-signals",
        &json!({
            "event_id": "e1",
            "source_type": "NEWS",
            "raw_content": "port closure announced after dock workers strike",
            "source_reference": "https://news.example.com/port",
            "geographic_scope": "US-TX",
            "timestamp_utc": "2026-02-23T10:00:00Z",
            "signal_confidence": 0.9,
        }),
    )
    .await
    .unwrap();

    // Drain stage by stage.
    for stage in &stages {
        assert!(stage.run_once().await.unwrap() >= 1, "stage must process");
    }

    // Every intermediate stream carries the event.
    for stream in [
        "external-signals",
        "classified-events",
        "risk-evaluations",
        "mitigation-plans",
    ] {
        let records = bus.read_recent(stream, 10).await.unwrap();
        assert_eq!(records.len(), 1, "{} should carry one record", stream);
    }

    let classified = bus.read_recent("classified-events", 1).await.unwrap();
    assert_eq!(
        classified[0].message["structured_risk"]["event_type"],
        "PORT_CLOSURE"
    );

    let notifications = bus.read_recent("notifications", 10).await.unwrap();
    assert!(
        !notifications.is_empty(),
        "a high-severity plan must notify"
    );
    assert_eq!(notifications[0].message["event_id"], "e1");

    let at_risk = bus.read_recent("at-risk-shipments", 10).await.unwrap();
    assert_eq!(at_risk.len(), 1, "only the Texas-bound shipment is flagged");
    assert_eq!(at_risk[0].message["shipment_id"], "ship-1");

    let exposures = bus.read_recent("inventory-exposures", 10).await.unwrap();
    assert_eq!(exposures.len(), 1);
    assert_eq!(exposures[0].message["sku"], "sku-1");

    // Nothing left pending anywhere.
    for (stream, group) in [
        ("raw-input-signals", "ingestion"),
        ("external-signals", "classification"),
        ("classified-events", "risk-engine"),
        ("risk-evaluations", "mitigation"),
        ("mitigation-plans", "notifier"),
        ("mitigation-plans", "planning-impact"),
    ] {
        assert_eq!(bus.pending_count(stream, group).await, 0, "{}/{}", stream, group);
    }
}
