//! Connector change detection across polls.
//!
//! A feed serving the same item twice publishes once and then reports
//! `skipped_unchanged = 1`; a changed item publishes again. Every poll
//! satisfies `fetched = published + skipped_unchanged + failed`.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use connectors::json_feed::JsonFeedFactory;
use sr_bus::{EventStreamReader, MemoryBus};
use sr_connector::{ConnectorConfig, ConnectorContext, ConnectorFactory, PollSummary};
use sr_state::{ConnectorMetricsStore, ConnectorStateStore, MemoryStateStore};

type FeedBody = Arc<Mutex<Value>>;

async fn serve_mutable_feed(initial: Value) -> (String, FeedBody) {
    let body: FeedBody = Arc::new(Mutex::new(initial));
    let handler_body = body.clone();
    let router = Router::new()
        .route(
            "/feed",
            get(|State(body): State<FeedBody>| async move {
                let value = body.lock().unwrap().clone();
                Json(value)
            }),
        )
        .with_state(handler_body);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    (format!("http://{}/feed", addr), body)
}

fn assert_partition(summary: &PollSummary) {
    assert_eq!(
        summary.fetched,
        summary.published + summary.skipped_unchanged + summary.failed,
        "poll summary must partition fetched"
    );
}

#[tokio::test]
async fn unchanged_item_is_skipped_until_it_changes() {
    let (url, feed) = serve_mutable_feed(json!([
        {"id": "alert-1", "content": "storm watch", "region": "US-FL"}
    ]))
    .await;

    let cfg: ConnectorConfig = serde_json::from_value(json!({
        "name": "weather",
        "type": "json-feed",
        "provider_config": {"url": url, "source_type": "WEATHER"},
    }))
    .unwrap();
    let bus = MemoryBus::new();
    let store = MemoryStateStore::new();
    let connector = JsonFeedFactory
        .create(
            &cfg,
            &ConnectorContext {
                publisher: Arc::new(bus.clone()),
                state_store: Arc::new(store.clone()),
            },
        )
        .unwrap();

    // Poll 1: new item publishes.
    let first = connector.poll().await.unwrap();
    assert_partition(&first);
    assert_eq!((first.published, first.skipped_unchanged), (1, 0));

    // Poll 2: identical item is skipped.
    let second = connector.poll().await.unwrap();
    assert_partition(&second);
    assert_eq!((second.published, second.skipped_unchanged), (0, 1));

    // Poll 3: the item changed; it publishes again.
    *feed.lock().unwrap() = json!([
        {"id": "alert-1", "content": "storm warning upgraded", "region": "US-FL"}
    ]);
    let third = connector.poll().await.unwrap();
    assert_partition(&third);
    assert_eq!((third.published, third.skipped_unchanged), (1, 0));

    let records = bus.read_recent("raw-input-signals", 10).await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].message["content"], "storm watch");
    assert_eq!(records[1].message["content"], "storm warning upgraded");

    // Cursor state persisted under the connector's name.
    let state = store.load("weather").await.unwrap().unwrap();
    assert!(state.latest["item_versions"].is_object());
}

#[tokio::test]
async fn runner_records_metrics_per_poll() {
    let (url, _feed) = serve_mutable_feed(json!([
        {"id": "alert-1", "content": "road closed", "region": "US-TX"}
    ]))
    .await;

    let cfg: ConnectorConfig = serde_json::from_value(json!({
        "name": "traffic",
        "type": "json-feed",
        "provider_config": {"url": url, "source_type": "TRAFFIC"},
    }))
    .unwrap();
    let bus = MemoryBus::new();
    let store = MemoryStateStore::new();
    let connector = JsonFeedFactory
        .create(
            &cfg,
            &ConnectorContext {
                publisher: Arc::new(bus.clone()),
                state_store: Arc::new(store.clone()),
            },
        )
        .unwrap();

    let runner = sr_connector::ConnectorRunner::new(
        connector,
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Duration::from_millis(10),
        Duration::from_secs(30),
    );
    runner.run_once().await;
    runner.run_once().await;

    let metrics = store.snapshot("traffic").await.unwrap().unwrap();
    assert_eq!(metrics.total_polls, 2);
    assert_eq!(metrics.successful_polls, 2);
    assert_eq!(metrics.items_fetched, 2);
    assert_eq!(metrics.items_published, 1, "second poll skipped unchanged");
    assert!(store
        .is_healthy("traffic", Duration::from_secs(60))
        .await
        .unwrap());
}
