//! Queue overflow at the classification adapter.
//!
//! With `max_concurrency = 1` and `max_queue_size = 1` and a paused
//! upstream, the third concurrent classify request is refused with 503
//! QUEUE_FULL; once the upstream resumes, the two admitted requests
//! complete and the overflow counter reads 1.

use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use classifier::adapter;
use classifier::llm::{LlmClient, LlmClientConfig};
use sr_test_utils::MockLlmUpstream;

async fn start_adapter(upstream: &MockLlmUpstream) -> SocketAddr {
    let client = Arc::new(
        LlmClient::new(LlmClientConfig {
            base_url: upstream.base_url(),
            api_key: None,
            model: "mock-model".to_owned(),
            timeout: Duration::from_secs(8),
            max_attempts: 1,
            retry_base_delay: Duration::from_millis(10),
        })
        .unwrap(),
    );
    let router = adapter::build_router(client, 1, 1);
    adapter::serve(router, "127.0.0.1:0").await.unwrap()
}

fn classify_body() -> Value {
    json!({
        "signal": {
            "event_id": "e1",
            "raw_content": "port closure at terminal 4",
            "source_reference": "r",
            "geographic_scope": "US-TX",
        }
    })
}

#[tokio::test]
async fn third_concurrent_request_overflows() {
    let upstream = MockLlmUpstream::start().await.unwrap();
    upstream.pause();
    let addr = start_adapter(&upstream).await;
    let client = reqwest::Client::new();
    let url = format!("http://{}/classify", addr);

    let spawn_request = |client: reqwest::Client, url: String| {
        tokio::spawn(async move { client.post(url).json(&classify_body()).send().await })
    };

    // First occupies the slot, second queues.
    let first = spawn_request(client.clone(), url.clone());
    tokio::time::sleep(Duration::from_millis(50)).await;
    let second = spawn_request(client.clone(), url.clone());
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Third is refused immediately.
    let third = client
        .post(&url)
        .json(&classify_body())
        .send()
        .await
        .unwrap();
    assert_eq!(third.status(), 503);
    let body: Value = third.json().await.unwrap();
    assert_eq!(body["error"], "QUEUE_FULL");

    // Release the upstream; the two admitted requests finish.
    upstream.resume();
    let first = first.await.unwrap().unwrap();
    let second = second.await.unwrap().unwrap();
    assert_eq!(first.status(), 200);
    assert_eq!(second.status(), 200);
    let risk: Value = first.json().await.unwrap();
    assert_eq!(risk["structured_risk"]["event_type"], "PORT_CLOSURE");

    let health: Value = client
        .get(format!("http://{}/health", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["metrics"]["queue_overflow_rejections"], 1);
    assert_eq!(health["metrics"]["requests_in_flight"], 0);
}
