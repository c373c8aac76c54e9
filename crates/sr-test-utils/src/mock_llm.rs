//! Pausable mock LLM upstream.
//!
//! Serves `POST /v1/chat/completions` on a random local port. While
//! paused, requests are admitted but held open until `resume()`, which is
//! how the queue-overflow scenarios stack up concurrent in-flight calls.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;

struct UpstreamState {
    paused: watch::Sender<bool>,
    requests: AtomicU64,
    status: AtomicU16,
    content: Mutex<String>,
}

/// Handle to the running mock upstream.
pub struct MockLlmUpstream {
    addr: SocketAddr,
    state: Arc<UpstreamState>,
}

impl MockLlmUpstream {
    /// Start on a random port, answering with a default structured-risk
    /// draft.
    pub async fn start() -> std::io::Result<MockLlmUpstream> {
        let default_draft = json!({
            "event_type": "PORT_CLOSURE",
            "severity_level": "HIGH",
            "impact_region": "US-TX",
            "expected_duration_hours": 48,
            "classification_confidence": 0.9,
            "model_version": "mock-1",
        });
        let (paused, _) = watch::channel(false);
        let state = Arc::new(UpstreamState {
            paused,
            requests: AtomicU64::new(0),
            status: AtomicU16::new(200),
            content: Mutex::new(default_draft.to_string()),
        });

        let router = Router::new()
            .route("/v1/chat/completions", post(completions))
            .with_state(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        Ok(MockLlmUpstream { addr, state })
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Hold subsequent (and in-flight) requests open until `resume()`.
    pub fn pause(&self) {
        // send_replace updates the value even with zero live receivers.
        self.state.paused.send_replace(true);
    }

    pub fn resume(&self) {
        self.state.paused.send_replace(false);
    }

    /// Total requests admitted (including ones currently held).
    pub fn requests(&self) -> u64 {
        self.state.requests.load(Ordering::SeqCst)
    }

    /// Respond with this status from now on.
    pub fn set_status(&self, status: u16) {
        self.state.status.store(status, Ordering::SeqCst);
    }

    /// Set the assistant-message content returned to clients.
    pub fn set_content(&self, content: impl Into<String>) {
        *self
            .state
            .content
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = content.into();
    }
}

async fn completions(
    State(state): State<Arc<UpstreamState>>,
    _body: Json<Value>,
) -> impl IntoResponse {
    state.requests.fetch_add(1, Ordering::SeqCst);

    // Wait out a pause.
    let mut rx = state.paused.subscribe();
    while *rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            break;
        }
    }

    let status = state.status.load(Ordering::SeqCst);
    if status != 200 {
        return (
            StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            Json(json!({"error": "mock upstream error"})),
        );
    }

    let content = state
        .content
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();
    (
        StatusCode::OK,
        Json(json!({
            "choices": [
                {"message": {"role": "assistant", "content": content}}
            ]
        })),
    )
}
