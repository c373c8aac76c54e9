//! Classification LLM adapter HTTP service.
//!
//! The bounded-concurrency front for the upstream model: every request is
//! parsed and validated first, then admitted through the queue, then sent
//! upstream with the retry policy.
//!
//! # Responses
//! - `GET /health` — 200 `{status, service, upstream_base_url, metrics}`
//! - `POST /classify` — 200 `{structured_risk}`; 400 invalid body or
//!   missing `signal.event_id`; 503 `{error: "QUEUE_FULL"}`; 502
//!   `{error: "UPSTREAM_CLASSIFICATION_FAILED"}`.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::llm::LlmClient;
use sr_gateway::{BoundedQueue, GatewayMetrics, QueueConfig};
use sr_types::{Signal, StructuredRisk};

#[derive(Clone)]
pub struct AdapterState {
    client: Arc<LlmClient>,
    queue: BoundedQueue,
    metrics: Arc<GatewayMetrics>,
}

pub fn build_router(
    client: Arc<LlmClient>,
    max_concurrency: usize,
    max_queue_size: usize,
) -> Router {
    let metrics = Arc::new(GatewayMetrics::default());
    let queue = BoundedQueue::new(
        QueueConfig {
            max_concurrency,
            max_queue_size,
        },
        metrics.clone(),
    );
    let state = AdapterState {
        client,
        queue,
        metrics,
    };
    Router::new()
        .route("/health", get(health))
        .route("/classify", post(classify))
        .fallback(not_found)
        .with_state(state)
}

pub async fn serve(router: Router, bind: &str) -> std::io::Result<SocketAddr> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    let addr = listener.local_addr()?;
    info!(addr = %addr, "classification adapter listening");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            error!(error = %e, "classification adapter server error");
        }
    });
    Ok(addr)
}

async fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"error": "NOT_FOUND"})),
    )
        .into_response()
}

async fn health(State(state): State<AdapterState>) -> Response {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "service": "classification-adapter",
            "upstream_base_url": state.client.base_url(),
            "metrics": state.metrics.snapshot(),
        })),
    )
        .into_response()
}

async fn classify(
    State(state): State<AdapterState>,
    body: Result<Json<Value>, axum::extract::rejection::JsonRejection>,
) -> Response {
    state.metrics.record_request();

    // Admission: parse and validate before taking a queue slot.
    let Ok(Json(body)) = body else {
        state.metrics.record_failure();
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "INVALID_REQUEST_BODY"})),
        )
            .into_response();
    };
    let Some(raw_signal) = body.get("signal") else {
        state.metrics.record_failure();
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "INVALID_REQUEST_BODY", "message": "missing signal"})),
        )
            .into_response();
    };
    if raw_signal
        .get("event_id")
        .and_then(Value::as_str)
        .map_or(true, str::is_empty)
    {
        state.metrics.record_failure();
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "INVALID_REQUEST_BODY", "message": "missing signal.event_id"})),
        )
            .into_response();
    }
    let signal = match Signal::normalize(raw_signal) {
        Ok(signal) => signal,
        Err(e) => {
            state.metrics.record_failure();
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "INVALID_REQUEST_BODY", "message": e.to_string()})),
            )
                .into_response();
        }
    };
    let model = body.get("model").and_then(Value::as_str);
    let instructions = body.get("instructions").and_then(Value::as_str);

    let _permit = match state.queue.admit().await {
        Ok(permit) => permit,
        Err(_) => {
            state.metrics.record_failure();
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"error": "QUEUE_FULL"})),
            )
                .into_response();
        }
    };

    let draft = match state.client.classify_draft(&signal, model, instructions).await {
        Ok(draft) => draft,
        Err(e) => {
            warn!(event_id = %signal.event_id, error = %e, "upstream classification failed");
            state.metrics.record_failure();
            return (
                StatusCode::BAD_GATEWAY,
                Json(json!({"error": "UPSTREAM_CLASSIFICATION_FAILED"})),
            )
                .into_response();
        }
    };

    match StructuredRisk::from_draft(&signal.event_id, &draft) {
        Ok(risk) => (StatusCode::OK, Json(json!({"structured_risk": risk}))).into_response(),
        Err(e) => {
            warn!(event_id = %signal.event_id, error = %e, "draft did not resolve");
            state.metrics.record_failure();
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({"error": "UPSTREAM_CLASSIFICATION_FAILED"})),
            )
                .into_response()
        }
    }
}
