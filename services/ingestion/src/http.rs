//! Ingestion HTTP gateway.
//!
//! Accepts raw signals over HTTP and publishes them to the raw-input
//! stream; the raw-signals worker picks them up from there. Body shapes:
//! a single object, an array, `{"signals": [...]}`, or `{"signal": {...}}`.
//!
//! # Responses
//! - `GET /health` — 200 `{status, service, raw_input_stream, metrics}`
//! - `POST /signals` (alias `/v1/signals`) — 202 `{accepted, ids,
//!   raw_input_stream}`; 400 malformed body / count bounds; 401 bad or
//!   missing bearer token (when configured); 503 `QUEUE_FULL`; 502 on
//!   publish failure; 404 elsewhere.

use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

use sr_bus::{EventPublisher, PublishOptions};
use sr_gateway::{bearer_token_matches, BoundedQueue, GatewayMetrics, QueueConfig};
use sr_types::streams;

/// Upper bound on signals accepted in one request.
pub const MAX_SIGNALS_PER_REQUEST: usize = 500;

#[derive(Clone)]
pub struct GatewayState {
    publisher: Arc<dyn EventPublisher>,
    queue: BoundedQueue,
    metrics: Arc<GatewayMetrics>,
    auth_token: Option<String>,
}

/// Build the gateway router.
pub fn build_router(
    publisher: Arc<dyn EventPublisher>,
    auth_token: Option<String>,
    max_concurrency: usize,
    max_queue_size: usize,
    max_request_bytes: usize,
) -> Router {
    let metrics = Arc::new(GatewayMetrics::default());
    let queue = BoundedQueue::new(
        QueueConfig {
            max_concurrency,
            max_queue_size,
        },
        metrics.clone(),
    );
    let state = GatewayState {
        publisher,
        queue,
        metrics,
        auth_token,
    };
    Router::new()
        .route("/health", get(health))
        .route("/signals", post(post_signals))
        .route("/v1/signals", post(post_signals))
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(max_request_bytes))
        .with_state(state)
}

/// Bind and serve until the task is dropped. Returns the bound address.
pub async fn serve(router: Router, bind: &str) -> std::io::Result<SocketAddr> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    let addr = listener.local_addr()?;
    info!(addr = %addr, "ingestion gateway listening");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            error!(error = %e, "ingestion gateway server error");
        }
    });
    Ok(addr)
}

fn json_error(status: StatusCode, code: &str, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({"error": code, "message": message.into()})),
    )
        .into_response()
}

async fn not_found() -> Response {
    json_error(StatusCode::NOT_FOUND, "NOT_FOUND", "no such route")
}

async fn health(State(state): State<GatewayState>) -> Response {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "service": "ingestion-gateway",
            "raw_input_stream": streams::RAW_INPUT_SIGNALS,
            "metrics": state.metrics.snapshot(),
        })),
    )
        .into_response()
}

/// Pull the list of signal objects out of any accepted body shape.
fn extract_signals(body: &Value) -> Result<Vec<Value>, String> {
    let list = match body {
        Value::Array(items) => items.clone(),
        Value::Object(obj) => {
            if let Some(signals) = obj.get("signals") {
                match signals {
                    Value::Array(items) => items.clone(),
                    _ => return Err("\"signals\" must be an array".to_owned()),
                }
            } else if let Some(signal) = obj.get("signal") {
                vec![signal.clone()]
            } else {
                vec![body.clone()]
            }
        }
        _ => return Err("body must be an object or an array".to_owned()),
    };

    if list.is_empty() {
        return Err("no signals in request".to_owned());
    }
    if list.len() > MAX_SIGNALS_PER_REQUEST {
        return Err(format!(
            "too many signals in one request ({} > {})",
            list.len(),
            MAX_SIGNALS_PER_REQUEST
        ));
    }
    for item in &list {
        if !item.is_object() {
            return Err("every signal must be a JSON object".to_owned());
        }
    }
    Ok(list)
}

async fn post_signals(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Result<Json<Value>, axum::extract::rejection::JsonRejection>,
) -> Response {
    state.metrics.record_request();

    let auth_header = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok());
    if !bearer_token_matches(state.auth_token.as_deref(), auth_header) {
        state.metrics.record_failure();
        return json_error(
            StatusCode::UNAUTHORIZED,
            "UNAUTHORIZED",
            "missing or invalid bearer token",
        );
    }

    let Ok(Json(body)) = body else {
        state.metrics.record_failure();
        return json_error(
            StatusCode::BAD_REQUEST,
            "INVALID_REQUEST_BODY",
            "body is not valid JSON",
        );
    };

    let signals = match extract_signals(&body) {
        Ok(signals) => signals,
        Err(message) => {
            state.metrics.record_failure();
            return json_error(StatusCode::BAD_REQUEST, "INVALID_REQUEST_BODY", message);
        }
    };

    let _permit = match state.queue.admit().await {
        Ok(permit) => permit,
        Err(_) => {
            state.metrics.record_failure();
            return json_error(
                StatusCode::SERVICE_UNAVAILABLE,
                "QUEUE_FULL",
                "gateway at capacity",
            );
        }
    };

    let mut ids = Vec::with_capacity(signals.len());
    for signal in &signals {
        match state
            .publisher
            .publish(streams::RAW_INPUT_SIGNALS, signal, PublishOptions::default())
            .await
        {
            Ok(record) => ids.push(record.id),
            Err(e) => {
                error!(error = %e, "raw signal publish failed");
                state.metrics.record_failure();
                return json_error(
                    StatusCode::BAD_GATEWAY,
                    "PUBLISH_FAILED",
                    "could not persist signal to the raw input stream",
                );
            }
        }
    }

    (
        StatusCode::ACCEPTED,
        Json(json!({
            "accepted": ids.len(),
            "ids": ids,
            "raw_input_stream": streams::RAW_INPUT_SIGNALS,
        })),
    )
        .into_response()
}
