//! Planning HTTP gateway.
//!
//! Accepts shipment plans and inventory snapshots, validates them against
//! the planning schemas, and publishes them to their streams; the state
//! workers persist them from there.
//!
//! # Responses
//! - `POST /shipments` (alias `/v1/shipments`) — 202 `{accepted, stream}`
//! - `POST /inventory` (alias `/v1/inventory`) — 202 `{accepted, stream}`
//! - 400 on schema violations; 502 on publish failure; 404 elsewhere.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

use sr_bus::{publish_message, EventPublisher};
use sr_types::{streams, InventorySnapshot, ShipmentPlan};

#[derive(Clone)]
pub struct PlanningGatewayState {
    publisher: Arc<dyn EventPublisher>,
}

pub fn build_router(publisher: Arc<dyn EventPublisher>) -> Router {
    let state = PlanningGatewayState { publisher };
    Router::new()
        .route("/shipments", post(post_shipments))
        .route("/v1/shipments", post(post_shipments))
        .route("/inventory", post(post_inventory))
        .route("/v1/inventory", post(post_inventory))
        .fallback(not_found)
        .with_state(state)
}

pub async fn serve(router: Router, bind: &str) -> std::io::Result<SocketAddr> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    let addr = listener.local_addr()?;
    info!(addr = %addr, "planning gateway listening");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            error!(error = %e, "planning gateway server error");
        }
    });
    Ok(addr)
}

async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({"error": "NOT_FOUND"}))).into_response()
}

/// One record or a list of records, validated to `T`.
fn extract_records<T: serde::de::DeserializeOwned>(body: &Value) -> Result<Vec<T>, String> {
    let items: Vec<Value> = match body {
        Value::Array(items) => items.clone(),
        Value::Object(_) => vec![body.clone()],
        _ => return Err("body must be an object or an array".to_owned()),
    };
    if items.is_empty() {
        return Err("no records in request".to_owned());
    }
    items
        .into_iter()
        .map(|item| serde_json::from_value(item).map_err(|e| e.to_string()))
        .collect()
}

async fn publish_records<T: serde::Serialize>(
    state: &PlanningGatewayState,
    stream: &str,
    records: &[T],
) -> Response {
    for record in records {
        if let Err(e) = publish_message(state.publisher.as_ref(), stream, record).await {
            error!(stream, error = %e, "planning record publish failed");
            return (
                StatusCode::BAD_GATEWAY,
                Json(json!({"error": "PUBLISH_FAILED"})),
            )
                .into_response();
        }
    }
    (
        StatusCode::ACCEPTED,
        Json(json!({"accepted": records.len(), "stream": stream})),
    )
        .into_response()
}

async fn post_shipments(
    State(state): State<PlanningGatewayState>,
    body: Result<Json<Value>, axum::extract::rejection::JsonRejection>,
) -> Response {
    let Ok(Json(body)) = body else {
        return bad_request("body is not valid JSON");
    };
    match extract_records::<ShipmentPlan>(&body) {
        Ok(plans) => publish_records(&state, streams::SHIPMENT_PLANS, &plans).await,
        Err(message) => bad_request(message),
    }
}

async fn post_inventory(
    State(state): State<PlanningGatewayState>,
    body: Result<Json<Value>, axum::extract::rejection::JsonRejection>,
) -> Response {
    let Ok(Json(body)) = body else {
        return bad_request("body is not valid JSON");
    };
    match extract_records::<InventorySnapshot>(&body) {
        Ok(snapshots) => publish_records(&state, streams::INVENTORY_SNAPSHOTS, &snapshots).await,
        Err(message) => bad_request(message),
    }
}

fn bad_request(message: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({"error": "INVALID_REQUEST_BODY", "message": message.into()})),
    )
        .into_response()
}
