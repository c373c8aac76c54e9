//! Capability traits over the backing key-value store.

use async_trait::async_trait;
use std::time::Duration;

use crate::types::{ConnectorMetrics, ConnectorState, PollRecord};
use crate::StateError;
use sr_types::{InventorySnapshot, ShipmentPlan};

/// Content-hash dedup with TTL.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Atomic conditional create of `dedup:<stream>:<event_id>`. Returns
    /// true exactly when the key was created — first sight of this event
    /// on this stream within the TTL window.
    async fn mark_if_first_seen(&self, stream: &str, event_id: &str) -> Result<bool, StateError>;

    /// Unconditional delete; used when a publish that followed a
    /// successful mark later fails.
    async fn clear(&self, stream: &str, event_id: &str) -> Result<(), StateError>;
}

/// Delivery-attempt counters keyed by (stream, group, message id).
///
/// This counter is authoritative for DLQ promotion; the log store's own
/// delivery count is a hint only and is never reconciled against it.
#[async_trait]
pub trait AttemptStore: Send + Sync {
    async fn get(&self, stream: &str, group: &str, message_id: &str) -> Result<u64, StateError>;

    /// Increment and return the new count. The TTL is applied when the
    /// counter is first created.
    async fn increment(
        &self,
        stream: &str,
        group: &str,
        message_id: &str,
        ttl: Duration,
    ) -> Result<u64, StateError>;

    async fn clear(&self, stream: &str, group: &str, message_id: &str)
        -> Result<(), StateError>;
}

/// Persisted per-connector cursor state.
#[async_trait]
pub trait ConnectorStateStore: Send + Sync {
    /// `None` when the connector has never saved state. Parse errors
    /// surface to the caller.
    async fn load(&self, name: &str) -> Result<Option<ConnectorState>, StateError>;

    async fn save(&self, name: &str, state: &ConnectorState) -> Result<(), StateError>;
}

/// Single-writer lease per connector name.
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Acquire (or renew, for the current owner) the lease on `name`.
    /// Returns false when another instance holds it.
    async fn try_acquire(
        &self,
        name: &str,
        owner: &str,
        ttl: Duration,
    ) -> Result<bool, StateError>;

    /// Delete the lease only if `owner` still holds it. Returns true when
    /// the lease was released; a non-owner never deletes the key.
    async fn release(&self, name: &str, owner: &str) -> Result<bool, StateError>;
}

/// Per-connector poll counters.
#[async_trait]
pub trait ConnectorMetricsStore: Send + Sync {
    async fn record_poll(&self, name: &str, record: &PollRecord) -> Result<(), StateError>;

    async fn snapshot(&self, name: &str) -> Result<Option<ConnectorMetrics>, StateError>;

    /// True when the last poll and the last success both happened within
    /// `max_age`.
    async fn is_healthy(&self, name: &str, max_age: Duration) -> Result<bool, StateError>;
}

/// Shipment and inventory state for the planning-impact join.
#[async_trait]
pub trait PlanningStateStore: Send + Sync {
    async fn upsert_shipment(&self, plan: &ShipmentPlan) -> Result<(), StateError>;

    async fn upsert_inventory(&self, snapshot: &InventorySnapshot) -> Result<(), StateError>;

    async fn list_shipments(&self) -> Result<Vec<ShipmentPlan>, StateError>;

    async fn list_inventory(&self) -> Result<Vec<InventorySnapshot>, StateError>;

    /// Shipment ids registered on a lane.
    async fn shipments_for_lane(&self, lane_id: &str) -> Result<Vec<String>, StateError>;
}
