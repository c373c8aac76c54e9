// sr-state: Persisted pipeline state behind capability traits.
//
// Idempotency marks, delivery-attempt counters, connector cursor state,
// single-writer leases, connector metrics, and the planning join state all
// live in one backing key-value store. Components depend on the traits
// here; production wires `RedisStateStore`, tests wire `MemoryStateStore`.
//
// Key layout (frozen):
//   dedup:<stream>:<eventId>              string, TTL
//   retry:<stream>:<group>:<messageId>    string, TTL
//   connector:state:<name>                hash {latest, timestamp, version}
//   lease:<name>                          string (owner id), TTL
//   metrics:connector:<name>              hash, TTL 30d
//   planning:shipments                    hash shipment_id -> JSON
//   planning:inventory                    hash sku@site -> JSON
//   planning:lane:<laneId>                set of shipment ids

pub mod keys;
pub mod memory_store;
pub mod redis_store;
pub mod traits;
pub mod types;

pub use memory_store::MemoryStateStore;
pub use redis_store::RedisStateStore;
pub use traits::{
    AttemptStore, ConnectorMetricsStore, ConnectorStateStore, IdempotencyStore, LeaseStore,
    PlanningStateStore,
};
pub use types::{ConnectorMetrics, ConnectorState, PollRecord};

/// Default idempotency-mark lifetime: one week.
pub const DEFAULT_DEDUP_TTL_SECONDS: u64 = 604_800;

/// Default delivery-counter lifetime: one day. Deliberately decoupled from
/// the dedup TTL; the two police unrelated things.
pub const DEFAULT_RETRY_KEY_TTL_SECONDS: u64 = 86_400;

/// Connector metrics lifetime: 30 days.
pub const METRICS_TTL_SECONDS: u64 = 2_592_000;

/// State-store failure.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}
