//! In-memory state store for tests.
//!
//! Honors the same contracts as the Redis store, including TTL expiry for
//! idempotency marks, attempt counters, and leases (checked lazily on
//! access).

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::traits::{
    AttemptStore, ConnectorMetricsStore, ConnectorStateStore, IdempotencyStore, LeaseStore,
    PlanningStateStore,
};
use crate::types::{ConnectorMetrics, ConnectorState, PollRecord};
use crate::{keys, redis_store::within_window, StateError, DEFAULT_DEDUP_TTL_SECONDS};
use sr_types::{InventorySnapshot, ShipmentPlan};

#[derive(Default)]
struct Inner {
    dedup: HashMap<String, Instant>,
    attempts: HashMap<String, (u64, Instant)>,
    connector_states: HashMap<String, ConnectorState>,
    leases: HashMap<String, (String, Instant)>,
    metrics: HashMap<String, ConnectorMetrics>,
    shipments: HashMap<String, ShipmentPlan>,
    inventory: HashMap<String, InventorySnapshot>,
    lanes: HashMap<String, BTreeSet<String>>,
}

/// In-memory implementation of every state trait.
#[derive(Clone)]
pub struct MemoryStateStore {
    inner: Arc<Mutex<Inner>>,
    dedup_ttl: Duration,
}

impl MemoryStateStore {
    pub fn new() -> MemoryStateStore {
        Self::with_dedup_ttl(Duration::from_secs(DEFAULT_DEDUP_TTL_SECONDS))
    }

    pub fn with_dedup_ttl(dedup_ttl: Duration) -> MemoryStateStore {
        MemoryStateStore {
            inner: Arc::new(Mutex::new(Inner::default())),
            dedup_ttl,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdempotencyStore for MemoryStateStore {
    async fn mark_if_first_seen(&self, stream: &str, event_id: &str) -> Result<bool, StateError> {
        let key = keys::dedup(stream, event_id);
        let mut inner = self.lock();
        let now = Instant::now();
        match inner.dedup.get(&key) {
            Some(expiry) if *expiry > now => Ok(false),
            _ => {
                inner.dedup.insert(key, now + self.dedup_ttl);
                Ok(true)
            }
        }
    }

    async fn clear(&self, stream: &str, event_id: &str) -> Result<(), StateError> {
        self.lock().dedup.remove(&keys::dedup(stream, event_id));
        Ok(())
    }
}

#[async_trait]
impl AttemptStore for MemoryStateStore {
    async fn get(&self, stream: &str, group: &str, message_id: &str) -> Result<u64, StateError> {
        let key = keys::retry(stream, group, message_id);
        let inner = self.lock();
        Ok(match inner.attempts.get(&key) {
            Some((count, expiry)) if *expiry > Instant::now() => *count,
            _ => 0,
        })
    }

    async fn increment(
        &self,
        stream: &str,
        group: &str,
        message_id: &str,
        ttl: Duration,
    ) -> Result<u64, StateError> {
        let key = keys::retry(stream, group, message_id);
        let mut inner = self.lock();
        let now = Instant::now();
        let entry = match inner.attempts.get(&key) {
            Some((count, expiry)) if *expiry > now => (*count + 1, *expiry),
            // First increment (or expired counter): TTL starts here.
            _ => (1, now + ttl),
        };
        inner.attempts.insert(key, entry);
        Ok(entry.0)
    }

    async fn clear(
        &self,
        stream: &str,
        group: &str,
        message_id: &str,
    ) -> Result<(), StateError> {
        self.lock()
            .attempts
            .remove(&keys::retry(stream, group, message_id));
        Ok(())
    }
}

#[async_trait]
impl ConnectorStateStore for MemoryStateStore {
    async fn load(&self, name: &str) -> Result<Option<ConnectorState>, StateError> {
        Ok(self.lock().connector_states.get(name).cloned())
    }

    async fn save(&self, name: &str, state: &ConnectorState) -> Result<(), StateError> {
        self.lock()
            .connector_states
            .insert(name.to_owned(), state.clone());
        Ok(())
    }
}

#[async_trait]
impl LeaseStore for MemoryStateStore {
    async fn try_acquire(
        &self,
        name: &str,
        owner: &str,
        ttl: Duration,
    ) -> Result<bool, StateError> {
        let mut inner = self.lock();
        let now = Instant::now();
        match inner.leases.get(name) {
            Some((holder, expiry)) if *expiry > now && holder != owner => Ok(false),
            _ => {
                inner
                    .leases
                    .insert(name.to_owned(), (owner.to_owned(), now + ttl));
                Ok(true)
            }
        }
    }

    async fn release(&self, name: &str, owner: &str) -> Result<bool, StateError> {
        let mut inner = self.lock();
        match inner.leases.get(name) {
            Some((holder, _)) if holder == owner => {
                inner.leases.remove(name);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl ConnectorMetricsStore for MemoryStateStore {
    async fn record_poll(&self, name: &str, record: &PollRecord) -> Result<(), StateError> {
        let mut inner = self.lock();
        inner
            .metrics
            .entry(name.to_owned())
            .or_default()
            .apply(record, sr_core::now_rfc3339());
        Ok(())
    }

    async fn snapshot(&self, name: &str) -> Result<Option<ConnectorMetrics>, StateError> {
        Ok(self.lock().metrics.get(name).cloned())
    }

    async fn is_healthy(&self, name: &str, max_age: Duration) -> Result<bool, StateError> {
        let Some(metrics) = self.snapshot(name).await? else {
            return Ok(false);
        };
        Ok(within_window(metrics.last_poll_time.as_deref(), max_age)
            && within_window(metrics.last_success_time.as_deref(), max_age))
    }
}

#[async_trait]
impl PlanningStateStore for MemoryStateStore {
    async fn upsert_shipment(&self, plan: &ShipmentPlan) -> Result<(), StateError> {
        let mut inner = self.lock();
        inner
            .lanes
            .entry(plan.lane_id.clone())
            .or_default()
            .insert(plan.shipment_id.clone());
        inner
            .shipments
            .insert(plan.shipment_id.clone(), plan.clone());
        Ok(())
    }

    async fn upsert_inventory(&self, snapshot: &InventorySnapshot) -> Result<(), StateError> {
        self.lock().inventory.insert(
            keys::inventory_field(&snapshot.sku, &snapshot.site_id),
            snapshot.clone(),
        );
        Ok(())
    }

    async fn list_shipments(&self) -> Result<Vec<ShipmentPlan>, StateError> {
        Ok(self.lock().shipments.values().cloned().collect())
    }

    async fn list_inventory(&self) -> Result<Vec<InventorySnapshot>, StateError> {
        Ok(self.lock().inventory.values().cloned().collect())
    }

    async fn shipments_for_lane(&self, lane_id: &str) -> Result<Vec<String>, StateError> {
        Ok(self
            .lock()
            .lanes
            .get(lane_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }
}
