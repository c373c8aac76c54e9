//! Redis-backed state store.
//!
//! All conditional writes are atomic server-side: idempotency marks and
//! lease acquisition use `SET NX EX`, lease release and renewal go through
//! small Lua scripts so a non-owner can never delete or extend a lease it
//! does not hold.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::Script;
use std::collections::HashMap;
use std::time::Duration;

use crate::traits::{
    AttemptStore, ConnectorMetricsStore, ConnectorStateStore, IdempotencyStore, LeaseStore,
    PlanningStateStore,
};
use crate::types::{ConnectorMetrics, ConnectorState, PollRecord};
use crate::{keys, StateError, DEFAULT_DEDUP_TTL_SECONDS, METRICS_TTL_SECONDS};
use sr_types::{InventorySnapshot, ShipmentPlan};

/// Acquire-or-renew: create the lease if absent, extend it if already ours.
const ACQUIRE_LEASE: &str = r#"
if redis.call('SET', KEYS[1], ARGV[1], 'NX', 'EX', ARGV[2]) then
  return 1
end
if redis.call('GET', KEYS[1]) == ARGV[1] then
  redis.call('EXPIRE', KEYS[1], ARGV[2])
  return 1
end
return 0
"#;

/// Compare-and-delete: release only when the stored owner matches.
const RELEASE_LEASE: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  return redis.call('DEL', KEYS[1])
end
return 0
"#;

/// State store backed by Redis.
#[derive(Clone)]
pub struct RedisStateStore {
    manager: ConnectionManager,
    dedup_ttl: Duration,
}

impl RedisStateStore {
    pub async fn connect(url: &str) -> Result<RedisStateStore, StateError> {
        Self::connect_with_dedup_ttl(url, Duration::from_secs(DEFAULT_DEDUP_TTL_SECONDS)).await
    }

    pub async fn connect_with_dedup_ttl(
        url: &str,
        dedup_ttl: Duration,
    ) -> Result<RedisStateStore, StateError> {
        let client =
            redis::Client::open(url).map_err(|e| StateError::Transport(e.to_string()))?;
        let manager = client
            .get_connection_manager()
            .await
            .map_err(|e| StateError::Transport(e.to_string()))?;
        Ok(RedisStateStore { manager, dedup_ttl })
    }

    fn conn(&self) -> ConnectionManager {
        self.manager.clone()
    }
}

fn transport(e: redis::RedisError) -> StateError {
    StateError::Transport(e.to_string())
}

#[async_trait]
impl IdempotencyStore for RedisStateStore {
    async fn mark_if_first_seen(&self, stream: &str, event_id: &str) -> Result<bool, StateError> {
        let mut conn = self.conn();
        let created: Option<String> = redis::cmd("SET")
            .arg(keys::dedup(stream, event_id))
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(self.dedup_ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await
            .map_err(transport)?;
        Ok(created.is_some())
    }

    async fn clear(&self, stream: &str, event_id: &str) -> Result<(), StateError> {
        let mut conn = self.conn();
        let _: u64 = redis::cmd("DEL")
            .arg(keys::dedup(stream, event_id))
            .query_async(&mut conn)
            .await
            .map_err(transport)?;
        Ok(())
    }
}

#[async_trait]
impl AttemptStore for RedisStateStore {
    async fn get(&self, stream: &str, group: &str, message_id: &str) -> Result<u64, StateError> {
        let mut conn = self.conn();
        let value: Option<String> = redis::cmd("GET")
            .arg(keys::retry(stream, group, message_id))
            .query_async(&mut conn)
            .await
            .map_err(transport)?;
        Ok(value.and_then(|v| v.parse().ok()).unwrap_or(0))
    }

    async fn increment(
        &self,
        stream: &str,
        group: &str,
        message_id: &str,
        ttl: Duration,
    ) -> Result<u64, StateError> {
        let key = keys::retry(stream, group, message_id);
        let mut conn = self.conn();
        let count: u64 = redis::cmd("INCR")
            .arg(&key)
            .query_async(&mut conn)
            .await
            .map_err(transport)?;
        if count == 1 {
            let _: u64 = redis::cmd("EXPIRE")
                .arg(&key)
                .arg(ttl.as_secs().max(1))
                .query_async(&mut conn)
                .await
                .map_err(transport)?;
        }
        Ok(count)
    }

    async fn clear(
        &self,
        stream: &str,
        group: &str,
        message_id: &str,
    ) -> Result<(), StateError> {
        let mut conn = self.conn();
        let _: u64 = redis::cmd("DEL")
            .arg(keys::retry(stream, group, message_id))
            .query_async(&mut conn)
            .await
            .map_err(transport)?;
        Ok(())
    }
}

#[async_trait]
impl ConnectorStateStore for RedisStateStore {
    async fn load(&self, name: &str) -> Result<Option<ConnectorState>, StateError> {
        let mut conn = self.conn();
        let map: HashMap<String, String> = redis::cmd("HGETALL")
            .arg(keys::connector_state(name))
            .query_async(&mut conn)
            .await
            .map_err(transport)?;
        if map.is_empty() {
            return Ok(None);
        }
        let latest = map
            .get("latest")
            .map(|raw| serde_json::from_str(raw))
            .transpose()
            .map_err(|e| StateError::Serialization(format!("connector state '{}': {}", name, e)))?
            .unwrap_or(serde_json::Value::Null);
        Ok(Some(ConnectorState {
            latest,
            timestamp: map.get("timestamp").cloned().unwrap_or_default(),
            version: map.get("version").and_then(|v| v.parse().ok()).unwrap_or(1),
        }))
    }

    async fn save(&self, name: &str, state: &ConnectorState) -> Result<(), StateError> {
        let latest = serde_json::to_string(&state.latest)
            .map_err(|e| StateError::Serialization(e.to_string()))?;
        let mut conn = self.conn();
        let _: u64 = redis::cmd("HSET")
            .arg(keys::connector_state(name))
            .arg("latest")
            .arg(latest)
            .arg("timestamp")
            .arg(&state.timestamp)
            .arg("version")
            .arg(state.version)
            .query_async(&mut conn)
            .await
            .map_err(transport)?;
        Ok(())
    }
}

#[async_trait]
impl LeaseStore for RedisStateStore {
    async fn try_acquire(
        &self,
        name: &str,
        owner: &str,
        ttl: Duration,
    ) -> Result<bool, StateError> {
        let mut conn = self.conn();
        let acquired: u64 = Script::new(ACQUIRE_LEASE)
            .key(keys::lease(name))
            .arg(owner)
            .arg(ttl.as_secs().max(1))
            .invoke_async(&mut conn)
            .await
            .map_err(transport)?;
        Ok(acquired == 1)
    }

    async fn release(&self, name: &str, owner: &str) -> Result<bool, StateError> {
        let mut conn = self.conn();
        let released: u64 = Script::new(RELEASE_LEASE)
            .key(keys::lease(name))
            .arg(owner)
            .invoke_async(&mut conn)
            .await
            .map_err(transport)?;
        Ok(released == 1)
    }
}

fn metrics_from_map(map: &HashMap<String, String>) -> ConnectorMetrics {
    let get_u64 = |k: &str| map.get(k).and_then(|v| v.parse().ok()).unwrap_or(0);
    ConnectorMetrics {
        last_poll_time: map.get("last_poll_time").cloned(),
        last_success_time: map.get("last_success_time").cloned(),
        total_polls: get_u64("total_polls"),
        successful_polls: get_u64("successful_polls"),
        failed_polls: get_u64("failed_polls"),
        items_fetched: get_u64("items_fetched"),
        items_published: get_u64("items_published"),
        average_latency_ms: map
            .get("average_latency_ms")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0.0),
    }
}

#[async_trait]
impl ConnectorMetricsStore for RedisStateStore {
    async fn record_poll(&self, name: &str, record: &PollRecord) -> Result<(), StateError> {
        let key = keys::connector_metrics(name);
        let mut conn = self.conn();
        let map: HashMap<String, String> = redis::cmd("HGETALL")
            .arg(&key)
            .query_async(&mut conn)
            .await
            .map_err(transport)?;
        let mut metrics = metrics_from_map(&map);
        metrics.apply(record, sr_core::now_rfc3339());

        let mut cmd = redis::cmd("HSET");
        cmd.arg(&key)
            .arg("total_polls")
            .arg(metrics.total_polls)
            .arg("successful_polls")
            .arg(metrics.successful_polls)
            .arg("failed_polls")
            .arg(metrics.failed_polls)
            .arg("items_fetched")
            .arg(metrics.items_fetched)
            .arg("items_published")
            .arg(metrics.items_published)
            .arg("average_latency_ms")
            .arg(metrics.average_latency_ms);
        if let Some(t) = &metrics.last_poll_time {
            cmd.arg("last_poll_time").arg(t);
        }
        if let Some(t) = &metrics.last_success_time {
            cmd.arg("last_success_time").arg(t);
        }
        let _: u64 = cmd.query_async(&mut conn).await.map_err(transport)?;
        let _: u64 = redis::cmd("EXPIRE")
            .arg(&key)
            .arg(METRICS_TTL_SECONDS)
            .query_async(&mut conn)
            .await
            .map_err(transport)?;
        Ok(())
    }

    async fn snapshot(&self, name: &str) -> Result<Option<ConnectorMetrics>, StateError> {
        let mut conn = self.conn();
        let map: HashMap<String, String> = redis::cmd("HGETALL")
            .arg(keys::connector_metrics(name))
            .query_async(&mut conn)
            .await
            .map_err(transport)?;
        if map.is_empty() {
            return Ok(None);
        }
        Ok(Some(metrics_from_map(&map)))
    }

    async fn is_healthy(&self, name: &str, max_age: Duration) -> Result<bool, StateError> {
        let Some(metrics) = self.snapshot(name).await? else {
            return Ok(false);
        };
        Ok(within_window(metrics.last_poll_time.as_deref(), max_age)
            && within_window(metrics.last_success_time.as_deref(), max_age))
    }
}

pub(crate) fn within_window(timestamp: Option<&str>, max_age: Duration) -> bool {
    let Some(parsed) = timestamp.and_then(|t| DateTime::parse_from_rfc3339(t).ok()) else {
        return false;
    };
    let age = Utc::now().signed_duration_since(parsed.with_timezone(&Utc));
    age.num_milliseconds() >= 0 && age.num_milliseconds() as u128 <= max_age.as_millis()
}

#[async_trait]
impl PlanningStateStore for RedisStateStore {
    async fn upsert_shipment(&self, plan: &ShipmentPlan) -> Result<(), StateError> {
        let encoded =
            serde_json::to_string(plan).map_err(|e| StateError::Serialization(e.to_string()))?;
        let mut conn = self.conn();
        let _: u64 = redis::cmd("HSET")
            .arg(keys::PLANNING_SHIPMENTS)
            .arg(&plan.shipment_id)
            .arg(encoded)
            .query_async(&mut conn)
            .await
            .map_err(transport)?;
        let _: u64 = redis::cmd("SADD")
            .arg(keys::planning_lane(&plan.lane_id))
            .arg(&plan.shipment_id)
            .query_async(&mut conn)
            .await
            .map_err(transport)?;
        Ok(())
    }

    async fn upsert_inventory(&self, snapshot: &InventorySnapshot) -> Result<(), StateError> {
        let encoded = serde_json::to_string(snapshot)
            .map_err(|e| StateError::Serialization(e.to_string()))?;
        let mut conn = self.conn();
        let _: u64 = redis::cmd("HSET")
            .arg(keys::PLANNING_INVENTORY)
            .arg(keys::inventory_field(&snapshot.sku, &snapshot.site_id))
            .arg(encoded)
            .query_async(&mut conn)
            .await
            .map_err(transport)?;
        Ok(())
    }

    async fn list_shipments(&self) -> Result<Vec<ShipmentPlan>, StateError> {
        let mut conn = self.conn();
        let map: HashMap<String, String> = redis::cmd("HGETALL")
            .arg(keys::PLANNING_SHIPMENTS)
            .query_async(&mut conn)
            .await
            .map_err(transport)?;
        map.values()
            .map(|raw| {
                serde_json::from_str(raw).map_err(|e| StateError::Serialization(e.to_string()))
            })
            .collect()
    }

    async fn list_inventory(&self) -> Result<Vec<InventorySnapshot>, StateError> {
        let mut conn = self.conn();
        let map: HashMap<String, String> = redis::cmd("HGETALL")
            .arg(keys::PLANNING_INVENTORY)
            .query_async(&mut conn)
            .await
            .map_err(transport)?;
        map.values()
            .map(|raw| {
                serde_json::from_str(raw).map_err(|e| StateError::Serialization(e.to_string()))
            })
            .collect()
    }

    async fn shipments_for_lane(&self, lane_id: &str) -> Result<Vec<String>, StateError> {
        let mut conn = self.conn();
        redis::cmd("SMEMBERS")
            .arg(keys::planning_lane(lane_id))
            .query_async(&mut conn)
            .await
            .map_err(transport)
    }
}
