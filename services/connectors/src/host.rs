//! Connector host: reconciles running runners against the registry.
//!
//! `apply` diffs the desired registry against what is running: connectors
//! that disappeared or became disabled are stopped, new enabled ones are
//! started. The SIGHUP loop in `main` re-loads the registry and calls
//! `apply` again; a mid-poll reload never corrupts state because runners
//! finish their in-flight poll before honoring the stop token.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use sr_connector::{factory, ConnectorConfig, ConnectorContext, ConnectorRunner};
use sr_core::StopSource;
use sr_state::{ConnectorMetricsStore, LeaseStore};

struct RunningConnector {
    stop: StopSource,
    task: JoinHandle<()>,
    cfg: ConnectorConfig,
}

pub struct ConnectorHost {
    ctx: ConnectorContext,
    leases: Arc<dyn LeaseStore>,
    metrics: Arc<dyn ConnectorMetricsStore>,
    running: Mutex<HashMap<String, RunningConnector>>,
}

impl ConnectorHost {
    pub fn new(
        ctx: ConnectorContext,
        leases: Arc<dyn LeaseStore>,
        metrics: Arc<dyn ConnectorMetricsStore>,
    ) -> ConnectorHost {
        ConnectorHost {
            ctx,
            leases,
            metrics,
            running: Mutex::new(HashMap::new()),
        }
    }

    /// Names of currently running connectors, sorted.
    pub async fn running_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.running.lock().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Reconcile running connectors against a freshly loaded registry.
    pub async fn apply(&self, configs: &[ConnectorConfig]) {
        let desired: HashMap<&str, &ConnectorConfig> = configs
            .iter()
            .filter(|c| c.enabled)
            .map(|c| (c.name.as_str(), c))
            .collect();

        let mut running = self.running.lock().await;

        // Stop connectors that are gone, disabled, or reconfigured.
        let to_stop: HashSet<String> = running
            .iter()
            .filter(|(name, entry)| {
                desired
                    .get(name.as_str())
                    .map_or(true, |cfg| **cfg != entry.cfg)
            })
            .map(|(name, _)| name.clone())
            .collect();
        for name in to_stop {
            if let Some(entry) = running.remove(&name) {
                info!(connector = %name, "stopping connector runner");
                entry.stop.stop();
                // Let the runner finish its in-flight poll.
                let _ = entry.task.await;
            }
        }

        // Start connectors that are desired but not running.
        for (name, cfg) in desired {
            if running.contains_key(name) {
                continue;
            }
            let connector = match factory::create(cfg, &self.ctx) {
                Ok(connector) => connector,
                Err(e) => {
                    warn!(connector = %name, error = %e, "cannot build connector, skipping");
                    continue;
                }
            };
            let runner = ConnectorRunner::new(
                connector,
                self.leases.clone(),
                self.metrics.clone(),
                Duration::from_millis(cfg.poll_interval_ms),
                Duration::from_secs(cfg.lease_ttl_seconds),
            );
            let stop = StopSource::new();
            let token = stop.token();
            let task = tokio::spawn(async move {
                runner.run(token).await;
            });
            info!(connector = %name, "connector runner started");
            running.insert(
                name.to_owned(),
                RunningConnector {
                    stop,
                    task,
                    cfg: cfg.clone(),
                },
            );
        }
    }

    /// Stop everything.
    pub async fn shutdown(&self) {
        let mut running = self.running.lock().await;
        for (name, entry) in running.drain() {
            info!(connector = %name, "stopping connector runner");
            entry.stop.stop();
            let _ = entry.task.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use sr_bus::MemoryBus;
    use sr_connector::{Connector, ConnectorError, ConnectorFactory, PollSummary};
    use sr_state::MemoryStateStore;

    struct IdleConnector {
        name: String,
    }

    #[async_trait]
    impl Connector for IdleConnector {
        fn name(&self) -> &str {
            &self.name
        }
        async fn poll(&self) -> Result<PollSummary, ConnectorError> {
            Ok(PollSummary::default())
        }
    }

    struct IdleFactory;

    impl ConnectorFactory for IdleFactory {
        fn create(
            &self,
            cfg: &ConnectorConfig,
            _ctx: &ConnectorContext,
        ) -> Result<Arc<dyn Connector>, ConnectorError> {
            Ok(Arc::new(IdleConnector {
                name: cfg.name.clone(),
            }))
        }
    }

    fn cfg(name: &str, enabled: bool) -> ConnectorConfig {
        serde_json::from_value(json!({
            "name": name,
            "type": "idle-test",
            "enabled": enabled,
            "poll_interval_ms": 10,
        }))
        .unwrap()
    }

    fn host() -> ConnectorHost {
        let store = MemoryStateStore::new();
        ConnectorHost::new(
            ConnectorContext {
                publisher: Arc::new(MemoryBus::new()),
                state_store: Arc::new(store.clone()),
            },
            Arc::new(store.clone()),
            Arc::new(store),
        )
    }

    #[tokio::test]
    async fn apply_starts_and_reload_stops() {
        factory::register("idle-test", Arc::new(IdleFactory));
        let host = host();

        host.apply(&[cfg("a", true), cfg("b", true)]).await;
        assert_eq!(host.running_names().await, vec!["a", "b"]);

        // Reload: "a" disabled, "b" gone, "c" new.
        host.apply(&[cfg("a", false), cfg("c", true)]).await;
        assert_eq!(host.running_names().await, vec!["c"]);

        host.shutdown().await;
        assert!(host.running_names().await.is_empty());
    }
}
