//! The per-connector poll loop.
//!
//! Each interval: take the connector's single-writer lease (a miss means
//! another instance is polling — routine, not an error), poll, record
//! metrics, release the lease, sleep until the next interval. Poll errors
//! log and continue; the loop only exits on the stop token. Registry
//! reload on SIGHUP is the host binary's job: it stops this runner when
//! the connector disappears or is disabled.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::poll::Connector;
use sr_core::StopToken;
use sr_state::{ConnectorMetricsStore, LeaseStore, PollRecord};

pub struct ConnectorRunner {
    connector: Arc<dyn Connector>,
    leases: Arc<dyn LeaseStore>,
    metrics: Arc<dyn ConnectorMetricsStore>,
    poll_interval: Duration,
    lease_ttl: Duration,
    /// Instance-unique lease owner token.
    instance_id: String,
}

impl ConnectorRunner {
    pub fn new(
        connector: Arc<dyn Connector>,
        leases: Arc<dyn LeaseStore>,
        metrics: Arc<dyn ConnectorMetricsStore>,
        poll_interval: Duration,
        lease_ttl: Duration,
    ) -> ConnectorRunner {
        ConnectorRunner {
            connector,
            leases,
            metrics,
            poll_interval,
            lease_ttl,
            instance_id: format!("runner-{}", Uuid::new_v4()),
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Run until the stop token fires.
    pub async fn run(&self, stop: StopToken) {
        let name = self.connector.name().to_owned();
        info!(connector = %name, instance = %self.instance_id, "connector runner starting");
        while !stop.is_stopped() {
            self.run_once().await;
            // Sleep until the next interval; a stop signal wakes this
            // immediately, well inside the 500 ms responsiveness bound.
            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = stop.stopped() => {}
            }
        }
        info!(connector = %name, "connector runner stopped");
    }

    /// One iteration: lease, poll, metrics, release.
    pub async fn run_once(&self) {
        let name = self.connector.name().to_owned();

        match self
            .leases
            .try_acquire(&name, &self.instance_id, self.lease_ttl)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                // Another instance holds the lease; try again next interval.
                debug!(connector = %name, "lease held elsewhere, skipping poll");
                return;
            }
            Err(e) => {
                warn!(connector = %name, error = %e, "lease acquisition failed");
                return;
            }
        }

        let started = Instant::now();
        let record = match self.connector.poll().await {
            Ok(summary) => PollRecord {
                fetched: summary.fetched,
                published: summary.published,
                failed: summary.failed,
                latency: started.elapsed(),
            },
            Err(e) => {
                warn!(connector = %name, error = %e, "poll failed");
                PollRecord {
                    fetched: 0,
                    published: 0,
                    failed: 1,
                    latency: started.elapsed(),
                }
            }
        };

        if let Err(e) = self.metrics.record_poll(&name, &record).await {
            warn!(connector = %name, error = %e, "metrics record failed");
        }

        // The lease is released even when the poll failed.
        match self.leases.release(&name, &self.instance_id).await {
            Ok(true) => {}
            Ok(false) => debug!(connector = %name, "lease expired before release"),
            Err(e) => warn!(connector = %name, error = %e, "lease release failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poll::PollSummary;
    use crate::ConnectorError;
    use async_trait::async_trait;
    use sr_core::StopSource;
    use sr_state::{ConnectorMetricsStore, MemoryStateStore};
    use std::sync::atomic::{AtomicU64, Ordering};

    struct CountingConnector {
        polls: AtomicU64,
        fail: bool,
    }

    #[async_trait]
    impl Connector for CountingConnector {
        fn name(&self) -> &str {
            "counting"
        }
        async fn poll(&self) -> Result<PollSummary, ConnectorError> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(ConnectorError::Fetch("upstream down".to_owned()))
            } else {
                Ok(PollSummary {
                    fetched: 2,
                    published: 2,
                    skipped_unchanged: 0,
                    failed: 0,
                })
            }
        }
    }

    fn runner(connector: Arc<CountingConnector>, store: &MemoryStateStore) -> ConnectorRunner {
        ConnectorRunner::new(
            connector,
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Duration::from_millis(10),
            Duration::from_secs(30),
        )
    }

    #[tokio::test]
    async fn run_once_polls_and_records_metrics() {
        let store = MemoryStateStore::new();
        let connector = Arc::new(CountingConnector {
            polls: AtomicU64::new(0),
            fail: false,
        });
        let r = runner(connector.clone(), &store);
        r.run_once().await;
        assert_eq!(connector.polls.load(Ordering::SeqCst), 1);
        let metrics = store.snapshot("counting").await.unwrap().unwrap();
        assert_eq!(metrics.total_polls, 1);
        assert_eq!(metrics.successful_polls, 1);
        assert_eq!(metrics.items_published, 2);
    }

    #[tokio::test]
    async fn failed_poll_records_and_releases_lease() {
        let store = MemoryStateStore::new();
        let connector = Arc::new(CountingConnector {
            polls: AtomicU64::new(0),
            fail: true,
        });
        let r = runner(connector, &store);
        r.run_once().await;
        let metrics = store.snapshot("counting").await.unwrap().unwrap();
        assert_eq!(metrics.failed_polls, 1);
        // Lease released: a different owner can acquire immediately.
        assert!(sr_state::LeaseStore::try_acquire(
            &store,
            "counting",
            "someone-else",
            Duration::from_secs(30)
        )
        .await
        .unwrap());
    }

    #[tokio::test]
    async fn lease_held_elsewhere_skips_poll() {
        let store = MemoryStateStore::new();
        sr_state::LeaseStore::try_acquire(&store, "counting", "other", Duration::from_secs(30))
            .await
            .unwrap();
        let connector = Arc::new(CountingConnector {
            polls: AtomicU64::new(0),
            fail: false,
        });
        let r = runner(connector.clone(), &store);
        r.run_once().await;
        assert_eq!(connector.polls.load(Ordering::SeqCst), 0);
        assert!(store.snapshot("counting").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn run_stops_on_token() {
        let store = MemoryStateStore::new();
        let connector = Arc::new(CountingConnector {
            polls: AtomicU64::new(0),
            fail: false,
        });
        let r = Arc::new(runner(connector.clone(), &store));
        let source = StopSource::new();
        let token = source.token();
        let handle = {
            let r = r.clone();
            tokio::spawn(async move { r.run(token).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        source.stop();
        tokio::time::timeout(Duration::from_millis(500), handle)
            .await
            .expect("runner must stop promptly")
            .unwrap();
        assert!(connector.polls.load(Ordering::SeqCst) >= 1);
    }
}
