//! The bounded concurrency queue.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::oneshot;

use crate::metrics::GatewayMetrics;

/// Admission limits.
#[derive(Debug, Clone, Copy)]
pub struct QueueConfig {
    pub max_concurrency: usize,
    pub max_queue_size: usize,
}

/// Admission refused: concurrency and queue are both full.
#[derive(Debug, thiserror::Error)]
#[error("QUEUE_FULL")]
pub struct QueueOverflow;

struct State {
    in_flight: usize,
    waiters: VecDeque<oneshot::Sender<()>>,
}

struct Shared {
    cfg: QueueConfig,
    state: Mutex<State>,
    metrics: Arc<GatewayMetrics>,
}

impl Shared {
    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Bounded-concurrency admission queue.
#[derive(Clone)]
pub struct BoundedQueue {
    shared: Arc<Shared>,
}

/// An execution slot. Dropping it hands the slot to the oldest live
/// waiter, or frees it when the queue is empty.
pub struct Permit {
    shared: Arc<Shared>,
}

impl BoundedQueue {
    pub fn new(cfg: QueueConfig, metrics: Arc<GatewayMetrics>) -> BoundedQueue {
        BoundedQueue {
            shared: Arc::new(Shared {
                cfg,
                state: Mutex::new(State {
                    in_flight: 0,
                    waiters: VecDeque::new(),
                }),
                metrics,
            }),
        }
    }

    pub fn metrics(&self) -> Arc<GatewayMetrics> {
        self.shared.metrics.clone()
    }

    /// Admit one request: immediately, after queueing, or not at all.
    pub async fn admit(&self) -> Result<Permit, QueueOverflow> {
        let waiter = {
            let mut state = self.shared.lock();
            if state.in_flight < self.shared.cfg.max_concurrency {
                state.in_flight += 1;
                self.shared.metrics.slot_acquired();
                None
            } else if state.waiters.len() < self.shared.cfg.max_queue_size {
                let (tx, rx) = oneshot::channel();
                state.waiters.push_back(tx);
                self.shared.metrics.set_queue_depth(state.waiters.len() as u64);
                Some(rx)
            } else {
                self.shared.metrics.record_overflow();
                return Err(QueueOverflow);
            }
        };

        match waiter {
            None => Ok(Permit {
                shared: self.shared.clone(),
            }),
            Some(rx) => match rx.await {
                // The releaser transferred its slot to us; in_flight and
                // the in-flight gauge carry over unchanged.
                Ok(()) => Ok(Permit {
                    shared: self.shared.clone(),
                }),
                // Queue dropped while we waited; treat as refusal.
                Err(_) => Err(QueueOverflow),
            },
        }
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        loop {
            match state.waiters.pop_front() {
                Some(waiter) => {
                    self.shared
                        .metrics
                        .set_queue_depth(state.waiters.len() as u64);
                    if waiter.send(()).is_ok() {
                        // Slot transferred; in_flight unchanged.
                        return;
                    }
                    // Waiter gave up (request timed out while queued);
                    // try the next one.
                }
                None => {
                    state.in_flight -= 1;
                    self.shared.metrics.slot_released();
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn queue(max_concurrency: usize, max_queue_size: usize) -> BoundedQueue {
        BoundedQueue::new(
            QueueConfig {
                max_concurrency,
                max_queue_size,
            },
            Arc::new(GatewayMetrics::default()),
        )
    }

    #[tokio::test]
    async fn admits_up_to_concurrency_limit() {
        let q = queue(2, 0);
        let _a = q.admit().await.unwrap();
        let _b = q.admit().await.unwrap();
        assert!(q.admit().await.is_err(), "no queue space configured");
    }

    #[tokio::test]
    async fn queued_request_runs_after_release() {
        let q = queue(1, 1);
        let first = q.admit().await.unwrap();

        let q2 = q.clone();
        let queued = tokio::spawn(async move { q2.admit().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!queued.is_finished(), "second request must wait");

        drop(first);
        let permit = tokio::time::timeout(Duration::from_millis(200), queued)
            .await
            .expect("queued request should be admitted")
            .unwrap();
        assert!(permit.is_ok());
    }

    #[tokio::test]
    async fn overflow_rejects_and_counts() {
        let q = queue(1, 1);
        let _held = q.admit().await.unwrap();

        let q2 = q.clone();
        let _queued = tokio::spawn(async move {
            let _permit = q2.admit().await;
            tokio::time::sleep(Duration::from_secs(5)).await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Concurrency full, queue full: immediate rejection.
        assert!(q.admit().await.is_err());
        assert_eq!(q.metrics().snapshot().queue_overflow_rejections, 1);
    }

    #[tokio::test]
    async fn abandoned_waiter_does_not_leak_the_slot() {
        let q = queue(1, 2);
        let first = q.admit().await.unwrap();

        // A waiter that gives up before being woken.
        let q2 = q.clone();
        let abandoned = tokio::spawn(async move {
            let _ = tokio::time::timeout(Duration::from_millis(10), q2.admit()).await;
        });
        abandoned.await.unwrap();

        // A waiter that stays.
        let q3 = q.clone();
        let patient = tokio::spawn(async move { q3.admit().await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        drop(first);
        let permit = tokio::time::timeout(Duration::from_millis(200), patient)
            .await
            .expect("patient waiter should get the slot")
            .unwrap();
        assert!(permit.is_ok());
    }

    #[tokio::test]
    async fn in_flight_gauge_tracks_permits() {
        let q = queue(4, 0);
        let a = q.admit().await.unwrap();
        let b = q.admit().await.unwrap();
        assert_eq!(q.metrics().snapshot().requests_in_flight, 2);
        drop(a);
        drop(b);
        assert_eq!(q.metrics().snapshot().requests_in_flight, 0);
    }
}
