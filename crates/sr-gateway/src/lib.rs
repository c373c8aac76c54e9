// sr-gateway: Bounded-concurrency admission shared by the HTTP gateways.
//
// Admission policy: run immediately while in-flight work is under the
// concurrency limit; queue (with a completion wakeup) while the queue is
// under its limit; reject with QueueOverflow beyond that. Releasing a slot
// hands it directly to the oldest live waiter, so queued requests drain in
// FIFO order without a scheduler thread.

pub mod auth;
pub mod metrics;
pub mod queue;

pub use auth::bearer_token_matches;
pub use metrics::{GatewayMetrics, GatewayMetricsSnapshot};
pub use queue::{BoundedQueue, Permit, QueueConfig, QueueOverflow};
