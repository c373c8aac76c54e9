// sr-worker: Generic consumer-group worker loop.
//
// One worker instance processes its stream sequentially; parallelism comes
// from running more instances with distinct consumer names in the same
// group. Per message: read the authoritative delivery count, invoke the
// handler, then ack (success), dead-letter + ack (delivery budget spent),
// or leave pending for backoff redelivery (budget remaining).
//
// # Delivery-count authority
// The external attempt counter (`retry:<stream>:<group>:<id>`) drives the
// DLQ decision so policy survives consumer-name changes. The log store's
// own delivery count is a hint only and is never reconciled against it.

use async_trait::async_trait;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use sr_bus::{
    BusError, ConsumeRequest, ConsumerMessage, DlqReason, DlqRequest, EventBus, GroupStart,
};
use sr_core::{default_consumer_name, StopSource, StopToken};
use sr_state::{AttemptStore, StateError, DEFAULT_RETRY_KEY_TTL_SECONDS};

/// Hard cap on a single retry-backoff sleep.
const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Handler contract
// ---------------------------------------------------------------------------

/// Failure raised by a stream handler; governed by the delivery-count
/// policy. A handler that returns an error immediately and one whose
/// future fails later are treated identically.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct HandlerError {
    pub message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> HandlerError {
        HandlerError {
            message: message.into(),
        }
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        HandlerError { message }
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        HandlerError {
            message: message.to_owned(),
        }
    }
}

/// A stream message handler.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: &ConsumerMessage) -> Result<(), HandlerError>;
}

// ---------------------------------------------------------------------------
// Worker configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub stream: String,
    pub group: String,
    pub consumer: String,
    pub batch_size: usize,
    pub block: Duration,
    pub max_deliveries: u64,
    pub retry_key_ttl: Duration,
    /// Base backoff; attempt n sleeps `retry_backoff × n` (capped).
    pub retry_backoff: Duration,
}

impl WorkerConfig {
    /// Defaults per the transport configuration: batch 50, block 5 s,
    /// 5 deliveries, consumer `<role>-<host>-<pid>`.
    pub fn new(stream: impl Into<String>, group: impl Into<String>, role: &str) -> WorkerConfig {
        WorkerConfig {
            stream: stream.into(),
            group: group.into(),
            consumer: default_consumer_name(role),
            batch_size: 50,
            block: Duration::from_millis(5_000),
            max_deliveries: 5,
            retry_key_ttl: Duration::from_secs(DEFAULT_RETRY_KEY_TTL_SECONDS),
            retry_backoff: Duration::from_millis(50),
        }
    }
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Initialized,
    Running,
    Stopping,
    Stopped,
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error(transparent)]
    Bus(#[from] BusError),
    #[error(transparent)]
    State(#[from] StateError),
}

// ---------------------------------------------------------------------------
// StreamWorker
// ---------------------------------------------------------------------------

/// Consumer-group worker binding a handler to one stream.
pub struct StreamWorker {
    bus: Arc<dyn EventBus>,
    attempts: Arc<dyn AttemptStore>,
    handler: Arc<dyn MessageHandler>,
    cfg: WorkerConfig,
    stop: StopSource,
    state: Mutex<WorkerState>,
}

impl StreamWorker {
    pub fn new(
        bus: Arc<dyn EventBus>,
        attempts: Arc<dyn AttemptStore>,
        handler: Arc<dyn MessageHandler>,
        cfg: WorkerConfig,
    ) -> StreamWorker {
        StreamWorker {
            bus,
            attempts,
            handler,
            cfg,
            stop: StopSource::new(),
            state: Mutex::new(WorkerState::Initialized),
        }
    }

    pub fn state(&self) -> WorkerState {
        *self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn set_state(&self, state: WorkerState) {
        *self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = state;
    }

    /// Ensure the consumer group exists, positioned at the stream head.
    pub async fn init(&self) -> Result<(), WorkerError> {
        self.bus
            .ensure_group(&self.cfg.stream, &self.cfg.group, GroupStart::Head)
            .await?;
        Ok(())
    }

    /// Signal the loop to stop. Idempotent. The in-flight message always
    /// completes its ack/DLQ decision before the loop exits.
    pub fn stop(&self) {
        if self.state() == WorkerState::Running {
            self.set_state(WorkerState::Stopping);
        }
        self.stop.stop();
    }

    /// Run until `stop()` is signalled.
    pub async fn start(&self) -> Result<(), WorkerError> {
        let token = self.stop.token();
        self.set_state(WorkerState::Running);
        info!(
            stream = %self.cfg.stream,
            group = %self.cfg.group,
            consumer = %self.cfg.consumer,
            "worker starting"
        );
        while !token.is_stopped() {
            match self.run_once().await {
                Ok(_) => {}
                Err(e) => {
                    error!(
                        stream = %self.cfg.stream,
                        group = %self.cfg.group,
                        error = %e,
                        "worker iteration failed"
                    );
                    self.sleep_interruptible(self.cfg.retry_backoff, &token).await;
                }
            }
        }
        self.set_state(WorkerState::Stopped);
        info!(stream = %self.cfg.stream, group = %self.cfg.group, "worker stopped");
        Ok(())
    }

    /// One loop iteration: read a batch, process each message to its
    /// ack/DLQ/pending decision. Returns the number of messages handled
    /// successfully. This is the entry point tests drive directly.
    pub async fn run_once(&self) -> Result<usize, WorkerError> {
        let token = self.stop.token();
        let messages = self
            .bus
            .consume_group(&ConsumeRequest {
                stream: self.cfg.stream.clone(),
                group: self.cfg.group.clone(),
                consumer: self.cfg.consumer.clone(),
                count: self.cfg.batch_size,
                block: self.cfg.block,
            })
            .await?;

        let mut handled = 0;
        for message in &messages {
            if self.process_message(message, &token).await? {
                handled += 1;
            }
            // Stop between messages, never between a handler outcome and
            // its ack/DLQ decision.
            if token.is_stopped() {
                break;
            }
        }
        Ok(handled)
    }

    /// Process one message to completion. Returns true on handler success.
    async fn process_message(
        &self,
        message: &ConsumerMessage,
        token: &StopToken,
    ) -> Result<bool, WorkerError> {
        let cfg = &self.cfg;
        let prior = self
            .attempts
            .get(&cfg.stream, &cfg.group, &message.id)
            .await?;
        debug!(
            stream = %cfg.stream,
            group = %cfg.group,
            id = %message.id,
            attempt = prior + 1,
            redelivered = message.redelivered,
            "handling message"
        );

        match self.handler.handle(message).await {
            Ok(()) => {
                self.bus
                    .ack(&cfg.stream, &cfg.group, &[message.id.clone()])
                    .await?;
                self.attempts
                    .clear(&cfg.stream, &cfg.group, &message.id)
                    .await?;
                Ok(true)
            }
            Err(handler_error) => {
                let count = self
                    .attempts
                    .increment(&cfg.stream, &cfg.group, &message.id, cfg.retry_key_ttl)
                    .await?;
                if count >= cfg.max_deliveries {
                    warn!(
                        stream = %cfg.stream,
                        group = %cfg.group,
                        id = %message.id,
                        attempt = count,
                        error = %handler_error,
                        "delivery budget spent, routing to DLQ"
                    );
                    self.bus
                        .move_to_dlq(DlqRequest {
                            source_stream: cfg.stream.clone(),
                            source_message_id: message.id.clone(),
                            reason: DlqReason::MaxDeliveriesExceeded,
                            payload: message.message.clone(),
                            metadata: json!({
                                "group": cfg.group,
                                "consumer": cfg.consumer,
                                "last_error": handler_error.message,
                            }),
                        })
                        .await?;
                    self.bus
                        .ack(&cfg.stream, &cfg.group, &[message.id.clone()])
                        .await?;
                    self.attempts
                        .clear(&cfg.stream, &cfg.group, &message.id)
                        .await?;
                } else {
                    let delay = cfg
                        .retry_backoff
                        .saturating_mul(count.min(u64::from(u32::MAX)) as u32)
                        .min(MAX_RETRY_BACKOFF);
                    warn!(
                        stream = %cfg.stream,
                        group = %cfg.group,
                        id = %message.id,
                        attempt = count,
                        delay_ms = delay.as_millis() as u64,
                        error = %handler_error,
                        "handler failed, leaving pending for redelivery"
                    );
                    self.sleep_interruptible(delay, token).await;
                }
                Ok(false)
            }
        }
    }

    async fn sleep_interruptible(&self, delay: Duration, token: &StopToken) {
        if delay.is_zero() {
            return;
        }
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = token.stopped() => {}
        }
    }
}
