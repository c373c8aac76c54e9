// sr-bus: Event-bus abstraction over a log-structured stream store.
//
// Streams are named append-only logs with store-assigned, lexically ordered
// ids. Consumer groups share a cursor with per-message pending state,
// giving at-least-once delivery; unprocessable records are routed to
// `<stream>.dlq` instead of surfacing to handlers.
//
// Two drivers implement the contract: Redis Streams (production) and an
// in-memory store (tests, with a publish-failure budget for simulating
// transient transport errors).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

pub mod envelope;
pub mod memory;
pub mod redis_driver;

pub use envelope::{decode_envelope, encode_envelope, DecodeFailure, DecodedEnvelope};
pub use memory::MemoryBus;
pub use redis_driver::RedisStreamBus;

/// Sentinel id ordering after every real id; selects "tail" as a group
/// start position.
pub const TAIL_ID: &str = "$";

/// Default approximate stream length cap.
pub const DEFAULT_STREAM_MAX_LEN: usize = 100_000;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Transport-level bus failure. Decode failures never appear here: the
/// drivers route malformed envelopes to the DLQ themselves.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("encode error: {0}")]
    Encode(String),
    #[error("no such consumer group '{group}' on stream '{stream}'")]
    NoSuchGroup { stream: String, group: String },
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A record as stored in a stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub stream: String,
    /// Store-assigned id; lexical order equals insertion order.
    pub id: String,
    /// The decoded message payload.
    pub message: Value,
    pub published_at: DateTime<Utc>,
}

/// A record delivered through a consumer group.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumerMessage {
    pub id: String,
    pub message: Value,
    pub published_at: DateTime<Utc>,
    /// True when this delivery came off the pending list (a redelivery).
    pub redelivered: bool,
}

/// Publish options; `max_len` overrides the driver's default length cap.
#[derive(Debug, Clone, Copy, Default)]
pub struct PublishOptions {
    pub max_len: Option<usize>,
}

/// Initial cursor position when creating a consumer group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupStart {
    /// Deliver everything already in the stream.
    Head,
    /// Deliver only records published after group creation.
    Tail,
    /// Deliver records after a literal id.
    At(String),
}

/// Parameters for a `consume_group` call.
#[derive(Debug, Clone)]
pub struct ConsumeRequest {
    pub stream: String,
    pub group: String,
    pub consumer: String,
    /// Upper bound on returned messages.
    pub count: usize,
    /// How long to block waiting for new messages once pending is drained.
    pub block: Duration,
}

/// Reason a record was routed to the dead-letter stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DlqReason {
    MalformedPayload,
    MaxDeliveriesExceeded,
}

/// Parameters for a `move_to_dlq` call.
#[derive(Debug, Clone)]
pub struct DlqRequest {
    pub source_stream: String,
    pub source_message_id: String,
    pub reason: DlqReason,
    /// The original payload, carried verbatim.
    pub payload: Value,
    /// Routing context: group, consumer, last error, raw fields.
    pub metadata: Value,
}

/// The structured record published to `<stream>.dlq`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqRecord {
    pub source_stream: String,
    pub source_message_id: String,
    pub reason: DlqReason,
    pub payload: Value,
    pub metadata: Value,
    pub failed_at_utc: String,
}

impl DlqRecord {
    pub fn from_request(req: DlqRequest) -> DlqRecord {
        DlqRecord {
            source_stream: req.source_stream,
            source_message_id: req.source_message_id,
            reason: req.reason,
            payload: req.payload,
            metadata: req.metadata,
            failed_at_utc: sr_core::now_rfc3339(),
        }
    }
}

// ---------------------------------------------------------------------------
// Capability traits
// ---------------------------------------------------------------------------

#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Append one envelope; returns the assigned id and publish timestamp.
    /// Fails only on transport errors.
    async fn publish(
        &self,
        stream: &str,
        message: &Value,
        opts: PublishOptions,
    ) -> Result<Record, BusError>;
}

#[async_trait]
pub trait EventStreamReader: Send + Sync {
    /// Up to `limit` most recent records in chronological order. Malformed
    /// envelopes are silently skipped. `limit == 0` returns empty without
    /// touching the transport.
    async fn read_recent(&self, stream: &str, limit: usize) -> Result<Vec<Record>, BusError>;
}

#[async_trait]
pub trait EventConsumer: Send + Sync {
    /// Idempotently create a consumer group at the given start position.
    async fn ensure_group(
        &self,
        stream: &str,
        group: &str,
        start: GroupStart,
    ) -> Result<(), BusError>;

    /// Deliver at most `count` messages: pending redeliveries for this
    /// consumer first (non-blocking), then new messages past the group
    /// cursor (blocking up to `block`). Malformed envelopes are routed to
    /// the DLQ and acked before this returns; the caller never sees them.
    async fn consume_group(&self, req: &ConsumeRequest) -> Result<Vec<ConsumerMessage>, BusError>;

    /// Remove ids from the group's pending set. Empty input is a no-op
    /// returning 0.
    async fn ack(&self, stream: &str, group: &str, ids: &[String]) -> Result<u64, BusError>;

    /// Publish a structured failure record to `<source_stream>.dlq`.
    async fn move_to_dlq(&self, req: DlqRequest) -> Result<String, BusError>;
}

/// The full bus: publish + tailing reads + consumer groups.
pub trait EventBus: EventPublisher + EventStreamReader + EventConsumer {}

impl<T: EventPublisher + EventStreamReader + EventConsumer> EventBus for T {}

// ---------------------------------------------------------------------------
// Typed publish helper
// ---------------------------------------------------------------------------

/// Serialize a typed message and publish it with default options.
pub async fn publish_message<T, P>(
    publisher: &P,
    stream: &str,
    message: &T,
) -> Result<Record, BusError>
where
    T: Serialize + ?Sized,
    P: EventPublisher + ?Sized,
{
    let value =
        serde_json::to_value(message).map_err(|e| BusError::Encode(e.to_string()))?;
    publisher.publish(stream, &value, PublishOptions::default()).await
}
