//! Redis Streams driver.
//!
//! Mapping: `publish` → XADD with `MAXLEN ~` trimming, `read_recent` →
//! XREVRANGE, `ensure_group` → XGROUP CREATE MKSTREAM (BUSYGROUP
//! swallowed), `consume_group` → XREADGROUP with the "0" pending cursor
//! first then the ">" new cursor, `ack` → XACK.
//!
//! A blocking XREADGROUP occupies the underlying connection, so each
//! worker should hold its own `RedisStreamBus` (cloning is cheap; the
//! connection manager reconnects on its own).

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

use crate::envelope::{decode_envelope, encode_envelope};
use crate::{
    BusError, ConsumeRequest, ConsumerMessage, DlqReason, DlqRecord, DlqRequest, EventConsumer,
    EventPublisher, EventStreamReader, GroupStart, PublishOptions, Record, DEFAULT_STREAM_MAX_LEN,
    TAIL_ID,
};

/// Raw XREADGROUP entry: id plus fields, or nil fields for entries that
/// were trimmed out from under the pending list.
type RawEntry = (String, Option<HashMap<String, String>>);
type RawStreamReply = Option<Vec<(String, Vec<RawEntry>)>>;

/// Event bus backed by Redis Streams.
#[derive(Clone)]
pub struct RedisStreamBus {
    manager: ConnectionManager,
    default_max_len: usize,
}

impl RedisStreamBus {
    /// Connect to the stream store.
    pub async fn connect(url: &str) -> Result<RedisStreamBus, BusError> {
        Self::connect_with_max_len(url, DEFAULT_STREAM_MAX_LEN).await
    }

    pub async fn connect_with_max_len(
        url: &str,
        default_max_len: usize,
    ) -> Result<RedisStreamBus, BusError> {
        let client =
            redis::Client::open(url).map_err(|e| BusError::Transport(e.to_string()))?;
        let manager = client
            .get_connection_manager()
            .await
            .map_err(|e| BusError::Transport(e.to_string()))?;
        Ok(RedisStreamBus {
            manager,
            default_max_len,
        })
    }

    /// Release the transport. The manager closes when the last clone drops.
    pub fn close(self) {}

    fn conn(&self) -> ConnectionManager {
        self.manager.clone()
    }

    async fn read_group_raw(
        &self,
        req: &ConsumeRequest,
        cursor: &str,
        block: Option<Duration>,
    ) -> Result<Vec<RawEntry>, BusError> {
        let mut conn = self.conn();
        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP")
            .arg(&req.group)
            .arg(&req.consumer)
            .arg("COUNT")
            .arg(req.count);
        if let Some(block) = block {
            cmd.arg("BLOCK").arg(block.as_millis() as u64);
        }
        cmd.arg("STREAMS").arg(&req.stream).arg(cursor);

        let reply: RawStreamReply = cmd.query_async(&mut conn).await.map_err(|e| {
            if e.code() == Some("NOGROUP") {
                BusError::NoSuchGroup {
                    stream: req.stream.clone(),
                    group: req.group.clone(),
                }
            } else {
                BusError::Transport(e.to_string())
            }
        })?;

        Ok(reply
            .unwrap_or_default()
            .into_iter()
            .flat_map(|(_, entries)| entries)
            .collect())
    }

    /// Decode raw entries, routing malformed envelopes to the DLQ.
    async fn decode_entries(
        &self,
        req: &ConsumeRequest,
        entries: Vec<RawEntry>,
        redelivered: bool,
    ) -> Result<Vec<ConsumerMessage>, BusError> {
        let mut messages = Vec::with_capacity(entries.len());
        for (id, fields) in entries {
            let Some(fields) = fields else {
                // Trimmed out from under the pending list; nothing to
                // deliver or dead-letter.
                debug!(stream = %req.stream, id = %id, "pending entry trimmed, acking");
                self.ack(&req.stream, &req.group, &[id]).await?;
                continue;
            };
            match decode_envelope(&fields) {
                Ok(envelope) => messages.push(ConsumerMessage {
                    id,
                    message: envelope.message,
                    published_at: envelope.published_at,
                    redelivered,
                }),
                Err(failure) => {
                    warn!(
                        stream = %req.stream,
                        group = %req.group,
                        id = %id,
                        error = %failure.error,
                        "malformed envelope, routing to DLQ"
                    );
                    self.move_to_dlq(DlqRequest {
                        source_stream: req.stream.clone(),
                        source_message_id: id.clone(),
                        reason: DlqReason::MalformedPayload,
                        payload: serde_json::json!(failure.raw_fields),
                        metadata: serde_json::json!({
                            "group": req.group,
                            "consumer": req.consumer,
                            "error": failure.error,
                        }),
                    })
                    .await?;
                    self.ack(&req.stream, &req.group, &[id]).await?;
                }
            }
        }
        Ok(messages)
    }
}

#[async_trait]
impl EventPublisher for RedisStreamBus {
    async fn publish(
        &self,
        stream: &str,
        message: &serde_json::Value,
        opts: PublishOptions,
    ) -> Result<Record, BusError> {
        let fields = encode_envelope(message)?;
        let published_at = fields
            .iter()
            .find(|(k, _)| k == crate::envelope::PUBLISHED_AT_FIELD)
            .and_then(|(_, v)| chrono::DateTime::parse_from_rfc3339(v).ok())
            .map(|dt| dt.with_timezone(&chrono::Utc))
            .unwrap_or_else(chrono::Utc::now);

        let max_len = opts.max_len.unwrap_or(self.default_max_len);
        let mut conn = self.conn();
        let mut cmd = redis::cmd("XADD");
        cmd.arg(stream).arg("MAXLEN").arg("~").arg(max_len).arg("*");
        for (key, value) in &fields {
            cmd.arg(key).arg(value);
        }
        let id: String = cmd
            .query_async(&mut conn)
            .await
            .map_err(|e| BusError::Transport(e.to_string()))?;

        Ok(Record {
            stream: stream.to_owned(),
            id,
            message: message.clone(),
            published_at,
        })
    }
}

#[async_trait]
impl EventStreamReader for RedisStreamBus {
    async fn read_recent(&self, stream: &str, limit: usize) -> Result<Vec<Record>, BusError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.conn();
        let reply: Vec<(String, HashMap<String, String>)> = redis::cmd("XREVRANGE")
            .arg(stream)
            .arg("+")
            .arg("-")
            .arg("COUNT")
            .arg(limit)
            .query_async(&mut conn)
            .await
            .map_err(|e| BusError::Transport(e.to_string()))?;

        let mut records: Vec<Record> = reply
            .into_iter()
            .filter_map(|(id, fields)| match decode_envelope(&fields) {
                Ok(envelope) => Some(Record {
                    stream: stream.to_owned(),
                    id,
                    message: envelope.message,
                    published_at: envelope.published_at,
                }),
                Err(failure) => {
                    debug!(stream = %stream, id = %id, error = %failure.error, "skipping malformed record");
                    None
                }
            })
            .collect();
        records.reverse();
        Ok(records)
    }
}

#[async_trait]
impl EventConsumer for RedisStreamBus {
    async fn ensure_group(
        &self,
        stream: &str,
        group: &str,
        start: GroupStart,
    ) -> Result<(), BusError> {
        let start_id = match &start {
            GroupStart::Head => "0",
            GroupStart::Tail => TAIL_ID,
            GroupStart::At(id) => id.as_str(),
        };
        let mut conn = self.conn();
        let created: Result<String, redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(stream)
            .arg(group)
            .arg(start_id)
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;
        match created {
            Ok(_) => Ok(()),
            // Re-creating an existing group is a no-op.
            Err(e) if e.code() == Some("BUSYGROUP") => Ok(()),
            Err(e) => Err(BusError::Transport(e.to_string())),
        }
    }

    async fn consume_group(&self, req: &ConsumeRequest) -> Result<Vec<ConsumerMessage>, BusError> {
        // Pending first: messages delivered to this consumer but never
        // acked. Non-blocking.
        let pending = self.read_group_raw(req, "0", None).await?;
        if !pending.is_empty() {
            let messages = self.decode_entries(req, pending, true).await?;
            if !messages.is_empty() {
                return Ok(messages);
            }
            // Every pending entry was malformed or trimmed; fall through
            // to the new-message read.
        }

        let fresh = self.read_group_raw(req, ">", Some(req.block)).await?;
        self.decode_entries(req, fresh, false).await
    }

    async fn ack(&self, stream: &str, group: &str, ids: &[String]) -> Result<u64, BusError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn();
        let mut cmd = redis::cmd("XACK");
        cmd.arg(stream).arg(group);
        for id in ids {
            cmd.arg(id);
        }
        cmd.query_async(&mut conn)
            .await
            .map_err(|e| BusError::Transport(e.to_string()))
    }

    async fn move_to_dlq(&self, req: DlqRequest) -> Result<String, BusError> {
        let dlq = sr_types::streams::dlq_stream(&req.source_stream);
        let record = DlqRecord::from_request(req);
        let value =
            serde_json::to_value(&record).map_err(|e| BusError::Encode(e.to_string()))?;
        let published = self
            .publish(&dlq, &value, PublishOptions::default())
            .await?;
        Ok(published.id)
    }
}
