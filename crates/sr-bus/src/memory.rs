//! In-memory bus for tests.
//!
//! Honors the same contracts as the Redis driver: store-assigned ids in
//! insertion order (zero-padded so lexical order equals numeric order),
//! pending-first consumer-group reads, malformed-envelope DLQ routing, and
//! approximate length trimming. Two test-only additions: a configurable
//! publish-failure budget simulating transient transport errors, and a
//! publish-invocation counter. Both cover `publish` only; DLQ writes
//! bypass them.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::envelope::{decode_envelope, encode_envelope};
use crate::{
    BusError, ConsumeRequest, ConsumerMessage, DlqReason, DlqRecord, DlqRequest, EventConsumer,
    EventPublisher, EventStreamReader, GroupStart, PublishOptions, Record, DEFAULT_STREAM_MAX_LEN,
    TAIL_ID,
};

fn format_id(seq: u64) -> String {
    format!("{:020}", seq)
}

fn parse_id(id: &str) -> Option<u64> {
    id.parse().ok()
}

struct StoredRecord {
    seq: u64,
    fields: HashMap<String, String>,
}

struct PendingEntry {
    consumer: String,
}

#[derive(Default)]
struct GroupState {
    /// Highest seq handed out to any consumer in this group.
    last_delivered: u64,
    /// Delivered-but-unacked entries, keyed by seq.
    pending: BTreeMap<u64, PendingEntry>,
}

#[derive(Default)]
struct MemoryStream {
    next_seq: u64,
    records: VecDeque<StoredRecord>,
    groups: HashMap<String, GroupState>,
}

impl MemoryStream {
    fn record(&self, seq: u64) -> Option<&StoredRecord> {
        self.records
            .binary_search_by_key(&seq, |r| r.seq)
            .ok()
            .map(|i| &self.records[i])
    }
}

#[derive(Default)]
struct MemoryState {
    streams: HashMap<String, MemoryStream>,
    publish_failures_remaining: u64,
    publish_invocations: u64,
}

/// In-memory log store with consumer groups.
#[derive(Clone)]
pub struct MemoryBus {
    state: Arc<Mutex<MemoryState>>,
    notify: Arc<Notify>,
    default_max_len: usize,
}

impl MemoryBus {
    pub fn new() -> MemoryBus {
        MemoryBus {
            state: Arc::new(Mutex::new(MemoryState::default())),
            notify: Arc::new(Notify::new()),
            default_max_len: DEFAULT_STREAM_MAX_LEN,
        }
    }

    /// Fail the next `budget` `publish` calls with a transport error.
    pub fn with_publish_failure_budget(budget: u64) -> MemoryBus {
        MemoryBus {
            state: Arc::new(Mutex::new(MemoryState {
                publish_failures_remaining: budget,
                ..MemoryState::default()
            })),
            notify: Arc::new(Notify::new()),
            default_max_len: DEFAULT_STREAM_MAX_LEN,
        }
    }

    pub fn with_max_len(default_max_len: usize) -> MemoryBus {
        MemoryBus {
            default_max_len,
            ..MemoryBus::new()
        }
    }

    /// Release the store. No transport is owned; dropping suffices.
    pub fn close(self) {}

    /// How many times `publish` has been invoked (including failed calls).
    pub async fn publish_invocations(&self) -> u64 {
        self.state.lock().await.publish_invocations
    }

    /// Number of records currently retained on a stream.
    pub async fn stream_len(&self, stream: &str) -> usize {
        self.state
            .lock()
            .await
            .streams
            .get(stream)
            .map_or(0, |s| s.records.len())
    }

    /// Number of delivered-but-unacked entries for a group.
    pub async fn pending_count(&self, stream: &str, group: &str) -> usize {
        self.state
            .lock()
            .await
            .streams
            .get(stream)
            .and_then(|s| s.groups.get(group))
            .map_or(0, |g| g.pending.len())
    }

    /// Append raw envelope fields, bypassing the codec. Lets tests plant
    /// malformed envelopes the way a foreign producer could.
    pub async fn publish_raw_fields(
        &self,
        stream: &str,
        fields: HashMap<String, String>,
    ) -> String {
        let mut state = self.state.lock().await;
        let id = Self::append_locked(&mut state, stream, fields, self.default_max_len);
        drop(state);
        self.notify.notify_waiters();
        id
    }

    fn append_locked(
        state: &mut MemoryState,
        stream: &str,
        fields: HashMap<String, String>,
        max_len: usize,
    ) -> String {
        let entry = state.streams.entry(stream.to_owned()).or_default();
        if entry.next_seq == 0 {
            entry.next_seq = 1;
        }
        let seq = entry.next_seq;
        entry.next_seq += 1;
        entry.records.push_back(StoredRecord { seq, fields });
        while entry.records.len() > max_len {
            entry.records.pop_front();
        }
        format_id(seq)
    }

    fn start_cursor(stream: &MemoryStream, start: &GroupStart) -> u64 {
        let tail = stream.next_seq.saturating_sub(1);
        match start {
            GroupStart::Head => 0,
            GroupStart::Tail => tail,
            GroupStart::At(id) if id == TAIL_ID => tail,
            GroupStart::At(id) => parse_id(id).unwrap_or(0),
        }
    }

    /// Decode one batch of (seq, fields) pairs; malformed entries are
    /// dead-lettered and dropped from pending in place.
    fn decode_batch_locked(
        state: &mut MemoryState,
        req: &ConsumeRequest,
        batch: Vec<(u64, HashMap<String, String>)>,
        redelivered: bool,
        default_max_len: usize,
    ) -> Vec<ConsumerMessage> {
        let mut messages = Vec::with_capacity(batch.len());
        for (seq, fields) in batch {
            match decode_envelope(&fields) {
                Ok(envelope) => messages.push(ConsumerMessage {
                    id: format_id(seq),
                    message: envelope.message,
                    published_at: envelope.published_at,
                    redelivered,
                }),
                Err(failure) => {
                    warn!(
                        stream = %req.stream,
                        group = %req.group,
                        seq,
                        error = %failure.error,
                        "malformed envelope, routing to DLQ"
                    );
                    let record = DlqRecord::from_request(DlqRequest {
                        source_stream: req.stream.clone(),
                        source_message_id: format_id(seq),
                        reason: DlqReason::MalformedPayload,
                        payload: serde_json::json!(failure.raw_fields),
                        metadata: serde_json::json!({
                            "group": req.group,
                            "consumer": req.consumer,
                            "error": failure.error,
                        }),
                    });
                    if let Ok(value) = serde_json::to_value(&record) {
                        if let Ok(fields) = encode_envelope(&value) {
                            let dlq = sr_types::streams::dlq_stream(&req.stream);
                            Self::append_locked(
                                state,
                                &dlq,
                                fields.into_iter().collect(),
                                default_max_len,
                            );
                        }
                    }
                    // Ack: the caller never sees a malformed record.
                    if let Some(stream) = state.streams.get_mut(&req.stream) {
                        if let Some(group) = stream.groups.get_mut(&req.group) {
                            group.pending.remove(&seq);
                        }
                    }
                }
            }
        }
        messages
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventPublisher for MemoryBus {
    async fn publish(
        &self,
        stream: &str,
        message: &Value,
        opts: PublishOptions,
    ) -> Result<Record, BusError> {
        let fields = encode_envelope(message)?;
        let published_at = chrono::Utc::now();
        let max_len = opts.max_len.unwrap_or(self.default_max_len);

        let mut state = self.state.lock().await;
        state.publish_invocations += 1;
        if state.publish_failures_remaining > 0 {
            state.publish_failures_remaining -= 1;
            return Err(BusError::Transport(
                "simulated transient publish failure".to_owned(),
            ));
        }
        let id = Self::append_locked(&mut state, stream, fields.into_iter().collect(), max_len);
        drop(state);
        self.notify.notify_waiters();

        Ok(Record {
            stream: stream.to_owned(),
            id,
            message: message.clone(),
            published_at,
        })
    }
}

#[async_trait]
impl EventStreamReader for MemoryBus {
    async fn read_recent(&self, stream: &str, limit: usize) -> Result<Vec<Record>, BusError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let state = self.state.lock().await;
        let Some(entry) = state.streams.get(stream) else {
            return Ok(Vec::new());
        };
        let skip = entry.records.len().saturating_sub(limit);
        Ok(entry
            .records
            .iter()
            .skip(skip)
            .filter_map(|record| match decode_envelope(&record.fields) {
                Ok(envelope) => Some(Record {
                    stream: stream.to_owned(),
                    id: format_id(record.seq),
                    message: envelope.message,
                    published_at: envelope.published_at,
                }),
                Err(failure) => {
                    debug!(stream = %stream, seq = record.seq, error = %failure.error, "skipping malformed record");
                    None
                }
            })
            .collect())
    }
}

#[async_trait]
impl EventConsumer for MemoryBus {
    async fn ensure_group(
        &self,
        stream: &str,
        group: &str,
        start: GroupStart,
    ) -> Result<(), BusError> {
        let mut state = self.state.lock().await;
        let entry = state.streams.entry(stream.to_owned()).or_default();
        if entry.next_seq == 0 {
            entry.next_seq = 1;
        }
        if !entry.groups.contains_key(group) {
            let last_delivered = Self::start_cursor(entry, &start);
            entry.groups.insert(
                group.to_owned(),
                GroupState {
                    last_delivered,
                    pending: BTreeMap::new(),
                },
            );
        }
        Ok(())
    }

    async fn consume_group(&self, req: &ConsumeRequest) -> Result<Vec<ConsumerMessage>, BusError> {
        let deadline = Instant::now() + req.block;
        loop {
            let mut state = self.state.lock().await;

            let group_exists = state
                .streams
                .get(&req.stream)
                .is_some_and(|s| s.groups.contains_key(&req.group));
            if !group_exists {
                return Err(BusError::NoSuchGroup {
                    stream: req.stream.clone(),
                    group: req.group.clone(),
                });
            }

            // Pending first: redeliver this consumer's unacked messages.
            let pending_seqs: Vec<u64> = state
                .streams
                .get(&req.stream)
                .and_then(|s| s.groups.get(&req.group))
                .map(|group| {
                    group
                        .pending
                        .iter()
                        .filter(|(_, entry)| entry.consumer == req.consumer)
                        .map(|(seq, _)| *seq)
                        .take(req.count)
                        .collect()
                })
                .unwrap_or_default();
            if !pending_seqs.is_empty() {
                let mut batch = Vec::with_capacity(pending_seqs.len());
                let mut trimmed = Vec::new();
                if let Some(stream_entry) = state.streams.get(&req.stream) {
                    for seq in &pending_seqs {
                        match stream_entry.record(*seq) {
                            Some(record) => batch.push((*seq, record.fields.clone())),
                            None => trimmed.push(*seq),
                        }
                    }
                }
                if !trimmed.is_empty() {
                    // Trimmed out from under the pending list.
                    if let Some(group) = state
                        .streams
                        .get_mut(&req.stream)
                        .and_then(|s| s.groups.get_mut(&req.group))
                    {
                        for seq in &trimmed {
                            group.pending.remove(seq);
                        }
                    }
                }
                let messages = Self::decode_batch_locked(
                    &mut state,
                    req,
                    batch,
                    true,
                    self.default_max_len,
                );
                if !messages.is_empty() {
                    return Ok(messages);
                }
                // All pending entries were malformed or trimmed; loop to
                // the new-message path with a fresh lock.
                continue;
            }

            // New messages past the group cursor.
            let cursor = state
                .streams
                .get(&req.stream)
                .and_then(|s| s.groups.get(&req.group))
                .map_or(0, |g| g.last_delivered);
            let batch: Vec<(u64, HashMap<String, String>)> = state
                .streams
                .get(&req.stream)
                .map(|s| {
                    s.records
                        .iter()
                        .filter(|record| record.seq > cursor)
                        .take(req.count)
                        .map(|record| (record.seq, record.fields.clone()))
                        .collect()
                })
                .unwrap_or_default();
            if !batch.is_empty() {
                if let Some(group) = state
                    .streams
                    .get_mut(&req.stream)
                    .and_then(|s| s.groups.get_mut(&req.group))
                {
                    for (seq, _) in &batch {
                        group.pending.insert(
                            *seq,
                            PendingEntry {
                                consumer: req.consumer.clone(),
                            },
                        );
                        group.last_delivered = group.last_delivered.max(*seq);
                    }
                }
                // Even if every record is malformed (and dead-lettered),
                // the cursor advanced; report what survived.
                return Ok(Self::decode_batch_locked(
                    &mut state,
                    req,
                    batch,
                    false,
                    self.default_max_len,
                ));
            }

            // Nothing to deliver; block until a publish or the deadline.
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(Vec::new());
            }
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            drop(state);
            if tokio::time::timeout(remaining, notified).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn ack(&self, stream: &str, group: &str, ids: &[String]) -> Result<u64, BusError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut state = self.state.lock().await;
        let Some(stream_entry) = state.streams.get_mut(stream) else {
            return Ok(0);
        };
        let Some(group_entry) = stream_entry.groups.get_mut(group) else {
            return Ok(0);
        };
        let mut removed = 0;
        for id in ids {
            if let Some(seq) = parse_id(id) {
                if group_entry.pending.remove(&seq).is_some() {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    async fn move_to_dlq(&self, req: DlqRequest) -> Result<String, BusError> {
        let dlq = sr_types::streams::dlq_stream(&req.source_stream);
        let record = DlqRecord::from_request(req);
        let value =
            serde_json::to_value(&record).map_err(|e| BusError::Encode(e.to_string()))?;
        let fields = encode_envelope(&value)?;
        let mut state = self.state.lock().await;
        let id = Self::append_locked(
            &mut state,
            &dlq,
            fields.into_iter().collect(),
            self.default_max_len,
        );
        drop(state);
        self.notify.notify_waiters();
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publish_message;
    use serde_json::json;

    fn consume_req(stream: &str, group: &str, consumer: &str, count: usize) -> ConsumeRequest {
        ConsumeRequest {
            stream: stream.to_owned(),
            group: group.to_owned(),
            consumer: consumer.to_owned(),
            count,
            block: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn publish_assigns_monotonic_lexical_ids() {
        let bus = MemoryBus::new();
        let a = publish_message(&bus, "s", &json!({"n": 1})).await.unwrap();
        let b = publish_message(&bus, "s", &json!({"n": 2})).await.unwrap();
        assert!(b.id > a.id, "lexical order must equal insertion order");
    }

    #[tokio::test]
    async fn read_recent_returns_chronological_tail() {
        let bus = MemoryBus::new();
        for n in 0..5 {
            publish_message(&bus, "s", &json!({"n": n})).await.unwrap();
        }
        let records = bus.read_recent("s", 3).await.unwrap();
        let ns: Vec<i64> = records
            .iter()
            .map(|r| r.message["n"].as_i64().unwrap())
            .collect();
        assert_eq!(ns, vec![2, 3, 4]);
        assert!(bus.read_recent("s", 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn length_cap_trims_oldest() {
        let bus = MemoryBus::with_max_len(3);
        for n in 0..10 {
            publish_message(&bus, "s", &json!({"n": n})).await.unwrap();
        }
        assert_eq!(bus.stream_len("s").await, 3);
        let records = bus.read_recent("s", 10).await.unwrap();
        assert_eq!(records[0].message["n"], 7);
    }

    #[tokio::test]
    async fn ensure_group_is_idempotent_and_respects_tail() {
        let bus = MemoryBus::new();
        publish_message(&bus, "s", &json!({"n": 0})).await.unwrap();
        bus.ensure_group("s", "g", GroupStart::Tail).await.unwrap();
        // Re-creating must not reset the cursor.
        bus.ensure_group("s", "g", GroupStart::Head).await.unwrap();

        publish_message(&bus, "s", &json!({"n": 1})).await.unwrap();
        let messages = bus
            .consume_group(&consume_req("s", "g", "c1", 10))
            .await
            .unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].message["n"], 1);
    }

    #[tokio::test]
    async fn head_group_sees_existing_records() {
        let bus = MemoryBus::new();
        publish_message(&bus, "s", &json!({"n": 0})).await.unwrap();
        bus.ensure_group("s", "g", GroupStart::Head).await.unwrap();
        let messages = bus
            .consume_group(&consume_req("s", "g", "c1", 10))
            .await
            .unwrap();
        assert_eq!(messages.len(), 1);
        assert!(!messages[0].redelivered);
    }

    #[tokio::test]
    async fn pending_redelivery_precedes_new_messages() {
        let bus = MemoryBus::new();
        bus.ensure_group("s", "g", GroupStart::Head).await.unwrap();
        publish_message(&bus, "s", &json!({"n": 1})).await.unwrap();

        // Deliver without acking.
        let first = bus
            .consume_group(&consume_req("s", "g", "c1", 10))
            .await
            .unwrap();
        assert_eq!(first.len(), 1);

        publish_message(&bus, "s", &json!({"n": 2})).await.unwrap();

        // The unacked message comes back first, flagged as redelivered.
        let second = bus
            .consume_group(&consume_req("s", "g", "c1", 10))
            .await
            .unwrap();
        assert_eq!(second.len(), 1);
        assert!(second[0].redelivered);
        assert_eq!(second[0].message["n"], 1);

        // Ack it; the new message is delivered next.
        bus.ack("s", "g", &[second[0].id.clone()]).await.unwrap();
        let third = bus
            .consume_group(&consume_req("s", "g", "c1", 10))
            .await
            .unwrap();
        assert_eq!(third[0].message["n"], 2);
        assert!(!third[0].redelivered);
    }

    #[tokio::test]
    async fn ack_empty_is_noop() {
        let bus = MemoryBus::new();
        bus.ensure_group("s", "g", GroupStart::Head).await.unwrap();
        assert_eq!(bus.ack("s", "g", &[]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn malformed_envelope_routes_to_dlq_and_acks() {
        let bus = MemoryBus::new();
        bus.ensure_group("s", "g", GroupStart::Head).await.unwrap();
        let mut fields = HashMap::new();
        fields.insert("payload".to_owned(), "{broken".to_owned());
        bus.publish_raw_fields("s", fields).await;

        let messages = bus
            .consume_group(&consume_req("s", "g", "c1", 10))
            .await
            .unwrap();
        assert!(messages.is_empty(), "caller must never see malformed records");
        assert_eq!(bus.pending_count("s", "g").await, 0, "must be acked");

        let dlq = bus.read_recent("s.dlq", 10).await.unwrap();
        assert_eq!(dlq.len(), 1);
        assert_eq!(dlq[0].message["reason"], "MALFORMED_PAYLOAD");
    }

    #[tokio::test]
    async fn publish_failure_budget_fails_then_recovers() {
        let bus = MemoryBus::with_publish_failure_budget(2);
        assert!(publish_message(&bus, "s", &json!(1)).await.is_err());
        assert!(publish_message(&bus, "s", &json!(1)).await.is_err());
        assert!(publish_message(&bus, "s", &json!(1)).await.is_ok());
        assert_eq!(bus.publish_invocations().await, 3);
        assert_eq!(bus.stream_len("s").await, 1);
    }

    #[tokio::test]
    async fn blocking_consume_wakes_on_publish() {
        let bus = MemoryBus::new();
        bus.ensure_group("s", "g", GroupStart::Head).await.unwrap();

        let reader = bus.clone();
        let handle = tokio::spawn(async move {
            let mut req = consume_req("s", "g", "c1", 10);
            req.block = Duration::from_secs(5);
            reader.consume_group(&req).await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        publish_message(&bus, "s", &json!({"n": 42})).await.unwrap();

        let messages = handle.await.unwrap().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].message["n"], 42);
    }

    #[tokio::test]
    async fn dlq_round_trip_preserves_payload() {
        let bus = MemoryBus::new();
        let payload = json!({"event_id": "e1", "x": [1, 2]});
        let record = publish_message(&bus, "s", &payload).await.unwrap();
        bus.move_to_dlq(DlqRequest {
            source_stream: "s".to_owned(),
            source_message_id: record.id,
            reason: DlqReason::MaxDeliveriesExceeded,
            payload: payload.clone(),
            metadata: json!({"group": "g"}),
        })
        .await
        .unwrap();

        let dlq = bus.read_recent("s.dlq", 1).await.unwrap();
        assert_eq!(dlq[0].message["payload"], payload);
        assert_eq!(dlq[0].message["reason"], "MAX_DELIVERIES_EXCEEDED");
    }
}
