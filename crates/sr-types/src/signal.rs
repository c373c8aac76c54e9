//! The canonical input record and its normalization from raw feed items.
//!
//! Raw events arrive from connectors, the HTTP gateway, and third-party
//! feeds with inconsistent field naming (camelCase vs snake_case, assorted
//! synonyms). Normalization resolves fields through the alias tables below,
//! coerces the timestamp to RFC 3339 UTC, clamps confidence into [0, 1],
//! and synthesizes a stable `event_id` when the producer did not supply one.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sr_core::{now_rfc3339, stable_content_hash, time::coerce_rfc3339};

// ---------------------------------------------------------------------------
// Alias tables
// ---------------------------------------------------------------------------

const EVENT_ID_ALIASES: &[&str] = &["event_id", "eventId", "id"];
const SOURCE_TYPE_ALIASES: &[&str] = &["source_type", "sourceType", "type", "kind"];
const RAW_CONTENT_ALIASES: &[&str] = &["raw_content", "rawContent", "content", "text", "body"];
const SOURCE_REFERENCE_ALIASES: &[&str] = &[
    "source_reference",
    "sourceReference",
    "source",
    "reference",
    "url",
];
const GEOGRAPHIC_SCOPE_ALIASES: &[&str] = &[
    "geographic_scope",
    "geographicScope",
    "region",
    "location",
];
const TIMESTAMP_ALIASES: &[&str] = &[
    "timestamp_utc",
    "timestampUtc",
    "timestamp",
    "time",
    "occurred_at",
    "occurredAt",
];
const CONFIDENCE_ALIASES: &[&str] = &["signal_confidence", "signalConfidence", "confidence"];

/// First value in `obj` matching any of `aliases`, in table order.
pub(crate) fn first_alias<'a>(obj: &'a Map<String, Value>, aliases: &[&str]) -> Option<&'a Value> {
    aliases.iter().find_map(|key| obj.get(*key))
}

// ---------------------------------------------------------------------------
// Signal
// ---------------------------------------------------------------------------

/// Source category of an external signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceType {
    News,
    Weather,
    Traffic,
    Social,
    Other,
}

impl SourceType {
    fn parse(s: &str) -> SourceType {
        match s.to_ascii_uppercase().as_str() {
            "NEWS" => SourceType::News,
            "WEATHER" => SourceType::Weather,
            "TRAFFIC" => SourceType::Traffic,
            "SOCIAL" => SourceType::Social,
            _ => SourceType::Other,
        }
    }
}

/// The canonical input record to the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// Supplied by the producer, or derived as a stable hash of
    /// (source_reference, content, timestamp).
    pub event_id: String,
    pub source_type: SourceType,
    pub raw_content: String,
    pub source_reference: String,
    /// Free-form scope string, e.g. "US-TX" or "global".
    pub geographic_scope: String,
    /// When the underlying event happened (RFC 3339 UTC).
    pub timestamp_utc: String,
    /// When this pipeline first saw it (RFC 3339 UTC).
    pub ingestion_time_utc: String,
    /// Producer-reported confidence, clamped to [0, 1].
    pub signal_confidence: f64,
}

/// Error normalizing a raw event into a `Signal`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalParseError {
    /// The raw event is not a JSON object.
    NotAnObject,
    /// The raw event carries neither content nor a source reference; there
    /// is nothing to hash an identity from and nothing to classify.
    Empty,
}

impl std::fmt::Display for SignalParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalParseError::NotAnObject => write!(f, "raw event is not a JSON object"),
            SignalParseError::Empty => {
                write!(f, "raw event has no content and no source reference")
            }
        }
    }
}

impl std::error::Error for SignalParseError {}

impl Signal {
    /// Normalize a raw feed item into the canonical schema.
    ///
    /// Missing timestamp falls back to now; missing confidence defaults to
    /// a neutral 0.5; missing `event_id` is synthesized from
    /// `hash(source_reference ∥ content ∥ timestamp)` so the same upstream
    /// item always maps to the same id.
    pub fn normalize(raw: &Value) -> Result<Signal, SignalParseError> {
        let obj = raw.as_object().ok_or(SignalParseError::NotAnObject)?;

        let raw_content = first_alias(obj, RAW_CONTENT_ALIASES)
            .map(value_to_string)
            .unwrap_or_default();
        let source_reference = first_alias(obj, SOURCE_REFERENCE_ALIASES)
            .map(value_to_string)
            .unwrap_or_default();
        if raw_content.is_empty() && source_reference.is_empty() {
            return Err(SignalParseError::Empty);
        }

        let timestamp_utc = first_alias(obj, TIMESTAMP_ALIASES)
            .and_then(coerce_rfc3339)
            .unwrap_or_else(now_rfc3339);

        let signal_confidence = first_alias(obj, CONFIDENCE_ALIASES)
            .and_then(Value::as_f64)
            .unwrap_or(0.5)
            .clamp(0.0, 1.0);

        let source_type = first_alias(obj, SOURCE_TYPE_ALIASES)
            .and_then(Value::as_str)
            .map(SourceType::parse)
            .unwrap_or(SourceType::Other);

        let geographic_scope = first_alias(obj, GEOGRAPHIC_SCOPE_ALIASES)
            .map(value_to_string)
            .unwrap_or_default();

        let event_id = first_alias(obj, EVENT_ID_ALIASES)
            .map(value_to_string)
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| {
                stable_content_hash(&[&source_reference, &raw_content, &timestamp_utc])
            });

        Ok(Signal {
            event_id,
            source_type,
            raw_content,
            source_reference,
            geographic_scope,
            timestamp_utc,
            ingestion_time_utc: now_rfc3339(),
            signal_confidence,
        })
    }
}

fn value_to_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
