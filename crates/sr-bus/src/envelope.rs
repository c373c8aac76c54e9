//! On-wire envelope codec.
//!
//! An envelope is deliberately minimal so any log store can back it: a
//! `payload` field holding the JSON-encoded message and a
//! `published_at_utc` RFC 3339 timestamp. Decoders tolerate additional
//! fields; a missing or unparseable `payload` is the only fatal condition,
//! and the raw fields are preserved on failure for DLQ metadata.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;

use crate::BusError;

pub const PAYLOAD_FIELD: &str = "payload";
pub const PUBLISHED_AT_FIELD: &str = "published_at_utc";

/// A successfully decoded envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedEnvelope {
    pub message: Value,
    pub published_at: DateTime<Utc>,
}

/// A failed decode, with the raw fields preserved for DLQ metadata.
#[derive(Debug, Clone)]
pub struct DecodeFailure {
    pub error: String,
    pub raw_fields: HashMap<String, String>,
}

/// Encode a message into envelope field pairs, stamping `published_at_utc`.
pub fn encode_envelope(message: &Value) -> Result<Vec<(String, String)>, BusError> {
    let payload =
        serde_json::to_string(message).map_err(|e| BusError::Encode(e.to_string()))?;
    Ok(vec![
        (PAYLOAD_FIELD.to_owned(), payload),
        (PUBLISHED_AT_FIELD.to_owned(), sr_core::now_rfc3339()),
    ])
}

/// Decode envelope fields back into a message.
///
/// A missing `published_at_utc` (or one that fails to parse) falls back to
/// the unix epoch rather than failing the record — the timestamp is
/// advisory, the payload is not.
pub fn decode_envelope(fields: &HashMap<String, String>) -> Result<DecodedEnvelope, DecodeFailure> {
    let payload = fields.get(PAYLOAD_FIELD).ok_or_else(|| DecodeFailure {
        error: "missing payload field".to_owned(),
        raw_fields: fields.clone(),
    })?;

    let message: Value = serde_json::from_str(payload).map_err(|e| DecodeFailure {
        error: format!("payload is not valid JSON: {}", e),
        raw_fields: fields.clone(),
    })?;

    let published_at = fields
        .get(PUBLISHED_AT_FIELD)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

    Ok(DecodedEnvelope {
        message,
        published_at,
    })
}
