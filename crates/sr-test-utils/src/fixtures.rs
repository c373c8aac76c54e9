//! Canned raw signals.

use serde_json::{json, Value};

/// A well-formed raw NEWS signal with the given event id.
pub fn raw_signal(event_id: &str) -> Value {
    raw_signal_with_confidence(event_id, 0.8)
}

pub fn raw_signal_with_confidence(event_id: &str, confidence: f64) -> Value {
    json!({
        "event_id": event_id,
        "source_type": "NEWS",
        "raw_content": "port strike announced at major container terminal",
        "source_reference": "https://news.example.com/strike",
        "geographic_scope": "US-TX",
        "timestamp_utc": "2026-02-23T10:00:00Z",
        "signal_confidence": confidence,
    })
}
