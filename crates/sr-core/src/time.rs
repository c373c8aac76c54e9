//! Wall-clock helpers.
//!
//! All wire timestamps are RFC 3339 UTC. Parsing is lenient on input
//! (anything chrono accepts plus unix seconds/millis) and strict on output.

use chrono::{DateTime, TimeZone, Utc};

/// Current time as an RFC 3339 UTC string (second precision is enough for
/// envelope timestamps; sub-second survives round-trips untouched).
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

/// Coerce a loosely-typed timestamp into RFC 3339 UTC.
///
/// Accepts RFC 3339 strings, bare `YYYY-MM-DDTHH:MM:SS` strings, and unix
/// epoch numbers (seconds, or milliseconds when the magnitude says so).
/// Returns `None` when the value is unrecognizable.
pub fn coerce_rfc3339(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => parse_timestamp_str(s).map(|dt| dt.to_rfc3339()),
        serde_json::Value::Number(n) => {
            let raw = n.as_f64()?;
            // Heuristic: anything past the year 33658 in seconds is millis.
            let secs = if raw.abs() >= 1e12 { raw / 1000.0 } else { raw };
            let nanos = (secs.fract() * 1e9) as u32;
            Utc.timestamp_opt(secs.trunc() as i64, nanos)
                .single()
                .map(|dt| dt.to_rfc3339())
        }
        _ => None,
    }
}

fn parse_timestamp_str(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Bare datetime without offset: assume UTC.
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rfc3339_passthrough_preserves_instant() {
        let coerced = coerce_rfc3339(&json!("2026-02-23T10:00:00Z")).unwrap();
        let dt = DateTime::parse_from_rfc3339(&coerced).unwrap();
        assert_eq!(dt.timestamp(), 1_771_840_800);
    }

    #[test]
    fn offset_timestamps_normalize_to_utc() {
        let coerced = coerce_rfc3339(&json!("2026-02-23T05:00:00-05:00")).unwrap();
        assert!(coerced.starts_with("2026-02-23T10:00:00"));
    }

    #[test]
    fn epoch_seconds_and_millis_agree() {
        let from_secs = coerce_rfc3339(&json!(1_771_840_800)).unwrap();
        let from_millis = coerce_rfc3339(&json!(1_771_840_800_000i64)).unwrap();
        assert_eq!(
            DateTime::parse_from_rfc3339(&from_secs).unwrap().timestamp(),
            DateTime::parse_from_rfc3339(&from_millis).unwrap().timestamp(),
        );
    }

    #[test]
    fn bare_datetime_assumed_utc() {
        let coerced = coerce_rfc3339(&json!("2026-02-23T10:00:00")).unwrap();
        assert!(coerced.starts_with("2026-02-23T10:00:00"));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(coerce_rfc3339(&json!("not a time")).is_none());
        assert!(coerce_rfc3339(&json!(true)).is_none());
        assert!(coerce_rfc3339(&json!(null)).is_none());
    }
}
