//! Stream names (wire constants, frozen).
//!
//! Streams are independent append-only logs; no cross-stream ordering is
//! promised anywhere in the pipeline.

pub const RAW_INPUT_SIGNALS: &str = "raw-input-signals";
pub const EXTERNAL_SIGNALS: &str = "external-signals";
pub const CLASSIFIED_EVENTS: &str = "classified-events";
pub const RISK_EVALUATIONS: &str = "risk-evaluations";
pub const MITIGATION_PLANS: &str = "mitigation-plans";
pub const NOTIFICATIONS: &str = "notifications";
pub const SHIPMENT_PLANS: &str = "shipment-plans";
pub const INVENTORY_SNAPSHOTS: &str = "inventory-snapshots";
pub const AT_RISK_SHIPMENTS: &str = "at-risk-shipments";
pub const INVENTORY_EXPOSURES: &str = "inventory-exposures";

/// Suffix appended to a source stream to form its dead-letter stream.
pub const DLQ_SUFFIX: &str = ".dlq";

/// Dead-letter stream name for a source stream.
pub fn dlq_stream(stream: &str) -> String {
    format!("{}{}", stream, DLQ_SUFFIX)
}
