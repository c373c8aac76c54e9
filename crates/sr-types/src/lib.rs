// sr-types: Domain record types and wire constants for the risk pipeline.
//
// Message payloads are opaque to the bus; these are the concrete shapes the
// module boundaries exchange. Alias resolution (camelCase/snake_case field
// synonyms from third-party feeds and LLM drafts) happens here, against
// declarative tables, so no other crate duck-types JSON.

pub mod planning;
pub mod risk;
pub mod signal;
pub mod streams;

pub use planning::{AtRiskShipment, InventoryExposure, InventorySnapshot, ShipmentPlan};
pub use risk::{
    ClassifiedEvent, DraftError, MitigationPlan, Notification, RiskEvaluation, SeverityLevel,
    StructuredRisk,
};
pub use signal::{Signal, SignalParseError, SourceType};
