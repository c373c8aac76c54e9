//! Downstream record shapes: structured risk, evaluation, plan, notification.
//!
//! Classifier output ("drafts") comes back from LLMs and rule engines with
//! loose field naming; `StructuredRisk::from_draft` resolves the draft
//! against the alias table and rejects objects that resolve nothing, so a
//! coincidentally-parseable substring never becomes a classification.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sr_core::now_rfc3339;

use crate::signal::{first_alias, Signal};

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

/// Severity band shared by classifications, evaluations, and plans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeverityLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl SeverityLevel {
    pub fn parse(s: &str) -> Option<SeverityLevel> {
        match s.to_ascii_uppercase().as_str() {
            "LOW" | "MINOR" => Some(SeverityLevel::Low),
            "MEDIUM" | "MODERATE" => Some(SeverityLevel::Medium),
            "HIGH" | "MAJOR" | "SEVERE" => Some(SeverityLevel::High),
            "CRITICAL" | "EXTREME" => Some(SeverityLevel::Critical),
            _ => None,
        }
    }

    /// Scoring weight used by the risk engine.
    pub fn weight(self) -> f64 {
        match self {
            SeverityLevel::Low => 0.25,
            SeverityLevel::Medium => 0.5,
            SeverityLevel::High => 0.75,
            SeverityLevel::Critical => 1.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Structured risk (classifier output)
// ---------------------------------------------------------------------------

/// Alias table for structured-risk draft fields (frozen).
const EVENT_TYPE_ALIASES: &[&str] = &[
    "event_type",
    "eventType",
    "risk_event_type",
    "riskType",
    "risk_type",
    "riskEventType",
];
const SEVERITY_ALIASES: &[&str] = &["severity_level", "severityLevel", "risk_level", "severity"];
const IMPACT_REGION_ALIASES: &[&str] = &[
    "impact_region",
    "impactRegion",
    "geographic_scope",
    "region",
];
const DURATION_ALIASES: &[&str] = &[
    "expected_duration_hours",
    "expectedDurationHours",
    "duration_hours",
    "durationHours",
];
const CLASSIFICATION_CONFIDENCE_ALIASES: &[&str] = &[
    "classification_confidence",
    "classificationConfidence",
    "confidence",
    "probability",
];
const MODEL_VERSION_ALIASES: &[&str] = &["model_version", "modelVersion", "model_name", "model"];

/// A classified risk event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredRisk {
    pub event_id: String,
    /// E.g. "PORT_CLOSURE", "SEVERE_WEATHER", "LABOR_ACTION".
    pub event_type: String,
    pub severity_level: SeverityLevel,
    pub impact_region: String,
    pub expected_duration_hours: f64,
    /// Classifier confidence, clamped to [0, 1].
    pub classification_confidence: f64,
    pub model_version: String,
}

/// Error resolving a classifier draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DraftError {
    NotAnObject,
    /// No draft field resolved through the alias table; the object is not a
    /// structured-risk draft at all.
    NoRecognizedFields,
}

impl std::fmt::Display for DraftError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DraftError::NotAnObject => write!(f, "draft is not a JSON object"),
            DraftError::NoRecognizedFields => {
                write!(f, "draft resolves no structured-risk fields")
            }
        }
    }
}

impl std::error::Error for DraftError {}

impl StructuredRisk {
    /// Resolve a loose classifier draft into the canonical record.
    ///
    /// `probability`-style confidences on a 0–100 scale are rescaled by
    /// 0.01; everything ends clamped into [0, 1].
    pub fn from_draft(event_id: &str, draft: &Value) -> Result<StructuredRisk, DraftError> {
        let obj = draft.as_object().ok_or(DraftError::NotAnObject)?;

        if !Self::draft_has_known_field(obj) {
            return Err(DraftError::NoRecognizedFields);
        }

        let event_type = first_alias(obj, EVENT_TYPE_ALIASES)
            .and_then(Value::as_str)
            .map(|s| s.trim().to_ascii_uppercase().replace([' ', '-'], "_"))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "UNKNOWN".to_owned());

        let severity_level = first_alias(obj, SEVERITY_ALIASES)
            .and_then(Value::as_str)
            .and_then(SeverityLevel::parse)
            .unwrap_or(SeverityLevel::Medium);

        let impact_region = first_alias(obj, IMPACT_REGION_ALIASES)
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_owned();

        let expected_duration_hours = first_alias(obj, DURATION_ALIASES)
            .and_then(Value::as_f64)
            .unwrap_or(0.0)
            .max(0.0);

        let mut classification_confidence = first_alias(obj, CLASSIFICATION_CONFIDENCE_ALIASES)
            .and_then(Value::as_f64)
            .unwrap_or(0.5);
        if classification_confidence > 1.0 {
            classification_confidence *= 0.01;
        }
        let classification_confidence = classification_confidence.clamp(0.0, 1.0);

        let model_version = first_alias(obj, MODEL_VERSION_ALIASES)
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_owned();

        Ok(StructuredRisk {
            event_id: event_id.to_owned(),
            event_type,
            severity_level,
            impact_region,
            expected_duration_hours,
            classification_confidence,
            model_version,
        })
    }

    /// True when at least one alias of any draft field is present.
    pub fn draft_has_known_field(obj: &Map<String, Value>) -> bool {
        [
            EVENT_TYPE_ALIASES,
            SEVERITY_ALIASES,
            IMPACT_REGION_ALIASES,
            DURATION_ALIASES,
            CLASSIFICATION_CONFIDENCE_ALIASES,
            MODEL_VERSION_ALIASES,
        ]
        .iter()
        .any(|aliases| first_alias(obj, aliases).is_some())
    }
}

// ---------------------------------------------------------------------------
// Classified event
// ---------------------------------------------------------------------------

/// A signal paired with its classification; published to `classified-events`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedEvent {
    pub event_id: String,
    pub signal: Signal,
    pub structured_risk: StructuredRisk,
    pub classified_at_utc: String,
}

impl ClassifiedEvent {
    pub fn new(signal: Signal, structured_risk: StructuredRisk) -> ClassifiedEvent {
        ClassifiedEvent {
            event_id: signal.event_id.clone(),
            signal,
            structured_risk,
            classified_at_utc: now_rfc3339(),
        }
    }
}

// ---------------------------------------------------------------------------
// Risk evaluation
// ---------------------------------------------------------------------------

/// Scored risk; published to `risk-evaluations`. References the upstream
/// classified event by `event_id` only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskEvaluation {
    pub event_id: String,
    /// Composite score in [0, 1].
    pub risk_score: f64,
    pub risk_level: SeverityLevel,
    pub event_type: String,
    pub impact_region: String,
    pub expected_duration_hours: f64,
    pub evaluated_at_utc: String,
}

// ---------------------------------------------------------------------------
// Mitigation plan
// ---------------------------------------------------------------------------

/// Actionable plan derived from an evaluation; published to `mitigation-plans`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MitigationPlan {
    pub plan_id: String,
    pub event_id: String,
    pub event_type: String,
    pub risk_level: SeverityLevel,
    pub impact_region: String,
    pub actions: Vec<String>,
    pub created_at_utc: String,
}

// ---------------------------------------------------------------------------
// Notification
// ---------------------------------------------------------------------------

/// Routed notification; published to `notifications`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub notification_id: String,
    pub plan_id: String,
    pub event_id: String,
    /// Delivery channel, e.g. "ops-pager" or "ops-email".
    pub channel: String,
    pub risk_level: SeverityLevel,
    pub subject: String,
    pub body: String,
    pub created_at_utc: String,
}
