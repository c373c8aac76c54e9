//! Keyword-rule classifier.
//!
//! The rule table is deliberately shallow: first matching keyword wins,
//! severity and duration come from the table, confidence blends the match
//! with the signal's own confidence. It exists as the default mode and as
//! the fallback when an LLM classification comes back under the
//! confidence threshold.

use async_trait::async_trait;

use crate::worker::{Classifier, ClassifyError};
use sr_types::{SeverityLevel, Signal, StructuredRisk};

pub const RULES_MODEL_VERSION: &str = "rules-v1";

/// (keywords, event type, severity, expected duration hours)
const RULES: &[(&[&str], &str, SeverityLevel, f64)] = &[
    (
        &["hurricane", "typhoon", "cyclone"],
        "SEVERE_WEATHER",
        SeverityLevel::Critical,
        96.0,
    ),
    (
        &["storm", "flood", "blizzard", "wildfire"],
        "SEVERE_WEATHER",
        SeverityLevel::High,
        48.0,
    ),
    (
        &["earthquake", "tsunami"],
        "NATURAL_DISASTER",
        SeverityLevel::Critical,
        168.0,
    ),
    (
        &["port clos", "port congestion", "berth"],
        "PORT_CLOSURE",
        SeverityLevel::High,
        72.0,
    ),
    (
        &["strike", "labor action", "walkout", "union"],
        "LABOR_ACTION",
        SeverityLevel::High,
        72.0,
    ),
    (
        &["ransomware", "cyberattack", "cyber attack", "data breach"],
        "CYBER_INCIDENT",
        SeverityLevel::High,
        96.0,
    ),
    (
        &["road closure", "highway", "traffic", "derail"],
        "TRANSPORT_DISRUPTION",
        SeverityLevel::Medium,
        12.0,
    ),
    (
        &["fire", "explosion"],
        "FACILITY_INCIDENT",
        SeverityLevel::High,
        48.0,
    ),
    (
        &["shortage", "recall", "bankrupt"],
        "SUPPLIER_DISRUPTION",
        SeverityLevel::Medium,
        120.0,
    ),
];

/// Classifier driven by the keyword table above.
pub struct RuleBasedClassifier;

impl RuleBasedClassifier {
    pub fn new() -> RuleBasedClassifier {
        RuleBasedClassifier
    }

    fn matching_rule(content: &str) -> Option<&'static (&'static [&'static str], &'static str, SeverityLevel, f64)> {
        let lowered = content.to_lowercase();
        RULES
            .iter()
            .find(|(keywords, _, _, _)| keywords.iter().any(|k| lowered.contains(k)))
    }
}

impl Default for RuleBasedClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Classifier for RuleBasedClassifier {
    async fn classify(&self, signal: &Signal) -> Result<StructuredRisk, ClassifyError> {
        let (event_type, severity, duration, matched) =
            match Self::matching_rule(&signal.raw_content) {
                Some((_, event_type, severity, duration)) => {
                    (*event_type, *severity, *duration, true)
                }
                None => ("GENERAL_DISRUPTION", SeverityLevel::Low, 24.0, false),
            };

        // A keyword hit is worth more than a miss; the signal's own
        // confidence scales both.
        let base = if matched { 0.75 } else { 0.35 };
        let confidence = (base * (0.5 + signal.signal_confidence / 2.0)).clamp(0.0, 1.0);

        Ok(StructuredRisk {
            event_id: signal.event_id.clone(),
            event_type: event_type.to_owned(),
            severity_level: severity,
            impact_region: signal.geographic_scope.clone(),
            expected_duration_hours: duration,
            classification_confidence: confidence,
            model_version: RULES_MODEL_VERSION.to_owned(),
        })
    }
}
