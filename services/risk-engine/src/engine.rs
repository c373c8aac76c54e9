//! Risk scoring.

use sr_core::now_rfc3339;
use sr_types::{ClassifiedEvent, RiskEvaluation, SeverityLevel};

/// The evaluation seam the worker composes over.
pub trait RiskEvaluator: Send + Sync {
    fn evaluate(&self, event: &ClassifiedEvent) -> RiskEvaluation;
}

/// Default scorer: severity weight scaled by a confidence blend.
///
/// `score = severity_weight × (0.6 × classification_confidence
///                             + 0.4 × signal_confidence)`,
/// with a small uplift for long-running events, clamped into [0, 1].
pub struct WeightedEvaluator;

impl WeightedEvaluator {
    pub fn new() -> WeightedEvaluator {
        WeightedEvaluator
    }

    fn band(score: f64) -> SeverityLevel {
        if score >= 0.75 {
            SeverityLevel::Critical
        } else if score >= 0.5 {
            SeverityLevel::High
        } else if score >= 0.25 {
            SeverityLevel::Medium
        } else {
            SeverityLevel::Low
        }
    }
}

impl Default for WeightedEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl RiskEvaluator for WeightedEvaluator {
    fn evaluate(&self, event: &ClassifiedEvent) -> RiskEvaluation {
        let risk = &event.structured_risk;
        let confidence_blend =
            0.6 * risk.classification_confidence + 0.4 * event.signal.signal_confidence;
        // Events expected to outlast three days weigh a little heavier.
        let duration_uplift = if risk.expected_duration_hours > 72.0 {
            1.1
        } else {
            1.0
        };
        let score =
            (risk.severity_level.weight() * confidence_blend * duration_uplift).clamp(0.0, 1.0);

        RiskEvaluation {
            event_id: event.event_id.clone(),
            risk_score: score,
            risk_level: Self::band(score),
            event_type: risk.event_type.clone(),
            impact_region: risk.impact_region.clone(),
            expected_duration_hours: risk.expected_duration_hours,
            evaluated_at_utc: now_rfc3339(),
        }
    }
}
