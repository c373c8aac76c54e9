//! Mitigation-plan templating.

use sr_core::now_rfc3339;
use sr_types::{MitigationPlan, RiskEvaluation, SeverityLevel};
use uuid::Uuid;

/// The planning seam the worker composes over.
pub trait MitigationPlanner: Send + Sync {
    fn create_plan(&self, evaluation: &RiskEvaluation) -> MitigationPlan;
}

/// Per-event-type action templates, escalated by risk level.
pub struct TemplatePlanner;

impl TemplatePlanner {
    pub fn new() -> TemplatePlanner {
        TemplatePlanner
    }

    fn base_actions(event_type: &str) -> Vec<&'static str> {
        match event_type {
            "PORT_CLOSURE" => vec![
                "Identify shipments routed through the affected port",
                "Evaluate diversion to nearest alternate port",
                "Notify affected carriers of rebooking window",
            ],
            "SEVERE_WEATHER" | "NATURAL_DISASTER" => vec![
                "Freeze outbound dispatches into the affected region",
                "Re-sequence deliveries around the event window",
                "Confirm safety status with regional facilities",
            ],
            "LABOR_ACTION" => vec![
                "Estimate strike duration against buffer stock",
                "Pre-book capacity with unaffected carriers",
            ],
            "CYBER_INCIDENT" => vec![
                "Verify EDI and booking integrations with the affected party",
                "Switch to manual confirmation for in-flight orders",
            ],
            "TRANSPORT_DISRUPTION" => vec![
                "Re-route ground legs around the closure",
                "Update customer ETAs for affected lanes",
            ],
            "SUPPLIER_DISRUPTION" => vec![
                "Activate qualified alternate suppliers",
                "Re-check open purchase orders against the disruption",
            ],
            _ => vec!["Review exposure in the affected region"],
        }
    }
}

impl Default for TemplatePlanner {
    fn default() -> Self {
        Self::new()
    }
}

impl MitigationPlanner for TemplatePlanner {
    fn create_plan(&self, evaluation: &RiskEvaluation) -> MitigationPlan {
        let mut actions: Vec<String> = Self::base_actions(&evaluation.event_type)
            .into_iter()
            .map(str::to_owned)
            .collect();
        if evaluation.risk_level >= SeverityLevel::High {
            actions.insert(0, "Escalate to the on-call supply-chain manager".to_owned());
        }

        MitigationPlan {
            plan_id: format!("plan-{}", Uuid::new_v4()),
            event_id: evaluation.event_id.clone(),
            event_type: evaluation.event_type.clone(),
            risk_level: evaluation.risk_level,
            impact_region: evaluation.impact_region.clone(),
            actions,
            created_at_utc: now_rfc3339(),
        }
    }
}
