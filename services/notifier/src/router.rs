//! Severity-based notification routing.

use sr_core::now_rfc3339;
use sr_types::{MitigationPlan, Notification, SeverityLevel};
use uuid::Uuid;

pub const CHANNEL_PAGER: &str = "ops-pager";
pub const CHANNEL_EMAIL: &str = "ops-email";
pub const CHANNEL_DIGEST: &str = "ops-digest";

/// The routing seam the worker composes over.
pub trait NotificationRouter: Send + Sync {
    fn route(&self, plan: &MitigationPlan) -> Vec<Notification>;
}

/// Routes by risk level: critical/high page and mail, medium mails, low
/// lands in the daily digest.
pub struct SeverityRouter;

impl SeverityRouter {
    pub fn new() -> SeverityRouter {
        SeverityRouter
    }

    fn channels(level: SeverityLevel) -> Vec<&'static str> {
        match level {
            SeverityLevel::Critical | SeverityLevel::High => {
                vec![CHANNEL_PAGER, CHANNEL_EMAIL]
            }
            SeverityLevel::Medium => vec![CHANNEL_EMAIL],
            SeverityLevel::Low => vec![CHANNEL_DIGEST],
        }
    }
}

impl Default for SeverityRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationRouter for SeverityRouter {
    fn route(&self, plan: &MitigationPlan) -> Vec<Notification> {
        let subject = format!(
            "[{:?}] {} in {}",
            plan.risk_level, plan.event_type, plan.impact_region
        )
        .to_uppercase();
        let body = format!(
            "Mitigation plan {} for event {}:\n{}",
            plan.plan_id,
            plan.event_id,
            plan.actions.join("\n- ")
        );

        Self::channels(plan.risk_level)
            .into_iter()
            .map(|channel| Notification {
                notification_id: format!("ntf-{}", Uuid::new_v4()),
                plan_id: plan.plan_id.clone(),
                event_id: plan.event_id.clone(),
                channel: channel.to_owned(),
                risk_level: plan.risk_level,
                subject: subject.clone(),
                body: body.clone(),
                created_at_utc: now_rfc3339(),
            })
            .collect()
    }
}
