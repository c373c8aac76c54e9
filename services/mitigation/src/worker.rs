//! Plan worker: `risk-evaluations` → `mitigation-plans`.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::planner::MitigationPlanner;
use sr_bus::{publish_message, ConsumerMessage, EventPublisher};
use sr_types::{streams, RiskEvaluation};
use sr_worker::{HandlerError, MessageHandler};

pub struct PlanHandler {
    planner: Arc<dyn MitigationPlanner>,
    publisher: Arc<dyn EventPublisher>,
}

impl PlanHandler {
    pub fn new(
        planner: Arc<dyn MitigationPlanner>,
        publisher: Arc<dyn EventPublisher>,
    ) -> PlanHandler {
        PlanHandler { planner, publisher }
    }
}

#[async_trait]
impl MessageHandler for PlanHandler {
    async fn handle(&self, message: &ConsumerMessage) -> Result<(), HandlerError> {
        let evaluation: RiskEvaluation = serde_json::from_value(message.message.clone())
            .map_err(|e| HandlerError::new(format!("not a risk evaluation: {}", e)))?;
        let plan = self.planner.create_plan(&evaluation);
        publish_message(self.publisher.as_ref(), streams::MITIGATION_PLANS, &plan)
            .await
            .map_err(|e| HandlerError::new(e.to_string()))?;
        debug!(event_id = %plan.event_id, plan_id = %plan.plan_id, "mitigation plan published");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::TemplatePlanner;
    use sr_bus::{EventStreamReader, MemoryBus};
    use sr_types::SeverityLevel;

    #[tokio::test]
    async fn evaluation_becomes_plan() {
        let bus = MemoryBus::new();
        let handler = PlanHandler::new(Arc::new(TemplatePlanner::new()), Arc::new(bus.clone()));

        let evaluation = RiskEvaluation {
            event_id: "e1".to_owned(),
            risk_score: 0.8,
            risk_level: SeverityLevel::High,
            event_type: "PORT_CLOSURE".to_owned(),
            impact_region: "US-TX".to_owned(),
            expected_duration_hours: 48.0,
            evaluated_at_utc: sr_core::now_rfc3339(),
        };
        let message = ConsumerMessage {
            id: "1".to_owned(),
            message: serde_json::to_value(&evaluation).unwrap(),
            published_at: chrono::DateTime::<chrono::Utc>::UNIX_EPOCH,
            redelivered: false,
        };
        handler.handle(&message).await.unwrap();

        let plans = bus.read_recent("mitigation-plans", 10).await.unwrap();
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].message["event_id"], "e1");
        assert_eq!(plans[0].message["risk_level"], "HIGH");
        assert!(!plans[0].message["actions"].as_array().unwrap().is_empty());
    }
}
