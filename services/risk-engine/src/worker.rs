//! Evaluation worker: `classified-events` → `risk-evaluations`.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::engine::RiskEvaluator;
use sr_bus::{publish_message, ConsumerMessage, EventPublisher};
use sr_types::{streams, ClassifiedEvent};
use sr_worker::{HandlerError, MessageHandler};

pub struct EvaluationHandler {
    evaluator: Arc<dyn RiskEvaluator>,
    publisher: Arc<dyn EventPublisher>,
}

impl EvaluationHandler {
    pub fn new(
        evaluator: Arc<dyn RiskEvaluator>,
        publisher: Arc<dyn EventPublisher>,
    ) -> EvaluationHandler {
        EvaluationHandler {
            evaluator,
            publisher,
        }
    }
}

#[async_trait]
impl MessageHandler for EvaluationHandler {
    async fn handle(&self, message: &ConsumerMessage) -> Result<(), HandlerError> {
        let event: ClassifiedEvent = serde_json::from_value(message.message.clone())
            .map_err(|e| HandlerError::new(format!("not a classified event: {}", e)))?;
        let evaluation = self.evaluator.evaluate(&event);
        publish_message(
            self.publisher.as_ref(),
            streams::RISK_EVALUATIONS,
            &evaluation,
        )
        .await
        .map_err(|e| HandlerError::new(e.to_string()))?;
        debug!(
            event_id = %evaluation.event_id,
            risk_score = evaluation.risk_score,
            "risk evaluation published"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::WeightedEvaluator;
    use serde_json::json;
    use sr_bus::{EventStreamReader, MemoryBus};
    use sr_types::{SeverityLevel, Signal, StructuredRisk};

    #[tokio::test]
    async fn classified_event_becomes_evaluation() {
        let bus = MemoryBus::new();
        let handler = EvaluationHandler::new(
            Arc::new(WeightedEvaluator::new()),
            Arc::new(bus.clone()),
        );

        let signal = Signal::normalize(&json!({
            "event_id": "e1",
            "raw_content": "hurricane",
            "source_reference": "r",
            "geographic_scope": "US-FL",
            "signal_confidence": 0.9,
        }))
        .unwrap();
        let risk = StructuredRisk {
            event_id: "e1".to_owned(),
            event_type: "SEVERE_WEATHER".to_owned(),
            severity_level: SeverityLevel::Critical,
            impact_region: "US-FL".to_owned(),
            expected_duration_hours: 96.0,
            classification_confidence: 0.9,
            model_version: "rules-v1".to_owned(),
        };
        let event = ClassifiedEvent::new(signal, risk);

        let message = ConsumerMessage {
            id: "1".to_owned(),
            message: serde_json::to_value(&event).unwrap(),
            published_at: chrono::DateTime::<chrono::Utc>::UNIX_EPOCH,
            redelivered: false,
        };
        handler.handle(&message).await.unwrap();

        let out = bus.read_recent("risk-evaluations", 10).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].message["event_id"], "e1");
        assert!(out[0].message["risk_score"].as_f64().unwrap() > 0.5);
    }

    #[tokio::test]
    async fn malformed_payload_is_handler_error() {
        let bus = MemoryBus::new();
        let handler = EvaluationHandler::new(
            Arc::new(WeightedEvaluator::new()),
            Arc::new(bus.clone()),
        );
        let message = ConsumerMessage {
            id: "1".to_owned(),
            message: json!({"nope": 1}),
            published_at: chrono::DateTime::<chrono::Utc>::UNIX_EPOCH,
            redelivered: false,
        };
        assert!(handler.handle(&message).await.is_err());
    }
}
