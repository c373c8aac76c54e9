//! Classification worker: `external-signals` → `classified-events`.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use sr_bus::{publish_message, ConsumerMessage, EventPublisher};
use sr_types::{streams, ClassifiedEvent, Signal, StructuredRisk};
use sr_worker::{HandlerError, MessageHandler};

/// Failure classifying a signal.
#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("upstream classification failed: {0}")]
    Upstream(String),
    #[error("draft resolution failed: {0}")]
    Draft(String),
}

/// The classification seam: rule engines and LLM adapters both implement
/// this and are injected into the worker.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, signal: &Signal) -> Result<StructuredRisk, ClassifyError>;
}

/// Handler consuming `external-signals`.
///
/// When a primary classification comes back under the confidence
/// threshold and a fallback classifier is configured (LLM mode backed by
/// rules), the fallback result is published instead of dropping the event.
pub struct ClassificationHandler {
    classifier: Arc<dyn Classifier>,
    fallback: Option<Arc<dyn Classifier>>,
    publisher: Arc<dyn EventPublisher>,
    confidence_threshold: f64,
}

impl ClassificationHandler {
    pub fn new(
        classifier: Arc<dyn Classifier>,
        fallback: Option<Arc<dyn Classifier>>,
        publisher: Arc<dyn EventPublisher>,
        confidence_threshold: f64,
    ) -> ClassificationHandler {
        ClassificationHandler {
            classifier,
            fallback,
            publisher,
            confidence_threshold,
        }
    }
}

#[async_trait]
impl MessageHandler for ClassificationHandler {
    async fn handle(&self, message: &ConsumerMessage) -> Result<(), HandlerError> {
        let signal: Signal = serde_json::from_value(message.message.clone())
            .map_err(|e| HandlerError::new(format!("not a signal: {}", e)))?;

        let mut risk = self
            .classifier
            .classify(&signal)
            .await
            .map_err(|e| HandlerError::new(e.to_string()))?;

        if risk.classification_confidence < self.confidence_threshold {
            if let Some(fallback) = &self.fallback {
                warn!(
                    event_id = %signal.event_id,
                    confidence = risk.classification_confidence,
                    threshold = self.confidence_threshold,
                    "classification under threshold, using fallback"
                );
                risk = fallback
                    .classify(&signal)
                    .await
                    .map_err(|e| HandlerError::new(e.to_string()))?;
            }
        }

        let event = ClassifiedEvent::new(signal, risk);
        publish_message(
            self.publisher.as_ref(),
            streams::CLASSIFIED_EVENTS,
            &event,
        )
        .await
        .map_err(|e| HandlerError::new(e.to_string()))?;
        debug!(event_id = %event.event_id, "classified event published");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::RuleBasedClassifier;
    use serde_json::json;
    use sr_bus::{EventStreamReader, MemoryBus};
    use sr_types::SeverityLevel;

    struct FixedClassifier {
        confidence: f64,
    }

    #[async_trait]
    impl Classifier for FixedClassifier {
        async fn classify(&self, signal: &Signal) -> Result<StructuredRisk, ClassifyError> {
            Ok(StructuredRisk {
                event_id: signal.event_id.clone(),
                event_type: "FIXED".to_owned(),
                severity_level: SeverityLevel::High,
                impact_region: signal.geographic_scope.clone(),
                expected_duration_hours: 1.0,
                classification_confidence: self.confidence,
                model_version: "fixed-1".to_owned(),
            })
        }
    }

    fn message(signal: serde_json::Value) -> ConsumerMessage {
        ConsumerMessage {
            id: "1".to_owned(),
            message: signal,
            published_at: chrono::DateTime::<chrono::Utc>::UNIX_EPOCH,
            redelivered: false,
        }
    }

    fn signal_json() -> serde_json::Value {
        serde_json::to_value(
            Signal::normalize(&json!({
                "event_id": "e1",
                "raw_content": "port closure at terminal 4",
                "source_reference": "r",
                "geographic_scope": "US-TX",
                "signal_confidence": 0.9,
            }))
            .unwrap(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn confident_classification_is_published() {
        let bus = MemoryBus::new();
        let handler = ClassificationHandler::new(
            Arc::new(FixedClassifier { confidence: 0.9 }),
            Some(Arc::new(RuleBasedClassifier::new())),
            Arc::new(bus.clone()),
            0.65,
        );
        handler.handle(&message(signal_json())).await.unwrap();

        let events = bus.read_recent("classified-events", 10).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].message["structured_risk"]["event_type"], "FIXED");
        assert_eq!(events[0].message["event_id"], "e1");
    }

    #[tokio::test]
    async fn low_confidence_falls_back_to_rules() {
        let bus = MemoryBus::new();
        let handler = ClassificationHandler::new(
            Arc::new(FixedClassifier { confidence: 0.2 }),
            Some(Arc::new(RuleBasedClassifier::new())),
            Arc::new(bus.clone()),
            0.65,
        );
        handler.handle(&message(signal_json())).await.unwrap();

        let events = bus.read_recent("classified-events", 10).await.unwrap();
        assert_eq!(
            events[0].message["structured_risk"]["event_type"],
            "PORT_CLOSURE",
            "rule-based fallback should classify the port closure"
        );
    }

    #[tokio::test]
    async fn non_signal_payload_is_a_handler_error() {
        let bus = MemoryBus::new();
        let handler = ClassificationHandler::new(
            Arc::new(FixedClassifier { confidence: 0.9 }),
            None,
            Arc::new(bus.clone()),
            0.65,
        );
        let result = handler.handle(&message(json!({"not": "a signal"}))).await;
        assert!(result.is_err());
    }
}
