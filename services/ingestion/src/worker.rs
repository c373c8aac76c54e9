//! Raw-signals consumer: feeds gateway-published raw events through the
//! ingestion core.

use async_trait::async_trait;
use std::sync::Arc;

use crate::service::IngestionService;
use sr_bus::ConsumerMessage;
use sr_worker::{HandlerError, MessageHandler};

/// Handler for the `raw-input-signals` consumer group.
///
/// A publish failure leaves the signal parked in the service and fails the
/// delivery, so the raw record is redelivered and the publish retried
/// until the delivery budget routes it to the DLQ.
pub struct RawSignalHandler {
    service: Arc<IngestionService>,
}

impl RawSignalHandler {
    pub fn new(service: Arc<IngestionService>) -> RawSignalHandler {
        RawSignalHandler { service }
    }
}

#[async_trait]
impl MessageHandler for RawSignalHandler {
    async fn handle(&self, message: &ConsumerMessage) -> Result<(), HandlerError> {
        let summary = self
            .service
            .ingest_signals(std::slice::from_ref(&message.message))
            .await;
        if summary.failed > 0 {
            return Err(HandlerError::new(format!(
                "ingest failed for {} of {} events",
                summary.failed, summary.polled
            )));
        }
        Ok(())
    }
}
