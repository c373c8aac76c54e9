//! Notification worker: `mitigation-plans` → `notifications`.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::router::NotificationRouter;
use sr_bus::{publish_message, ConsumerMessage, EventPublisher};
use sr_types::{streams, MitigationPlan};
use sr_worker::{HandlerError, MessageHandler};

pub struct NotificationHandler {
    router: Arc<dyn NotificationRouter>,
    publisher: Arc<dyn EventPublisher>,
}

impl NotificationHandler {
    pub fn new(
        router: Arc<dyn NotificationRouter>,
        publisher: Arc<dyn EventPublisher>,
    ) -> NotificationHandler {
        NotificationHandler { router, publisher }
    }
}

#[async_trait]
impl MessageHandler for NotificationHandler {
    async fn handle(&self, message: &ConsumerMessage) -> Result<(), HandlerError> {
        let plan: MitigationPlan = serde_json::from_value(message.message.clone())
            .map_err(|e| HandlerError::new(format!("not a mitigation plan: {}", e)))?;
        let notifications = self.router.route(&plan);
        for notification in &notifications {
            publish_message(self.publisher.as_ref(), streams::NOTIFICATIONS, notification)
                .await
                .map_err(|e| HandlerError::new(e.to_string()))?;
        }
        debug!(
            plan_id = %plan.plan_id,
            count = notifications.len(),
            "notifications published"
        );
        Ok(())
    }
}
