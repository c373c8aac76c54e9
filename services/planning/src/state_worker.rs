//! State workers persisting shipment plans and inventory snapshots.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use sr_bus::ConsumerMessage;
use sr_state::PlanningStateStore;
use sr_types::{InventorySnapshot, ShipmentPlan};
use sr_worker::{HandlerError, MessageHandler};

/// Persists `shipment-plans` records into the planning state store.
pub struct ShipmentStateHandler {
    store: Arc<dyn PlanningStateStore>,
}

impl ShipmentStateHandler {
    pub fn new(store: Arc<dyn PlanningStateStore>) -> ShipmentStateHandler {
        ShipmentStateHandler { store }
    }
}

#[async_trait]
impl MessageHandler for ShipmentStateHandler {
    async fn handle(&self, message: &ConsumerMessage) -> Result<(), HandlerError> {
        let plan: ShipmentPlan = serde_json::from_value(message.message.clone())
            .map_err(|e| HandlerError::new(format!("not a shipment plan: {}", e)))?;
        self.store
            .upsert_shipment(&plan)
            .await
            .map_err(|e| HandlerError::new(e.to_string()))?;
        debug!(shipment_id = %plan.shipment_id, lane_id = %plan.lane_id, "shipment persisted");
        Ok(())
    }
}

/// Persists `inventory-snapshots` records into the planning state store.
pub struct InventoryStateHandler {
    store: Arc<dyn PlanningStateStore>,
}

impl InventoryStateHandler {
    pub fn new(store: Arc<dyn PlanningStateStore>) -> InventoryStateHandler {
        InventoryStateHandler { store }
    }
}

#[async_trait]
impl MessageHandler for InventoryStateHandler {
    async fn handle(&self, message: &ConsumerMessage) -> Result<(), HandlerError> {
        let snapshot: InventorySnapshot = serde_json::from_value(message.message.clone())
            .map_err(|e| HandlerError::new(format!("not an inventory snapshot: {}", e)))?;
        self.store
            .upsert_inventory(&snapshot)
            .await
            .map_err(|e| HandlerError::new(e.to_string()))?;
        debug!(sku = %snapshot.sku, site_id = %snapshot.site_id, "inventory persisted");
        Ok(())
    }
}
