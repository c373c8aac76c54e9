//! Planning-impact join: `mitigation-plans` × persisted planning state →
//! `at-risk-shipments` + `inventory-exposures`.
//!
//! Matching is by region (exact or country prefix, see
//! `sr_types::planning::region_matches`) against a shipment's lane
//! endpoints and an inventory position's site region.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use sr_bus::{publish_message, ConsumerMessage, EventPublisher};
use sr_core::now_rfc3339;
use sr_state::PlanningStateStore;
use sr_types::planning::region_matches;
use sr_types::{streams, AtRiskShipment, InventoryExposure, MitigationPlan};
use sr_worker::{HandlerError, MessageHandler};

pub struct ImpactHandler {
    store: Arc<dyn PlanningStateStore>,
    publisher: Arc<dyn EventPublisher>,
}

impl ImpactHandler {
    pub fn new(
        store: Arc<dyn PlanningStateStore>,
        publisher: Arc<dyn EventPublisher>,
    ) -> ImpactHandler {
        ImpactHandler { store, publisher }
    }
}

#[async_trait]
impl MessageHandler for ImpactHandler {
    async fn handle(&self, message: &ConsumerMessage) -> Result<(), HandlerError> {
        let plan: MitigationPlan = serde_json::from_value(message.message.clone())
            .map_err(|e| HandlerError::new(format!("not a mitigation plan: {}", e)))?;
        if plan.impact_region.is_empty() {
            debug!(plan_id = %plan.plan_id, "plan has no impact region, nothing to join");
            return Ok(());
        }

        let shipments = self
            .store
            .list_shipments()
            .await
            .map_err(|e| HandlerError::new(e.to_string()))?;
        let mut flagged_shipments = 0usize;
        for shipment in &shipments {
            let touches = region_matches(&plan.impact_region, &shipment.origin_region)
                || region_matches(&plan.impact_region, &shipment.destination_region);
            if !touches {
                continue;
            }
            let at_risk = AtRiskShipment {
                shipment_id: shipment.shipment_id.clone(),
                lane_id: shipment.lane_id.clone(),
                event_id: plan.event_id.clone(),
                plan_id: plan.plan_id.clone(),
                impact_region: plan.impact_region.clone(),
                risk_level: plan.risk_level,
                flagged_at_utc: now_rfc3339(),
            };
            publish_message(self.publisher.as_ref(), streams::AT_RISK_SHIPMENTS, &at_risk)
                .await
                .map_err(|e| HandlerError::new(e.to_string()))?;
            flagged_shipments += 1;
        }

        let inventory = self
            .store
            .list_inventory()
            .await
            .map_err(|e| HandlerError::new(e.to_string()))?;
        let mut flagged_inventory = 0usize;
        for position in &inventory {
            if !region_matches(&plan.impact_region, &position.region) {
                continue;
            }
            let exposure = InventoryExposure {
                sku: position.sku.clone(),
                site_id: position.site_id.clone(),
                region: position.region.clone(),
                event_id: plan.event_id.clone(),
                plan_id: plan.plan_id.clone(),
                risk_level: plan.risk_level,
                days_of_cover: position.days_of_cover,
                flagged_at_utc: now_rfc3339(),
            };
            publish_message(
                self.publisher.as_ref(),
                streams::INVENTORY_EXPOSURES,
                &exposure,
            )
            .await
            .map_err(|e| HandlerError::new(e.to_string()))?;
            flagged_inventory += 1;
        }

        info!(
            plan_id = %plan.plan_id,
            impact_region = %plan.impact_region,
            shipments = flagged_shipments,
            inventory = flagged_inventory,
            "impact join complete"
        );
        Ok(())
    }
}
