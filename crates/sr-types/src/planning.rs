//! Planning-side records: shipments, inventory, and impact joins.

use serde::{Deserialize, Serialize};

use crate::risk::SeverityLevel;

/// A planned shipment; published to `shipment-plans` and persisted by the
/// planning state worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipmentPlan {
    pub shipment_id: String,
    /// Lane identity, e.g. "USLAX-USDAL".
    pub lane_id: String,
    pub origin_region: String,
    pub destination_region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carrier: Option<String>,
    pub departure_utc: String,
    pub eta_utc: String,
    #[serde(default)]
    pub value_usd: f64,
}

/// A point-in-time inventory position; published to `inventory-snapshots`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventorySnapshot {
    pub sku: String,
    pub site_id: String,
    pub region: String,
    pub quantity: i64,
    /// Days of demand the on-hand quantity covers.
    pub days_of_cover: f64,
}

/// A shipment flagged by the impact join; published to `at-risk-shipments`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtRiskShipment {
    pub shipment_id: String,
    pub lane_id: String,
    pub event_id: String,
    pub plan_id: String,
    pub impact_region: String,
    pub risk_level: SeverityLevel,
    pub flagged_at_utc: String,
}

/// An inventory position flagged by the impact join; published to
/// `inventory-exposures`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryExposure {
    pub sku: String,
    pub site_id: String,
    pub region: String,
    pub event_id: String,
    pub plan_id: String,
    pub risk_level: SeverityLevel,
    pub days_of_cover: f64,
    pub flagged_at_utc: String,
}

/// True when an impact region touches a planning region.
///
/// Matching is case-insensitive on the exact scope, plus country-prefix:
/// a plan scoped "US-TX" matches shipments/inventory recorded as "US-TX"
/// or "US", and a plan scoped "US" matches "US-TX".
pub fn region_matches(impact_region: &str, planning_region: &str) -> bool {
    if impact_region.is_empty() || planning_region.is_empty() {
        return false;
    }
    let impact = impact_region.to_ascii_uppercase();
    let planning = planning_region.to_ascii_uppercase();
    if impact == planning {
        return true;
    }
    let impact_country = impact.split('-').next().unwrap_or(&impact);
    let planning_country = planning.split('-').next().unwrap_or(&planning);
    impact_country == planning_country
}
