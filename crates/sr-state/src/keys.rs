//! Persistent key layout.

pub fn dedup(stream: &str, event_id: &str) -> String {
    format!("dedup:{}:{}", stream, event_id)
}

pub fn retry(stream: &str, group: &str, message_id: &str) -> String {
    format!("retry:{}:{}:{}", stream, group, message_id)
}

pub fn connector_state(name: &str) -> String {
    format!("connector:state:{}", name)
}

pub fn lease(name: &str) -> String {
    format!("lease:{}", name)
}

pub fn connector_metrics(name: &str) -> String {
    format!("metrics:connector:{}", name)
}

pub const PLANNING_SHIPMENTS: &str = "planning:shipments";
pub const PLANNING_INVENTORY: &str = "planning:inventory";

pub fn planning_lane(lane_id: &str) -> String {
    format!("planning:lane:{}", lane_id)
}

/// Field key for an inventory position within the planning inventory hash.
pub fn inventory_field(sku: &str, site_id: &str) -> String {
    format!("{}@{}", sku, site_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_shapes_are_frozen() {
        assert_eq!(dedup("external-signals", "e1"), "dedup:external-signals:e1");
        assert_eq!(retry("s", "g", "m1"), "retry:s:g:m1");
        assert_eq!(connector_state("weather"), "connector:state:weather");
        assert_eq!(lease("weather"), "lease:weather");
        assert_eq!(connector_metrics("weather"), "metrics:connector:weather");
        assert_eq!(planning_lane("USLAX-USDAL"), "planning:lane:USLAX-USDAL");
        assert_eq!(inventory_field("sku1", "dc7"), "sku1@dc7");
    }
}
