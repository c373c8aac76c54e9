// planning: Library entry point.
// Exposes modules for integration testing.

pub mod http;
pub mod impact;
pub mod state_worker;

pub use impact::ImpactHandler;
pub use state_worker::{InventoryStateHandler, ShipmentStateHandler};
