// supply-risk: Umbrella crate for the risk-intelligence pipeline.
//
// Re-exports the substrate crates so the root integration suites (and
// downstream tooling) have one import surface. The runnable services live
// under services/.

pub use sr_bus;
pub use sr_core;
pub use sr_state;
pub use sr_types;
pub use sr_worker;
