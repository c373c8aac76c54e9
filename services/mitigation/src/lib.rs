// mitigation: Turns risk evaluations into mitigation plans.

pub mod planner;
pub mod worker;

pub use planner::{MitigationPlanner, TemplatePlanner};
pub use worker::PlanHandler;
