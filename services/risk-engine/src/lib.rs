// risk-engine: Scores classified events into risk evaluations.

pub mod engine;
pub mod worker;

pub use engine::{RiskEvaluator, WeightedEvaluator};
pub use worker::EvaluationHandler;
