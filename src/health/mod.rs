//! Module health probing and scoring

pub mod evaluator;
pub mod prober;

pub use evaluator::{health_score, Evaluation, EvaluatorConfig, HealthEvaluator};
pub use prober::{NetworkProber, ProbeReport, Prober};
