//! Health Evaluator
//!
//! Turns a probe into a status and a score:
//! - timeout or probe error -> `failed`, score 0
//! - success -> score from latency and recent errors; `active` at or above
//!   the degraded threshold, `degraded` below it

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

use super::prober::Prober;
use crate::domain::{ModuleRecord, ModuleStatus};
use crate::error::NexusError;

/// Maximum score deduction for latency
const LATENCY_PENALTY_MAX: f64 = 50.0;
/// Score deduction per retained error entry
const ERROR_PENALTY_EACH: f64 = 5.0;
/// Maximum score deduction for errors
const ERROR_PENALTY_MAX: f64 = 40.0;

/// Configuration for the health evaluator
#[derive(Debug, Clone)]
pub struct EvaluatorConfig {
    /// Per-module probe timeout (default: 2s)
    pub probe_timeout: Duration,
    /// Successful probes scoring below this are `degraded` (default: 50)
    pub degraded_threshold: f64,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(2),
            degraded_threshold: 50.0,
        }
    }
}

/// Result of evaluating one module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    pub status: ModuleStatus,
    pub health_score: f64,
    pub latency_ms: Option<u64>,
    /// Set when the probe failed or timed out
    pub error: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl Evaluation {
    pub fn failed(error: &NexusError) -> Self {
        Self {
            status: ModuleStatus::Failed,
            health_score: 0.0,
            latency_ms: None,
            error: Some(error.to_string()),
            checked_at: Utc::now(),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.status == ModuleStatus::Failed
    }
}

/// Score a successful probe
///
/// `100 - 50 * min(latency / timeout, 1) - min(errors * 5, 40)`, clamped to
/// `[0, 100]`.
pub fn health_score(latency_ms: u64, timeout: Duration, recent_errors: usize) -> f64 {
    let timeout_ms = timeout.as_millis().max(1) as f64;
    let latency_ratio = (latency_ms as f64 / timeout_ms).min(1.0);
    let latency_penalty = LATENCY_PENALTY_MAX * latency_ratio;
    let error_penalty = (recent_errors as f64 * ERROR_PENALTY_EACH).min(ERROR_PENALTY_MAX);
    (100.0 - latency_penalty - error_penalty).clamp(0.0, 100.0)
}

/// Runs probes under a timeout and scores the outcome
#[derive(Clone)]
pub struct HealthEvaluator {
    prober: Arc<dyn Prober>,
    config: EvaluatorConfig,
}

impl HealthEvaluator {
    pub fn new(prober: Arc<dyn Prober>, config: EvaluatorConfig) -> Self {
        Self { prober, config }
    }

    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    pub fn prober(&self) -> &Arc<dyn Prober> {
        &self.prober
    }

    /// Probe one module and score the result
    pub async fn evaluate(&self, record: &ModuleRecord) -> Evaluation {
        let timeout = self.config.probe_timeout;
        let start = Instant::now();

        let outcome = tokio::time::timeout(timeout, self.prober.check(record)).await;
        match outcome {
            Err(_) => {
                let err = NexusError::ProbeTimeout {
                    module_id: record.id.clone(),
                    timeout_ms: timeout.as_millis() as u64,
                };
                warn!("{}", err);
                Evaluation::failed(&err)
            }
            Ok(Err(err)) => {
                warn!("Probe error for {}: {}", record.id, err);
                Evaluation::failed(&err)
            }
            Ok(Ok(report)) => {
                let latency_ms = report
                    .latency_ms
                    .unwrap_or_else(|| start.elapsed().as_millis() as u64);
                let score = health_score(latency_ms, timeout, record.errors.len());
                let status = if score >= self.config.degraded_threshold {
                    ModuleStatus::Active
                } else {
                    ModuleStatus::Degraded
                };
                debug!(
                    "Probe ok for {} in {}ms (score {:.1}, {})",
                    record.id, latency_ms, score, status
                );
                Evaluation {
                    status,
                    health_score: score,
                    latency_ms: Some(latency_ms),
                    error: None,
                    checked_at: Utc::now(),
                }
            }
        }
    }

    /// Evaluate many modules with at most `max_concurrency` probes in flight
    ///
    /// Each probe runs in its own task, so a panicking probe only fails its
    /// own module. Results come back in input order once every probe has
    /// finished.
    pub async fn evaluate_all(
        &self,
        records: Vec<ModuleRecord>,
        max_concurrency: usize,
    ) -> Vec<(String, Evaluation)> {
        let permits = Arc::new(Semaphore::new(max_concurrency.max(1)));

        let handles: Vec<_> = records
            .into_iter()
            .map(|record| {
                let evaluator = self.clone();
                let permits = Arc::clone(&permits);
                let id = record.id.clone();
                let handle = tokio::spawn(async move {
                    // The semaphore is never closed
                    let _permit = permits.acquire_owned().await.ok();
                    evaluator.evaluate(&record).await
                });
                (id, handle)
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for (id, handle) in handles {
            let evaluation = match handle.await {
                Ok(evaluation) => evaluation,
                Err(join_err) => {
                    let reason = if join_err.is_panic() {
                        "probe panicked".to_string()
                    } else {
                        "probe task cancelled".to_string()
                    };
                    error!("Probe task for {} aborted: {}", id, reason);
                    Evaluation::failed(&NexusError::Probe {
                        module_id: id.clone(),
                        reason,
                    })
                }
            };
            results.push((id, evaluation));
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ModuleCategory, ModuleDescriptor};
    use crate::health::prober::{MockProber, ProbeReport};

    fn record(id: &str) -> ModuleRecord {
        ModuleRecord::from_descriptor(ModuleDescriptor::new(id, id, ModuleCategory::Ai))
    }

    fn evaluator(prober: MockProber) -> HealthEvaluator {
        HealthEvaluator::new(
            Arc::new(prober),
            EvaluatorConfig {
                probe_timeout: Duration::from_millis(100),
                degraded_threshold: 50.0,
            },
        )
    }

    #[test]
    fn test_health_score_formula() {
        let timeout = Duration::from_millis(1000);
        assert_eq!(health_score(0, timeout, 0), 100.0);
        assert_eq!(health_score(500, timeout, 0), 75.0);
        assert_eq!(health_score(5000, timeout, 0), 50.0);
        assert_eq!(health_score(0, timeout, 2), 90.0);
        assert_eq!(health_score(0, timeout, 100), 60.0);
        assert_eq!(health_score(1000, timeout, 100), 10.0);
    }

    #[tokio::test]
    async fn test_successful_probe_is_active() {
        let mut prober = MockProber::new();
        prober
            .expect_check()
            .returning(|_| Ok(ProbeReport::with_latency(0)));

        let eval = evaluator(prober).evaluate(&record("a")).await;
        assert_eq!(eval.status, ModuleStatus::Active);
        assert_eq!(eval.health_score, 100.0);
        assert_eq!(eval.latency_ms, Some(0));
        assert!(eval.error.is_none());
    }

    #[tokio::test]
    async fn test_slow_error_prone_probe_is_degraded() {
        let mut prober = MockProber::new();
        prober
            .expect_check()
            .returning(|_| Ok(ProbeReport::with_latency(100)));

        let mut rec = record("a");
        rec.errors = vec!["e".to_string(); 4];
        let eval = evaluator(prober).evaluate(&rec).await;
        assert_eq!(eval.status, ModuleStatus::Degraded);
        assert_eq!(eval.health_score, 30.0);
    }

    #[tokio::test]
    async fn test_probe_error_fails_module() {
        let mut prober = MockProber::new();
        prober.expect_check().returning(|m| {
            Err(NexusError::Probe {
                module_id: m.id.clone(),
                reason: "connection refused".into(),
            })
        });

        let eval = evaluator(prober).evaluate(&record("a")).await;
        assert_eq!(eval.status, ModuleStatus::Failed);
        assert_eq!(eval.health_score, 0.0);
        assert!(eval.error.unwrap().contains("connection refused"));
    }

    struct HangingProber;

    #[async_trait::async_trait]
    impl Prober for HangingProber {
        async fn check(&self, _module: &ModuleRecord) -> crate::Result<ProbeReport> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_timeout_fails_module() {
        let evaluator = HealthEvaluator::new(
            Arc::new(HangingProber),
            EvaluatorConfig {
                probe_timeout: Duration::from_millis(250),
                degraded_threshold: 50.0,
            },
        );

        let eval = evaluator.evaluate(&record("slow")).await;
        assert_eq!(eval.status, ModuleStatus::Failed);
        assert!(eval.error.unwrap().contains("timed out"));
    }

    struct PanickyProber;

    #[async_trait::async_trait]
    impl Prober for PanickyProber {
        async fn check(&self, module: &ModuleRecord) -> crate::Result<ProbeReport> {
            if module.id == "bad" {
                panic!("probe bug");
            }
            Ok(ProbeReport::with_latency(0))
        }
    }

    #[tokio::test]
    async fn test_panicking_probe_is_isolated() {
        let evaluator = HealthEvaluator::new(Arc::new(PanickyProber), EvaluatorConfig::default());
        let results = evaluator
            .evaluate_all(vec![record("a"), record("bad"), record("c")], 2)
            .await;

        let ids: Vec<&str> = results.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["a", "bad", "c"]);
        assert_eq!(results[0].1.status, ModuleStatus::Active);
        assert_eq!(results[1].1.status, ModuleStatus::Failed);
        assert!(results[1].1.error.as_deref().unwrap().contains("panicked"));
        assert_eq!(results[2].1.status, ModuleStatus::Active);
    }
}
