//! Repair Policy
//!
//! Bounded retry for modules that just failed. An attempt is a restart hook
//! followed by a delay and a verifying re-probe; only a re-probe that
//! succeeds counts as recovery.

use std::time::Duration;
use tracing::{debug, info, warn};

use crate::domain::ModuleRecord;
use crate::health::{Evaluation, HealthEvaluator};

/// Retry policy for failed modules
#[derive(Debug, Clone)]
pub struct RepairPolicy {
    /// Attempts before leaving the module failed (default: 1; 0 disables repair)
    pub max_attempts: u32,
    /// Delay before the first re-probe (default: 1s)
    pub delay: Duration,
    /// Multiplier applied to the delay after each attempt (default: 2.0)
    pub backoff: f64,
}

impl Default for RepairPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            delay: Duration::from_secs(1),
            backoff: 2.0,
        }
    }
}

impl RepairPolicy {
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.max_attempts > 0
    }

    /// Delay before re-probing on `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        self.delay.mul_f64(self.backoff.max(1.0).powi(exponent))
    }
}

/// Result of running the repair policy on one module
#[derive(Debug, Clone, PartialEq)]
pub enum RepairOutcome {
    /// A verifying re-probe succeeded
    Recovered { attempts: u32, evaluation: Evaluation },
    /// Every attempt failed; the module stays failed
    Exhausted {
        attempts: u32,
        last_error: Option<String>,
    },
}

impl RepairOutcome {
    pub fn is_recovered(&self) -> bool {
        matches!(self, RepairOutcome::Recovered { .. })
    }
}

/// Run up to `max_attempts` restart + re-probe cycles
pub async fn attempt_repair(
    policy: &RepairPolicy,
    evaluator: &HealthEvaluator,
    record: &ModuleRecord,
) -> RepairOutcome {
    let mut last_error = None;

    for attempt in 1..=policy.max_attempts {
        debug!(
            "Repair attempt {}/{} for {}",
            attempt, policy.max_attempts, record.id
        );

        if let Err(e) = evaluator.prober().restart(record).await {
            warn!("Restart hook failed for {} (attempt {}): {}", record.id, attempt, e);
            last_error = Some(e.to_string());
            continue;
        }

        tokio::time::sleep(policy.delay_for(attempt)).await;

        let evaluation = evaluator.evaluate(record).await;
        if evaluation.is_failure() {
            warn!(
                "Re-probe failed for {} (attempt {}): {}",
                record.id,
                attempt,
                evaluation.error.as_deref().unwrap_or("unknown error")
            );
            last_error = evaluation.error;
            continue;
        }

        info!(
            "Module {} recovered after {} repair attempt(s)",
            record.id, attempt
        );
        return RepairOutcome::Recovered {
            attempts: attempt,
            evaluation,
        };
    }

    RepairOutcome::Exhausted {
        attempts: policy.max_attempts,
        last_error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ModuleCategory, ModuleDescriptor, ModuleStatus};
    use crate::error::NexusError;
    use crate::health::prober::{MockProber, ProbeReport};
    use crate::health::EvaluatorConfig;
    use std::sync::Arc;

    fn record() -> ModuleRecord {
        ModuleRecord::from_descriptor(ModuleDescriptor::new("m", "M", ModuleCategory::Data))
    }

    fn policy(max_attempts: u32) -> RepairPolicy {
        RepairPolicy {
            max_attempts,
            delay: Duration::from_millis(10),
            backoff: 2.0,
        }
    }

    fn probe_error() -> NexusError {
        NexusError::Probe {
            module_id: "m".into(),
            reason: "still down".into(),
        }
    }

    #[test]
    fn test_delay_backs_off() {
        let policy = policy(3);
        assert_eq!(policy.delay_for(1), Duration::from_millis(10));
        assert_eq!(policy.delay_for(2), Duration::from_millis(20));
        assert_eq!(policy.delay_for(3), Duration::from_millis(40));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovery_requires_successful_reprobe() {
        let mut prober = MockProber::new();
        prober.expect_restart().times(2).returning(|_| Ok(()));
        let mut calls = 0;
        prober.expect_check().times(2).returning(move |_| {
            calls += 1;
            if calls == 1 {
                Err(probe_error())
            } else {
                Ok(ProbeReport::with_latency(0))
            }
        });
        let evaluator = HealthEvaluator::new(Arc::new(prober), EvaluatorConfig::default());

        let outcome = attempt_repair(&policy(3), &evaluator, &record()).await;
        match outcome {
            RepairOutcome::Recovered {
                attempts,
                evaluation,
            } => {
                assert_eq!(attempts, 2);
                assert_eq!(evaluation.status, ModuleStatus::Active);
            }
            other => panic!("expected recovery, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_restart_without_healthy_probe_is_not_recovery() {
        let mut prober = MockProber::new();
        prober.expect_restart().times(1).returning(|_| Ok(()));
        prober.expect_check().times(1).returning(|_| Err(probe_error()));
        let evaluator = HealthEvaluator::new(Arc::new(prober), EvaluatorConfig::default());

        let outcome = attempt_repair(&policy(1), &evaluator, &record()).await;
        assert_eq!(
            outcome,
            RepairOutcome::Exhausted {
                attempts: 1,
                last_error: Some(probe_error().to_string()),
            }
        );
    }

    #[tokio::test]
    async fn test_disabled_policy_never_probes() {
        let prober = MockProber::new();
        let evaluator = HealthEvaluator::new(Arc::new(prober), EvaluatorConfig::default());

        let outcome = attempt_repair(&RepairPolicy::disabled(), &evaluator, &record()).await;
        assert!(!outcome.is_recovered());
    }
}
