//! Health Poller
//!
//! Re-evaluates every registered module on a fixed interval. A tick:
//! 1. Probes all pollable modules with bounded fan-out and a per-module timeout
//! 2. Applies the results once every probe has finished
//! 3. Runs the repair policy for modules that went `active -> failed`
//! 4. Takes one rollback point if any fingerprint drifted
//!
//! Ticks, module commands, manual snapshots and restores share one lock, so
//! none of them ever observes another half-applied.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Mutex};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::command::{CommandResult, ModuleCommand};
use super::repair::{attempt_repair, RepairOutcome, RepairPolicy};
use crate::coordination::ShutdownSignal;
use crate::domain::{labels, ModuleRecord, ModuleStatus, RollbackMeta, RollbackPoint};
use crate::error::{NexusError, Result};
use crate::health::{Evaluation, HealthEvaluator};
use crate::persistence::RollbackStore;
use crate::registry::Registry;

/// Configuration for the poller
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Interval between ticks (default: 10s)
    pub interval: Duration,
    /// Maximum probes in flight during a tick (default: 8)
    pub max_concurrency: usize,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            max_concurrency: 8,
        }
    }
}

/// Poller run state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollerState {
    Idle,
    Running,
}

/// What happened to one module during a tick
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleOutcome {
    pub id: String,
    pub previous: ModuleStatus,
    pub status: ModuleStatus,
    pub health_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickReport {
    pub tick: u64,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub outcomes: Vec<ModuleOutcome>,
    /// Locked or in maintenance
    pub skipped: Vec<String>,
    pub repaired: Vec<String>,
    pub drifted: Vec<String>,
    pub rollback_point: Option<String>,
}

impl TickReport {
    pub fn outcome(&self, id: &str) -> Option<&ModuleOutcome> {
        self.outcomes.iter().find(|o| o.id == id)
    }

    pub fn healthy_ratio(&self) -> f64 {
        if self.outcomes.is_empty() {
            return 1.0;
        }
        let healthy = self
            .outcomes
            .iter()
            .filter(|o| o.status.is_healthy())
            .count();
        healthy as f64 / self.outcomes.len() as f64
    }
}

/// Recurring health poller for a registry
pub struct Poller {
    config: PollerConfig,
    registry: Arc<Registry>,
    rollback: Arc<RollbackStore>,
    evaluator: HealthEvaluator,
    repair: RepairPolicy,
    tick_lock: Mutex<()>,
    running: AtomicBool,
    ticks: AtomicU64,
}

impl Poller {
    pub fn new(
        config: PollerConfig,
        registry: Arc<Registry>,
        rollback: Arc<RollbackStore>,
        evaluator: HealthEvaluator,
        repair: RepairPolicy,
    ) -> Self {
        Self {
            config,
            registry,
            rollback,
            evaluator,
            repair,
            tick_lock: Mutex::new(()),
            running: AtomicBool::new(false),
            ticks: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> PollerState {
        if self.running.load(Ordering::SeqCst) {
            PollerState::Running
        } else {
            PollerState::Idle
        }
    }

    pub fn ticks_completed(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn rollback(&self) -> &Arc<RollbackStore> {
        &self.rollback
    }

    /// Run one full poll cycle
    pub async fn tick(&self) -> TickReport {
        let _guard = self.tick_lock.lock().await;
        self.running.store(true, Ordering::SeqCst);
        let start = Instant::now();
        let started_at = Utc::now();
        let tick = self.ticks.load(Ordering::SeqCst) + 1;

        let (pollable, skipped): (Vec<ModuleRecord>, Vec<ModuleRecord>) = self
            .registry
            .list(None)
            .await
            .into_iter()
            .partition(|r| r.status.is_pollable());
        let held: HashMap<String, ModuleStatus> =
            skipped.iter().map(|r| (r.id.clone(), r.status)).collect();
        let skipped: Vec<String> = skipped.into_iter().map(|r| r.id).collect();

        let mut evaluations = self
            .evaluator
            .evaluate_all(pollable.clone(), self.config.max_concurrency)
            .await;
        propagate_dependency_failures(&pollable, &held, &mut evaluations);

        let mut outcomes = Vec::with_capacity(evaluations.len());
        let mut to_repair = Vec::new();
        for (id, evaluation) in &evaluations {
            let previous = match self.registry.apply_evaluation(id, evaluation).await {
                Ok(previous) => previous,
                Err(NexusError::UnknownModule(_)) => {
                    debug!("Module {} deregistered during tick {}", id, tick);
                    continue;
                }
                Err(e) => {
                    error!("Failed to apply evaluation for {}: {}", id, e);
                    continue;
                }
            };
            if previous == ModuleStatus::Active && evaluation.is_failure() {
                to_repair.push(id.clone());
            }
            outcomes.push(ModuleOutcome {
                id: id.clone(),
                previous,
                status: evaluation.status,
                health_score: evaluation.health_score,
                error: evaluation.error.clone(),
            });
        }

        let repaired = self.repair_modules(&to_repair).await;
        for outcome in outcomes.iter_mut() {
            if repaired.contains(&outcome.id) {
                if let Some(record) = self.registry.get(&outcome.id).await {
                    outcome.status = record.status;
                    outcome.health_score = record.health_score;
                }
            }
        }

        let drifted = self.registry.detect_drift().await;
        let rollback_point = if drifted.is_empty() {
            None
        } else {
            let label = format!("{}{}", labels::DRIFT_PREFIX, drifted.join(","));
            warn!("Fingerprint drift detected for {:?}", drifted);
            match self.rollback.snapshot(&self.registry, &label).await {
                Ok(point) => Some(point.id),
                Err(e) => {
                    error!("Failed to snapshot after drift: {}", e);
                    None
                }
            }
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        self.ticks.store(tick, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);

        let failed = outcomes.iter().filter(|o| o.status == ModuleStatus::Failed).count();
        debug!(
            "Tick {} done in {}ms: {} evaluated, {} failed, {} skipped",
            tick,
            duration_ms,
            outcomes.len(),
            failed,
            skipped.len()
        );

        TickReport {
            tick,
            started_at,
            duration_ms,
            outcomes,
            skipped,
            repaired,
            drifted,
            rollback_point,
        }
    }

    /// Run the repair policy for freshly failed modules, returning recovered ids
    async fn repair_modules(&self, ids: &[String]) -> Vec<String> {
        if ids.is_empty() || !self.repair.is_enabled() {
            return Vec::new();
        }

        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = self.registry.get(id).await {
                records.push(record);
            }
        }

        let outcomes = join_all(records.iter().map(|record| async move {
            let outcome = attempt_repair(&self.repair, &self.evaluator, record).await;
            (record.id.clone(), outcome)
        }))
        .await;

        let mut recovered = Vec::new();
        for (id, outcome) in outcomes {
            match outcome {
                RepairOutcome::Recovered { evaluation, .. } => {
                    if self.registry.apply_evaluation(&id, &evaluation).await.is_ok() {
                        recovered.push(id);
                    }
                }
                RepairOutcome::Exhausted {
                    attempts,
                    last_error,
                } => {
                    error!(
                        "Module {} still failed after {} repair attempt(s): {}",
                        id,
                        attempts,
                        last_error.as_deref().unwrap_or("unknown error")
                    );
                }
            }
        }
        recovered
    }

    /// Take a labeled rollback point between ticks
    pub async fn snapshot(&self, label: &str) -> Result<RollbackPoint> {
        let _guard = self.tick_lock.lock().await;
        self.rollback.snapshot(&self.registry, label).await
    }

    /// Restore a rollback point between ticks
    ///
    /// An in-flight tick finishes first, so its results never land on top of
    /// the restored state.
    pub async fn restore(&self, id: &str) -> Result<RollbackMeta> {
        let _guard = self.tick_lock.lock().await;
        self.rollback.restore(&self.registry, id).await
    }

    /// Execute an operator command against one module
    pub async fn execute(&self, id: &str, command: ModuleCommand) -> Result<CommandResult> {
        if command == ModuleCommand::GetStatus {
            let record = self
                .registry
                .get(id)
                .await
                .ok_or_else(|| NexusError::UnknownModule(id.to_string()))?;
            return Ok(CommandResult {
                command: command.to_string(),
                module_id: id.to_string(),
                previous_status: record.status,
                message: format!("module is {}", record.status),
                record,
                evaluation: None,
            });
        }

        let _guard = self.tick_lock.lock().await;
        let record = self
            .registry
            .get(id)
            .await
            .ok_or_else(|| NexusError::UnknownModule(id.to_string()))?;
        let previous_status = record.status;
        info!("Executing {} on module {}", command, id);

        let (evaluation, message) = match &command {
            ModuleCommand::GetStatus => (None, format!("module is {}", record.status)),
            ModuleCommand::HealthCheck => {
                let evaluation = self.evaluator.evaluate(&record).await;
                let message = if record.status.is_pollable() {
                    self.registry.apply_evaluation(id, &evaluation).await?;
                    format!("health check: {}", evaluation.status)
                } else {
                    format!(
                        "module is {}; health check result not applied",
                        record.status
                    )
                };
                (Some(evaluation), message)
            }
            ModuleCommand::Restart => self.restart(&record).await?,
            ModuleCommand::Lock { reason } => {
                self.registry
                    .set_status(id, ModuleStatus::Locked, None)
                    .await?;
                let message = match reason {
                    Some(reason) => format!("locked: {}", reason),
                    None => "locked".to_string(),
                };
                (None, message)
            }
            ModuleCommand::Unlock => {
                if record.status == ModuleStatus::Locked {
                    self.registry
                        .set_status(id, ModuleStatus::Standby, None)
                        .await?;
                    (None, "unlocked; awaiting next poll".to_string())
                } else {
                    (None, format!("module is {}, not locked", record.status))
                }
            }
        };

        let record = self
            .registry
            .get(id)
            .await
            .ok_or_else(|| NexusError::UnknownModule(id.to_string()))?;
        Ok(CommandResult {
            command: command.to_string(),
            module_id: id.to_string(),
            previous_status,
            record,
            evaluation,
            message,
        })
    }

    async fn restart(&self, record: &ModuleRecord) -> Result<(Option<Evaluation>, String)> {
        if record.status == ModuleStatus::Locked {
            return Err(NexusError::ModuleLocked(record.id.clone()));
        }
        self.registry
            .set_status(&record.id, ModuleStatus::Maintenance, None)
            .await?;

        let policy = RepairPolicy {
            max_attempts: self.repair.max_attempts.max(1),
            ..self.repair.clone()
        };
        match attempt_repair(&policy, &self.evaluator, record).await {
            RepairOutcome::Recovered {
                attempts,
                evaluation,
            } => {
                self.registry.apply_evaluation(&record.id, &evaluation).await?;
                Ok((
                    Some(evaluation),
                    format!("restarted after {} attempt(s)", attempts),
                ))
            }
            RepairOutcome::Exhausted {
                attempts,
                last_error,
            } => {
                let reason = format!(
                    "restart failed after {} attempt(s): {}",
                    attempts,
                    last_error.as_deref().unwrap_or("unknown error")
                );
                self.registry
                    .set_status(&record.id, ModuleStatus::Failed, Some(&reason))
                    .await?;
                Ok((None, reason))
            }
        }
    }

    /// Tick on the configured interval until a shutdown signal arrives
    ///
    /// A tick already in progress always completes before the loop exits.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<ShutdownSignal>) {
        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            "Poller started (interval {}ms, concurrency {})",
            self.config.interval.as_millis(),
            self.config.max_concurrency
        );

        loop {
            tokio::select! {
                biased;
                signal = shutdown.recv() => {
                    match signal {
                        Ok(signal) => info!("Poller stopping on {} shutdown", signal),
                        Err(_) => info!("Poller stopping: shutdown channel closed"),
                    }
                    break;
                }
                _ = interval.tick() => {
                    let report = self.tick().await;
                    if report.outcomes.iter().any(|o| o.status == ModuleStatus::Failed) {
                        let failed: Vec<&str> = report
                            .outcomes
                            .iter()
                            .filter(|o| o.status == ModuleStatus::Failed)
                            .map(|o| o.id.as_str())
                            .collect();
                        warn!("Tick {}: failed modules {:?}", report.tick, failed);
                    }
                }
            }
        }

        info!("Poller stopped after {} ticks", self.ticks_completed());
    }
}

/// Downgrade `active` results whose dependencies failed this tick
///
/// Statuses come from this tick's evaluations, falling back to the stored
/// status for modules that were not probed. Unknown dependencies are ignored.
fn propagate_dependency_failures(
    pollable: &[ModuleRecord],
    skipped: &HashMap<String, ModuleStatus>,
    evaluations: &mut [(String, Evaluation)],
) {
    let mut effective: HashMap<&str, ModuleStatus> = skipped
        .iter()
        .map(|(id, status)| (id.as_str(), *status))
        .collect();
    for (id, evaluation) in evaluations.iter() {
        effective.insert(id.as_str(), evaluation.status);
    }

    let failed_deps: HashMap<String, Vec<String>> = pollable
        .iter()
        .map(|record| {
            let failed: Vec<String> = record
                .dependencies
                .iter()
                .filter(|dep| effective.get(dep.as_str()) == Some(&ModuleStatus::Failed))
                .cloned()
                .collect();
            (record.id.clone(), failed)
        })
        .filter(|(_, failed)| !failed.is_empty())
        .collect();

    for (id, evaluation) in evaluations.iter_mut() {
        if evaluation.status != ModuleStatus::Active {
            continue;
        }
        if let Some(failed) = failed_deps.get(id) {
            debug!("Module {} degraded by failed dependencies {:?}", id, failed);
            evaluation.status = ModuleStatus::Degraded;
        }
    }
}
