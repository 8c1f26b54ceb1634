//! In-memory module registry
//!
//! The registry is the single writer for module records and the global
//! configuration map. Callers only ever receive clones.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::fingerprint::{fingerprint, registry_fingerprint, Fingerprint};
use crate::domain::{
    GlobalConfig, ModuleDescriptor, ModuleFilter, ModuleRecord, ModuleStatus, RegistrySnapshot,
};
use crate::error::{NexusError, Result};
use crate::health::Evaluation;

/// Configuration for the registry
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Maximum retained entries in each module's error log (default: 20)
    pub max_errors: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { max_errors: 20 }
    }
}

/// Whole-registry health rollup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallHealth {
    Healthy,
    Degraded,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSummary {
    pub status: OverallHealth,
    /// Mean health score across modules (100 when empty)
    pub overall_health: f64,
    pub total_modules: usize,
    pub by_status: BTreeMap<ModuleStatus, usize>,
    pub fingerprint: String,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug)]
struct Entry {
    record: ModuleRecord,
    /// Fingerprint seen at the last drift check
    observed: Option<String>,
}

#[derive(Debug, Default)]
struct RegistryState {
    modules: BTreeMap<String, Entry>,
    config: GlobalConfig,
}

/// Module health registry
#[derive(Debug)]
pub struct Registry {
    config: RegistryConfig,
    state: RwLock<RegistryState>,
}

impl Registry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            state: RwLock::new(RegistryState::default()),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(RegistryConfig::default())
    }

    pub fn max_errors(&self) -> usize {
        self.config.max_errors
    }

    /// Register or update a module
    ///
    /// New ids start `active` with a score of 100. Re-registering an existing
    /// id replaces its descriptor fields but keeps status, score and errors,
    /// so the change surfaces as drift on the next poll. Returns `true` when
    /// the module was newly inserted.
    pub async fn register(&self, descriptor: ModuleDescriptor) -> Result<bool> {
        descriptor.validate()?;

        let mut state = self.state.write().await;
        if let Some(path) = find_cycle(&state.modules, &descriptor) {
            return Err(NexusError::DependencyCycle { path });
        }

        let id = descriptor.id.clone();
        match state.modules.get_mut(&id) {
            Some(entry) => {
                entry.record.apply_descriptor(descriptor);
                debug!("Updated module descriptor: {}", id);
                Ok(false)
            }
            None => {
                state.modules.insert(
                    id.clone(),
                    Entry {
                        record: ModuleRecord::from_descriptor(descriptor),
                        observed: None,
                    },
                );
                info!("Registered module: {}", id);
                Ok(true)
            }
        }
    }

    /// Remove a module; dependents keep their (now dangling) references
    pub async fn deregister(&self, id: &str) -> Result<ModuleRecord> {
        let mut state = self.state.write().await;
        let entry = state
            .modules
            .remove(id)
            .ok_or_else(|| NexusError::UnknownModule(id.to_string()))?;
        info!("Deregistered module: {}", id);
        Ok(entry.record)
    }

    pub async fn get(&self, id: &str) -> Option<ModuleRecord> {
        let state = self.state.read().await;
        state.modules.get(id).map(|e| e.record.clone())
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.state.read().await.modules.contains_key(id)
    }

    /// Snapshot copies ordered by id
    pub async fn list(&self, filter: Option<ModuleFilter>) -> Vec<ModuleRecord> {
        let filter = filter.unwrap_or_default();
        let state = self.state.read().await;
        state
            .modules
            .values()
            .filter(|e| filter.matches(&e.record))
            .map(|e| e.record.clone())
            .collect()
    }

    pub async fn ids(&self) -> Vec<String> {
        self.state.read().await.modules.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.modules.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Transition a module's status, returning the previous status
    ///
    /// Entering `failed` appends exactly one error entry (`reason`, or a
    /// generic message when none is given).
    pub async fn set_status(
        &self,
        id: &str,
        status: ModuleStatus,
        reason: Option<&str>,
    ) -> Result<ModuleStatus> {
        let max_errors = self.config.max_errors;
        let mut state = self.state.write().await;
        let entry = state
            .modules
            .get_mut(id)
            .ok_or_else(|| NexusError::UnknownModule(id.to_string()))?;

        let previous = entry.record.status;
        entry.record.status = status;
        if status == ModuleStatus::Failed {
            entry.record.health_score = 0.0;
            let message = reason
                .map(str::to_string)
                .unwrap_or_else(|| format!("status set to failed (was {})", previous));
            entry.record.push_error(&message, max_errors);
        }

        if previous != status {
            info!("Module {} status: {} -> {}", id, previous, status);
        }
        Ok(previous)
    }

    /// Apply a health evaluation in a single write, returning the previous status
    pub async fn apply_evaluation(&self, id: &str, evaluation: &Evaluation) -> Result<ModuleStatus> {
        let max_errors = self.config.max_errors;
        let mut state = self.state.write().await;
        let entry = state
            .modules
            .get_mut(id)
            .ok_or_else(|| NexusError::UnknownModule(id.to_string()))?;

        let record = &mut entry.record;
        let previous = record.status;
        record.status = evaluation.status;
        record.health_score = evaluation.health_score;
        record.last_checked = Some(evaluation.checked_at);
        record.last_latency_ms = evaluation.latency_ms;

        if evaluation.status == ModuleStatus::Failed {
            let message = evaluation
                .error
                .as_deref()
                .unwrap_or("health probe failed");
            record.push_error(message, max_errors);
        }

        if previous != evaluation.status {
            match evaluation.status {
                ModuleStatus::Failed | ModuleStatus::Degraded => warn!(
                    "Module {} status: {} -> {} (score {:.1})",
                    id, previous, evaluation.status, evaluation.health_score
                ),
                _ => info!(
                    "Module {} status: {} -> {} (score {:.1})",
                    id, previous, evaluation.status, evaluation.health_score
                ),
            }
        }
        Ok(previous)
    }

    /// Current fingerprints of every module, ordered by id
    pub async fn fingerprints(&self) -> Vec<Fingerprint> {
        let state = self.state.read().await;
        state.modules.values().map(|e| fingerprint(&e.record)).collect()
    }

    /// Recompute fingerprints and return ids whose value changed
    ///
    /// A module's first observation records its fingerprint without
    /// counting as drift.
    pub async fn detect_drift(&self) -> Vec<String> {
        let mut state = self.state.write().await;
        let mut drifted = Vec::new();
        for (id, entry) in state.modules.iter_mut() {
            let current = fingerprint(&entry.record).hash;
            match entry.observed.as_deref() {
                Some(previous) if previous != current => {
                    debug!("Fingerprint drift for {}: {} -> {}", id, previous, current);
                    drifted.push(id.clone());
                }
                _ => {}
            }
            entry.observed = Some(current);
        }
        drifted
    }

    pub async fn set_config(&self, key: impl Into<String>, value: serde_json::Value) {
        let mut state = self.state.write().await;
        state.config.insert(key.into(), value);
    }

    pub async fn config(&self) -> GlobalConfig {
        self.state.read().await.config.clone()
    }

    /// Deep copy of all records and the global config
    pub async fn capture(&self) -> RegistrySnapshot {
        let state = self.state.read().await;
        RegistrySnapshot {
            modules: state.modules.values().map(|e| e.record.clone()).collect(),
            config: state.config.clone(),
        }
    }

    /// Replace the entire live state with a snapshot
    ///
    /// Observed fingerprints are re-seeded from the restored records so a
    /// restore does not itself register as drift.
    pub async fn replace(&self, snapshot: RegistrySnapshot) {
        let modules: BTreeMap<String, Entry> = snapshot
            .modules
            .into_iter()
            .map(|record| {
                let observed = Some(fingerprint(&record).hash);
                (record.id.clone(), Entry { record, observed })
            })
            .collect();

        let mut state = self.state.write().await;
        let count = modules.len();
        state.modules = modules;
        state.config = snapshot.config;
        info!("Registry state replaced ({} modules)", count);
    }

    pub async fn summary(&self) -> HealthSummary {
        let state = self.state.read().await;
        let total = state.modules.len();

        let mut by_status: BTreeMap<ModuleStatus, usize> = BTreeMap::new();
        let mut score_sum = 0.0;
        for entry in state.modules.values() {
            *by_status.entry(entry.record.status).or_default() += 1;
            score_sum += entry.record.health_score;
        }

        let fingerprints: Vec<Fingerprint> =
            state.modules.values().map(|e| fingerprint(&e.record)).collect();

        let count = |s: ModuleStatus| by_status.get(&s).copied().unwrap_or(0);
        let status = if count(ModuleStatus::Failed) > 0 {
            OverallHealth::Critical
        } else if count(ModuleStatus::Active) == total {
            OverallHealth::Healthy
        } else {
            OverallHealth::Degraded
        };

        HealthSummary {
            status,
            overall_health: if total == 0 {
                100.0
            } else {
                score_sum / total as f64
            },
            total_modules: total,
            by_status,
            fingerprint: registry_fingerprint(&fingerprints),
            generated_at: Utc::now(),
        }
    }
}

/// Path of a dependency cycle that `candidate` would close, if any
///
/// The existing graph is acyclic, so any new cycle must pass through the
/// candidate.
fn find_cycle(
    modules: &BTreeMap<String, Entry>,
    candidate: &ModuleDescriptor,
) -> Option<Vec<String>> {
    let mut graph: HashMap<&str, Vec<&str>> = modules
        .values()
        .map(|e| {
            (
                e.record.id.as_str(),
                e.record.dependencies.iter().map(String::as_str).collect(),
            )
        })
        .collect();
    graph.insert(
        candidate.id.as_str(),
        candidate.dependencies.iter().map(String::as_str).collect(),
    );

    let target = candidate.id.as_str();
    let mut path = vec![target];
    let mut visited = std::collections::HashSet::new();
    if walk(&graph, target, target, &mut path, &mut visited) {
        Some(path.into_iter().map(str::to_string).collect())
    } else {
        None
    }
}

fn walk<'a>(
    graph: &HashMap<&'a str, Vec<&'a str>>,
    node: &'a str,
    target: &str,
    path: &mut Vec<&'a str>,
    visited: &mut std::collections::HashSet<&'a str>,
) -> bool {
    let Some(deps) = graph.get(node) else {
        return false;
    };
    for &dep in deps {
        if dep == target {
            path.push(dep);
            return true;
        }
        if !visited.insert(dep) {
            continue;
        }
        path.push(dep);
        if walk(graph, dep, target, path, visited) {
            return true;
        }
        path.pop();
    }
    false
}
