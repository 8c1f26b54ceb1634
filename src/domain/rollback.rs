use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::module::ModuleRecord;

/// Labels used for automatically created rollback points
pub mod labels {
    pub const INITIAL_BOOT: &str = "initial_boot";
    pub const PRE_SHUTDOWN: &str = "pre_shutdown";
    pub const DRIFT_PREFIX: &str = "drift:";
}

/// Global configuration captured alongside module records
pub type GlobalConfig = BTreeMap<String, serde_json::Value>;

/// Deep copy of the full registry state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrySnapshot {
    /// Ordered by module id
    pub modules: Vec<ModuleRecord>,
    pub config: GlobalConfig,
}

/// A retained, labeled registry snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackPoint {
    pub id: String,
    /// Monotonic creation order across the store's lifetime
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub label: String,
    pub snapshot: RegistrySnapshot,
}

impl RollbackPoint {
    pub fn meta(&self) -> RollbackMeta {
        RollbackMeta {
            id: self.id.clone(),
            sequence: self.sequence,
            timestamp: self.timestamp,
            label: self.label.clone(),
            module_count: self.snapshot.modules.len(),
        }
    }
}

/// Rollback point without the snapshot body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackMeta {
    pub id: String,
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub label: String,
    pub module_count: usize,
}
