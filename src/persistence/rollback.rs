//! Rollback Store
//!
//! Keeps a bounded ring of full registry snapshots for manual recovery.
//! Rollback points are created:
//! - On initial boot
//! - When a poll detects fingerprint drift
//! - On explicit admin request
//! - Before shutdown
//!
//! Snapshot and restore both run under the store lock, so rollback points
//! are totally ordered and never interleave with a restore.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{RollbackMeta, RollbackPoint};
use crate::error::{NexusError, Result};
use crate::registry::Registry;

/// Label used when a caller supplies an empty one
const DEFAULT_LABEL: &str = "manual";

/// Configuration for the rollback store
#[derive(Debug, Clone)]
pub struct RollbackConfig {
    /// Maximum retained rollback points (default: 10)
    pub capacity: usize,
    /// JSON file the ring is mirrored to after every snapshot
    pub persist_path: Option<PathBuf>,
}

impl Default for RollbackConfig {
    fn default() -> Self {
        Self {
            capacity: 10,
            persist_path: None,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RingState {
    next_sequence: u64,
    points: VecDeque<RollbackPoint>,
}

impl RingState {
    fn evict_to(&mut self, capacity: usize) -> usize {
        let mut evicted = 0;
        while self.points.len() > capacity {
            if let Some(old) = self.points.pop_front() {
                debug!("Evicted rollback point {} ({})", old.id, old.label);
                evicted += 1;
            }
        }
        evicted
    }
}

/// Bounded, append-only store of registry snapshots
#[derive(Debug)]
pub struct RollbackStore {
    config: RollbackConfig,
    state: Mutex<RingState>,
}

impl RollbackStore {
    /// Create an empty in-memory store
    pub fn new(config: RollbackConfig) -> Self {
        Self {
            config,
            state: Mutex::new(RingState::default()),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(RollbackConfig::default())
    }

    /// Create a store, reloading previously persisted points if configured
    ///
    /// A missing file yields an empty store; an unreadable one is an error.
    pub async fn open(config: RollbackConfig) -> Result<Self> {
        let mut ring = match &config.persist_path {
            Some(path) => load_ring(path).await?,
            None => RingState::default(),
        };
        let evicted = ring.evict_to(config.capacity);
        if !ring.points.is_empty() {
            info!(
                "Loaded {} rollback points ({} evicted for capacity {})",
                ring.points.len(),
                evicted,
                config.capacity
            );
        }
        Ok(Self {
            config,
            state: Mutex::new(ring),
        })
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// Capture the registry and append a labeled rollback point
    pub async fn snapshot(&self, registry: &Registry, label: &str) -> Result<RollbackPoint> {
        let label = match label.trim() {
            "" => DEFAULT_LABEL,
            trimmed => trimmed,
        };

        let mut state = self.state.lock().await;
        let snapshot = registry.capture().await;
        let point = RollbackPoint {
            id: Uuid::new_v4().to_string(),
            sequence: state.next_sequence,
            timestamp: Utc::now(),
            label: label.to_string(),
            snapshot,
        };
        state.next_sequence += 1;
        state.points.push_back(point.clone());
        state.evict_to(self.config.capacity);

        info!(
            "Created rollback point {} #{} '{}' ({} modules)",
            point.id,
            point.sequence,
            point.label,
            point.snapshot.modules.len()
        );

        if let Some(path) = &self.config.persist_path {
            if let Err(e) = persist_ring(path, &state).await {
                warn!("Failed to persist rollback points to {}: {}", path.display(), e);
            }
        }

        Ok(point)
    }

    /// Replace the live registry state with a stored snapshot
    pub async fn restore(&self, registry: &Registry, id: &str) -> Result<RollbackMeta> {
        let state = self.state.lock().await;
        let point = state
            .points
            .iter()
            .find(|p| p.id == id)
            .ok_or_else(|| NexusError::UnknownRollbackPoint(id.to_string()))?;

        registry.replace(point.snapshot.clone()).await;
        info!(
            "Restored rollback point {} #{} '{}'",
            point.id, point.sequence, point.label
        );
        Ok(point.meta())
    }

    /// Metadata for every retained point, oldest first
    pub async fn list(&self) -> Vec<RollbackMeta> {
        let state = self.state.lock().await;
        state.points.iter().map(RollbackPoint::meta).collect()
    }

    pub async fn get(&self, id: &str) -> Option<RollbackPoint> {
        let state = self.state.lock().await;
        state.points.iter().find(|p| p.id == id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.points.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

async fn load_ring(path: &Path) -> Result<RingState> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("No rollback file at {}, starting empty", path.display());
            Ok(RingState::default())
        }
        Err(e) => Err(e.into()),
    }
}

/// Write to a sibling temp file, then rename over the target
async fn persist_ring(path: &Path, state: &RingState) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let bytes = serde_json::to_vec_pretty(state)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
