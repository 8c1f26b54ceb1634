use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::persistence::RollbackStore;
use crate::registry::Registry;
use crate::supervisor::Poller;

/// Shared application state for API handlers
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub rollback: Arc<RollbackStore>,
    /// Serializes module commands with poll ticks
    pub poller: Arc<Poller>,
    /// Bearer token required on mutating endpoints; `None` disables auth
    pub admin_token: Option<Arc<str>>,
    pub start_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(poller: Arc<Poller>, admin_token: Option<String>) -> Self {
        Self {
            registry: Arc::clone(poller.registry()),
            rollback: Arc::clone(poller.rollback()),
            poller,
            admin_token: admin_token
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .map(Arc::from),
            start_time: Utc::now(),
        }
    }

    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.start_time).num_seconds()
    }
}
