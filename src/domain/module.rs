use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::{NexusError, Result};

/// Module lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleStatus {
    /// Probing healthy
    Active,
    /// Known but not yet re-evaluated (e.g. just unlocked)
    Standby,
    /// Reachable but slow, error-prone, or a dependency failed
    Degraded,
    /// Restart in progress; skipped by the poller
    Maintenance,
    /// Last probe failed or timed out
    Failed,
    /// Operator-locked; skipped by the poller
    Locked,
}

impl ModuleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleStatus::Active => "active",
            ModuleStatus::Standby => "standby",
            ModuleStatus::Degraded => "degraded",
            ModuleStatus::Maintenance => "maintenance",
            ModuleStatus::Failed => "failed",
            ModuleStatus::Locked => "locked",
        }
    }

    /// Whether the poller evaluates modules in this status
    pub fn is_pollable(&self) -> bool {
        !matches!(self, ModuleStatus::Locked | ModuleStatus::Maintenance)
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, ModuleStatus::Active)
    }

    pub const ALL: [ModuleStatus; 6] = [
        ModuleStatus::Active,
        ModuleStatus::Standby,
        ModuleStatus::Degraded,
        ModuleStatus::Maintenance,
        ModuleStatus::Failed,
        ModuleStatus::Locked,
    ];
}

impl fmt::Display for ModuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ModuleStatus {
    type Err = NexusError;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = raw.trim().to_ascii_lowercase();
        ModuleStatus::ALL
            .into_iter()
            .find(|s| s.as_str() == wanted)
            .ok_or_else(|| NexusError::InvalidDescriptor(format!("unknown status '{}'", raw)))
    }
}

/// Grouping tag for modules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleCategory {
    Trading,
    Ai,
    Data,
    Automation,
    Analytics,
    Infrastructure,
    Security,
    Other,
}

impl Default for ModuleCategory {
    fn default() -> Self {
        Self::Other
    }
}

impl ModuleCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trading => "trading",
            Self::Ai => "ai",
            Self::Data => "data",
            Self::Automation => "automation",
            Self::Analytics => "analytics",
            Self::Infrastructure => "infrastructure",
            Self::Security => "security",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for ModuleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ModuleCategory {
    type Err = NexusError;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "trading" => Ok(Self::Trading),
            "ai" => Ok(Self::Ai),
            "data" => Ok(Self::Data),
            "automation" => Ok(Self::Automation),
            "analytics" => Ok(Self::Analytics),
            "infrastructure" | "infra" => Ok(Self::Infrastructure),
            "security" => Ok(Self::Security),
            "other" => Ok(Self::Other),
            other => Err(NexusError::InvalidDescriptor(format!(
                "unknown category '{}'",
                other
            ))),
        }
    }
}

/// How a module's liveness is checked
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ProbeTarget {
    /// HTTP GET; healthy on `expect_status` (or any 2xx when unset)
    Http {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expect_status: Option<u16>,
        /// POSTed to by the restart hook
        #[serde(default, skip_serializing_if = "Option::is_none")]
        restart_url: Option<String>,
    },
    /// TCP connect to `host:port`
    Tcp { address: String },
}

impl fmt::Display for ProbeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeTarget::Http { url, .. } => write!(f, "http {}", url),
            ProbeTarget::Tcp { address } => write!(f, "tcp {}", address),
        }
    }
}

fn default_version() -> String {
    "1.0.0".to_string()
}

/// Static metadata supplied when registering a module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleDescriptor {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub category: ModuleCategory,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub dependencies: BTreeSet<String>,
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    /// Passive module when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe: Option<ProbeTarget>,
}

impl ModuleDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>, category: ModuleCategory) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category,
            version: default_version(),
            dependencies: BTreeSet::new(),
            capabilities: BTreeSet::new(),
            probe: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_dependency(mut self, id: impl Into<String>) -> Self {
        self.dependencies.insert(id.into());
        self
    }

    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.insert(capability.into());
        self
    }

    pub fn with_probe(mut self, probe: ProbeTarget) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Reject descriptors that can never be registered
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(NexusError::InvalidDescriptor("module id must not be empty".into()));
        }
        if self.id.trim() != self.id {
            return Err(NexusError::InvalidDescriptor(format!(
                "module id '{}' has surrounding whitespace",
                self.id
            )));
        }
        if self.dependencies.contains(&self.id) {
            return Err(NexusError::DependencyCycle {
                path: vec![self.id.clone(), self.id.clone()],
            });
        }
        Ok(())
    }
}

/// Query filter for `Registry::list`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct ModuleFilter {
    pub category: Option<ModuleCategory>,
    pub status: Option<ModuleStatus>,
}

impl ModuleFilter {
    pub fn category(category: ModuleCategory) -> Self {
        Self {
            category: Some(category),
            status: None,
        }
    }

    pub fn status(status: ModuleStatus) -> Self {
        Self {
            category: None,
            status: Some(status),
        }
    }

    pub fn matches(&self, record: &ModuleRecord) -> bool {
        self.category.map_or(true, |c| c == record.category)
            && self.status.map_or(true, |s| s == record.status)
    }
}

/// Live state of a registered module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleRecord {
    pub id: String,
    pub name: String,
    pub category: ModuleCategory,
    pub version: String,
    pub dependencies: BTreeSet<String>,
    pub capabilities: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe: Option<ProbeTarget>,
    pub status: ModuleStatus,
    pub health_score: f64,
    pub last_checked: Option<DateTime<Utc>>,
    pub last_latency_ms: Option<u64>,
    /// Most recent last
    pub errors: Vec<String>,
}

impl ModuleRecord {
    pub(crate) fn from_descriptor(descriptor: ModuleDescriptor) -> Self {
        Self {
            id: descriptor.id,
            name: descriptor.name,
            category: descriptor.category,
            version: descriptor.version,
            dependencies: descriptor.dependencies,
            capabilities: descriptor.capabilities,
            probe: descriptor.probe,
            status: ModuleStatus::Active,
            health_score: 100.0,
            last_checked: None,
            last_latency_ms: None,
            errors: Vec::new(),
        }
    }

    /// Replace descriptor fields, keeping runtime health state
    pub(crate) fn apply_descriptor(&mut self, descriptor: ModuleDescriptor) {
        self.name = descriptor.name;
        self.category = descriptor.category;
        self.version = descriptor.version;
        self.dependencies = descriptor.dependencies;
        self.capabilities = descriptor.capabilities;
        self.probe = descriptor.probe;
    }

    /// Append to the bounded error log, dropping the oldest entries
    pub(crate) fn push_error(&mut self, message: &str, max_errors: usize) {
        let stamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        self.errors.push(format!("[{}] {}", stamp, message));
        if self.errors.len() > max_errors {
            let excess = self.errors.len() - max_errors;
            self.errors.drain(..excess);
        }
    }

    pub fn last_error(&self) -> Option<&str> {
        self.errors.last().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_str() {
        for status in ModuleStatus::ALL {
            assert_eq!(status.as_str().parse::<ModuleStatus>().unwrap(), status);
        }
        assert!("healthy".parse::<ModuleStatus>().is_err());
    }

    #[test]
    fn test_locked_and_maintenance_are_not_polled() {
        assert!(!ModuleStatus::Locked.is_pollable());
        assert!(!ModuleStatus::Maintenance.is_pollable());
        assert!(ModuleStatus::Failed.is_pollable());
        assert!(ModuleStatus::Standby.is_pollable());
    }

    #[test]
    fn test_descriptor_rejects_self_dependency() {
        let desc = ModuleDescriptor::new("a", "A", ModuleCategory::Data).with_dependency("a");
        assert!(matches!(desc.validate(), Err(NexusError::DependencyCycle { .. })));
    }

    #[test]
    fn test_descriptor_rejects_blank_id() {
        let desc = ModuleDescriptor::new("  ", "blank", ModuleCategory::Other);
        assert!(desc.validate().is_err());
    }

    #[test]
    fn test_error_log_is_bounded() {
        let mut record =
            ModuleRecord::from_descriptor(ModuleDescriptor::new("a", "A", ModuleCategory::Ai));
        for i in 0..5 {
            record.push_error(&format!("boom {}", i), 3);
        }
        assert_eq!(record.errors.len(), 3);
        assert!(record.errors[0].ends_with("boom 2"));
        assert!(record.last_error().unwrap().ends_with("boom 4"));
    }

    #[test]
    fn test_descriptor_deserializes_with_defaults() {
        let desc: ModuleDescriptor = serde_json::from_value(serde_json::json!({
            "id": "market-feed",
            "name": "Market Feed",
            "probe": { "kind": "tcp", "address": "127.0.0.1:9000" }
        }))
        .unwrap();
        assert_eq!(desc.category, ModuleCategory::Other);
        assert_eq!(desc.version, "1.0.0");
        assert_eq!(
            desc.probe,
            Some(ProbeTarget::Tcp {
                address: "127.0.0.1:9000".into()
            })
        );
    }

    #[test]
    fn test_filter_matches_category_and_status() {
        let record =
            ModuleRecord::from_descriptor(ModuleDescriptor::new("a", "A", ModuleCategory::Trading));
        assert!(ModuleFilter::default().matches(&record));
        assert!(ModuleFilter::category(ModuleCategory::Trading).matches(&record));
        assert!(!ModuleFilter::category(ModuleCategory::Ai).matches(&record));
        assert!(!ModuleFilter::status(ModuleStatus::Failed).matches(&record));
    }
}
