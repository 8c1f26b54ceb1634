use thiserror::Error;

/// Main error type for the module registry
#[derive(Error, Debug)]
pub enum NexusError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Probe errors (caught at the poller boundary, never surfaced by get/list)
    #[error("Probe timed out for module {module_id} after {timeout_ms}ms")]
    ProbeTimeout { module_id: String, timeout_ms: u64 },

    #[error("Probe failed for module {module_id}: {reason}")]
    Probe { module_id: String, reason: String },

    // Lookup errors
    #[error("Unknown module: {0}")]
    UnknownModule(String),

    #[error("Unknown rollback point: {0}")]
    UnknownRollbackPoint(String),

    // Registration errors
    #[error("Duplicate registration: {0}")]
    DuplicateRegistration(String),

    #[error("Dependency cycle: {}", path.join(" -> "))]
    DependencyCycle { path: Vec<String> },

    #[error("Invalid module descriptor: {0}")]
    InvalidDescriptor(String),

    // Command errors
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Module {0} is locked; unlock it first")]
    ModuleLocked(String),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl NexusError {
    /// Short machine-readable kind, used in API error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            NexusError::Config(_) | NexusError::InvalidConfig(_) => "config",
            NexusError::ProbeTimeout { .. } => "probe_timeout",
            NexusError::Probe { .. } => "probe_error",
            NexusError::UnknownModule(_) => "unknown_module",
            NexusError::UnknownRollbackPoint(_) => "unknown_rollback_point",
            NexusError::DuplicateRegistration(_) => "duplicate_registration",
            NexusError::DependencyCycle { .. } => "dependency_cycle",
            NexusError::InvalidDescriptor(_) => "invalid_descriptor",
            NexusError::UnknownCommand(_) => "unknown_command",
            NexusError::ModuleLocked(_) => "module_locked",
            NexusError::Http(_) => "http",
            NexusError::Json(_) => "json",
            NexusError::Io(_) => "io",
        }
    }

    /// True for lookups that referenced an id that does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            NexusError::UnknownModule(_) | NexusError::UnknownRollbackPoint(_)
        )
    }
}

/// Result type alias for NexusError
pub type Result<T> = std::result::Result<T, NexusError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_lists_path() {
        let err = NexusError::DependencyCycle {
            path: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "Dependency cycle: a -> b -> a");
        assert_eq!(err.kind(), "dependency_cycle");
    }

    #[test]
    fn test_not_found_classification() {
        assert!(NexusError::UnknownModule("x".into()).is_not_found());
        assert!(NexusError::UnknownRollbackPoint("x".into()).is_not_found());
        assert!(!NexusError::UnknownCommand("x".into()).is_not_found());
    }
}
