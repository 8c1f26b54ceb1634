use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::coordination::ShutdownConfig;
use crate::domain::ModuleDescriptor;
use crate::error::{NexusError, Result};
use crate::health::EvaluatorConfig;
use crate::persistence::RollbackConfig;
use crate::registry::RegistryConfig;
use crate::supervisor::{PollerConfig, RepairPolicy};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub poller: PollerSettings,
    #[serde(default)]
    pub repair: RepairSettings,
    #[serde(default)]
    pub rollback: RollbackSettings,
    #[serde(default)]
    pub registry: RegistrySettings,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub shutdown: ShutdownSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Modules registered at startup
    #[serde(default)]
    pub modules: Vec<ModuleDescriptor>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollerSettings {
    /// Interval between ticks in milliseconds
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Per-module probe timeout in milliseconds
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    /// Maximum probes in flight
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Scores below this are reported degraded
    #[serde(default = "default_degraded_threshold")]
    pub degraded_threshold: f64,
}

fn default_interval_ms() -> u64 {
    10_000
}

fn default_probe_timeout_ms() -> u64 {
    2_000
}

fn default_max_concurrency() -> usize {
    8
}

fn default_degraded_threshold() -> f64 {
    50.0
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
            max_concurrency: default_max_concurrency(),
            degraded_threshold: default_degraded_threshold(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepairSettings {
    /// Attempts per failure (0 disables repair)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_repair_delay_ms")]
    pub delay_ms: u64,
    #[serde(default = "default_backoff")]
    pub backoff: f64,
}

fn default_max_attempts() -> u32 {
    1
}

fn default_repair_delay_ms() -> u64 {
    1_000
}

fn default_backoff() -> f64 {
    2.0
}

impl Default for RepairSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_repair_delay_ms(),
            backoff: default_backoff(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RollbackSettings {
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// JSON file the rollback ring is mirrored to
    #[serde(default)]
    pub persist_path: Option<PathBuf>,
}

fn default_capacity() -> usize {
    10
}

impl Default for RollbackSettings {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            persist_path: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistrySettings {
    /// Error log entries kept per module
    #[serde(default = "default_max_errors")]
    pub max_errors: usize,
}

fn default_max_errors() -> usize {
    20
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            max_errors: default_max_errors(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ApiConfig {
    /// Bearer token for mutating endpoints; unset leaves them open
    #[serde(default)]
    pub admin_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShutdownSettings {
    #[serde(default = "default_shutdown_timeout")]
    pub timeout_secs: u64,
}

fn default_shutdown_timeout() -> u64 {
    30
}

impl Default for ShutdownSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_shutdown_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            poller: PollerSettings::default(),
            repair: RepairSettings::default(),
            rollback: RollbackSettings::default(),
            registry: RegistrySettings::default(),
            api: ApiConfig::default(),
            shutdown: ShutdownSettings::default(),
            logging: LoggingConfig::default(),
            modules: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Load and validate configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config: Self = Self::builder(config_dir.as_ref())?.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn builder(
        config_dir: &Path,
    ) -> std::result::Result<config::builder::ConfigBuilder<config::builder::DefaultState>, ConfigError>
    {
        Ok(Config::builder()
            // Start with default values
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("server.port", 8080)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("NEXUS_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (NEXUS_POLLER__INTERVAL_MS, etc.)
            .add_source(
                Environment::with_prefix("NEXUS")
                    .separator("__")
                    .try_parsing(true),
            ))
    }

    /// Reject values the runtime cannot work with
    pub fn validate(&self) -> Result<()> {
        let zero = |field: &str| Err(NexusError::InvalidConfig(format!("{} must be > 0", field)));
        if self.poller.interval_ms == 0 {
            return zero("poller.interval_ms");
        }
        if self.poller.probe_timeout_ms == 0 {
            return zero("poller.probe_timeout_ms");
        }
        if self.poller.max_concurrency == 0 {
            return zero("poller.max_concurrency");
        }
        if self.rollback.capacity == 0 {
            return zero("rollback.capacity");
        }
        if self.shutdown.timeout_secs == 0 {
            return zero("shutdown.timeout_secs");
        }
        if !(0.0..=100.0).contains(&self.poller.degraded_threshold) {
            return Err(NexusError::InvalidConfig(format!(
                "poller.degraded_threshold must be within 0..=100, got {}",
                self.poller.degraded_threshold
            )));
        }
        if self.repair.backoff < 1.0 {
            return Err(NexusError::InvalidConfig(format!(
                "repair.backoff must be >= 1.0, got {}",
                self.repair.backoff
            )));
        }

        let mut seen = HashSet::new();
        for module in &self.modules {
            module.validate()?;
            if !seen.insert(module.id.as_str()) {
                return Err(NexusError::DuplicateRegistration(module.id.clone()));
            }
        }
        Ok(())
    }

    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            max_errors: self.registry.max_errors,
        }
    }

    pub fn evaluator_config(&self) -> EvaluatorConfig {
        EvaluatorConfig {
            probe_timeout: Duration::from_millis(self.poller.probe_timeout_ms),
            degraded_threshold: self.poller.degraded_threshold,
        }
    }

    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            interval: Duration::from_millis(self.poller.interval_ms),
            max_concurrency: self.poller.max_concurrency,
        }
    }

    pub fn repair_policy(&self) -> RepairPolicy {
        RepairPolicy {
            max_attempts: self.repair.max_attempts,
            delay: Duration::from_millis(self.repair.delay_ms),
            backoff: self.repair.backoff,
        }
    }

    pub fn rollback_config(&self) -> RollbackConfig {
        RollbackConfig {
            capacity: self.rollback.capacity,
            persist_path: self.rollback.persist_path.clone(),
        }
    }

    pub fn shutdown_config(&self) -> ShutdownConfig {
        ShutdownConfig {
            drain_timeout: Duration::from_secs(self.shutdown.timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ModuleCategory;

    fn write(dir: &Path, name: &str, body: &str) {
        std::fs::write(dir.join(name), body).unwrap();
    }

    #[test]
    fn test_defaults_without_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_from(dir.path()).unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.poller.max_concurrency, 8);
        assert_eq!(config.rollback.capacity, 10);
        assert_eq!(config.logging.level, "info");
        assert!(config.modules.is_empty());
    }

    #[test]
    fn test_file_values_and_modules() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "default.toml",
            r#"
[poller]
interval_ms = 250
degraded_threshold = 70.0

[rollback]
capacity = 3

[[modules]]
id = "market-data"
name = "Market Data"
category = "data"

[[modules]]
id = "signal-engine"
name = "Signal Engine"
category = "ai"
dependencies = ["market-data"]

[modules.probe]
kind = "http"
url = "http://127.0.0.1:9000/health"
"#,
        );

        let config = AppConfig::load_from(dir.path()).unwrap();
        assert_eq!(config.poller.interval_ms, 250);
        assert_eq!(config.poller.degraded_threshold, 70.0);
        assert_eq!(config.rollback.capacity, 3);
        assert_eq!(config.poller_config().interval, Duration::from_millis(250));

        assert_eq!(config.modules.len(), 2);
        assert_eq!(config.modules[1].category, ModuleCategory::Ai);
        assert!(config.modules[1].dependencies.contains("market-data"));
        assert!(config.modules[1].probe.is_some());
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "default.toml", "[rollback]\ncapacity = 0\n");

        let err = AppConfig::load_from(dir.path()).unwrap_err();
        assert!(matches!(err, NexusError::InvalidConfig(msg) if msg.contains("rollback.capacity")));
    }

    #[test]
    fn test_duplicate_module_ids_are_rejected() {
        let mut config = AppConfig::default();
        config.modules = vec![
            ModuleDescriptor::new("a", "A", ModuleCategory::Data),
            ModuleDescriptor::new("a", "A again", ModuleCategory::Ai),
        ];
        assert!(matches!(
            config.validate(),
            Err(NexusError::DuplicateRegistration(id)) if id == "a"
        ));
    }
}
