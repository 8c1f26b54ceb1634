pub mod api;
pub mod bootstrap;
pub mod cli;
pub mod config;
pub mod coordination;
pub mod domain;
pub mod error;
pub mod health;
pub mod persistence;
pub mod registry;
pub mod supervisor;

pub use bootstrap::Nexus;
pub use config::AppConfig;
pub use coordination::{ShutdownController, ShutdownSignal};
pub use domain::{
    ModuleCategory, ModuleDescriptor, ModuleFilter, ModuleRecord, ModuleStatus, ProbeTarget,
    RollbackMeta, RollbackPoint,
};
pub use error::{NexusError, Result};
pub use health::{Evaluation, HealthEvaluator, NetworkProber, ProbeReport, Prober};
pub use persistence::{RollbackConfig, RollbackStore};
pub use registry::{fingerprint, Fingerprint, HealthSummary, Registry, RegistryConfig};
pub use supervisor::{ModuleCommand, Poller, PollerConfig, RepairPolicy, TickReport};
