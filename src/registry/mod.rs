//! Module registry and drift fingerprints

pub mod fingerprint;
pub mod store;

pub use fingerprint::{fingerprint, registry_fingerprint, Fingerprint};
pub use store::{HealthSummary, OverallHealth, Registry, RegistryConfig};
