//! Drift fingerprints
//!
//! A fingerprint covers only the status-independent fields of a module
//! (identity, version, capability/dependency sets, probe target), so routine
//! health polling never changes it. Fields are length-prefixed before hashing
//! so that `("ab", "c")` and `("a", "bc")` cannot collide.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::{ModuleRecord, ProbeTarget};

/// Bumped whenever the canonical encoding changes
const FINGERPRINT_VERSION: &str = "NEXUS_FP_V1";

/// Truncated digest length in bytes (32 hex chars)
const FINGERPRINT_BYTES: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fingerprint {
    pub module_id: String,
    pub hash: String,
}

struct CanonicalHasher(Sha256);

impl CanonicalHasher {
    fn new() -> Self {
        let mut hasher = Self(Sha256::new());
        hasher.field(FINGERPRINT_VERSION);
        hasher
    }

    fn field(&mut self, value: &str) {
        self.0.update((value.len() as u64).to_le_bytes());
        self.0.update(value.as_bytes());
    }

    fn set<'a>(&mut self, values: impl ExactSizeIterator<Item = &'a String>) {
        self.0.update((values.len() as u64).to_le_bytes());
        for value in values {
            self.field(value);
        }
    }

    fn finish(self) -> String {
        let digest = self.0.finalize();
        hex::encode(&digest[..FINGERPRINT_BYTES])
    }
}

/// Fingerprint a module's status-independent fields
pub fn fingerprint(record: &ModuleRecord) -> Fingerprint {
    let mut hasher = CanonicalHasher::new();
    hasher.field(&record.id);
    hasher.field(&record.name);
    hasher.field(record.category.as_str());
    hasher.field(&record.version);
    // BTreeSet iteration is already sorted
    hasher.set(record.capabilities.iter());
    hasher.set(record.dependencies.iter());
    match &record.probe {
        None => hasher.field("probe:none"),
        Some(ProbeTarget::Http {
            url,
            expect_status,
            restart_url,
        }) => {
            hasher.field("probe:http");
            hasher.field(url);
            hasher.field(&expect_status.map(|s| s.to_string()).unwrap_or_default());
            hasher.field(restart_url.as_deref().unwrap_or_default());
        }
        Some(ProbeTarget::Tcp { address }) => {
            hasher.field("probe:tcp");
            hasher.field(address);
        }
    }

    Fingerprint {
        module_id: record.id.clone(),
        hash: hasher.finish(),
    }
}

/// Combined fingerprint over `(module_id, hash)` pairs
///
/// Input order does not matter; pairs are sorted by module id first.
pub fn registry_fingerprint<'a>(fingerprints: impl IntoIterator<Item = &'a Fingerprint>) -> String {
    let mut pairs: Vec<&Fingerprint> = fingerprints.into_iter().collect();
    pairs.sort_by(|a, b| a.module_id.cmp(&b.module_id));

    let mut hasher = CanonicalHasher::new();
    hasher.field("registry");
    for fp in pairs {
        hasher.field(&fp.module_id);
        hasher.field(&fp.hash);
    }
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ModuleCategory, ModuleDescriptor, ModuleStatus};
    use chrono::Utc;

    fn record() -> ModuleRecord {
        ModuleRecord::from_descriptor(
            ModuleDescriptor::new("quant-engine", "Quant Engine", ModuleCategory::Trading)
                .with_capability("signals")
                .with_capability("backtest")
                .with_dependency("market-feed"),
        )
    }

    #[test]
    fn test_fingerprint_is_truncated_hex() {
        let fp = fingerprint(&record());
        assert_eq!(fp.module_id, "quant-engine");
        assert_eq!(fp.hash.len(), FINGERPRINT_BYTES * 2);
        assert!(fp.hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_health_fields_do_not_affect_fingerprint() {
        let base = record();
        let mut polled = base.clone();
        polled.status = ModuleStatus::Failed;
        polled.health_score = 12.5;
        polled.last_checked = Some(Utc::now());
        polled.last_latency_ms = Some(340);
        polled.errors.push("probe refused".into());

        assert_eq!(fingerprint(&base), fingerprint(&polled));
    }

    #[test]
    fn test_capability_change_changes_fingerprint() {
        let base = record();
        let mut changed = base.clone();
        changed.capabilities.insert("execution".into());
        assert_ne!(fingerprint(&base).hash, fingerprint(&changed).hash);

        let mut bumped = base.clone();
        bumped.version = "1.1.0".into();
        assert_ne!(fingerprint(&base).hash, fingerprint(&bumped).hash);
    }

    #[test]
    fn test_field_boundaries_are_unambiguous() {
        let mut a = record();
        a.name = "ab".into();
        a.version = "c".into();
        let mut b = record();
        b.name = "a".into();
        b.version = "bc".into();
        assert_ne!(fingerprint(&a).hash, fingerprint(&b).hash);
    }

    #[test]
    fn test_registry_fingerprint_ignores_input_order() {
        let a = fingerprint(&record());
        let mut other = record();
        other.id = "market-feed".into();
        let b = fingerprint(&other);

        assert_eq!(
            registry_fingerprint([&a, &b]),
            registry_fingerprint([&b, &a])
        );
        assert_ne!(registry_fingerprint([&a]), registry_fingerprint([&a, &b]));
    }
}
