//! Persistence Layer
//!
//! Bounded rollback history for the registry, optionally mirrored to disk.

pub mod rollback;

pub use rollback::{RollbackConfig, RollbackStore};
