//! Coordination Layer
//!
//! Shutdown sequencing for the registry host process.

pub mod shutdown;

pub use shutdown::{
    ShutdownConfig, ShutdownController, ShutdownPhase, ShutdownReport, ShutdownSignal,
};
