//! Supervisor Layer for Module Monitoring and Recovery
//!
//! - Poller for periodic health evaluation and drift snapshots
//! - Repair policy for freshly failed modules
//! - Operator commands against single modules

pub mod command;
pub mod poller;
pub mod repair;

pub use command::{CommandResult, ModuleCommand};
pub use poller::{ModuleOutcome, Poller, PollerConfig, PollerState, TickReport};
pub use repair::{attempt_repair, RepairOutcome, RepairPolicy};
