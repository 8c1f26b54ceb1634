//! Module commands: explicit operator control over a single module

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::{ModuleRecord, ModuleStatus};
use crate::error::NexusError;
use crate::health::Evaluation;

/// Commands accepted by `Poller::execute`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleCommand {
    /// Probe now and apply the result
    HealthCheck,
    /// Return the current record
    GetStatus,
    /// Maintenance, restart hook, verifying re-probe
    Restart,
    /// Stop polling the module
    Lock { reason: Option<String> },
    /// Return a locked module to standby
    Unlock,
}

impl ModuleCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HealthCheck => "health_check",
            Self::GetStatus => "get_status",
            Self::Restart => "restart",
            Self::Lock { .. } => "lock",
            Self::Unlock => "unlock",
        }
    }

    /// Build a command from its wire name and optional parameters
    ///
    /// `lock` reads an optional `reason` string from `params`.
    pub fn parse(command: &str, params: Option<&serde_json::Value>) -> Result<Self, NexusError> {
        let mut parsed: ModuleCommand = command.parse()?;
        if let ModuleCommand::Lock { reason } = &mut parsed {
            *reason = params
                .and_then(|p| p.get("reason"))
                .and_then(|r| r.as_str())
                .map(str::to_string);
        }
        Ok(parsed)
    }

    /// Whether the command changes module state
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Self::GetStatus)
    }
}

impl fmt::Display for ModuleCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ModuleCommand {
    type Err = NexusError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "health_check" | "healthcheck" => Ok(Self::HealthCheck),
            "get_status" | "status" => Ok(Self::GetStatus),
            "restart" => Ok(Self::Restart),
            "lock" => Ok(Self::Lock { reason: None }),
            "unlock" => Ok(Self::Unlock),
            _ => Err(NexusError::UnknownCommand(raw.to_string())),
        }
    }
}

/// Outcome of a module command
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    pub command: String,
    pub module_id: String,
    pub previous_status: ModuleStatus,
    pub record: ModuleRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<Evaluation>,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_known_commands() {
        assert_eq!(
            ModuleCommand::parse("health_check", None).unwrap(),
            ModuleCommand::HealthCheck
        );
        assert_eq!(
            ModuleCommand::parse("get-status", None).unwrap(),
            ModuleCommand::GetStatus
        );
        assert_eq!(
            ModuleCommand::parse(" RESTART ", None).unwrap(),
            ModuleCommand::Restart
        );
    }

    #[test]
    fn test_lock_reads_reason_param() {
        let params = json!({ "reason": "deploy window" });
        assert_eq!(
            ModuleCommand::parse("lock", Some(&params)).unwrap(),
            ModuleCommand::Lock {
                reason: Some("deploy window".into())
            }
        );
    }

    #[test]
    fn test_unknown_command_is_rejected() {
        let err = ModuleCommand::parse("self_destruct", None).unwrap_err();
        assert!(matches!(err, NexusError::UnknownCommand(c) if c == "self_destruct"));
    }

    #[test]
    fn test_only_get_status_is_read_only() {
        assert!(!ModuleCommand::GetStatus.is_mutating());
        assert!(ModuleCommand::HealthCheck.is_mutating());
        assert!(ModuleCommand::Unlock.is_mutating());
    }
}
