use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ModuleCategory, ModuleFilter, ModuleStatus, RollbackPoint};
use crate::error::NexusError;
use crate::supervisor::PollerState;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

/// Handler error rendered as `{"error": kind, "message": text}`
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, kind: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                error: kind.to_string(),
                message: message.into(),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }
}

impl From<NexusError> for ApiError {
    fn from(err: NexusError) -> Self {
        let status = match &err {
            e if e.is_not_found() => StatusCode::NOT_FOUND,
            NexusError::UnknownCommand(_)
            | NexusError::ModuleLocked(_)
            | NexusError::InvalidDescriptor(_)
            | NexusError::DependencyCycle { .. }
            | NexusError::DuplicateRegistration(_) => StatusCode::BAD_REQUEST,
            NexusError::ProbeTimeout { .. } | NexusError::Probe { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!("API error: {}", err);
        }
        Self::new(status, err.kind(), err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

// ============================================================================
// Module Types
// ============================================================================

/// Query string for `GET /modules`
#[derive(Debug, Default, Deserialize)]
pub struct ModuleQuery {
    pub category: Option<String>,
    pub status: Option<String>,
}

impl ModuleQuery {
    pub fn into_filter(self) -> Result<Option<ModuleFilter>, ApiError> {
        let category = self
            .category
            .filter(|c| !c.trim().is_empty())
            .map(|c| c.parse::<ModuleCategory>())
            .transpose()
            .map_err(|e| ApiError::bad_request(e.to_string()))?;
        let status = self
            .status
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.parse::<ModuleStatus>())
            .transpose()
            .map_err(|e| ApiError::bad_request(e.to_string()))?;

        if category.is_none() && status.is_none() {
            return Ok(None);
        }
        Ok(Some(ModuleFilter { category, status }))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRequest {
    pub command: String,
    #[serde(default)]
    pub params: Option<serde_json::Value>,
}

// ============================================================================
// Rollback Types
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RollbackRequest {
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackCreated {
    pub id: String,
    pub sequence: u64,
    pub label: String,
    pub timestamp: DateTime<Utc>,
}

impl From<&RollbackPoint> for RollbackCreated {
    fn from(point: &RollbackPoint) -> Self {
        Self {
            id: point.id.clone(),
            sequence: point.sequence,
            label: point.label.clone(),
            timestamp: point.timestamp,
        }
    }
}

// ============================================================================
// System Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LivenessResponse {
    pub status: String,
    pub uptime_secs: i64,
    pub poller: PollerState,
    pub ticks: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_maps_to_404() {
        let err = ApiError::from(NexusError::UnknownModule("ghost".into()));
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert_eq!(err.body.error, "unknown_module");
    }

    #[test]
    fn test_unknown_command_maps_to_400() {
        let err = ApiError::from(NexusError::UnknownCommand("explode".into()));
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_empty_query_has_no_filter() {
        let query = ModuleQuery {
            category: Some(String::new()),
            status: None,
        };
        assert!(query.into_filter().unwrap().is_none());
    }

    #[test]
    fn test_bad_status_query_is_rejected() {
        let query = ModuleQuery {
            category: None,
            status: Some("sleepy".into()),
        };
        assert_eq!(query.into_filter().unwrap_err().status, StatusCode::BAD_REQUEST);
    }
}
