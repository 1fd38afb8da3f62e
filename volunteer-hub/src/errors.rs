use crate::db::errors::DbError;
use crate::types::{Operation, Permission};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use thiserror::Error as ThisError;
use utoipa::ToSchema;

/// Machine-readable code attached to business-rule rejections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionCode {
    /// Shift starts too soon to be booked
    TooLate,
    /// Fixed shift already has a volunteer
    ShiftTaken,
    /// Overlaps another confirmed assignment of the same volunteer
    TimeConflict,
    /// Flexible shift has no free slots left
    CapacityFull,
    /// Flexible time selection is outside the window or inconsistent
    InvalidTimeRange,
    /// Volunteer lacks the role the shift requires
    RequirementsNotMet,
    /// Assignment is not in a state that can be cancelled
    NotCancellable,
    /// Entity is in a state that does not allow the requested transition
    InvalidState,
}

impl RejectionCode {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RejectionCode::TooLate | RejectionCode::RequirementsNotMet => StatusCode::FORBIDDEN,
            _ => StatusCode::CONFLICT,
        }
    }
}

impl fmt::Display for RejectionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            RejectionCode::TooLate => "TOO_LATE",
            RejectionCode::ShiftTaken => "SHIFT_TAKEN",
            RejectionCode::TimeConflict => "TIME_CONFLICT",
            RejectionCode::CapacityFull => "CAPACITY_FULL",
            RejectionCode::InvalidTimeRange => "INVALID_TIME_RANGE",
            RejectionCode::RequirementsNotMet => "REQUIREMENTS_NOT_MET",
            RejectionCode::NotCancellable => "NOT_CANCELLABLE",
            RejectionCode::InvalidState => "INVALID_STATE",
        };
        f.write_str(code)
    }
}

/// JSON body returned for business-rule rejections.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RejectionBody {
    pub reason: String,
    pub code: RejectionCode,
}

#[derive(ThisError, Debug)]
pub enum Error {
    /// Authentication required but not provided
    #[error("Not authenticated")]
    Unauthenticated { message: Option<String> },

    /// User lacks required permissions for the operation
    #[error("Insufficient permissions to {action:?} {resource}")]
    InsufficientPermissions {
        required: Permission,
        action: Operation,
        resource: String,
    },

    /// Invalid request data
    #[error("{message}")]
    BadRequest { message: String },

    /// Requested resource not found
    #[error("{resource} with ID {id} not found")]
    NotFound { resource: String, id: String },

    /// Business rule rejected the request
    #[error("{code}: {reason}")]
    Rejected { code: RejectionCode, reason: String },

    /// Client exceeded its request budget
    #[error("{message}")]
    TooManyRequests { message: String },

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Database operation error
    #[error(transparent)]
    Database(#[from] DbError),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),

    /// Conflict error, e.g., for unique constraint violations
    #[error("Conflict: {message}")]
    Conflict { message: String },
}

impl Error {
    pub fn rejected(code: RejectionCode, reason: impl Into<String>) -> Self {
        Error::Rejected {
            code,
            reason: reason.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Unauthenticated { .. } => StatusCode::UNAUTHORIZED,
            Error::InsufficientPermissions { .. } => StatusCode::FORBIDDEN,
            Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Rejected { code, .. } => code.status_code(),
            Error::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            Error::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Database(db_err) => match db_err {
                DbError::NotFound => StatusCode::NOT_FOUND,
                DbError::UniqueViolation { .. } => StatusCode::CONFLICT,
                DbError::ForeignKeyViolation { .. } => StatusCode::BAD_REQUEST,
                DbError::CheckViolation { .. } => StatusCode::BAD_REQUEST,
                DbError::ProtectedEntity { .. } => StatusCode::FORBIDDEN,
                DbError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Conflict { .. } => StatusCode::CONFLICT,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::Unauthenticated { message } => message.clone().unwrap_or_else(|| "Authentication required".to_string()),
            Error::InsufficientPermissions { action, resource, .. } => {
                format!("Insufficient permissions to {action} {resource}")
            }
            Error::BadRequest { message } => message.clone(),
            Error::NotFound { resource, id } => {
                format!("{resource} with ID {id} not found")
            }
            Error::Rejected { reason, .. } => reason.clone(),
            Error::TooManyRequests { message } => message.clone(),
            Error::Internal { .. } => "Internal server error".to_string(),
            Error::Database(db_err) => match db_err {
                DbError::NotFound => "Resource not found".to_string(),
                DbError::UniqueViolation { constraint, table, .. } => unique_violation_message(table.as_deref(), constraint.as_deref()).0,
                DbError::ForeignKeyViolation { .. } => "Invalid reference to related resource".to_string(),
                DbError::CheckViolation { .. } => "Invalid data provided".to_string(),
                DbError::ProtectedEntity {
                    operation,
                    entity_type,
                    reason,
                    ..
                } => {
                    format!("Cannot {operation} {entity_type}: {reason}")
                }
                DbError::Other(_) => "Database error occurred".to_string(),
            },
            Error::Other(_) => "Internal server error".to_string(),
            Error::Conflict { message } => message.clone(),
        }
    }
}

fn unique_violation_message(table: Option<&str>, constraint: Option<&str>) -> (String, &'static str) {
    match (table, constraint) {
        (Some("users"), Some(c)) if c.contains("email") => ("An account with this email address already exists".to_string(), "user"),
        (Some("users"), Some(c)) if c.contains("username") => ("This username is already taken".to_string(), "user"),
        (Some("volunteer_applications"), Some(c)) if c.contains("email") => (
            "An application for this email address is already pending".to_string(),
            "volunteer_application",
        ),
        (Some("volunteer_profiles"), _) => ("This volunteer already has a profile".to_string(), "volunteer_profile"),
        _ => ("Resource already exists".to_string(), "unknown"),
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match &self {
            Error::Database(DbError::Other(_)) | Error::Internal { .. } | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::Database(_) => {
                tracing::warn!("Database constraint error: {}", self);
            }
            Error::Unauthenticated { .. } | Error::InsufficientPermissions { .. } => {
                tracing::info!("Authorization error: {}", self);
            }
            Error::Rejected { .. } | Error::TooManyRequests { .. } => {
                tracing::info!("Request rejected: {}", self);
            }
            Error::BadRequest { .. } | Error::NotFound { .. } => {
                tracing::debug!("Client error: {}", self);
            }
            Error::Conflict { .. } => {
                tracing::warn!("Conflict error: {}", self);
            }
        }

        let status = self.status_code();

        match &self {
            Error::Rejected { code, reason } => {
                let body = RejectionBody {
                    reason: reason.clone(),
                    code: *code,
                };
                (status, axum::response::Json(body)).into_response()
            }
            Error::Conflict { message } => (status, axum::response::Json(json!({ "message": message }))).into_response(),
            Error::Database(DbError::UniqueViolation { constraint, table, .. }) => {
                let (message, resource) = unique_violation_message(table.as_deref(), constraint.as_deref());
                let body = json!({
                    "message": message,
                    "resource": resource
                });
                (status, axum::response::Json(body)).into_response()
            }
            _ => (status, self.user_message()).into_response(),
        }
    }
}

/// Convert from String errors (e.g., from external functions)
impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Internal { operation: msg }
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn rejection_codes_map_to_business_statuses() {
        assert_eq!(RejectionCode::TooLate.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(RejectionCode::ShiftTaken.status_code(), StatusCode::CONFLICT);
        assert_eq!(RejectionCode::CapacityFull.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            serde_json::to_value(RejectionCode::InvalidTimeRange).unwrap(),
            serde_json::json!("INVALID_TIME_RANGE")
        );
    }

    #[tokio::test]
    async fn rejected_renders_reason_and_code() {
        let response = Error::rejected(RejectionCode::TimeConflict, "overlaps another shift").into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["code"], "TIME_CONFLICT");
        assert_eq!(json["reason"], "overlaps another shift");
    }

    #[test]
    fn internal_errors_hide_details() {
        let err = Error::Internal {
            operation: "talk to smtp relay at 10.0.0.3".to_string(),
        };
        assert_eq!(err.user_message(), "Internal server error");
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
