//! API request/response models for volunteer applications and bulk administration.

use super::pagination::Pagination;
use crate::db::models::applications::ApplicationDBResponse;
use crate::types::{ApplicationId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "application_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Pending,
    Approved,
    Rejected,
    Archived,
}

/// Public volunteer application form.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApplicationCreate {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub interests: Vec<String>,
    pub availability: Option<String>,
    pub motivation: Option<String>,
}

impl ApplicationCreate {
    pub fn validate(&self) -> Result<(), String> {
        if self.first_name.trim().is_empty() || self.last_name.trim().is_empty() {
            return Err("First and last name are required".to_string());
        }
        let email = self.email.trim();
        match email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
            _ => Err("A valid email address is required".to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApplicationResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: ApplicationId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub skills: Vec<String>,
    pub interests: Vec<String>,
    pub availability: Option<String>,
    pub motivation: Option<String>,
    pub status: ApplicationStatus,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub reviewed_by: Option<UserId>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub review_notes: Option<String>,
    /// Account created (or linked) when the application was approved
    #[schema(value_type = Option<String>, format = "uuid")]
    pub user_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ApplicationDBResponse> for ApplicationResponse {
    fn from(db: ApplicationDBResponse) -> Self {
        Self {
            id: db.id,
            first_name: db.first_name,
            last_name: db.last_name,
            email: db.email,
            phone: db.phone,
            skills: db.skills,
            interests: db.interests,
            availability: db.availability,
            motivation: db.motivation,
            status: db.status,
            reviewed_by: db.reviewed_by,
            reviewed_at: db.reviewed_at,
            review_notes: db.review_notes,
            user_id: db.user_id,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct ListApplicationsQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,

    pub status: Option<ApplicationStatus>,
}

/// Optional reviewer note attached to approve/reject.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ReviewRequest {
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApprovalResponse {
    pub application: ApplicationResponse,
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
    /// False when an existing account with the same email was reused
    pub account_created: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BulkAction {
    Approve,
    Reject,
    Archive,
    Delete,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BulkActionRequest {
    pub action: BulkAction,
    #[schema(value_type = Vec<String>)]
    pub ids: Vec<ApplicationId>,
    /// Stored as the review note for approve/reject
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BulkFailure {
    #[schema(value_type = String, format = "uuid")]
    pub id: ApplicationId,
    pub error: String,
}

/// Per-item outcome of a bulk action. Items are processed independently.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct BulkActionResponse {
    pub successful: usize,
    pub failed: Vec<BulkFailure>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(email: &str) -> ApplicationCreate {
        ApplicationCreate {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: email.to_string(),
            phone: None,
            skills: vec![],
            interests: vec![],
            availability: None,
            motivation: None,
        }
    }

    #[test]
    fn test_application_validation() {
        assert!(form("ada@example.org").validate().is_ok());
        assert!(form("ada").validate().is_err());
        assert!(form("@example.org").validate().is_err());
        assert!(form("ada@localhost").validate().is_err());
    }

    #[test]
    fn test_bulk_request_parses_snake_case_action() {
        let request: BulkActionRequest = serde_json::from_value(serde_json::json!({
            "action": "archive",
            "ids": ["00000000-0000-0000-0000-000000000001"]
        }))
        .unwrap();
        assert_eq!(request.action, BulkAction::Archive);
        assert!(request.reason.is_none());
    }
}
