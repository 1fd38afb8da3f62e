use super::{pagination::Pagination, shifts::Priority};
use crate::db::models::help_requests::HelpRequestDBResponse;
use crate::types::{HelpRequestId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "help_request_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum HelpRequestStatus {
    Open,
    InProgress,
    Resolved,
    Closed,
}

/// A request for help from a member of the public.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HelpRequestCreate {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    /// e.g. "food", "transport", "companionship"
    pub category: String,
    pub description: String,
    #[serde(default)]
    pub urgency: Priority,
}

impl HelpRequestCreate {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Name is required".to_string());
        }
        if !self.email.contains('@') {
            return Err("A valid email address is required".to_string());
        }
        if self.category.trim().is_empty() || self.description.trim().is_empty() {
            return Err("Category and description are required".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct HelpRequestUpdate {
    pub status: Option<HelpRequestStatus>,
    pub urgency: Option<Priority>,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub assigned_to: Option<UserId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HelpRequestResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: HelpRequestId,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub requester_id: Option<UserId>,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub category: String,
    pub description: String,
    pub urgency: Priority,
    pub status: HelpRequestStatus,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub assigned_to: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<HelpRequestDBResponse> for HelpRequestResponse {
    fn from(db: HelpRequestDBResponse) -> Self {
        Self {
            id: db.id,
            requester_id: db.requester_id,
            name: db.name,
            email: db.email,
            phone: db.phone,
            category: db.category,
            description: db.description,
            urgency: db.urgency,
            status: db.status,
            assigned_to: db.assigned_to,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct ListHelpRequestsQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,

    pub status: Option<HelpRequestStatus>,
}
