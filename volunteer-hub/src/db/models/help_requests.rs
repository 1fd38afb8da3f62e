use crate::api::models::{
    help_requests::{HelpRequestCreate, HelpRequestStatus, HelpRequestUpdate},
    shifts::Priority,
};
use crate::types::{HelpRequestId, UserId};
use chrono::{DateTime, Utc};
use sqlx::FromRow;

#[derive(Debug, Clone)]
pub struct HelpRequestCreateDBRequest {
    pub requester_id: Option<UserId>,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub category: String,
    pub description: String,
    pub urgency: Priority,
}

impl HelpRequestCreateDBRequest {
    pub fn new(api: HelpRequestCreate, requester_id: Option<UserId>) -> Self {
        Self {
            requester_id,
            name: api.name.trim().to_string(),
            email: api.email.trim().to_lowercase(),
            phone: api.phone,
            category: api.category.trim().to_lowercase(),
            description: api.description,
            urgency: api.urgency,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct HelpRequestUpdateDBRequest {
    pub status: Option<HelpRequestStatus>,
    pub urgency: Option<Priority>,
    pub assigned_to: Option<UserId>,
}

impl From<HelpRequestUpdate> for HelpRequestUpdateDBRequest {
    fn from(api: HelpRequestUpdate) -> Self {
        Self {
            status: api.status,
            urgency: api.urgency,
            assigned_to: api.assigned_to,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct HelpRequestDBResponse {
    pub id: HelpRequestId,
    pub requester_id: Option<UserId>,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub category: String,
    pub description: String,
    pub urgency: Priority,
    pub status: HelpRequestStatus,
    pub assigned_to: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
