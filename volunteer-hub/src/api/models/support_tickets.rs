use super::{pagination::Pagination, shifts::Priority};
use crate::db::models::support_tickets::TicketDBResponse;
use crate::types::{TicketId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "ticket_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Open,
    InProgress,
    Resolved,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TicketCreate {
    /// Required when the caller is not signed in
    pub email: Option<String>,
    pub subject: String,
    pub message: String,
    pub category: Option<String>,
    #[serde(default)]
    pub priority: Priority,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct TicketUpdate {
    pub status: Option<TicketStatus>,
    pub priority: Option<Priority>,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub assigned_to: Option<UserId>,
    pub resolution: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TicketResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: TicketId,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub user_id: Option<UserId>,
    pub email: String,
    pub subject: String,
    pub message: String,
    pub category: Option<String>,
    pub priority: Priority,
    pub status: TicketStatus,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub assigned_to: Option<UserId>,
    pub resolution: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<TicketDBResponse> for TicketResponse {
    fn from(db: TicketDBResponse) -> Self {
        Self {
            id: db.id,
            user_id: db.user_id,
            email: db.email,
            subject: db.subject,
            message: db.message,
            category: db.category,
            priority: db.priority,
            status: db.status,
            assigned_to: db.assigned_to,
            resolution: db.resolution,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct ListTicketsQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,

    pub status: Option<TicketStatus>,
}
