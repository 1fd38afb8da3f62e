use crate::api::models::{
    shifts::Priority,
    support_tickets::{TicketStatus, TicketUpdate},
};
use crate::types::{TicketId, UserId};
use chrono::{DateTime, Utc};
use sqlx::FromRow;

#[derive(Debug, Clone)]
pub struct TicketCreateDBRequest {
    pub user_id: Option<UserId>,
    pub email: String,
    pub subject: String,
    pub message: String,
    pub category: Option<String>,
    pub priority: Priority,
}

#[derive(Debug, Clone, Default)]
pub struct TicketUpdateDBRequest {
    pub status: Option<TicketStatus>,
    pub priority: Option<Priority>,
    pub assigned_to: Option<UserId>,
    pub resolution: Option<String>,
}

impl From<TicketUpdate> for TicketUpdateDBRequest {
    fn from(api: TicketUpdate) -> Self {
        Self {
            status: api.status,
            priority: api.priority,
            assigned_to: api.assigned_to,
            resolution: api.resolution,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct TicketDBResponse {
    pub id: TicketId,
    pub user_id: Option<UserId>,
    pub email: String,
    pub subject: String,
    pub message: String,
    pub category: Option<String>,
    pub priority: Priority,
    pub status: TicketStatus,
    pub assigned_to: Option<UserId>,
    pub resolution: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
