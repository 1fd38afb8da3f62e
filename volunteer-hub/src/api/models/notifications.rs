//! API models for in-app notifications and the email outbox.

use super::pagination::Pagination;
use crate::db::models::notifications::{NotificationDBResponse, OutboxDBResponse};
use crate::types::{NotificationId, OutboxId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NotificationResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: NotificationId,
    /// Machine-readable kind, e.g. "shift_booked"
    pub kind: String,
    pub title: String,
    pub body: String,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<NotificationDBResponse> for NotificationResponse {
    fn from(db: NotificationDBResponse) -> Self {
        Self {
            id: db.id,
            kind: db.kind,
            title: db.title,
            body: db.body,
            read_at: db.read_at,
            created_at: db.created_at,
        }
    }
}

#[serde_as]
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct ListNotificationsQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,

    #[serde_as(as = "DisplayFromStr")]
    #[serde(default)]
    pub unread_only: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MarkedRead {
    pub updated: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "outbox_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
    Pending,
    Sent,
    Dead,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OutboxEntryResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: OutboxId,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub user_id: Option<UserId>,
    pub recipient_email: String,
    pub kind: String,
    pub subject: String,
    pub status: OutboxStatus,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub next_attempt_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<OutboxDBResponse> for OutboxEntryResponse {
    fn from(db: OutboxDBResponse) -> Self {
        Self {
            id: db.id,
            user_id: db.user_id,
            recipient_email: db.recipient_email,
            kind: db.kind,
            subject: db.subject,
            status: db.status,
            attempts: db.attempts,
            last_error: db.last_error,
            next_attempt_at: db.next_attempt_at,
            sent_at: db.sent_at,
            created_at: db.created_at,
        }
    }
}

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct ListOutboxQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,

    pub status: Option<OutboxStatus>,
}

/// Number of outbox entries in each state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct OutboxStats {
    pub pending: i64,
    pub sent: i64,
    pub dead: i64,
}
