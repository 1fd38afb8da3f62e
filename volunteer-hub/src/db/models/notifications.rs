use crate::api::models::notifications::OutboxStatus;
use crate::types::{NotificationId, OutboxId, UserId};
use chrono::{DateTime, Utc};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct NotificationDBResponse {
    pub id: NotificationId,
    pub user_id: UserId,
    pub kind: String,
    pub title: String,
    pub body: String,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A message queued for delivery: one in-app notification plus one outbox email.
#[derive(Debug, Clone)]
pub struct OutboxCreateDBRequest {
    pub user_id: Option<UserId>,
    pub recipient_email: String,
    pub recipient_name: Option<String>,
    pub kind: String,
    pub subject: String,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, FromRow)]
pub struct OutboxDBResponse {
    pub id: OutboxId,
    pub user_id: Option<UserId>,
    pub recipient_email: String,
    pub recipient_name: Option<String>,
    pub kind: String,
    pub subject: String,
    pub payload: serde_json::Value,
    pub status: OutboxStatus,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub next_attempt_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
