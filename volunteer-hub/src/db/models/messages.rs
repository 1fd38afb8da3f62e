use crate::types::{MessageId, UserId};
use chrono::{DateTime, Utc};
use sqlx::FromRow;

#[derive(Debug, Clone)]
pub struct MessageCreateDBRequest {
    pub sender_id: UserId,
    pub recipient_id: UserId,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct MessageDBResponse {
    pub id: MessageId,
    pub sender_id: UserId,
    pub recipient_id: UserId,
    pub subject: String,
    pub body: String,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
