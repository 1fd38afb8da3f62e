use super::pagination::Pagination;
use crate::db::models::messages::MessageDBResponse;
use crate::types::{MessageId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageCreate {
    #[schema(value_type = String, format = "uuid")]
    pub recipient_id: UserId,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: MessageId,
    #[schema(value_type = String, format = "uuid")]
    pub sender_id: UserId,
    #[schema(value_type = String, format = "uuid")]
    pub recipient_id: UserId,
    pub subject: String,
    pub body: String,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<MessageDBResponse> for MessageResponse {
    fn from(db: MessageDBResponse) -> Self {
        Self {
            id: db.id,
            sender_id: db.sender_id,
            recipient_id: db.recipient_id,
            subject: db.subject,
            body: db.body,
            read_at: db.read_at,
            created_at: db.created_at,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Folder {
    #[default]
    Inbox,
    Sent,
}

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct ListMessagesQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,

    #[serde(default)]
    pub folder: Folder,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UnreadCount {
    pub unread: i64,
}
