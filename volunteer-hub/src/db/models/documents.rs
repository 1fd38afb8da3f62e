use crate::types::{DocumentId, UserId};
use chrono::{DateTime, Utc};
use sqlx::FromRow;

#[derive(Debug, Clone)]
pub struct DocumentCreateDBRequest {
    pub owner_id: UserId,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub sha256: String,
    pub storage_key: String,
    pub category: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DocumentDBResponse {
    pub id: DocumentId,
    pub owner_id: UserId,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub sha256: String,
    pub storage_key: String,
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
}
