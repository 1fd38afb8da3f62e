use crate::types::{AuditLogId, UserId};
use chrono::{DateTime, Utc};
use sqlx::FromRow;

#[derive(Debug, Clone)]
pub struct AuditLogCreateDBRequest {
    pub actor_id: Option<UserId>,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub details: serde_json::Value,
}

#[derive(Debug, Clone, FromRow)]
pub struct AuditLogDBResponse {
    pub id: AuditLogId,
    pub actor_id: Option<UserId>,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
