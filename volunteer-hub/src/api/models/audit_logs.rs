use super::pagination::Pagination;
use crate::db::models::audit_logs::AuditLogDBResponse;
use crate::types::{AuditLogId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuditLogResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: AuditLogId,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub actor_id: Option<UserId>,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<String>,
    #[schema(value_type = Object)]
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl From<AuditLogDBResponse> for AuditLogResponse {
    fn from(db: AuditLogDBResponse) -> Self {
        Self {
            id: db.id,
            actor_id: db.actor_id,
            action: db.action,
            entity_type: db.entity_type,
            entity_id: db.entity_id,
            details: db.details,
            created_at: db.created_at,
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListAuditLogsQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,

    #[param(value_type = Option<String>, format = "uuid")]
    pub actor_id: Option<UserId>,
    pub action: Option<String>,
    pub entity_type: Option<String>,
    pub since: Option<DateTime<Utc>>,
}
