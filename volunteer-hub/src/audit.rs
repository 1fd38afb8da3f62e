//! Best-effort audit trail for admin mutations.

use serde_json::Value;
use sqlx::PgPool;

use crate::{
    api::models::users::CurrentUser,
    db::{handlers::AuditLogs, models::audit_logs::AuditLogCreateDBRequest},
};

/// One admin action, ready to append.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub action: &'static str,
    pub entity_type: &'static str,
    pub entity_id: Option<String>,
    pub details: Value,
}

impl AuditEntry {
    pub fn new(action: &'static str, entity_type: &'static str, entity_id: impl ToString) -> Self {
        Self {
            action,
            entity_type,
            entity_id: Some(entity_id.to_string()),
            details: Value::Null,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }
}

/// Append an entry for `actor`. Failures are logged and never reach the caller.
pub async fn record(pool: &PgPool, actor: &CurrentUser, entry: AuditEntry) {
    let request = AuditLogCreateDBRequest {
        actor_id: Some(actor.id),
        action: entry.action.to_string(),
        entity_type: entry.entity_type.to_string(),
        entity_id: entry.entity_id,
        details: if entry.details.is_null() {
            Value::Object(Default::default())
        } else {
            entry.details
        },
    };

    let result = match pool.acquire().await {
        Ok(mut conn) => AuditLogs::new(&mut conn).append(&request).await.map(|_| ()),
        Err(e) => Err(e.into()),
    };

    if let Err(e) = result {
        tracing::warn!(error = %e, action = entry.action, entity_type = entry.entity_type, "Failed to write audit log entry");
    }
}
