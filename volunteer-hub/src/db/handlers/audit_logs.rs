use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    db::{
        errors::Result,
        models::audit_logs::{AuditLogCreateDBRequest, AuditLogDBResponse},
    },
    types::UserId,
};

#[derive(Debug, Clone)]
pub struct AuditLogFilter {
    pub skip: i64,
    pub limit: i64,
    pub actor_id: Option<UserId>,
    pub action: Option<String>,
    pub entity_type: Option<String>,
    pub since: Option<DateTime<Utc>>,
}

const FILTER_CLAUSE: &str = r#"
    WHERE ($1::uuid IS NULL OR actor_id = $1)
      AND ($2::text IS NULL OR action = $2)
      AND ($3::text IS NULL OR entity_type = $3)
      AND ($4::timestamptz IS NULL OR created_at >= $4)
"#;

/// Append-only store of admin actions.
pub struct AuditLogs<'c> {
    db: &'c mut PgConnection,
}

impl<'c> AuditLogs<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request), fields(action = %request.action, entity_type = %request.entity_type), err)]
    pub async fn append(&mut self, request: &AuditLogCreateDBRequest) -> Result<AuditLogDBResponse> {
        let entry = sqlx::query_as::<_, AuditLogDBResponse>(
            r#"
            INSERT INTO audit_logs (id, actor_id, action, entity_type, entity_id, details)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.actor_id)
        .bind(&request.action)
        .bind(&request.entity_type)
        .bind(&request.entity_id)
        .bind(&request.details)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(entry)
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    pub async fn list(&mut self, filter: &AuditLogFilter) -> Result<Vec<AuditLogDBResponse>> {
        let query = format!("SELECT * FROM audit_logs {FILTER_CLAUSE} ORDER BY created_at DESC LIMIT $5 OFFSET $6");
        let entries = sqlx::query_as::<_, AuditLogDBResponse>(&query)
            .bind(filter.actor_id)
            .bind(&filter.action)
            .bind(&filter.entity_type)
            .bind(filter.since)
            .bind(filter.limit)
            .bind(filter.skip)
            .fetch_all(&mut *self.db)
            .await?;
        Ok(entries)
    }

    #[instrument(skip(self, filter), err)]
    pub async fn count(&mut self, filter: &AuditLogFilter) -> Result<i64> {
        let query = format!("SELECT COUNT(*) FROM audit_logs {FILTER_CLAUSE}");
        let count = sqlx::query_scalar::<_, i64>(&query)
            .bind(filter.actor_id)
            .bind(&filter.action)
            .bind(&filter.entity_type)
            .bind(filter.since)
            .fetch_one(&mut *self.db)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::users::Role;
    use crate::test_utils::create_test_admin_user;
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_append_and_filter(pool: PgPool) {
        let admin = create_test_admin_user(&pool, Role::Admin).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = AuditLogs::new(&mut conn);

        for action in ["application.approve", "application.reject", "shift.delete"] {
            repo.append(&AuditLogCreateDBRequest {
                actor_id: Some(admin.id),
                action: action.to_string(),
                entity_type: action.split('.').next().unwrap().to_string(),
                entity_id: Some(Uuid::new_v4().to_string()),
                details: serde_json::json!({}),
            })
            .await
            .unwrap();
        }

        let filter = AuditLogFilter {
            skip: 0,
            limit: 10,
            actor_id: Some(admin.id),
            action: None,
            entity_type: Some("application".to_string()),
            since: None,
        };
        assert_eq!(repo.list(&filter).await.unwrap().len(), 2);
        assert_eq!(
            repo.count(&AuditLogFilter {
                action: Some("shift.delete".to_string()),
                entity_type: None,
                ..filter
            })
            .await
            .unwrap(),
            1
        );
    }
}
