use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    api::models::privacy::{PrivacyRequestKind, PrivacyRequestStatus},
    db::{errors::Result, models::privacy_requests::PrivacyRequestDBResponse},
    types::{PrivacyRequestId, UserId, abbrev_uuid},
};

#[derive(Debug, Clone)]
pub struct PrivacyRequestFilter {
    pub skip: i64,
    pub limit: i64,
    pub user_id: Option<UserId>,
    pub status: Option<PrivacyRequestStatus>,
    pub kind: Option<PrivacyRequestKind>,
}

const FILTER_CLAUSE: &str = r#"
    WHERE ($1::uuid IS NULL OR user_id = $1)
      AND ($2::privacy_request_status IS NULL OR status = $2)
      AND ($3::privacy_request_kind IS NULL OR kind = $3)
"#;

pub struct PrivacyRequests<'c> {
    db: &'c mut PgConnection,
}

impl<'c> PrivacyRequests<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, reason), fields(user_id = %abbrev_uuid(&user_id), kind = ?kind), err)]
    pub async fn create(&mut self, user_id: UserId, kind: PrivacyRequestKind, reason: Option<&str>) -> Result<PrivacyRequestDBResponse> {
        let request = sqlx::query_as::<_, PrivacyRequestDBResponse>(
            "INSERT INTO privacy_requests (id, user_id, kind, reason) VALUES ($1, $2, $3, $4) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(kind)
        .bind(reason)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(request)
    }

    #[instrument(skip(self), fields(request_id = %abbrev_uuid(&id)), err)]
    pub async fn get_by_id(&mut self, id: PrivacyRequestId) -> Result<Option<PrivacyRequestDBResponse>> {
        let request = sqlx::query_as::<_, PrivacyRequestDBResponse>("SELECT * FROM privacy_requests WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(request)
    }

    /// The user's pending request of this kind, if any.
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn pending_for_user(&mut self, user_id: UserId, kind: PrivacyRequestKind) -> Result<Option<PrivacyRequestDBResponse>> {
        let request = sqlx::query_as::<_, PrivacyRequestDBResponse>(
            "SELECT * FROM privacy_requests WHERE user_id = $1 AND kind = $2 AND status = 'pending' LIMIT 1",
        )
        .bind(user_id)
        .bind(kind)
        .fetch_optional(&mut *self.db)
        .await?;
        Ok(request)
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    pub async fn list(&mut self, filter: &PrivacyRequestFilter) -> Result<Vec<PrivacyRequestDBResponse>> {
        let query = format!("SELECT * FROM privacy_requests {FILTER_CLAUSE} ORDER BY created_at DESC LIMIT $4 OFFSET $5");
        let requests = sqlx::query_as::<_, PrivacyRequestDBResponse>(&query)
            .bind(filter.user_id)
            .bind(filter.status)
            .bind(filter.kind)
            .bind(filter.limit)
            .bind(filter.skip)
            .fetch_all(&mut *self.db)
            .await?;
        Ok(requests)
    }

    #[instrument(skip(self, filter), err)]
    pub async fn count(&mut self, filter: &PrivacyRequestFilter) -> Result<i64> {
        let query = format!("SELECT COUNT(*) FROM privacy_requests {FILTER_CLAUSE}");
        let count = sqlx::query_scalar::<_, i64>(&query)
            .bind(filter.user_id)
            .bind(filter.status)
            .bind(filter.kind)
            .fetch_one(&mut *self.db)
            .await?;
        Ok(count)
    }

    /// Close a pending request. Returns `None` when it was already closed.
    #[instrument(skip(self, export_data, reason), fields(request_id = %abbrev_uuid(&id), status = ?status), err)]
    pub async fn close(
        &mut self,
        id: PrivacyRequestId,
        status: PrivacyRequestStatus,
        processed_by: UserId,
        export_data: Option<&serde_json::Value>,
        reason: Option<&str>,
    ) -> Result<Option<PrivacyRequestDBResponse>> {
        let request = sqlx::query_as::<_, PrivacyRequestDBResponse>(
            r#"
            UPDATE privacy_requests SET
                status = $2,
                processed_by = $3,
                processed_at = NOW(),
                export_data = COALESCE($4, export_data),
                reason = COALESCE($5, reason)
            WHERE id = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(processed_by)
        .bind(export_data)
        .bind(reason)
        .fetch_optional(&mut *self.db)
        .await?;
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::users::Role;
    use crate::test_utils::{create_test_admin_user, create_test_user};
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_request_closes_once(pool: PgPool) {
        let admin = create_test_admin_user(&pool, Role::Admin).await;
        let user = create_test_user(&pool, Role::Volunteer).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = PrivacyRequests::new(&mut conn);

        let request = repo.create(user.id, PrivacyRequestKind::Export, None).await.unwrap();
        assert!(repo.pending_for_user(user.id, PrivacyRequestKind::Export).await.unwrap().is_some());
        assert!(repo.pending_for_user(user.id, PrivacyRequestKind::Deletion).await.unwrap().is_none());

        let data = serde_json::json!({ "user": { "id": user.id } });
        let closed = repo
            .close(request.id, PrivacyRequestStatus::Completed, admin.id, Some(&data), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(closed.export_data, Some(data));
        assert!(
            repo.close(request.id, PrivacyRequestStatus::Rejected, admin.id, None, Some("late"))
                .await
                .unwrap()
                .is_none()
        );

        let filter = PrivacyRequestFilter {
            skip: 0,
            limit: 10,
            user_id: Some(user.id),
            status: Some(PrivacyRequestStatus::Completed),
            kind: None,
        };
        assert_eq!(repo.count(&filter).await.unwrap(), 1);
        assert_eq!(repo.list(&filter).await.unwrap().len(), 1);
    }
}
