
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    api::models::help_requests::HelpRequestStatus,
    db::{
        errors::{DbError, Result},
        handlers::repository::Repository,
        models::help_requests::{HelpRequestCreateDBRequest, HelpRequestDBResponse, HelpRequestUpdateDBRequest},
    },
    types::{HelpRequestId, abbrev_uuid},
};

#[derive(Debug, Clone)]
pub struct HelpRequestFilter {
    pub skip: i64,
    pub limit: i64,
    pub status: Option<HelpRequestStatus>,
}

pub struct HelpRequests<'c> {
    db: &'c mut PgConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for HelpRequests<'c> {
    type CreateRequest = HelpRequestCreateDBRequest;
    type UpdateRequest = HelpRequestUpdateDBRequest;
    type Response = HelpRequestDBResponse;
    type Id = HelpRequestId;
    type Filter = HelpRequestFilter;

    #[instrument(skip(self, request), fields(category = %request.category), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let help_request = sqlx::query_as::<_, HelpRequestDBResponse>(
            r#"
            INSERT INTO help_requests (id, requester_id, name, email, phone, category, description, urgency)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.requester_id)
        .bind(&request.name)
        .bind(&request.email)
        .bind(&request.phone)
        .bind(&request.category)
        .bind(&request.description)
        .bind(request.urgency)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(help_request)
    }

    #[instrument(skip(self), fields(help_request_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let help_request = sqlx::query_as::<_, HelpRequestDBResponse>("SELECT * FROM help_requests WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(help_request)
    }

    /// Most urgent first, then oldest first within the same urgency.
    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let help_requests = sqlx::query_as::<_, HelpRequestDBResponse>(
            r#"
            SELECT * FROM help_requests
            WHERE ($1::help_request_status IS NULL OR status = $1)
            ORDER BY urgency DESC, created_at ASC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(filter.status)
        .bind(filter.limit)
        .bind(filter.skip)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(help_requests)
    }

    #[instrument(skip(self), fields(help_request_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM help_requests WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(help_request_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let help_request = sqlx::query_as::<_, HelpRequestDBResponse>(
            r#"
            UPDATE help_requests SET
                status = COALESCE($2, status),
                urgency = COALESCE($3, urgency),
                assigned_to = COALESCE($4, assigned_to),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(request.status)
        .bind(request.urgency)
        .bind(request.assigned_to)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;
        Ok(help_request)
    }
}

impl<'c> HelpRequests<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self), err)]
    pub async fn count(&mut self, status: Option<HelpRequestStatus>) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM help_requests WHERE ($1::help_request_status IS NULL OR status = $1)",
        )
        .bind(status)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::shifts::Priority;
    use sqlx::PgPool;

    fn request(name: &str, urgency: Priority) -> HelpRequestCreateDBRequest {
        HelpRequestCreateDBRequest {
            requester_id: None,
            name: name.to_string(),
            email: format!("{name}@example.org"),
            phone: None,
            category: "food".to_string(),
            description: "Need a food parcel".to_string(),
            urgency,
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_urgent_requests_listed_first(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = HelpRequests::new(&mut conn);

        repo.create(&request("calm", Priority::Low)).await.unwrap();
        let urgent = repo.create(&request("urgent", Priority::Urgent)).await.unwrap();

        let filter = HelpRequestFilter {
            skip: 0,
            limit: 10,
            status: None,
        };
        let listed = repo.list(&filter).await.unwrap();
        assert_eq!(listed[0].id, urgent.id);

        repo.update(
            urgent.id,
            &HelpRequestUpdateDBRequest {
                status: Some(HelpRequestStatus::Resolved),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(repo.count(Some(HelpRequestStatus::Open)).await.unwrap(), 1);
    }
}
