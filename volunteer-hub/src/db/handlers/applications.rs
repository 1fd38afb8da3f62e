//! Database repository for volunteer applications.


use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    api::models::applications::ApplicationStatus,
    db::{
        errors::{DbError, Result},
        handlers::repository::Repository,
        models::applications::{ApplicationCreateDBRequest, ApplicationDBResponse, ApplicationReviewDBRequest},
    },
    types::{ApplicationId, abbrev_uuid},
};

#[derive(Debug, Clone)]
pub struct ApplicationFilter {
    pub skip: i64,
    pub limit: i64,
    pub status: Option<ApplicationStatus>,
}

impl ApplicationFilter {
    pub fn new(skip: i64, limit: i64) -> Self {
        Self { skip, limit, status: None }
    }

    pub fn with_status(mut self, status: Option<ApplicationStatus>) -> Self {
        self.status = status;
        self
    }
}

pub struct Applications<'c> {
    db: &'c mut PgConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for Applications<'c> {
    type CreateRequest = ApplicationCreateDBRequest;
    type UpdateRequest = ApplicationReviewDBRequest;
    type Response = ApplicationDBResponse;
    type Id = ApplicationId;
    type Filter = ApplicationFilter;

    #[instrument(skip(self, request), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let application = sqlx::query_as::<_, ApplicationDBResponse>(
            r#"
            INSERT INTO volunteer_applications
                (id, first_name, last_name, email, phone, skills, interests, availability, motivation)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&request.first_name)
        .bind(&request.last_name)
        .bind(&request.email)
        .bind(&request.phone)
        .bind(&request.skills)
        .bind(&request.interests)
        .bind(&request.availability)
        .bind(&request.motivation)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(application)
    }

    #[instrument(skip(self), fields(application_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let application = sqlx::query_as::<_, ApplicationDBResponse>("SELECT * FROM volunteer_applications WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(application)
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let applications = sqlx::query_as::<_, ApplicationDBResponse>(
            r#"
            SELECT * FROM volunteer_applications
            WHERE ($1::application_status IS NULL OR status = $1)
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(filter.status)
        .bind(filter.limit)
        .bind(filter.skip)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(applications)
    }

    #[instrument(skip(self), fields(application_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM volunteer_applications WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Apply a review. Only pending applications may move, except archive which accepts any
    /// non-archived state.
    #[instrument(skip(self, request), fields(application_id = %abbrev_uuid(&id), status = ?request.status), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let application = sqlx::query_as::<_, ApplicationDBResponse>(
            r#"
            UPDATE volunteer_applications SET
                status = $2,
                reviewed_by = $3,
                reviewed_at = NOW(),
                review_notes = COALESCE($4, review_notes),
                user_id = COALESCE($5, user_id),
                updated_at = NOW()
            WHERE id = $1
              AND (status = 'pending' OR ($2 = 'archived'::application_status AND status <> 'archived'))
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(request.status)
        .bind(request.reviewed_by)
        .bind(&request.review_notes)
        .bind(request.user_id)
        .fetch_optional(&mut *self.db)
        .await?;

        match application {
            Some(application) => Ok(application),
            None => {
                // Distinguish a missing row from one in the wrong state
                let current = self.get_by_id(id).await?.ok_or(DbError::NotFound)?;
                Err(DbError::ProtectedEntity {
                    operation: crate::types::Operation::UpdateAll,
                    reason: format!("application is already {:?}", current.status).to_lowercase(),
                    entity_type: "volunteer application".to_string(),
                    entity_id: Some(id.to_string()),
                })
            }
        }
    }
}

impl<'c> Applications<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, filter), err)]
    pub async fn count(&mut self, filter: &ApplicationFilter) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM volunteer_applications WHERE ($1::application_status IS NULL OR status = $1)",
        )
        .bind(filter.status)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(count)
    }

    /// Applications submitted with this email, newest first. Used by privacy exports.
    #[instrument(skip(self, email), err)]
    pub async fn list_by_email(&mut self, email: &str) -> Result<Vec<ApplicationDBResponse>> {
        let applications = sqlx::query_as::<_, ApplicationDBResponse>(
            "SELECT * FROM volunteer_applications WHERE lower(email) = lower($1) ORDER BY created_at DESC",
        )
        .bind(email)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(applications)
    }
}
