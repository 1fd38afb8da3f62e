//! Database repository for volunteer profiles, keyed by user id.


use sqlx::PgConnection;
use tracing::instrument;

use crate::{
    api::models::profiles::VolunteerStatus,
    db::{
        errors::{DbError, Result},
        handlers::repository::Repository,
        models::profiles::{ProfileCreateDBRequest, ProfileDBResponse, ProfileUpdateDBRequest},
    },
    types::{UserId, abbrev_uuid},
};

#[derive(Debug, Clone)]
pub struct ProfileFilter {
    pub skip: i64,
    pub limit: i64,
    pub status: Option<VolunteerStatus>,
}

pub struct Profiles<'c> {
    db: &'c mut PgConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for Profiles<'c> {
    type CreateRequest = ProfileCreateDBRequest;
    type UpdateRequest = ProfileUpdateDBRequest;
    type Response = ProfileDBResponse;
    type Id = UserId;
    type Filter = ProfileFilter;

    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&request.user_id)), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let profile = sqlx::query_as::<_, ProfileDBResponse>(
            r#"
            INSERT INTO volunteer_profiles (user_id, skills, roles, preferred_time_of_day, bio)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(request.user_id)
        .bind(&request.skills)
        .bind(&request.roles)
        .bind(request.preferred_time_of_day)
        .bind(&request.bio)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(profile)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let profile = sqlx::query_as::<_, ProfileDBResponse>("SELECT * FROM volunteer_profiles WHERE user_id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(profile)
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let profiles = sqlx::query_as::<_, ProfileDBResponse>(
            r#"
            SELECT * FROM volunteer_profiles
            WHERE ($1::volunteer_status IS NULL OR status = $1)
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(filter.status)
        .bind(filter.limit)
        .bind(filter.skip)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(profiles)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM volunteer_profiles WHERE user_id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let profile = sqlx::query_as::<_, ProfileDBResponse>(
            r#"
            UPDATE volunteer_profiles SET
                skills = COALESCE($2, skills),
                roles = COALESCE($3, roles),
                preferred_time_of_day = COALESCE($4, preferred_time_of_day),
                bio = COALESCE($5, bio),
                emergency_contact = COALESCE($6, emergency_contact),
                status = COALESCE($7, status),
                updated_at = NOW()
            WHERE user_id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&request.skills)
        .bind(&request.roles)
        .bind(request.preferred_time_of_day)
        .bind(&request.bio)
        .bind(&request.emergency_contact)
        .bind(request.status)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;
        Ok(profile)
    }
}

impl<'c> Profiles<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Create the profile unless one exists. Returns the profile either way.
    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&request.user_id)), err)]
    pub async fn get_or_create(&mut self, request: &ProfileCreateDBRequest) -> Result<ProfileDBResponse> {
        if let Some(existing) = self.get_by_id(request.user_id).await? {
            return Ok(existing);
        }
        self.create(request).await
    }

    #[instrument(skip(self), err)]
    pub async fn count_active(&mut self) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM volunteer_profiles WHERE status = 'active'")
            .fetch_one(&mut *self.db)
            .await?;
        Ok(count)
    }
}
