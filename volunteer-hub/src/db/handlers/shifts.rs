//! Database repository for shifts.


use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    api::models::shifts::ShiftStatus,
    db::{
        errors::{DbError, Result},
        handlers::repository::Repository,
        models::shifts::{ShiftCreateDBRequest, ShiftDBResponse, ShiftUpdateDBRequest},
    },
    types::{ShiftId, UserId, abbrev_uuid},
};

#[derive(Debug, Clone, Default)]
pub struct ShiftFilter {
    pub skip: i64,
    pub limit: i64,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub status: Option<ShiftStatus>,
    /// Only shifts with a free place
    pub available_only: bool,
}

impl ShiftFilter {
    pub fn new(skip: i64, limit: i64) -> Self {
        Self {
            skip,
            limit,
            ..Default::default()
        }
    }

    pub fn between(mut self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        self.from = from;
        self.to = to;
        self
    }

    pub fn with_status(mut self, status: Option<ShiftStatus>) -> Self {
        self.status = status;
        self
    }

    pub fn available(mut self, available_only: bool) -> Self {
        self.available_only = available_only;
        self
    }
}

const FILTER_CLAUSE: &str = r#"
    WHERE ($1::timestamptz IS NULL OR start_time >= $1)
      AND ($2::timestamptz IS NULL OR start_time < $2)
      AND ($3::shift_status IS NULL OR status = $3)
      AND (NOT $4 OR (
            status = 'open' AND (
                (is_flexible AND flexible_slots_used < flexible_slots)
                OR (NOT is_flexible AND assigned_volunteer_id IS NULL)
            )
          ))
"#;

pub struct Shifts<'c> {
    db: &'c mut PgConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for Shifts<'c> {
    type CreateRequest = ShiftCreateDBRequest;
    type UpdateRequest = ShiftUpdateDBRequest;
    type Response = ShiftDBResponse;
    type Id = ShiftId;
    type Filter = ShiftFilter;

    #[instrument(skip(self, request), fields(title = %request.title), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let shift = sqlx::query_as::<_, ShiftDBResponse>(
            r#"
            INSERT INTO shifts (
                id, title, description, location, required_role, required_skills,
                start_time, end_time, is_flexible, flexible_slots, minimum_hours, maximum_hours,
                priority, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&request.title)
        .bind(&request.description)
        .bind(&request.location)
        .bind(&request.required_role)
        .bind(&request.required_skills)
        .bind(request.start_time)
        .bind(request.end_time)
        .bind(request.is_flexible)
        .bind(request.flexible_slots)
        .bind(request.minimum_hours)
        .bind(request.maximum_hours)
        .bind(request.priority)
        .bind(request.created_by)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(shift)
    }

    #[instrument(skip(self), fields(shift_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let shift = sqlx::query_as::<_, ShiftDBResponse>("SELECT * FROM shifts WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(shift)
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let query = format!("SELECT * FROM shifts {FILTER_CLAUSE} ORDER BY start_time ASC LIMIT $5 OFFSET $6");
        let shifts = sqlx::query_as::<_, ShiftDBResponse>(&query)
            .bind(filter.from)
            .bind(filter.to)
            .bind(filter.status)
            .bind(filter.available_only)
            .bind(filter.limit)
            .bind(filter.skip)
            .fetch_all(&mut *self.db)
            .await?;
        Ok(shifts)
    }

    #[instrument(skip(self), fields(shift_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM shifts WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(shift_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let shift = sqlx::query_as::<_, ShiftDBResponse>(
            r#"
            UPDATE shifts SET
                title = COALESCE($2, title),
                description = COALESCE($3, description),
                location = COALESCE($4, location),
                required_role = CASE WHEN $5::text IS NULL THEN required_role ELSE NULLIF($5, '') END,
                required_skills = COALESCE($6, required_skills),
                start_time = COALESCE($7, start_time),
                end_time = COALESCE($8, end_time),
                flexible_slots = COALESCE($9, flexible_slots),
                minimum_hours = COALESCE($10, minimum_hours),
                maximum_hours = COALESCE($11, maximum_hours),
                priority = COALESCE($12, priority),
                status = COALESCE($13, status),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&request.title)
        .bind(&request.description)
        .bind(&request.location)
        .bind(&request.required_role)
        .bind(&request.required_skills)
        .bind(request.start_time)
        .bind(request.end_time)
        .bind(request.flexible_slots)
        .bind(request.minimum_hours)
        .bind(request.maximum_hours)
        .bind(request.priority)
        .bind(request.status)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;
        Ok(shift)
    }
}

impl<'c> Shifts<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, filter), err)]
    pub async fn count(&mut self, filter: &ShiftFilter) -> Result<i64> {
        let query = format!("SELECT COUNT(*) FROM shifts {FILTER_CLAUSE}");
        let count = sqlx::query_scalar::<_, i64>(&query)
            .bind(filter.from)
            .bind(filter.to)
            .bind(filter.status)
            .bind(filter.available_only)
            .fetch_one(&mut *self.db)
            .await?;
        Ok(count)
    }

    /// Take one place on the shift: a flexible slot, or the fixed volunteer seat.
    #[instrument(skip(self), fields(shift_id = %abbrev_uuid(&id), volunteer_id = %abbrev_uuid(&volunteer_id)), err)]
    pub async fn claim_place(&mut self, id: ShiftId, volunteer_id: UserId) -> Result<ShiftDBResponse> {
        let shift = sqlx::query_as::<_, ShiftDBResponse>(
            r#"
            UPDATE shifts SET
                flexible_slots_used = CASE WHEN is_flexible THEN flexible_slots_used + 1 ELSE flexible_slots_used END,
                assigned_volunteer_id = CASE WHEN is_flexible THEN assigned_volunteer_id ELSE $2 END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(volunteer_id)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;
        Ok(shift)
    }

    /// Give a place back after a cancellation. The slot counter never drops below zero, and a
    /// fixed seat is only cleared if it still belongs to this volunteer.
    #[instrument(skip(self), fields(shift_id = %abbrev_uuid(&id), volunteer_id = %abbrev_uuid(&volunteer_id)), err)]
    pub async fn release_place(&mut self, id: ShiftId, volunteer_id: UserId) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE shifts SET
                flexible_slots_used = CASE WHEN is_flexible THEN GREATEST(flexible_slots_used - 1, 0) ELSE flexible_slots_used END,
                assigned_volunteer_id = CASE
                    WHEN NOT is_flexible AND assigned_volunteer_id = $2 THEN NULL
                    ELSE assigned_volunteer_id
                END,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(volunteer_id)
        .execute(&mut *self.db)
        .await?;
        Ok(())
    }

    /// Open shifts starting after `after`, soonest first. Feeds recommendations.
    #[instrument(skip(self), err)]
    pub async fn upcoming_open(&mut self, after: DateTime<Utc>, limit: i64) -> Result<Vec<ShiftDBResponse>> {
        let filter = ShiftFilter::new(0, limit)
            .between(Some(after), None)
            .with_status(Some(ShiftStatus::Open))
            .available(true);
        self.list(&filter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::users::Role;
    use crate::test_utils::{create_test_admin_user, create_test_user, sample_shift};
    use chrono::Duration;
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_list_and_filter_available(pool: PgPool) {
        let admin = create_test_admin_user(&pool, Role::Admin).await;
        let volunteer = create_test_user(&pool, Role::Volunteer).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Shifts::new(&mut conn);

        let start = Utc::now() + Duration::days(2);
        let fixed = repo.create(&sample_shift(admin.id, start, false)).await.unwrap();
        let flexible = repo.create(&sample_shift(admin.id, start + Duration::hours(5), true)).await.unwrap();
        assert_eq!(flexible.flexible_slots, 2);
        assert_eq!(fixed.available_slots(), 1);

        let taken = repo.claim_place(fixed.id, volunteer.id).await.unwrap();
        assert_eq!(taken.assigned_volunteer_id, Some(volunteer.id));
        assert_eq!(taken.available_slots(), 0);

        let available = repo.list(&ShiftFilter::new(0, 10).available(true)).await.unwrap();
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].id, flexible.id);
        assert_eq!(repo.count(&ShiftFilter::new(0, 10)).await.unwrap(), 2);

        repo.release_place(fixed.id, volunteer.id).await.unwrap();
        let released = repo.get_by_id(fixed.id).await.unwrap().unwrap();
        assert!(released.assigned_volunteer_id.is_none());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_flexible_slot_counter_never_negative(pool: PgPool) {
        let admin = create_test_admin_user(&pool, Role::Admin).await;
        let volunteer = create_test_user(&pool, Role::Volunteer).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Shifts::new(&mut conn);

        let shift = repo
            .create(&sample_shift(admin.id, Utc::now() + Duration::days(1), true))
            .await
            .unwrap();
        repo.claim_place(shift.id, volunteer.id).await.unwrap();
        repo.release_place(shift.id, volunteer.id).await.unwrap();
        repo.release_place(shift.id, volunteer.id).await.unwrap();

        let shift = repo.get_by_id(shift.id).await.unwrap().unwrap();
        assert_eq!(shift.flexible_slots_used, 0);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_update_clears_required_role_with_empty_string(pool: PgPool) {
        let admin = create_test_admin_user(&pool, Role::Admin).await;
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Shifts::new(&mut conn);

        let mut request = sample_shift(admin.id, Utc::now() + Duration::days(3), false);
        request.required_role = Some("driver".to_string());
        let shift = repo.create(&request).await.unwrap();

        let updated = repo
            .update(
                shift.id,
                &ShiftUpdateDBRequest {
                    title: Some("Evening delivery".to_string()),
                    required_role: Some(String::new()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.title, "Evening delivery");
        assert!(updated.required_role.is_none());

        let err = repo.update(Uuid::new_v4(), &ShiftUpdateDBRequest::default()).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound));
    }
}
