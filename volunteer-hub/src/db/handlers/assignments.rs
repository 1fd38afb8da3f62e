//! Database repository for shift assignments.
//!
//! Reads join the owning shift so responses carry its title. Bookings go through
//! [`Assignments::book`], which must run inside the caller's transaction so the shift's place
//! bookkeeping and the assignment insert commit together.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    api::models::assignments::AssignmentStatus,
    db::{
        errors::{DbError, Result},
        handlers::shifts::Shifts,
        models::assignments::{AssignmentCreateDBRequest, AssignmentDBResponse},
    },
    types::{AssignmentId, ShiftId, UserId, abbrev_uuid},
};

const SELECT_WITH_TITLE: &str = r#"
    SELECT a.*, s.title AS shift_title
    FROM shift_assignments a
    JOIN shifts s ON s.id = a.shift_id
"#;

#[derive(Debug, Clone)]
pub struct AssignmentFilter {
    pub skip: i64,
    pub limit: i64,
    pub volunteer_id: Option<UserId>,
    pub shift_id: Option<ShiftId>,
    pub status: Option<AssignmentStatus>,
    /// Only assignments starting after this instant
    pub starts_after: Option<DateTime<Utc>>,
}

impl AssignmentFilter {
    pub fn new(skip: i64, limit: i64) -> Self {
        Self {
            skip,
            limit,
            volunteer_id: None,
            shift_id: None,
            status: None,
            starts_after: None,
        }
    }

    pub fn for_volunteer(mut self, volunteer_id: UserId) -> Self {
        self.volunteer_id = Some(volunteer_id);
        self
    }

    pub fn for_shift(mut self, shift_id: ShiftId) -> Self {
        self.shift_id = Some(shift_id);
        self
    }

    pub fn with_status(mut self, status: Option<AssignmentStatus>) -> Self {
        self.status = status;
        self
    }

    pub fn starting_after(mut self, instant: Option<DateTime<Utc>>) -> Self {
        self.starts_after = instant;
        self
    }
}

/// Cancellation reason recorded when an account is deleted with bookings still ahead.
pub const ACCOUNT_DELETED_REASON: &str = "Account deleted";

pub struct Assignments<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Assignments<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Claim a place on the shift and insert the confirmed assignment.
    #[instrument(skip(self, request), fields(shift_id = %abbrev_uuid(&request.shift_id), volunteer_id = %abbrev_uuid(&request.volunteer_id)), err)]
    pub async fn book(&mut self, request: &AssignmentCreateDBRequest) -> Result<AssignmentDBResponse> {
        Shifts::new(&mut *self.db).claim_place(request.shift_id, request.volunteer_id).await?;

        let id: AssignmentId = sqlx::query_scalar(
            r#"
            INSERT INTO shift_assignments (id, shift_id, volunteer_id, start_time, end_time, duration_hours, is_flexible)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.shift_id)
        .bind(request.volunteer_id)
        .bind(request.start_time)
        .bind(request.end_time)
        .bind(request.duration_hours)
        .bind(request.is_flexible)
        .fetch_one(&mut *self.db)
        .await?;

        self.get_by_id(id).await?.ok_or(DbError::NotFound)
    }

    #[instrument(skip(self), fields(assignment_id = %abbrev_uuid(&id)), err)]
    pub async fn get_by_id(&mut self, id: AssignmentId) -> Result<Option<AssignmentDBResponse>> {
        let query = format!("{SELECT_WITH_TITLE} WHERE a.id = $1");
        let assignment = sqlx::query_as::<_, AssignmentDBResponse>(&query)
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(assignment)
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    pub async fn list(&mut self, filter: &AssignmentFilter) -> Result<Vec<AssignmentDBResponse>> {
        let query = format!(
            r#"{SELECT_WITH_TITLE}
            WHERE ($1::uuid IS NULL OR a.volunteer_id = $1)
              AND ($2::uuid IS NULL OR a.shift_id = $2)
              AND ($3::assignment_status IS NULL OR a.status = $3)
              AND ($4::timestamptz IS NULL OR a.start_time > $4)
            ORDER BY a.start_time ASC
            LIMIT $5 OFFSET $6"#
        );
        let assignments = sqlx::query_as::<_, AssignmentDBResponse>(&query)
            .bind(filter.volunteer_id)
            .bind(filter.shift_id)
            .bind(filter.status)
            .bind(filter.starts_after)
            .bind(filter.limit)
            .bind(filter.skip)
            .fetch_all(&mut *self.db)
            .await?;
        Ok(assignments)
    }

    #[instrument(skip(self, filter), err)]
    pub async fn count(&mut self, filter: &AssignmentFilter) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM shift_assignments a
            WHERE ($1::uuid IS NULL OR a.volunteer_id = $1)
              AND ($2::uuid IS NULL OR a.shift_id = $2)
              AND ($3::assignment_status IS NULL OR a.status = $3)
              AND ($4::timestamptz IS NULL OR a.start_time > $4)
            "#,
        )
        .bind(filter.volunteer_id)
        .bind(filter.shift_id)
        .bind(filter.status)
        .bind(filter.starts_after)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(count)
    }

    /// Every assignment the volunteer has ever held. Stats are recomputed from this on each call.
    #[instrument(skip(self), fields(volunteer_id = %abbrev_uuid(&volunteer_id)), err)]
    pub async fn history(&mut self, volunteer_id: UserId) -> Result<Vec<AssignmentDBResponse>> {
        let query = format!("{SELECT_WITH_TITLE} WHERE a.volunteer_id = $1 ORDER BY a.start_time DESC");
        let assignments = sqlx::query_as::<_, AssignmentDBResponse>(&query)
            .bind(volunteer_id)
            .fetch_all(&mut *self.db)
            .await?;
        Ok(assignments)
    }

    /// Confirmed assignments of the volunteer whose start falls on `day` (UTC).
    #[instrument(skip(self), fields(volunteer_id = %abbrev_uuid(&volunteer_id)), err)]
    pub async fn confirmed_on_day(&mut self, volunteer_id: UserId, day: NaiveDate) -> Result<Vec<AssignmentDBResponse>> {
        let query = format!(
            r#"{SELECT_WITH_TITLE}
            WHERE a.volunteer_id = $1
              AND a.status = 'confirmed'
              AND (a.start_time AT TIME ZONE 'UTC')::date = $2
            ORDER BY a.start_time ASC"#
        );
        let assignments = sqlx::query_as::<_, AssignmentDBResponse>(&query)
            .bind(volunteer_id)
            .bind(day)
            .fetch_all(&mut *self.db)
            .await?;
        Ok(assignments)
    }

    /// Move a confirmed assignment to cancelled and hand its place back to the shift.
    /// Returns `None` when the assignment exists but is no longer confirmed.
    #[instrument(skip(self, reason), fields(assignment_id = %abbrev_uuid(&id)), err)]
    pub async fn cancel(&mut self, id: AssignmentId, reason: Option<&str>, now: DateTime<Utc>) -> Result<Option<AssignmentDBResponse>> {
        let updated: Option<(ShiftId, UserId)> = sqlx::query_as(
            r#"
            UPDATE shift_assignments SET
                status = 'cancelled',
                cancelled_at = $2,
                hours_notice = EXTRACT(EPOCH FROM (start_time - $2)) / 3600.0,
                cancellation_reason = $3,
                updated_at = NOW()
            WHERE id = $1 AND status = 'confirmed'
            RETURNING shift_id, volunteer_id
            "#,
        )
        .bind(id)
        .bind(now)
        .bind(reason)
        .fetch_optional(&mut *self.db)
        .await?;

        let Some((shift_id, volunteer_id)) = updated else {
            return match self.get_by_id(id).await? {
                Some(_) => Ok(None),
                None => Err(DbError::NotFound),
            };
        };

        Shifts::new(&mut *self.db).release_place(shift_id, volunteer_id).await?;
        self.get_by_id(id).await
    }

    /// Cancel every confirmed assignment of the volunteer that hasn't started yet, releasing
    /// each place. Used when an account goes away.
    #[instrument(skip(self, reason), fields(volunteer_id = %abbrev_uuid(&volunteer_id)), err)]
    pub async fn cancel_upcoming_for_volunteer(
        &mut self,
        volunteer_id: UserId,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Vec<AssignmentDBResponse>> {
        let ids = sqlx::query_scalar::<_, AssignmentId>(
            r#"
            SELECT id FROM shift_assignments
            WHERE volunteer_id = $1 AND status = 'confirmed' AND start_time > $2
            ORDER BY start_time ASC
            "#,
        )
        .bind(volunteer_id)
        .bind(now)
        .fetch_all(&mut *self.db)
        .await?;

        let mut cancelled = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(assignment) = self.cancel(id, reason, now).await? {
                cancelled.push(assignment);
            }
        }
        Ok(cancelled)
    }

    /// Mark a confirmed assignment completed. `hours_worked` defaults to the booked duration.
    #[instrument(skip(self), fields(assignment_id = %abbrev_uuid(&id)), err)]
    pub async fn complete(&mut self, id: AssignmentId, hours_worked: Option<f64>) -> Result<Option<AssignmentDBResponse>> {
        let result = sqlx::query(
            r#"
            UPDATE shift_assignments SET
                status = 'completed',
                hours_worked = COALESCE($2, duration_hours),
                completed_at = NOW(),
                updated_at = NOW()
            WHERE id = $1 AND status = 'confirmed'
            "#,
        )
        .bind(id)
        .bind(hours_worked)
        .execute(&mut *self.db)
        .await?;
        self.after_transition(id, result.rows_affected()).await
    }

    #[instrument(skip(self), fields(assignment_id = %abbrev_uuid(&id)), err)]
    pub async fn mark_no_show(&mut self, id: AssignmentId) -> Result<Option<AssignmentDBResponse>> {
        let result = sqlx::query(
            r#"
            UPDATE shift_assignments SET status = 'no_show', updated_at = NOW()
            WHERE id = $1 AND status = 'confirmed'
            "#,
        )
        .bind(id)
        .execute(&mut *self.db)
        .await?;
        self.after_transition(id, result.rows_affected()).await
    }

    async fn after_transition(&mut self, id: AssignmentId, rows: u64) -> Result<Option<AssignmentDBResponse>> {
        let assignment = self.get_by_id(id).await?.ok_or(DbError::NotFound)?;
        Ok((rows > 0).then_some(assignment))
    }

    /// Hours on completed assignments across all volunteers.
    #[instrument(skip(self), err)]
    pub async fn total_completed_hours(&mut self) -> Result<f64> {
        let hours = sqlx::query_scalar::<_, Option<f64>>(
            "SELECT SUM(COALESCE(hours_worked, duration_hours)) FROM shift_assignments WHERE status = 'completed'",
        )
        .fetch_one(&mut *self.db)
        .await?;
        Ok(hours.unwrap_or(0.0))
    }
}
