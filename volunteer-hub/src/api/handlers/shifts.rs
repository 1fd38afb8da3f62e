//! Shift catalogue, booking and eligibility endpoints.
//!
//! Signup runs every eligibility check from [`crate::scheduling`] against freshly loaded rows
//! and books inside one transaction. The capacity check is read-then-write without a row
//! lock, so two concurrent flexible signups can both take the last slot.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::Utc;
use serde_json::json;
use sqlx::PgConnection;

use crate::{
    AppState,
    api::models::{
        pagination::{PaginatedResponse, Pagination},
        shifts::{
            ListShiftsQuery, RecommendedShift, ShiftCreate, ShiftResponse, ShiftUpdate, ShiftValidationResponse, SignupRequest,
            SignupResponse, validate_shape,
        },
    },
    audit::{self, AuditEntry},
    auth::permissions::{RequiresPermission, operation, resource},
    db::{
        handlers::{Assignments, Profiles, Repository, Shifts, shifts::ShiftFilter},
        models::{
            assignments::{AssignmentCreateDBRequest, AssignmentDBResponse},
            profiles::ProfileDBResponse,
            shifts::{ShiftCreateDBRequest, ShiftDBResponse, ShiftUpdateDBRequest},
        },
    },
    errors::{Error, Result},
    notifications::{self, Notice, NotificationKind, Recipient},
    scheduling::{self, BookingRules},
    types::{ShiftId, UserId},
};

/// How many upcoming shifts are scored before the top recommendations are picked.
const RECOMMENDATION_CANDIDATES: i64 = 100;

fn shift_not_found(id: ShiftId) -> Error {
    Error::NotFound {
        resource: "Shift".to_string(),
        id: id.to_string(),
    }
}

/// Everything the eligibility checks need about one volunteer and one shift.
struct BookingContext {
    shift: ShiftDBResponse,
    profile: Option<ProfileDBResponse>,
    same_day: Vec<AssignmentDBResponse>,
}

async fn load_booking_context(conn: &mut PgConnection, shift_id: ShiftId, volunteer_id: UserId) -> Result<BookingContext> {
    let shift = Shifts::new(&mut *conn)
        .get_by_id(shift_id)
        .await?
        .ok_or_else(|| shift_not_found(shift_id))?;
    let profile = Profiles::new(&mut *conn).get_by_id(volunteer_id).await?;

    let first_day = shift.start_time.date_naive();
    let last_day = shift.end_time.date_naive();
    let mut assignments = Assignments::new(&mut *conn);
    let mut same_day = assignments.confirmed_on_day(volunteer_id, first_day).await?;
    if last_day != first_day {
        same_day.extend(assignments.confirmed_on_day(volunteer_id, last_day).await?);
    }

    Ok(BookingContext { shift, profile, same_day })
}

/// List shifts
#[utoipa::path(
    get,
    path = "/shifts",
    tag = "shifts",
    params(ListShiftsQuery),
    responses(
        (status = 200, description = "Page of shifts", body = PaginatedResponse<ShiftResponse>),
        (status = 401, description = "Unauthorized"),
    ),
    security(("session_token" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_shifts(
    State(state): State<AppState>,
    Query(query): Query<ListShiftsQuery>,
    _: RequiresPermission<resource::Shifts, operation::ReadAll>,
) -> Result<Json<PaginatedResponse<ShiftResponse>>> {
    let (skip, limit) = query.pagination.params();
    let filter = ShiftFilter::new(skip, limit)
        .between(query.from, query.to)
        .with_status(query.status)
        .available(query.available.unwrap_or(false));

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Shifts::new(&mut conn);
    let shifts = repo.list(&filter).await?;
    let total_count = repo.count(&filter).await?;

    Ok(Json(PaginatedResponse::new(
        shifts.into_iter().map(ShiftResponse::from).collect(),
        total_count,
        skip,
        limit,
    )))
}

/// Get one shift
#[utoipa::path(
    get,
    path = "/shifts/{id}",
    tag = "shifts",
    params(("id" = uuid::Uuid, Path, description = "Shift ID")),
    responses(
        (status = 200, description = "Shift", body = ShiftResponse),
        (status = 404, description = "Shift not found"),
    ),
    security(("session_token" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_shift(
    State(state): State<AppState>,
    Path(id): Path<ShiftId>,
    _: RequiresPermission<resource::Shifts, operation::ReadAll>,
) -> Result<Json<ShiftResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let shift = Shifts::new(&mut conn).get_by_id(id).await?.ok_or_else(|| shift_not_found(id))?;
    Ok(Json(ShiftResponse::from(shift)))
}

/// Create a shift
#[utoipa::path(
    post,
    path = "/admin/shifts",
    tag = "shifts",
    request_body = ShiftCreate,
    responses(
        (status = 201, description = "Shift created", body = ShiftResponse),
        (status = 400, description = "Invalid shift"),
        (status = 403, description = "Insufficient permissions"),
    ),
    security(("session_token" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn create_shift(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Shifts, operation::CreateAll>,
    Json(body): Json<ShiftCreate>,
) -> Result<(StatusCode, Json<ShiftResponse>)> {
    body.validate().map_err(|message| Error::BadRequest { message })?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let shift = Shifts::new(&mut conn).create(&ShiftCreateDBRequest::new(body, current_user.id)).await?;
    drop(conn);

    audit::record(
        &state.db,
        &current_user,
        AuditEntry::new("shift.create", "shift", shift.id).with_details(json!({ "title": shift.title })),
    )
    .await;

    Ok((StatusCode::CREATED, Json(ShiftResponse::from(shift))))
}

/// Update a shift
#[utoipa::path(
    patch,
    path = "/admin/shifts/{id}",
    tag = "shifts",
    request_body = ShiftUpdate,
    params(("id" = uuid::Uuid, Path, description = "Shift ID")),
    responses(
        (status = 200, description = "Shift updated", body = ShiftResponse),
        (status = 400, description = "Invalid shift"),
        (status = 404, description = "Shift not found"),
    ),
    security(("session_token" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn update_shift(
    State(state): State<AppState>,
    Path(id): Path<ShiftId>,
    current_user: RequiresPermission<resource::Shifts, operation::UpdateAll>,
    Json(body): Json<ShiftUpdate>,
) -> Result<Json<ShiftResponse>> {
    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Shifts::new(&mut tx);
    let existing = repo.get_by_id(id).await?.ok_or_else(|| shift_not_found(id))?;

    // Validate the shape the row will have after the patch
    validate_shape(
        body.start_time.unwrap_or(existing.start_time),
        body.end_time.unwrap_or(existing.end_time),
        existing.is_flexible,
        body.flexible_slots.unwrap_or(existing.flexible_slots),
        body.minimum_hours.or(existing.minimum_hours),
        body.maximum_hours.or(existing.maximum_hours),
    )
    .map_err(|message| Error::BadRequest { message })?;
    if let Some(slots) = body.flexible_slots
        && existing.is_flexible
        && slots < existing.flexible_slots_used
    {
        return Err(Error::BadRequest {
            message: format!("{} slots are already booked", existing.flexible_slots_used),
        });
    }

    let updated = repo.update(id, &ShiftUpdateDBRequest::from(body)).await?;
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    audit::record(&state.db, &current_user, AuditEntry::new("shift.update", "shift", id)).await;

    Ok(Json(ShiftResponse::from(updated)))
}

/// Delete a shift and its assignments
#[utoipa::path(
    delete,
    path = "/admin/shifts/{id}",
    tag = "shifts",
    params(("id" = uuid::Uuid, Path, description = "Shift ID")),
    responses(
        (status = 204, description = "Shift deleted"),
        (status = 404, description = "Shift not found"),
    ),
    security(("session_token" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn delete_shift(
    State(state): State<AppState>,
    Path(id): Path<ShiftId>,
    current_user: RequiresPermission<resource::Shifts, operation::UpdateAll>,
) -> Result<StatusCode> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    if !Shifts::new(&mut conn).delete(id).await? {
        return Err(shift_not_found(id));
    }
    drop(conn);

    audit::record(&state.db, &current_user, AuditEntry::new("shift.delete", "shift", id)).await;

    Ok(StatusCode::NO_CONTENT)
}

/// Book a shift
///
/// Flexible shifts accept a time selection (`HH:MM` start and end plus the stated duration in
/// hours). Without one the whole published window is booked.
#[utoipa::path(
    post,
    path = "/volunteer/shifts/{id}/signup",
    tag = "shifts",
    request_body(content = Option<SignupRequest>),
    params(("id" = uuid::Uuid, Path, description = "Shift ID")),
    responses(
        (status = 201, description = "Shift booked", body = SignupResponse),
        (status = 403, description = "Too late to book, or requirements not met", body = crate::errors::RejectionBody),
        (status = 404, description = "Shift not found"),
        (status = 409, description = "Shift taken, time conflict, capacity full or invalid time range", body = crate::errors::RejectionBody),
    ),
    security(("session_token" = []))
)]
#[tracing::instrument(skip_all, fields(shift_id = %id))]
pub async fn signup(
    State(state): State<AppState>,
    Path(id): Path<ShiftId>,
    current_user: RequiresPermission<resource::Assignments, operation::CreateOwn>,
    request: Option<Json<SignupRequest>>,
) -> Result<(StatusCode, Json<SignupResponse>)> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    let rules = BookingRules::from(&state.config.scheduling);
    let now = Utc::now();

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;
    let context = load_booking_context(&mut tx, id, current_user.id).await?;
    let range = scheduling::evaluate(&context.shift, context.profile.as_ref(), &request, &context.same_day, now, &rules)?;

    let assignment = Assignments::new(&mut tx)
        .book(&AssignmentCreateDBRequest {
            shift_id: id,
            volunteer_id: current_user.id,
            start_time: range.start,
            end_time: range.end,
            duration_hours: range.hours(),
            is_flexible: context.shift.is_flexible,
        })
        .await?;
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    tracing::info!(assignment_id = %assignment.id, hours = assignment.duration_hours, "Shift booked");

    notifications::notify(
        &state.db,
        Recipient::user(current_user.id, current_user.email.clone(), current_user.display_name.clone()),
        Notice::new(
            NotificationKind::ShiftBooked,
            format!("You're booked on {}", assignment.shift_title),
            format!(
                "See you on {} from {} to {}.",
                assignment.start_time.format("%A %-d %B"),
                assignment.start_time.format("%H:%M"),
                assignment.end_time.format("%H:%M")
            ),
        )
        .with_link("/volunteer/assignments"),
    )
    .await;

    Ok((
        StatusCode::CREATED,
        Json(SignupResponse {
            assignment_id: assignment.id,
            shift_id: id,
            shift_title: assignment.shift_title,
            start_time: assignment.start_time,
            end_time: assignment.end_time,
            duration_hours: assignment.duration_hours,
            is_flexible: assignment.is_flexible,
            message: "Successfully signed up for shift".to_string(),
        }),
    ))
}

/// Check whether the caller may book a shift
///
/// Reports every failed check instead of stopping at the first, together with the caller's
/// running statistics, requirement match and recommendation score.
#[utoipa::path(
    get,
    path = "/volunteer/shifts/{id}/validation",
    tag = "shifts",
    params(
        ("id" = uuid::Uuid, Path, description = "Shift ID"),
        ("start_time" = Option<String>, Query, description = "Selection start, HH:MM"),
        ("end_time" = Option<String>, Query, description = "Selection end, HH:MM"),
        ("duration" = Option<f64>, Query, description = "Stated selection length in hours"),
    ),
    responses(
        (status = 200, description = "Eligibility report", body = ShiftValidationResponse),
        (status = 404, description = "Shift not found"),
    ),
    security(("session_token" = []))
)]
#[tracing::instrument(skip_all, fields(shift_id = %id))]
pub async fn validate_signup(
    State(state): State<AppState>,
    Path(id): Path<ShiftId>,
    Query(request): Query<SignupRequest>,
    current_user: RequiresPermission<resource::Assignments, operation::CreateOwn>,
) -> Result<Json<ShiftValidationResponse>> {
    let rules = BookingRules::from(&state.config.scheduling);
    let now = Utc::now();

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let context = load_booking_context(&mut conn, id, current_user.id).await?;
    let history = Assignments::new(&mut conn).history(current_user.id).await?;

    let assessment = scheduling::assess(&context.shift, context.profile.as_ref(), &request, &context.same_day, now, &rules);
    let stats = scheduling::volunteer_stats(&history, now);

    Ok(Json(ShiftValidationResponse {
        shift_id: id,
        eligible: assessment.is_eligible(),
        reasons: assessment.rejections.into_iter().map(Into::into).collect(),
        warnings: scheduling::warnings(&stats, state.config.scheduling.open_shift_warning_threshold),
        requirements: scheduling::requirement_match(&context.shift, context.profile.as_ref()),
        recommendation_score: scheduling::recommendation_score(&context.shift, context.profile.as_ref(), now),
        stats,
    }))
}

/// Upcoming open shifts ranked for the caller
#[utoipa::path(
    get,
    path = "/volunteer/shifts/recommended",
    tag = "shifts",
    params(Pagination),
    responses(
        (status = 200, description = "Shifts ordered by recommendation score", body = Vec<RecommendedShift>),
    ),
    security(("session_token" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn recommended_shifts(
    State(state): State<AppState>,
    Query(pagination): Query<Pagination>,
    current_user: RequiresPermission<resource::Assignments, operation::CreateOwn>,
) -> Result<Json<Vec<RecommendedShift>>> {
    let now = Utc::now();
    let rules = BookingRules::from(&state.config.scheduling);
    let max = state.config.scheduling.max_recommendations;
    let limit = pagination.limit.map_or(max, |l| l.clamp(1, max));

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let profile = Profiles::new(&mut conn).get_by_id(current_user.id).await?;
    let booked: Vec<ShiftId> = Assignments::new(&mut conn)
        .history(current_user.id)
        .await?
        .into_iter()
        .filter(|a| a.status == crate::api::models::assignments::AssignmentStatus::Confirmed)
        .map(|a| a.shift_id)
        .collect();
    let candidates = Shifts::new(&mut conn)
        .upcoming_open(now + rules.min_lead_time, RECOMMENDATION_CANDIDATES)
        .await?;

    let mut ranked: Vec<RecommendedShift> = candidates
        .into_iter()
        .filter(|shift| !booked.contains(&shift.id))
        .map(|shift| {
            let score = scheduling::recommendation_score(&shift, profile.as_ref(), now);
            let matched_skills = scheduling::requirement_match(&shift, profile.as_ref()).matched_skills;
            RecommendedShift {
                shift: ShiftResponse::from(shift),
                score,
                matched_skills,
            }
        })
        .collect();

    // Stable sort keeps soonest-first among equal scores
    ranked.sort_by(|a, b| b.score.cmp(&a.score));
    ranked.truncate(limit as usize);

    Ok(Json(ranked))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::assignments::AssignmentStatus;
    use crate::api::models::users::{Role, UserResponse};
    use crate::db::handlers::assignments::AssignmentFilter;
    use crate::errors::{RejectionBody, RejectionCode};
    use crate::test_utils::{add_auth_headers, create_test_admin_user, create_test_app, create_test_user, sample_shift};
    use chrono::{DateTime, Duration, TimeZone, Timelike};
    use sqlx::PgPool;

    /// A date at least three days out, at the given hour, so lead time never interferes.
    fn upcoming_at(hour: u32) -> DateTime<Utc> {
        let day = (Utc::now() + Duration::days(3)).date_naive();
        Utc.from_utc_datetime(&day.and_hms_opt(hour, 0, 0).unwrap())
    }

    async fn insert_shift(pool: &PgPool, admin: &UserResponse, start: DateTime<Utc>, flexible: bool) -> ShiftDBResponse {
        let mut conn = pool.acquire().await.unwrap();
        Shifts::new(&mut conn).create(&sample_shift(admin.id, start, flexible)).await.unwrap()
    }

    fn assert_rejected(response: &axum_test::TestResponse, status: StatusCode, code: RejectionCode) -> RejectionBody {
        response.assert_status(status);
        let body: RejectionBody = response.json();
        assert_eq!(body.code, code, "unexpected rejection: {}", body.reason);
        body
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_admin_creates_and_lists_shifts(pool: PgPool) {
        let (server, _bg) = create_test_app(pool.clone()).await;
        let admin = create_test_admin_user(&pool, Role::Admin).await;
        let volunteer = create_test_user(&pool, Role::Volunteer).await;
        let admin_auth = add_auth_headers(&admin);
        let volunteer_auth = add_auth_headers(&volunteer);
        let start = upcoming_at(8);

        let body = json!({
            "title": "Soup kitchen",
            "start_time": start,
            "end_time": start + Duration::hours(4),
            "is_flexible": true,
            "flexible_slots": 3,
            "minimum_hours": 1.0,
            "maximum_hours": 4.0,
            "required_skills": ["Cooking"]
        });

        server
            .post("/api/v1/admin/shifts")
            .add_header(&volunteer_auth[0].0, &volunteer_auth[0].1)
            .json(&body)
            .await
            .assert_status(StatusCode::FORBIDDEN);

        let response = server
            .post("/api/v1/admin/shifts")
            .add_header(&admin_auth[0].0, &admin_auth[0].1)
            .json(&body)
            .await;
        response.assert_status(StatusCode::CREATED);
        let created: ShiftResponse = response.json();
        assert_eq!(created.available_slots, 3);
        assert_eq!(created.required_skills, vec!["cooking".to_string()]);

        let page: PaginatedResponse<ShiftResponse> = server
            .get("/api/v1/shifts?available=true")
            .add_header(&volunteer_auth[0].0, &volunteer_auth[0].1)
            .await
            .json();
        assert_eq!(page.total_count, 1);
        assert_eq!(page.data[0].id, created.id);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_shift_rejects_inverted_window(pool: PgPool) {
        let (server, _bg) = create_test_app(pool.clone()).await;
        let admin = create_test_admin_user(&pool, Role::Admin).await;
        let auth = add_auth_headers(&admin);
        let start = upcoming_at(10);

        server
            .post("/api/v1/admin/shifts")
            .add_header(&auth[0].0, &auth[0].1)
            .json(&json!({ "title": "Backwards", "start_time": start, "end_time": start - Duration::hours(1) }))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_signup_too_late(pool: PgPool) {
        let (server, _bg) = create_test_app(pool.clone()).await;
        let admin = create_test_admin_user(&pool, Role::Admin).await;
        let volunteer = create_test_user(&pool, Role::Volunteer).await;
        let auth = add_auth_headers(&volunteer);
        let shift = insert_shift(&pool, &admin, Utc::now() + Duration::minutes(90), false).await;

        let response = server
            .post(&format!("/api/v1/volunteer/shifts/{}/signup", shift.id))
            .add_header(&auth[0].0, &auth[0].1)
            .await;
        assert_rejected(&response, StatusCode::FORBIDDEN, RejectionCode::TooLate);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_fixed_shift_taken_and_time_conflict(pool: PgPool) {
        let (server, _bg) = create_test_app(pool.clone()).await;
        let admin = create_test_admin_user(&pool, Role::Admin).await;
        let first = create_test_user(&pool, Role::Volunteer).await;
        let second = create_test_user(&pool, Role::Volunteer).await;
        let first_auth = add_auth_headers(&first);
        let second_auth = add_auth_headers(&second);

        let morning = insert_shift(&pool, &admin, upcoming_at(8), false).await;
        let overlapping = insert_shift(&pool, &admin, upcoming_at(10), false).await;

        let response = server
            .post(&format!("/api/v1/volunteer/shifts/{}/signup", morning.id))
            .add_header(&first_auth[0].0, &first_auth[0].1)
            .await;
        response.assert_status(StatusCode::CREATED);
        let booked: SignupResponse = response.json();
        assert_eq!(booked.duration_hours, 4.0);
        assert!(!booked.is_flexible);

        let taken = server
            .post(&format!("/api/v1/volunteer/shifts/{}/signup", morning.id))
            .add_header(&second_auth[0].0, &second_auth[0].1)
            .await;
        assert_rejected(&taken, StatusCode::CONFLICT, RejectionCode::ShiftTaken);

        // 10:00-14:00 overlaps the confirmed 08:00-12:00 booking
        let conflict = server
            .post(&format!("/api/v1/volunteer/shifts/{}/signup", overlapping.id))
            .add_header(&first_auth[0].0, &first_auth[0].1)
            .await;
        assert_rejected(&conflict, StatusCode::CONFLICT, RejectionCode::TimeConflict);

        let mut conn = pool.acquire().await.unwrap();
        let shift = Shifts::new(&mut conn).get_by_id(morning.id).await.unwrap().unwrap();
        assert_eq!(shift.assigned_volunteer_id, Some(first.id));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_flexible_capacity_full(pool: PgPool) {
        let (server, _bg) = create_test_app(pool.clone()).await;
        let admin = create_test_admin_user(&pool, Role::Admin).await;
        let shift = insert_shift(&pool, &admin, upcoming_at(8), true).await;
        assert_eq!(shift.flexible_slots, 2);

        for _ in 0..2 {
            let volunteer = create_test_user(&pool, Role::Volunteer).await;
            let auth = add_auth_headers(&volunteer);
            server
                .post(&format!("/api/v1/volunteer/shifts/{}/signup", shift.id))
                .add_header(&auth[0].0, &auth[0].1)
                .await
                .assert_status(StatusCode::CREATED);
        }

        let third = create_test_user(&pool, Role::Volunteer).await;
        let auth = add_auth_headers(&third);
        let response = server
            .post(&format!("/api/v1/volunteer/shifts/{}/signup", shift.id))
            .add_header(&auth[0].0, &auth[0].1)
            .await;
        assert_rejected(&response, StatusCode::CONFLICT, RejectionCode::CapacityFull);

        let mut conn = pool.acquire().await.unwrap();
        let shift = Shifts::new(&mut conn).get_by_id(shift.id).await.unwrap().unwrap();
        assert_eq!(shift.flexible_slots_used, 2);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_flexible_time_selection(pool: PgPool) {
        let (server, _bg) = create_test_app(pool.clone()).await;
        let admin = create_test_admin_user(&pool, Role::Admin).await;
        let volunteer = create_test_user(&pool, Role::Volunteer).await;
        let auth = add_auth_headers(&volunteer);
        // Window 08:00-12:00, one to four hours
        let shift = insert_shift(&pool, &admin, upcoming_at(8), true).await;

        let mismatch = server
            .post(&format!("/api/v1/volunteer/shifts/{}/signup", shift.id))
            .add_header(&auth[0].0, &auth[0].1)
            .json(&json!({ "start_time": "09:00", "end_time": "10:30", "duration": 1.0 }))
            .await;
        let body = assert_rejected(&mismatch, StatusCode::CONFLICT, RejectionCode::InvalidTimeRange);
        assert_eq!(body.reason, scheduling::DURATION_MISMATCH);

        let outside = server
            .post(&format!("/api/v1/volunteer/shifts/{}/signup", shift.id))
            .add_header(&auth[0].0, &auth[0].1)
            .json(&json!({ "start_time": "07:00", "end_time": "09:00", "duration": 2.0 }))
            .await;
        assert_rejected(&outside, StatusCode::CONFLICT, RejectionCode::InvalidTimeRange);

        let response = server
            .post(&format!("/api/v1/volunteer/shifts/{}/signup", shift.id))
            .add_header(&auth[0].0, &auth[0].1)
            .json(&json!({ "start_time": "09:00", "end_time": "10:30", "duration": 1.5 }))
            .await;
        response.assert_status(StatusCode::CREATED);
        let booked: SignupResponse = response.json();
        assert!(booked.is_flexible);
        assert_eq!(booked.duration_hours, 1.5);
        assert_eq!(booked.start_time.hour(), 9);
        assert_eq!(booked.end_time.minute(), 30);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_required_role_not_met(pool: PgPool) {
        let (server, _bg) = create_test_app(pool.clone()).await;
        let admin = create_test_admin_user(&pool, Role::Admin).await;
        let volunteer = create_test_user(&pool, Role::Volunteer).await;
        let auth = add_auth_headers(&volunteer);

        let mut request = sample_shift(admin.id, upcoming_at(8), false);
        request.required_role = Some("driver".to_string());
        let mut conn = pool.acquire().await.unwrap();
        let shift = Shifts::new(&mut conn).create(&request).await.unwrap();
        drop(conn);

        let response = server
            .post(&format!("/api/v1/volunteer/shifts/{}/signup", shift.id))
            .add_header(&auth[0].0, &auth[0].1)
            .await;
        assert_rejected(&response, StatusCode::FORBIDDEN, RejectionCode::RequirementsNotMet);

        server
            .patch("/api/v1/volunteer/profile")
            .add_header(&auth[0].0, &auth[0].1)
            .json(&json!({ "roles": ["Driver"] }))
            .await
            .assert_status_ok();

        server
            .post(&format!("/api/v1/volunteer/shifts/{}/signup", shift.id))
            .add_header(&auth[0].0, &auth[0].1)
            .await
            .assert_status(StatusCode::CREATED);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_validation_reports_all_failures(pool: PgPool) {
        let (server, _bg) = create_test_app(pool.clone()).await;
        let admin = create_test_admin_user(&pool, Role::Admin).await;
        let volunteer = create_test_user(&pool, Role::Volunteer).await;
        let auth = add_auth_headers(&volunteer);

        let mut request = sample_shift(admin.id, Utc::now() + Duration::minutes(30), false);
        request.required_role = Some("driver".to_string());
        request.required_skills = vec!["first aid".to_string()];
        let mut conn = pool.acquire().await.unwrap();
        let shift = Shifts::new(&mut conn).create(&request).await.unwrap();
        drop(conn);

        let response = server
            .get(&format!("/api/v1/volunteer/shifts/{}/validation", shift.id))
            .add_header(&auth[0].0, &auth[0].1)
            .await;
        response.assert_status_ok();
        let report: ShiftValidationResponse = response.json();
        assert!(!report.eligible);
        let codes: Vec<RejectionCode> = report.reasons.iter().map(|r| r.code).collect();
        assert_eq!(codes, vec![RejectionCode::TooLate, RejectionCode::RequirementsNotMet]);
        assert_eq!(report.requirements.missing_skills, vec!["first aid".to_string()]);
        assert_eq!(report.stats.total_shifts, 0);
        // Base score plus the within-48h urgency bonus
        assert_eq!(report.recommendation_score, 70);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_recommendations_rank_matching_shifts_first(pool: PgPool) {
        let (server, _bg) = create_test_app(pool.clone()).await;
        let admin = create_test_admin_user(&pool, Role::Admin).await;
        let volunteer = create_test_user(&pool, Role::Volunteer).await;
        let auth = add_auth_headers(&volunteer);

        server
            .patch("/api/v1/volunteer/profile")
            .add_header(&auth[0].0, &auth[0].1)
            .json(&json!({ "skills": ["cooking"] }))
            .await
            .assert_status_ok();

        let plain = insert_shift(&pool, &admin, upcoming_at(8), false).await;
        let mut request = sample_shift(admin.id, upcoming_at(14), false);
        request.required_skills = vec!["cooking".to_string()];
        let mut conn = pool.acquire().await.unwrap();
        let matching = Shifts::new(&mut conn).create(&request).await.unwrap();
        drop(conn);

        let ranked: Vec<RecommendedShift> = server
            .get("/api/v1/volunteer/shifts/recommended")
            .add_header(&auth[0].0, &auth[0].1)
            .await
            .json();
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].shift.id, matching.id);
        assert_eq!(ranked[0].matched_skills, vec!["cooking".to_string()]);
        assert_eq!(ranked[1].shift.id, plain.id);

        // Booked shifts drop out of the list
        server
            .post(&format!("/api/v1/volunteer/shifts/{}/signup", matching.id))
            .add_header(&auth[0].0, &auth[0].1)
            .await
            .assert_status(StatusCode::CREATED);
        let ranked: Vec<RecommendedShift> = server
            .get("/api/v1/volunteer/shifts/recommended")
            .add_header(&auth[0].0, &auth[0].1)
            .await
            .json();
        assert!(ranked.iter().all(|r| r.shift.id != matching.id));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_delete_shift_removes_assignments(pool: PgPool) {
        let (server, _bg) = create_test_app(pool.clone()).await;
        let admin = create_test_admin_user(&pool, Role::Admin).await;
        let volunteer = create_test_user(&pool, Role::Volunteer).await;
        let admin_auth = add_auth_headers(&admin);
        let auth = add_auth_headers(&volunteer);
        let shift = insert_shift(&pool, &admin, upcoming_at(8), false).await;

        server
            .post(&format!("/api/v1/volunteer/shifts/{}/signup", shift.id))
            .add_header(&auth[0].0, &auth[0].1)
            .await
            .assert_status(StatusCode::CREATED);

        server
            .delete(&format!("/api/v1/admin/shifts/{}", shift.id))
            .add_header(&admin_auth[0].0, &admin_auth[0].1)
            .await
            .assert_status(StatusCode::NO_CONTENT);

        let mut conn = pool.acquire().await.unwrap();
        let remaining = Assignments::new(&mut conn)
            .count(&AssignmentFilter::new(0, 10).for_volunteer(volunteer.id).with_status(Some(AssignmentStatus::Confirmed)))
            .await
            .unwrap();
        assert_eq!(remaining, 0);
    }
}
