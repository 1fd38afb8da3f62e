use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::Utc;
use serde_json::json;

use crate::{
    AppState,
    api::models::{
        assignments::{AssignmentResponse, CancelRequest, CompleteRequest, ListAssignmentsQuery},
        pagination::PaginatedResponse,
        users::CurrentUser,
    },
    audit::{self, AuditEntry},
    auth::permissions::{self, RequiresPermission, operation, resource},
    db::{
        handlers::{Assignments, Repository, Users, assignments::AssignmentFilter},
        models::assignments::AssignmentDBResponse,
    },
    errors::{Error, RejectionCode, Result},
    notifications::{self, Notice, NotificationKind, Recipient},
    types::{AssignmentId, Operation, Resource, UserId},
};

fn assignment_not_found(id: AssignmentId) -> Error {
    Error::NotFound {
        resource: "Assignment".to_string(),
        id: id.to_string(),
    }
}

fn not_confirmed(assignment: &AssignmentDBResponse) -> Error {
    Error::rejected(
        RejectionCode::InvalidState,
        format!("assignment is {:?}, only confirmed assignments can change", assignment.status).to_lowercase(),
    )
}

async fn page(state: &AppState, filter: AssignmentFilter) -> Result<PaginatedResponse<AssignmentResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Assignments::new(&mut conn);
    let assignments = repo.list(&filter).await?;
    let total_count = repo.count(&filter).await?;

    Ok(PaginatedResponse::new(
        assignments.into_iter().map(AssignmentResponse::from).collect(),
        total_count,
        filter.skip,
        filter.limit,
    ))
}

/// Notify the volunteer who holds an assignment. The acting user is reused when they are the
/// volunteer; otherwise the account is looked up.
async fn notify_volunteer(state: &AppState, actor: &CurrentUser, volunteer_id: UserId, notice: Notice) {
    let recipient = if actor.id == volunteer_id {
        Recipient::user(actor.id, actor.email.clone(), actor.display_name.clone())
    } else {
        let user = match state.db.acquire().await {
            Ok(mut conn) => Users::new(&mut conn).get_by_id(volunteer_id).await,
            Err(e) => Err(e.into()),
        };
        match user {
            Ok(Some(user)) => Recipient::user(user.id, user.email, user.display_name),
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(volunteer_id = %volunteer_id, error = %e, "Could not load volunteer for notification");
                return;
            }
        }
    };
    notifications::notify(&state.db, recipient, notice).await;
}

/// List the caller's assignments
#[utoipa::path(
    get,
    path = "/volunteer/assignments",
    tag = "assignments",
    params(ListAssignmentsQuery),
    responses(
        (status = 200, description = "Page of assignments", body = PaginatedResponse<AssignmentResponse>),
    ),
    security(("session_token" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_my_assignments(
    State(state): State<AppState>,
    Query(query): Query<ListAssignmentsQuery>,
    current_user: RequiresPermission<resource::Assignments, operation::ReadOwn>,
) -> Result<Json<PaginatedResponse<AssignmentResponse>>> {
    let (skip, limit) = query.pagination.params();
    let filter = AssignmentFilter::new(skip, limit)
        .for_volunteer(current_user.id)
        .with_status(query.status)
        .starting_after(query.upcoming.unwrap_or(false).then(Utc::now));

    Ok(Json(page(&state, filter).await?))
}

/// Cancel an assignment
///
/// Only confirmed assignments can be cancelled. The place is handed back to the shift and the
/// hours of notice given are recorded.
#[utoipa::path(
    post,
    path = "/volunteer/assignments/{id}/cancel",
    tag = "assignments",
    request_body(content = Option<CancelRequest>),
    params(("id" = uuid::Uuid, Path, description = "Assignment ID")),
    responses(
        (status = 200, description = "Assignment cancelled", body = AssignmentResponse),
        (status = 404, description = "Assignment not found"),
        (status = 409, description = "Assignment is not confirmed", body = crate::errors::RejectionBody),
    ),
    security(("session_token" = []))
)]
#[tracing::instrument(skip_all, fields(assignment_id = %id))]
pub async fn cancel_assignment(
    State(state): State<AppState>,
    Path(id): Path<AssignmentId>,
    current_user: RequiresPermission<resource::Assignments, operation::UpdateOwn>,
    body: Option<Json<CancelRequest>>,
) -> Result<Json<AssignmentResponse>> {
    let reason = body.and_then(|Json(b)| b.reason);
    let now = Utc::now();

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Assignments::new(&mut tx);
    let existing = repo.get_by_id(id).await?.ok_or_else(|| assignment_not_found(id))?;

    // Someone else's booking looks missing unless the caller manages assignments
    if existing.volunteer_id != current_user.id
        && !permissions::has_permission(&current_user, Resource::Assignments, Operation::UpdateAll)
    {
        return Err(assignment_not_found(id));
    }

    let cancelled = repo.cancel(id, reason.as_deref(), now).await?.ok_or_else(|| {
        Error::rejected(
            RejectionCode::NotCancellable,
            format!("assignment is {:?} and cannot be cancelled", existing.status).to_lowercase(),
        )
    })?;
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    tracing::info!(hours_notice = ?cancelled.hours_notice, "Assignment cancelled");

    notify_volunteer(
        &state,
        &current_user,
        cancelled.volunteer_id,
        Notice::new(
            NotificationKind::AssignmentCancelled,
            format!("Cancelled: {}", cancelled.shift_title),
            format!(
                "Your booking on {} has been cancelled.",
                cancelled.start_time.format("%A %-d %B at %H:%M")
            ),
        ),
    )
    .await;

    Ok(Json(AssignmentResponse::from(cancelled)))
}

/// List all assignments
#[utoipa::path(
    get,
    path = "/admin/assignments",
    tag = "assignments",
    params(ListAssignmentsQuery),
    responses(
        (status = 200, description = "Page of assignments", body = PaginatedResponse<AssignmentResponse>),
        (status = 403, description = "Insufficient permissions"),
    ),
    security(("session_token" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_assignments(
    State(state): State<AppState>,
    Query(query): Query<ListAssignmentsQuery>,
    _: RequiresPermission<resource::Assignments, operation::ReadAll>,
) -> Result<Json<PaginatedResponse<AssignmentResponse>>> {
    let (skip, limit) = query.pagination.params();
    let mut filter = AssignmentFilter::new(skip, limit)
        .with_status(query.status)
        .starting_after(query.upcoming.unwrap_or(false).then(Utc::now));
    if let Some(volunteer_id) = query.volunteer_id {
        filter = filter.for_volunteer(volunteer_id);
    }
    if let Some(shift_id) = query.shift_id {
        filter = filter.for_shift(shift_id);
    }

    Ok(Json(page(&state, filter).await?))
}

/// Mark an assignment completed
#[utoipa::path(
    post,
    path = "/admin/assignments/{id}/complete",
    tag = "assignments",
    request_body(content = Option<CompleteRequest>),
    params(("id" = uuid::Uuid, Path, description = "Assignment ID")),
    responses(
        (status = 200, description = "Assignment completed", body = AssignmentResponse),
        (status = 400, description = "Invalid hours"),
        (status = 404, description = "Assignment not found"),
        (status = 409, description = "Assignment is not confirmed", body = crate::errors::RejectionBody),
    ),
    security(("session_token" = []))
)]
#[tracing::instrument(skip_all, fields(assignment_id = %id))]
pub async fn complete_assignment(
    State(state): State<AppState>,
    Path(id): Path<AssignmentId>,
    current_user: RequiresPermission<resource::Assignments, operation::UpdateAll>,
    body: Option<Json<CompleteRequest>>,
) -> Result<Json<AssignmentResponse>> {
    let hours_worked = body.and_then(|Json(b)| b.hours_worked);
    if hours_worked.is_some_and(|h| !h.is_finite() || h < 0.0) {
        return Err(Error::BadRequest {
            message: "hours_worked must be zero or more".to_string(),
        });
    }

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Assignments::new(&mut conn);
    let existing = repo.get_by_id(id).await?.ok_or_else(|| assignment_not_found(id))?;
    let completed = repo.complete(id, hours_worked).await?.ok_or_else(|| not_confirmed(&existing))?;
    drop(conn);

    audit::record(
        &state.db,
        &current_user,
        AuditEntry::new("assignment.complete", "shift_assignment", id)
            .with_details(json!({ "hours_worked": completed.hours_worked, "volunteer_id": completed.volunteer_id })),
    )
    .await;

    notify_volunteer(
        &state,
        &current_user,
        completed.volunteer_id,
        Notice::new(
            NotificationKind::AssignmentCompleted,
            format!("Thank you for {}", completed.shift_title),
            format!(
                "We've logged {:.1} hours for your shift. Thanks for giving your time.",
                completed.hours_worked.unwrap_or(completed.duration_hours)
            ),
        ),
    )
    .await;

    Ok(Json(AssignmentResponse::from(completed)))
}

/// Mark a volunteer as not having turned up
#[utoipa::path(
    post,
    path = "/admin/assignments/{id}/no-show",
    tag = "assignments",
    params(("id" = uuid::Uuid, Path, description = "Assignment ID")),
    responses(
        (status = 200, description = "Assignment marked as no-show", body = AssignmentResponse),
        (status = 404, description = "Assignment not found"),
        (status = 409, description = "Assignment is not confirmed", body = crate::errors::RejectionBody),
    ),
    security(("session_token" = []))
)]
#[tracing::instrument(skip_all, fields(assignment_id = %id))]
pub async fn mark_no_show(
    State(state): State<AppState>,
    Path(id): Path<AssignmentId>,
    current_user: RequiresPermission<resource::Assignments, operation::UpdateAll>,
) -> Result<Json<AssignmentResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Assignments::new(&mut conn);
    let existing = repo.get_by_id(id).await?.ok_or_else(|| assignment_not_found(id))?;
    let marked = repo.mark_no_show(id).await?.ok_or_else(|| not_confirmed(&existing))?;
    drop(conn);

    audit::record(
        &state.db,
        &current_user,
        AuditEntry::new("assignment.no_show", "shift_assignment", id).with_details(json!({ "volunteer_id": marked.volunteer_id })),
    )
    .await;

    Ok(Json(AssignmentResponse::from(marked)))
}
