use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde_json::json;

use crate::{
    AppState,
    api::models::{
        applications::{
            ApplicationCreate, ApplicationResponse, ApplicationStatus, ApprovalResponse, BulkAction, BulkActionRequest,
            BulkActionResponse, BulkFailure, ListApplicationsQuery, ReviewRequest,
        },
        pagination::PaginatedResponse,
        users::{CurrentUser, Role},
    },
    audit::{self, AuditEntry},
    auth::{
        permissions::{RequiresPermission, operation, resource},
        utils::generate_username,
    },
    db::{
        errors::DbError,
        handlers::{Applications, Profiles, Repository, Users, applications::ApplicationFilter},
        models::{
            applications::{ApplicationCreateDBRequest, ApplicationDBResponse, ApplicationReviewDBRequest},
            profiles::ProfileCreateDBRequest,
            users::UserCreateDBRequest,
        },
    },
    errors::{Error, RejectionCode, Result},
    notifications::{self, Notice, NotificationKind, Recipient},
    types::ApplicationId,
};

fn application_not_found(id: ApplicationId) -> Error {
    Error::NotFound {
        resource: "Application".to_string(),
        id: id.to_string(),
    }
}

/// Reviews of non-pending applications come back from the repository as protected; callers
/// see them as a state conflict.
fn review_error(id: ApplicationId, error: DbError) -> Error {
    match error {
        DbError::NotFound => application_not_found(id),
        DbError::ProtectedEntity { reason, .. } => Error::rejected(RejectionCode::InvalidState, reason),
        other => Error::Database(other),
    }
}

fn ensure_pending(application: &ApplicationDBResponse) -> Result<()> {
    if application.status == ApplicationStatus::Pending {
        Ok(())
    } else {
        Err(Error::rejected(
            RejectionCode::InvalidState,
            format!("application is already {:?}", application.status).to_lowercase(),
        ))
    }
}

/// Approve one application in a single transaction: find or create the account, grant the
/// Volunteer role, create the profile and mark the application approved.
async fn approve_one(state: &AppState, reviewer: &CurrentUser, id: ApplicationId, notes: Option<String>) -> Result<ApprovalResponse> {
    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;

    let application = Applications::new(&mut tx)
        .get_by_id(id)
        .await?
        .ok_or_else(|| application_not_found(id))?;
    ensure_pending(&application)?;

    let mut users = Users::new(&mut tx);
    let (user, account_created) = match users.get_user_by_email(&application.email).await? {
        Some(existing) => {
            users.add_role(existing.id, Role::Volunteer).await?;
            (existing, false)
        }
        None => {
            let created = users
                .create(&UserCreateDBRequest {
                    username: generate_username(&application.email),
                    email: application.email.clone(),
                    display_name: Some(format!("{} {}", application.first_name, application.last_name)),
                    phone: application.phone.clone(),
                    is_admin: false,
                    roles: vec![Role::Volunteer],
                    // The volunteer sets a password through the reset flow
                    password_hash: None,
                })
                .await?;
            (created, true)
        }
    };

    Profiles::new(&mut tx)
        .get_or_create(&ProfileCreateDBRequest {
            user_id: user.id,
            skills: application.skills.clone(),
            roles: vec![],
            preferred_time_of_day: None,
            bio: application.motivation.clone(),
        })
        .await?;

    let approved = Applications::new(&mut tx)
        .update(
            id,
            &ApplicationReviewDBRequest {
                status: ApplicationStatus::Approved,
                reviewed_by: reviewer.id,
                review_notes: notes,
                user_id: Some(user.id),
            },
        )
        .await
        .map_err(|e| review_error(id, e))?;

    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    notifications::notify(
        &state.db,
        Recipient::user(user.id, user.email.clone(), user.display_name.clone()),
        Notice::new(
            NotificationKind::ApplicationApproved,
            "Welcome aboard!",
            "Your volunteer application has been approved. You can now browse and sign up for shifts.",
        )
        .with_link("/volunteer/shifts"),
    )
    .await;

    Ok(ApprovalResponse {
        application: ApplicationResponse::from(approved),
        user_id: user.id,
        account_created,
    })
}

async fn reject_one(state: &AppState, reviewer: &CurrentUser, id: ApplicationId, notes: Option<String>) -> Result<ApplicationDBResponse> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let rejected = Applications::new(&mut conn)
        .update(
            id,
            &ApplicationReviewDBRequest {
                status: ApplicationStatus::Rejected,
                reviewed_by: reviewer.id,
                review_notes: notes,
                user_id: None,
            },
        )
        .await
        .map_err(|e| review_error(id, e))?;
    drop(conn);

    notifications::notify(
        &state.db,
        Recipient::anonymous(rejected.email.clone(), Some(rejected.first_name.clone())),
        Notice::new(
            NotificationKind::ApplicationRejected,
            "About your volunteer application",
            "Thank you for applying. We are unable to take your application forward at this time.",
        ),
    )
    .await;

    Ok(rejected)
}

async fn archive_one(state: &AppState, reviewer: &CurrentUser, id: ApplicationId) -> Result<ApplicationDBResponse> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    Applications::new(&mut conn)
        .update(
            id,
            &ApplicationReviewDBRequest {
                status: ApplicationStatus::Archived,
                reviewed_by: reviewer.id,
                review_notes: None,
                user_id: None,
            },
        )
        .await
        .map_err(|e| review_error(id, e))
}

async fn delete_one(state: &AppState, id: ApplicationId) -> Result<()> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    if Applications::new(&mut conn).delete(id).await? {
        Ok(())
    } else {
        Err(application_not_found(id))
    }
}

/// Submit a volunteer application
#[utoipa::path(
    post,
    path = "/volunteer/applications",
    tag = "applications",
    request_body = ApplicationCreate,
    responses(
        (status = 201, description = "Application received", body = ApplicationResponse),
        (status = 400, description = "Invalid application"),
        (status = 409, description = "A pending application already exists for this email"),
        (status = 429, description = "Too many requests"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn submit_application(
    State(state): State<AppState>,
    Json(form): Json<ApplicationCreate>,
) -> Result<(StatusCode, Json<ApplicationResponse>)> {
    form.validate().map_err(|message| Error::BadRequest { message })?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let application = Applications::new(&mut conn).create(&ApplicationCreateDBRequest::from(form)).await?;
    drop(conn);

    notifications::notify(
        &state.db,
        Recipient::anonymous(application.email.clone(), Some(application.first_name.clone())),
        Notice::new(
            NotificationKind::ApplicationReceived,
            "We received your application",
            "Thanks for offering to volunteer with us. Our team will review your application shortly.",
        ),
    )
    .await;

    Ok((StatusCode::CREATED, Json(ApplicationResponse::from(application))))
}

/// List volunteer applications
#[utoipa::path(
    get,
    path = "/admin/volunteer/applications",
    tag = "applications",
    params(ListApplicationsQuery),
    responses(
        (status = 200, description = "Page of applications", body = PaginatedResponse<ApplicationResponse>),
        (status = 403, description = "Insufficient permissions"),
    ),
    security(("session_token" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_applications(
    State(state): State<AppState>,
    Query(query): Query<ListApplicationsQuery>,
    _: RequiresPermission<resource::Applications, operation::ReadAll>,
) -> Result<Json<PaginatedResponse<ApplicationResponse>>> {
    let (skip, limit) = query.pagination.params();
    let filter = ApplicationFilter::new(skip, limit).with_status(query.status);

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Applications::new(&mut conn);
    let applications = repo.list(&filter).await?;
    let total_count = repo.count(&filter).await?;

    Ok(Json(PaginatedResponse::new(
        applications.into_iter().map(ApplicationResponse::from).collect(),
        total_count,
        skip,
        limit,
    )))
}

/// Get one application
#[utoipa::path(
    get,
    path = "/admin/volunteer/applications/{id}",
    tag = "applications",
    params(("id" = uuid::Uuid, Path, description = "Application ID")),
    responses(
        (status = 200, description = "Application", body = ApplicationResponse),
        (status = 404, description = "Application not found"),
    ),
    security(("session_token" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_application(
    State(state): State<AppState>,
    Path(id): Path<ApplicationId>,
    _: RequiresPermission<resource::Applications, operation::ReadAll>,
) -> Result<Json<ApplicationResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let application = Applications::new(&mut conn)
        .get_by_id(id)
        .await?
        .ok_or_else(|| application_not_found(id))?;
    Ok(Json(ApplicationResponse::from(application)))
}

/// Approve an application
///
/// Creates the volunteer's account (or reuses one with the same email), grants the Volunteer
/// role and creates their profile.
#[utoipa::path(
    post,
    path = "/admin/volunteer/applications/{id}/approve",
    tag = "applications",
    request_body(content = Option<ReviewRequest>),
    params(("id" = uuid::Uuid, Path, description = "Application ID")),
    responses(
        (status = 200, description = "Application approved", body = ApprovalResponse),
        (status = 404, description = "Application not found"),
        (status = 409, description = "Application is not pending", body = crate::errors::RejectionBody),
    ),
    security(("session_token" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn approve_application(
    State(state): State<AppState>,
    Path(id): Path<ApplicationId>,
    current_user: RequiresPermission<resource::Applications, operation::UpdateAll>,
    review: Option<Json<ReviewRequest>>,
) -> Result<Json<ApprovalResponse>> {
    let notes = review.and_then(|Json(r)| r.notes);
    let approval = approve_one(&state, &current_user, id, notes).await?;

    audit::record(
        &state.db,
        &current_user,
        AuditEntry::new("application.approve", "volunteer_application", id)
            .with_details(json!({ "user_id": approval.user_id, "account_created": approval.account_created })),
    )
    .await;

    Ok(Json(approval))
}

/// Reject an application
#[utoipa::path(
    post,
    path = "/admin/volunteer/applications/{id}/reject",
    tag = "applications",
    request_body(content = Option<ReviewRequest>),
    params(("id" = uuid::Uuid, Path, description = "Application ID")),
    responses(
        (status = 200, description = "Application rejected", body = ApplicationResponse),
        (status = 404, description = "Application not found"),
        (status = 409, description = "Application is not pending", body = crate::errors::RejectionBody),
    ),
    security(("session_token" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn reject_application(
    State(state): State<AppState>,
    Path(id): Path<ApplicationId>,
    current_user: RequiresPermission<resource::Applications, operation::UpdateAll>,
    review: Option<Json<ReviewRequest>>,
) -> Result<Json<ApplicationResponse>> {
    let notes = review.and_then(|Json(r)| r.notes);
    let rejected = reject_one(&state, &current_user, id, notes).await?;

    audit::record(
        &state.db,
        &current_user,
        AuditEntry::new("application.reject", "volunteer_application", id),
    )
    .await;

    Ok(Json(ApplicationResponse::from(rejected)))
}

/// Apply one action to many applications
///
/// Each id is handled on its own. Failures are reported per item and never fail the batch.
#[utoipa::path(
    post,
    path = "/admin/volunteer/bulk",
    tag = "applications",
    request_body = BulkActionRequest,
    responses(
        (status = 200, description = "Per-item outcome", body = BulkActionResponse),
        (status = 403, description = "Insufficient permissions"),
    ),
    security(("session_token" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn bulk_action(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Applications, operation::UpdateAll>,
    Json(request): Json<BulkActionRequest>,
) -> Result<Json<BulkActionResponse>> {
    let mut response = BulkActionResponse::default();

    for id in request.ids.iter().copied() {
        let outcome = match request.action {
            BulkAction::Approve => approve_one(&state, &current_user, id, request.reason.clone()).await.map(|_| ()),
            BulkAction::Reject => reject_one(&state, &current_user, id, request.reason.clone()).await.map(|_| ()),
            BulkAction::Archive => archive_one(&state, &current_user, id).await.map(|_| ()),
            BulkAction::Delete => delete_one(&state, id).await,
        };

        match outcome {
            Ok(()) => response.successful += 1,
            Err(e) => {
                tracing::debug!(application_id = %id, error = %e, "Bulk item failed");
                response.failed.push(BulkFailure {
                    id,
                    error: e.user_message(),
                });
            }
        }
    }

    audit::record(
        &state.db,
        &current_user,
        AuditEntry::new("application.bulk", "volunteer_application", format!("{:?}", request.action).to_lowercase()).with_details(
            json!({ "ids": request.ids, "successful": response.successful, "failed": response.failed.len() }),
        ),
    )
    .await;

    Ok(Json(response))
}
