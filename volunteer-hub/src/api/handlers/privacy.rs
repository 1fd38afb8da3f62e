//! Data export and account deletion requests.
//!
//! Users file requests; an admin processes them. An export snapshot is compiled once, when the
//! request is processed, and stored on the request row so later downloads see the same data.
//! Deletion anonymises the account rather than removing the row, so assignment history and audit
//! entries keep their foreign keys.

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
        applications::ApplicationResponse,
        assignments::AssignmentResponse,
        documents::DocumentResponse,
        messages::MessageResponse,
        pagination::PaginatedResponse,
        privacy::{
            ListPrivacyRequestsQuery, PrivacyRejectRequest, PrivacyRequestCreate, PrivacyRequestKind, PrivacyRequestResponse,
            PrivacyRequestStatus,
        },
        profiles::ProfileResponse,
        support_tickets::TicketResponse,
        users::{CurrentUser, UserResponse},
    },
    audit::{self, AuditEntry},
    auth::permissions::{self, RequiresPermission, operation, resource},
    db::{
        errors::DbError,
        handlers::{
            Applications, Assignments, Documents, Messages, PrivacyRequests, Profiles, Repository, SupportTickets, Users,
            assignments::ACCOUNT_DELETED_REASON, privacy_requests::PrivacyRequestFilter, support_tickets::TicketFilter,
        },
        models::{documents::DocumentDBResponse, privacy_requests::PrivacyRequestDBResponse, users::UserDBResponse},
    },
    errors::{Error, RejectionCode, Result},
    notifications::{self, Notice, NotificationKind, Recipient},
    types::{PrivacyRequestId, Resource},
};

fn request_not_found(id: PrivacyRequestId) -> Error {
    Error::NotFound {
        resource: "Privacy request".to_string(),
        id: id.to_string(),
    }
}

fn already_closed(request: &PrivacyRequestDBResponse) -> Error {
    Error::rejected(
        RejectionCode::InvalidState,
        format!("This request is already {}", format!("{:?}", request.status).to_lowercase()),
    )
}

async fn file_request(
    state: &AppState,
    user: &CurrentUser,
    kind: PrivacyRequestKind,
    body: PrivacyRequestCreate,
) -> Result<(StatusCode, Json<PrivacyRequestResponse>)> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = PrivacyRequests::new(&mut conn);

    if repo.pending_for_user(user.id, kind).await?.is_some() {
        return Err(Error::rejected(
            RejectionCode::InvalidState,
            "You already have a pending request of this kind",
        ));
    }

    let reason = body.reason.as_deref().map(str::trim).filter(|r| !r.is_empty());
    let request = repo.create(user.id, kind, reason).await?;
    tracing::info!(request_id = %request.id, kind = ?kind, "Privacy request filed");

    Ok((StatusCode::CREATED, Json(PrivacyRequestResponse::from(request))))
}

/// Request a copy of your data
#[utoipa::path(
    post,
    path = "/privacy/export-request",
    tag = "privacy",
    request_body(content = Option<PrivacyRequestCreate>),
    responses(
        (status = 201, description = "Request filed", body = PrivacyRequestResponse),
        (status = 409, description = "A pending export request already exists"),
    ),
    security(("session_token" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn request_export(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::PrivacyRequests, operation::CreateOwn>,
    body: Option<Json<PrivacyRequestCreate>>,
) -> Result<(StatusCode, Json<PrivacyRequestResponse>)> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    file_request(&state, &current_user, PrivacyRequestKind::Export, body).await
}

/// Request deletion of your account
#[utoipa::path(
    post,
    path = "/privacy/deletion-request",
    tag = "privacy",
    request_body(content = Option<PrivacyRequestCreate>),
    responses(
        (status = 201, description = "Request filed", body = PrivacyRequestResponse),
        (status = 409, description = "A pending deletion request already exists"),
    ),
    security(("session_token" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn request_deletion(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::PrivacyRequests, operation::CreateOwn>,
    body: Option<Json<PrivacyRequestCreate>>,
) -> Result<(StatusCode, Json<PrivacyRequestResponse>)> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    file_request(&state, &current_user, PrivacyRequestKind::Deletion, body).await
}

/// List your privacy requests
#[utoipa::path(
    get,
    path = "/privacy/requests",
    tag = "privacy",
    params(ListPrivacyRequestsQuery),
    responses(
        (status = 200, description = "Page of requests", body = PaginatedResponse<PrivacyRequestResponse>),
    ),
    security(("session_token" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_my_requests(
    State(state): State<AppState>,
    Query(query): Query<ListPrivacyRequestsQuery>,
    current_user: RequiresPermission<resource::PrivacyRequests, operation::ReadOwn>,
) -> Result<Json<PaginatedResponse<PrivacyRequestResponse>>> {
    list_matching(&state, query, Some(current_user.id)).await
}

/// List every privacy request
#[utoipa::path(
    get,
    path = "/admin/privacy/requests",
    tag = "privacy",
    params(ListPrivacyRequestsQuery),
    responses(
        (status = 200, description = "Page of requests", body = PaginatedResponse<PrivacyRequestResponse>),
        (status = 403, description = "Admin only"),
    ),
    security(("session_token" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_requests(
    State(state): State<AppState>,
    Query(query): Query<ListPrivacyRequestsQuery>,
    _: RequiresPermission<resource::PrivacyRequests, operation::ReadAll>,
) -> Result<Json<PaginatedResponse<PrivacyRequestResponse>>> {
    list_matching(&state, query, None).await
}

async fn list_matching(
    state: &AppState,
    query: ListPrivacyRequestsQuery,
    user_id: Option<crate::types::UserId>,
) -> Result<Json<PaginatedResponse<PrivacyRequestResponse>>> {
    let (skip, limit) = query.pagination.params();
    let filter = PrivacyRequestFilter {
        skip,
        limit,
        user_id,
        status: query.status,
        kind: query.kind,
    };

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = PrivacyRequests::new(&mut conn);
    let requests = repo.list(&filter).await?;
    let total_count = repo.count(&filter).await?;

    Ok(Json(PaginatedResponse::new(
        requests.into_iter().map(PrivacyRequestResponse::from).collect(),
        total_count,
        skip,
        limit,
    )))
}

/// Download a completed export
#[utoipa::path(
    get,
    path = "/privacy/requests/{id}/export",
    tag = "privacy",
    params(("id" = uuid::Uuid, Path, description = "Privacy request ID")),
    responses(
        (status = 200, description = "Exported data", body = Object),
        (status = 404, description = "Request not found"),
        (status = 409, description = "Export not ready"),
    ),
    security(("session_token" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_export(
    State(state): State<AppState>,
    Path(id): Path<PrivacyRequestId>,
    current_user: RequiresPermission<resource::PrivacyRequests, operation::ReadOwn>,
) -> Result<Json<serde_json::Value>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let request = PrivacyRequests::new(&mut conn)
        .get_by_id(id)
        .await?
        .filter(|r| r.user_id == current_user.id || permissions::can_read_all_resources(&current_user, Resource::PrivacyRequests))
        .filter(|r| r.kind == PrivacyRequestKind::Export)
        .ok_or_else(|| request_not_found(id))?;

    request.export_data.map(Json).ok_or_else(|| {
        Error::rejected(
            RejectionCode::InvalidState,
            "The export has not been prepared yet",
        )
    })
}

/// Everything held about one user, as plain JSON.
async fn compile_export(conn: &mut PgConnection, user: UserDBResponse) -> Result<serde_json::Value> {
    let profile = Profiles::new(&mut *conn).get_by_id(user.id).await?.map(ProfileResponse::from);
    let assignments: Vec<AssignmentResponse> = Assignments::new(&mut *conn)
        .history(user.id)
        .await?
        .into_iter()
        .map(AssignmentResponse::from)
        .collect();
    let applications: Vec<ApplicationResponse> = Applications::new(&mut *conn)
        .list_by_email(&user.email)
        .await?
        .into_iter()
        .map(ApplicationResponse::from)
        .collect();
    let tickets: Vec<TicketResponse> = SupportTickets::new(&mut *conn)
        .list(&TicketFilter {
            skip: 0,
            limit: i64::MAX,
            status: None,
            user_id: Some(user.id),
        })
        .await?
        .into_iter()
        .map(TicketResponse::from)
        .collect();
    let messages: Vec<MessageResponse> = Messages::new(&mut *conn)
        .all_for_user(user.id)
        .await?
        .into_iter()
        .map(MessageResponse::from)
        .collect();
    let documents: Vec<DocumentResponse> = Documents::new(&mut *conn)
        .list_for_owner(user.id)
        .await?
        .into_iter()
        .map(DocumentResponse::from)
        .collect();

    Ok(json!({
        "generated_at": Utc::now(),
        "account": UserResponse::from(user),
        "profile": profile,
        "assignments": assignments,
        "applications": applications,
        "support_tickets": tickets,
        "messages": messages,
        "documents": documents,
    }))
}

/// Process a pending request
///
/// Exports are compiled and stored on the request. Deletions anonymise the account, remove the
/// volunteer profile, messages and uploaded documents, and invalidate every session.
#[utoipa::path(
    post,
    path = "/admin/privacy/requests/{id}/process",
    tag = "privacy",
    params(("id" = uuid::Uuid, Path, description = "Privacy request ID")),
    responses(
        (status = 200, description = "Request completed", body = PrivacyRequestResponse),
        (status = 404, description = "Request not found"),
        (status = 409, description = "Request already closed, or it would delete the last admin"),
    ),
    security(("session_token" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn process_request(
    State(state): State<AppState>,
    Path(id): Path<PrivacyRequestId>,
    current_user: RequiresPermission<resource::PrivacyRequests, operation::UpdateAll>,
) -> Result<Json<PrivacyRequestResponse>> {
    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;

    let request = PrivacyRequests::new(&mut tx).get_by_id(id).await?.ok_or_else(|| request_not_found(id))?;
    if request.status != PrivacyRequestStatus::Pending {
        return Err(already_closed(&request));
    }

    let user = Users::new(&mut tx)
        .get_by_id(request.user_id)
        .await?
        .filter(|u| u.deleted_at.is_none())
        .ok_or_else(|| Error::rejected(RejectionCode::InvalidState, "The account has already been deleted"))?;
    let email = user.email.clone();
    let name = user.display_name.clone();

    let mut removed_documents: Vec<DocumentDBResponse> = Vec::new();
    let closed = match request.kind {
        PrivacyRequestKind::Export => {
            let export = compile_export(&mut tx, user).await?;
            PrivacyRequests::new(&mut tx)
                .close(id, PrivacyRequestStatus::Completed, current_user.id, Some(&export), None)
                .await?
        }
        PrivacyRequestKind::Deletion => {
            let mut users = Users::new(&mut tx);
            if users.is_last_admin(&user).await? {
                return Err(Error::rejected(RejectionCode::InvalidState, "The last admin account cannot be deleted"));
            }
            users.anonymize(user.id).await?;
            let released = Assignments::new(&mut tx)
                .cancel_upcoming_for_volunteer(user.id, Some(ACCOUNT_DELETED_REASON), Utc::now())
                .await?;

            Profiles::new(&mut tx).delete(user.id).await?;
            let messages = Messages::new(&mut tx).delete_for_user(user.id).await?;

            let mut documents = Documents::new(&mut tx);
            for document in documents.list_for_owner(user.id).await? {
                if let Some(removed) = documents.delete(document.id).await? {
                    removed_documents.push(removed);
                }
            }
            tracing::info!(
                user_id = %user.id,
                messages,
                documents = removed_documents.len(),
                assignments = released.len(),
                "Account anonymised"
            );

            PrivacyRequests::new(&mut tx)
                .close(id, PrivacyRequestStatus::Completed, current_user.id, None, None)
                .await?
        }
    }
    .ok_or_else(|| already_closed(&request))?;

    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    for document in &removed_documents {
        if let Err(e) = state.document_store.delete(&document.storage_key).await {
            tracing::warn!(document_id = %document.id, error = %e, "Failed to remove content of deleted account");
        }
    }

    audit::record(
        &state.db,
        &current_user,
        AuditEntry::new("privacy.process", "privacy_request", id).with_details(json!({ "kind": closed.kind, "user_id": closed.user_id })),
    )
    .await;

    // A deleted account has no feed left, so only the email goes out
    let (recipient, body) = match closed.kind {
        PrivacyRequestKind::Export => (
            Recipient::user(closed.user_id, email, name),
            "Your data export is ready to download.",
        ),
        PrivacyRequestKind::Deletion => (
            Recipient::anonymous(email, name),
            "Your account and personal data have been deleted.",
        ),
    };
    let mut notice = Notice::new(NotificationKind::PrivacyRequestCompleted, "Your privacy request is complete", body);
    if closed.kind == PrivacyRequestKind::Export {
        notice = notice.with_link(format!("/privacy/requests/{}/export", closed.id));
    }
    notifications::notify(&state.db, recipient, notice).await;

    Ok(Json(PrivacyRequestResponse::from(closed)))
}

/// Reject a pending request
#[utoipa::path(
    post,
    path = "/admin/privacy/requests/{id}/reject",
    tag = "privacy",
    request_body(content = Option<PrivacyRejectRequest>),
    params(("id" = uuid::Uuid, Path, description = "Privacy request ID")),
    responses(
        (status = 200, description = "Request rejected", body = PrivacyRequestResponse),
        (status = 404, description = "Request not found"),
        (status = 409, description = "Request already closed"),
    ),
    security(("session_token" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn reject_request(
    State(state): State<AppState>,
    Path(id): Path<PrivacyRequestId>,
    current_user: RequiresPermission<resource::PrivacyRequests, operation::UpdateAll>,
    body: Option<Json<PrivacyRejectRequest>>,
) -> Result<Json<PrivacyRequestResponse>> {
    let reason = body.and_then(|Json(b)| b.reason);

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = PrivacyRequests::new(&mut conn);
    let request = repo.get_by_id(id).await?.ok_or_else(|| request_not_found(id))?;
    let rejected = repo
        .close(id, PrivacyRequestStatus::Rejected, current_user.id, None, reason.as_deref())
        .await
        .map_err(|e| match e {
            DbError::NotFound => request_not_found(id),
            other => Error::Database(other),
        })?
        .ok_or_else(|| already_closed(&request))?;
    drop(conn);

    audit::record(
        &state.db,
        &current_user,
        AuditEntry::new("privacy.reject", "privacy_request", id).with_details(json!({ "reason": reason })),
    )
    .await;

    Ok(Json(PrivacyRequestResponse::from(rejected)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::users::Role;
    use crate::db::handlers::Shifts;
    use crate::test_utils::{add_auth_headers, create_test_admin_user, create_test_app, create_test_user, sample_shift};
    use chrono::Duration;
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_export_request_lifecycle(pool: PgPool) {
        let (server, _bg) = create_test_app(pool.clone()).await;
        let admin = create_test_admin_user(&pool, Role::Admin).await;
        let volunteer = create_test_user(&pool, Role::Volunteer).await;
        let auth = add_auth_headers(&volunteer);
        let admin_auth = add_auth_headers(&admin);

        server
            .post("/api/v1/support-tickets")
            .add_header(&auth[0].0, &auth[0].1)
            .json(&json!({ "subject": "Hello", "message": "Just checking in" }))
            .await
            .assert_status(StatusCode::CREATED);

        let response = server.post("/api/v1/privacy/export-request").add_header(&auth[0].0, &auth[0].1).await;
        response.assert_status(StatusCode::CREATED);
        let request: PrivacyRequestResponse = response.json();
        assert_eq!(request.status, PrivacyRequestStatus::Pending);
        assert!(!request.export_ready);

        // One pending request per kind
        server
            .post("/api/v1/privacy/export-request")
            .add_header(&auth[0].0, &auth[0].1)
            .await
            .assert_status(StatusCode::CONFLICT);

        server
            .get(&format!("/api/v1/privacy/requests/{}/export", request.id))
            .add_header(&auth[0].0, &auth[0].1)
            .await
            .assert_status(StatusCode::CONFLICT);

        server
            .post(&format!("/api/v1/admin/privacy/requests/{}/process", request.id))
            .add_header(&auth[0].0, &auth[0].1)
            .await
            .assert_status(StatusCode::FORBIDDEN);

        let processed: PrivacyRequestResponse = server
            .post(&format!("/api/v1/admin/privacy/requests/{}/process", request.id))
            .add_header(&admin_auth[0].0, &admin_auth[0].1)
            .await
            .json();
        assert_eq!(processed.status, PrivacyRequestStatus::Completed);
        assert!(processed.export_ready);
        assert_eq!(processed.processed_by, Some(admin.id));

        let export: serde_json::Value = server
            .get(&format!("/api/v1/privacy/requests/{}/export", request.id))
            .add_header(&auth[0].0, &auth[0].1)
            .await
            .json();
        assert_eq!(export["account"]["email"], volunteer.email.as_str());
        assert_eq!(export["support_tickets"].as_array().map(Vec::len), Some(1));
        assert!(export["assignments"].as_array().is_some_and(Vec::is_empty));

        // Closed requests cannot be processed again
        server
            .post(&format!("/api/v1/admin/privacy/requests/{}/process", request.id))
            .add_header(&admin_auth[0].0, &admin_auth[0].1)
            .await
            .assert_status(StatusCode::CONFLICT);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_deletion_anonymises_account(pool: PgPool) {
        let (server, _bg) = create_test_app(pool.clone()).await;
        let admin = create_test_admin_user(&pool, Role::Admin).await;
        let volunteer = create_test_user(&pool, Role::Volunteer).await;
        let auth = add_auth_headers(&volunteer);
        let admin_auth = add_auth_headers(&admin);

        server
            .post("/api/v1/messages")
            .add_header(&admin_auth[0].0, &admin_auth[0].1)
            .json(&json!({ "recipient_id": volunteer.id, "subject": "Welcome", "body": "Glad to have you" }))
            .await
            .assert_status(StatusCode::CREATED);

        let request: PrivacyRequestResponse = server
            .post("/api/v1/privacy/deletion-request")
            .add_header(&auth[0].0, &auth[0].1)
            .json(&json!({ "reason": "Moving away" }))
            .await
            .json();
        assert_eq!(request.reason.as_deref(), Some("Moving away"));

        let pending: PaginatedResponse<PrivacyRequestResponse> = server
            .get("/api/v1/admin/privacy/requests?status=pending&kind=deletion")
            .add_header(&admin_auth[0].0, &admin_auth[0].1)
            .await
            .json();
        assert_eq!(pending.total_count, 1);

        server
            .post(&format!("/api/v1/admin/privacy/requests/{}/process", request.id))
            .add_header(&admin_auth[0].0, &admin_auth[0].1)
            .await
            .assert_status_ok();

        // The old session no longer works
        server
            .get("/api/v1/users/current")
            .add_header(&auth[0].0, &auth[0].1)
            .await
            .assert_status(StatusCode::UNAUTHORIZED);

        let (email, deleted): (String, bool) = sqlx::query_as("SELECT email, deleted_at IS NOT NULL FROM users WHERE id = $1")
            .bind(volunteer.id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert!(deleted);
        assert_ne!(email, volunteer.email);

        let messages: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE recipient_id = $1")
            .bind(volunteer.id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(messages, 0);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_deletion_frees_booked_shift(pool: PgPool) {
        let (server, _bg) = create_test_app(pool.clone()).await;
        let admin = create_test_admin_user(&pool, Role::Admin).await;
        let leaving = create_test_user(&pool, Role::Volunteer).await;
        let replacement = create_test_user(&pool, Role::Volunteer).await;
        let auth = add_auth_headers(&leaving);
        let admin_auth = add_auth_headers(&admin);
        let replacement_auth = add_auth_headers(&replacement);

        let mut conn = pool.acquire().await.unwrap();
        let shift = Shifts::new(&mut conn)
            .create(&sample_shift(admin.id, Utc::now() + Duration::days(2), false))
            .await
            .unwrap();

        server
            .post(&format!("/api/v1/volunteer/shifts/{}/signup", shift.id))
            .add_header(&auth[0].0, &auth[0].1)
            .await
            .assert_status(StatusCode::CREATED);

        let request: PrivacyRequestResponse = server
            .post("/api/v1/privacy/deletion-request")
            .add_header(&auth[0].0, &auth[0].1)
            .await
            .json();
        server
            .post(&format!("/api/v1/admin/privacy/requests/{}/process", request.id))
            .add_header(&admin_auth[0].0, &admin_auth[0].1)
            .await
            .assert_status_ok();

        let shift = Shifts::new(&mut conn).get_by_id(shift.id).await.unwrap().unwrap();
        assert_eq!(shift.assigned_volunteer_id, None);

        let (status, reason): (String, Option<String>) = sqlx::query_as(
            "SELECT status::text, cancellation_reason FROM shift_assignments WHERE volunteer_id = $1",
        )
        .bind(leaving.id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(status, "cancelled");
        assert_eq!(reason.as_deref(), Some(ACCOUNT_DELETED_REASON));

        server
            .post(&format!("/api/v1/volunteer/shifts/{}/signup", shift.id))
            .add_header(&replacement_auth[0].0, &replacement_auth[0].1)
            .await
            .assert_status(StatusCode::CREATED);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_reject_request(pool: PgPool) {
        let (server, _bg) = create_test_app(pool.clone()).await;
        let admin = create_test_admin_user(&pool, Role::Admin).await;
        let donor = create_test_user(&pool, Role::Donor).await;
        let auth = add_auth_headers(&donor);
        let admin_auth = add_auth_headers(&admin);

        let request: PrivacyRequestResponse = server
            .post("/api/v1/privacy/deletion-request")
            .add_header(&auth[0].0, &auth[0].1)
            .await
            .json();

        let rejected: PrivacyRequestResponse = server
            .post(&format!("/api/v1/admin/privacy/requests/{}/reject", request.id))
            .add_header(&admin_auth[0].0, &admin_auth[0].1)
            .json(&json!({ "reason": "Outstanding gift aid claim" }))
            .await
            .json();
        assert_eq!(rejected.status, PrivacyRequestStatus::Rejected);
        assert_eq!(rejected.reason.as_deref(), Some("Outstanding gift aid claim"));

        let mine: PaginatedResponse<PrivacyRequestResponse> = server
            .get("/api/v1/privacy/requests")
            .add_header(&auth[0].0, &auth[0].1)
            .await
            .json();
        assert_eq!(mine.total_count, 1);

        // A new request can be filed once the old one is closed
        server
            .post("/api/v1/privacy/deletion-request")
            .add_header(&auth[0].0, &auth[0].1)
            .await
            .assert_status(StatusCode::CREATED);

        server
            .post(&format!("/api/v1/admin/privacy/requests/{}/reject", uuid::Uuid::new_v4()))
            .add_header(&admin_auth[0].0, &admin_auth[0].1)
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }
}
