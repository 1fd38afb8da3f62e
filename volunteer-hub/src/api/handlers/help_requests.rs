use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde_json::json;

use crate::{
    AppState,
    api::models::{
        help_requests::{HelpRequestCreate, HelpRequestResponse, HelpRequestUpdate, ListHelpRequestsQuery},
        pagination::PaginatedResponse,
        users::CurrentUser,
    },
    audit::{self, AuditEntry},
    auth::permissions::{RequiresPermission, operation, resource},
    db::{
        errors::DbError,
        handlers::{HelpRequests, Repository, help_requests::HelpRequestFilter},
        models::help_requests::{HelpRequestCreateDBRequest, HelpRequestUpdateDBRequest},
    },
    errors::{Error, Result},
    notifications::{self, Notice, NotificationKind, Recipient},
    types::HelpRequestId,
};

/// Ask the charity for help
///
/// Open to anyone. Signed-in callers are linked to the request.
#[utoipa::path(
    post,
    path = "/help-requests",
    tag = "help_requests",
    request_body = HelpRequestCreate,
    responses(
        (status = 201, description = "Help request received", body = HelpRequestResponse),
        (status = 400, description = "Invalid request"),
        (status = 429, description = "Too many requests"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn create_help_request(
    State(state): State<AppState>,
    current_user: Option<CurrentUser>,
    Json(body): Json<HelpRequestCreate>,
) -> Result<(StatusCode, Json<HelpRequestResponse>)> {
    body.validate().map_err(|message| Error::BadRequest { message })?;

    let requester_id = current_user.as_ref().map(|u| u.id);
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let request = HelpRequests::new(&mut conn)
        .create(&HelpRequestCreateDBRequest::new(body, requester_id))
        .await?;
    drop(conn);

    tracing::info!(help_request_id = %request.id, category = %request.category, urgency = ?request.urgency, "Help request received");

    let recipient = match requester_id {
        Some(user_id) => Recipient::user(user_id, request.email.clone(), Some(request.name.clone())),
        None => Recipient::anonymous(request.email.clone(), Some(request.name.clone())),
    };
    notifications::notify(
        &state.db,
        recipient,
        Notice::new(
            NotificationKind::HelpRequestReceived,
            "We've received your request",
            "Thank you for getting in touch. Someone from our team will contact you soon.",
        ),
    )
    .await;

    Ok((StatusCode::CREATED, Json(HelpRequestResponse::from(request))))
}

/// List help requests
#[utoipa::path(
    get,
    path = "/admin/help-requests",
    tag = "help_requests",
    params(ListHelpRequestsQuery),
    responses(
        (status = 200, description = "Page of help requests", body = PaginatedResponse<HelpRequestResponse>),
        (status = 403, description = "Insufficient permissions"),
    ),
    security(("session_token" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_help_requests(
    State(state): State<AppState>,
    Query(query): Query<ListHelpRequestsQuery>,
    _: RequiresPermission<resource::HelpRequests, operation::ReadAll>,
) -> Result<Json<PaginatedResponse<HelpRequestResponse>>> {
    let (skip, limit) = query.pagination.params();
    let filter = HelpRequestFilter {
        skip,
        limit,
        status: query.status,
    };

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = HelpRequests::new(&mut conn);
    let requests = repo.list(&filter).await?;
    let total_count = repo.count(query.status).await?;

    Ok(Json(PaginatedResponse::new(
        requests.into_iter().map(HelpRequestResponse::from).collect(),
        total_count,
        skip,
        limit,
    )))
}

/// Triage a help request
#[utoipa::path(
    patch,
    path = "/admin/help-requests/{id}",
    tag = "help_requests",
    request_body = HelpRequestUpdate,
    params(("id" = uuid::Uuid, Path, description = "Help request ID")),
    responses(
        (status = 200, description = "Help request updated", body = HelpRequestResponse),
        (status = 404, description = "Help request not found"),
    ),
    security(("session_token" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn update_help_request(
    State(state): State<AppState>,
    Path(id): Path<HelpRequestId>,
    current_user: RequiresPermission<resource::HelpRequests, operation::UpdateAll>,
    Json(body): Json<HelpRequestUpdate>,
) -> Result<Json<HelpRequestResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let updated = HelpRequests::new(&mut conn)
        .update(id, &HelpRequestUpdateDBRequest::from(body))
        .await
        .map_err(|e| match e {
            DbError::NotFound => Error::NotFound {
                resource: "Help request".to_string(),
                id: id.to_string(),
            },
            other => Error::Database(other),
        })?;
    drop(conn);

    audit::record(
        &state.db,
        &current_user,
        AuditEntry::new("help_request.update", "help_request", id)
            .with_details(json!({ "status": updated.status, "assigned_to": updated.assigned_to })),
    )
    .await;

    Ok(Json(HelpRequestResponse::from(updated)))
}
