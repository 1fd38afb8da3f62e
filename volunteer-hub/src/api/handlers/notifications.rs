//! In-app notification feed, plus admin views over the email outbox.

use axum::{
    Json,
    extract::{Path, Query, State},
};

use crate::{
    AppState,
    api::models::{
        notifications::{
            ListNotificationsQuery, ListOutboxQuery, MarkedRead, NotificationResponse, OutboxEntryResponse, OutboxStats,
        },
        pagination::PaginatedResponse,
    },
    audit::{self, AuditEntry},
    auth::permissions::{RequiresPermission, operation, resource},
    db::handlers::{Notifications, Outbox},
    errors::{Error, RejectionCode, Result},
    types::{NotificationId, OutboxId},
};

/// List the caller's notifications, newest first
#[utoipa::path(
    get,
    path = "/notifications",
    tag = "notifications",
    params(ListNotificationsQuery),
    responses(
        (status = 200, description = "Page of notifications", body = PaginatedResponse<NotificationResponse>),
    ),
    security(("session_token" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_notifications(
    State(state): State<AppState>,
    Query(query): Query<ListNotificationsQuery>,
    current_user: RequiresPermission<resource::Notifications, operation::ReadOwn>,
) -> Result<Json<PaginatedResponse<NotificationResponse>>> {
    let (skip, limit) = query.pagination.params();

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Notifications::new(&mut conn);
    let notifications = repo.list(current_user.id, query.unread_only, skip, limit).await?;
    let total_count = repo.count(current_user.id, query.unread_only).await?;

    Ok(Json(PaginatedResponse::new(
        notifications.into_iter().map(NotificationResponse::from).collect(),
        total_count,
        skip,
        limit,
    )))
}

/// Mark every notification read
#[utoipa::path(
    post,
    path = "/notifications/read-all",
    tag = "notifications",
    responses(
        (status = 200, description = "Number of notifications marked", body = MarkedRead),
    ),
    security(("session_token" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn mark_all_read(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Notifications, operation::UpdateOwn>,
) -> Result<Json<MarkedRead>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let updated = Notifications::new(&mut conn).mark_all_read(current_user.id).await?;
    Ok(Json(MarkedRead { updated }))
}

/// Mark one notification read
#[utoipa::path(
    post,
    path = "/notifications/{id}/read",
    tag = "notifications",
    params(("id" = uuid::Uuid, Path, description = "Notification ID")),
    responses(
        (status = 200, description = "Marked read", body = MarkedRead),
        (status = 404, description = "Notification not found"),
    ),
    security(("session_token" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn mark_read(
    State(state): State<AppState>,
    Path(id): Path<NotificationId>,
    current_user: RequiresPermission<resource::Notifications, operation::UpdateOwn>,
) -> Result<Json<MarkedRead>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    if !Notifications::new(&mut conn).mark_read(id, current_user.id).await? {
        return Err(Error::NotFound {
            resource: "Notification".to_string(),
            id: id.to_string(),
        });
    }
    Ok(Json(MarkedRead { updated: 1 }))
}

/// Inspect the email outbox
#[utoipa::path(
    get,
    path = "/admin/notifications/outbox",
    tag = "notifications",
    params(ListOutboxQuery),
    responses(
        (status = 200, description = "Page of outbox entries", body = PaginatedResponse<OutboxEntryResponse>),
        (status = 403, description = "Admin only"),
    ),
    security(("session_token" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_outbox(
    State(state): State<AppState>,
    Query(query): Query<ListOutboxQuery>,
    _: RequiresPermission<resource::Notifications, operation::ReadAll>,
) -> Result<Json<PaginatedResponse<OutboxEntryResponse>>> {
    let (skip, limit) = query.pagination.params();

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Outbox::new(&mut conn);
    let entries = repo.list(query.status, skip, limit).await?;
    let total_count = repo.count(query.status).await?;

    Ok(Json(PaginatedResponse::new(
        entries.into_iter().map(OutboxEntryResponse::from).collect(),
        total_count,
        skip,
        limit,
    )))
}

/// Outbox counts by delivery state
#[utoipa::path(
    get,
    path = "/admin/notifications/outbox/stats",
    tag = "notifications",
    responses(
        (status = 200, description = "Outbox counts", body = OutboxStats),
    ),
    security(("session_token" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn outbox_stats(
    State(state): State<AppState>,
    _: RequiresPermission<resource::Notifications, operation::ReadAll>,
) -> Result<Json<OutboxStats>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    Ok(Json(Outbox::new(&mut conn).stats().await?))
}

/// Requeue a dead outbox entry
#[utoipa::path(
    post,
    path = "/admin/notifications/outbox/{id}/retry",
    tag = "notifications",
    params(("id" = uuid::Uuid, Path, description = "Outbox entry ID")),
    responses(
        (status = 200, description = "Entry requeued", body = OutboxEntryResponse),
        (status = 404, description = "Entry not found"),
        (status = 409, description = "Entry is not dead"),
    ),
    security(("session_token" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn retry_outbox_entry(
    State(state): State<AppState>,
    Path(id): Path<OutboxId>,
    current_user: RequiresPermission<resource::Notifications, operation::UpdateAll>,
) -> Result<Json<OutboxEntryResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Outbox::new(&mut conn);
    let Some(entry) = repo.retry(id).await? else {
        return Err(match repo.get_by_id(id).await? {
            Some(existing) => Error::rejected(
                RejectionCode::InvalidState,
                format!("Only dead entries can be retried, this one is {}", format!("{:?}", existing.status).to_lowercase()),
            ),
            None => Error::NotFound {
                resource: "Outbox entry".to_string(),
                id: id.to_string(),
            },
        });
    };
    drop(conn);

    audit::record(&state.db, &current_user, AuditEntry::new("outbox.retry", "notification_outbox", id)).await;
    Ok(Json(OutboxEntryResponse::from(entry)))
}
