use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::Utc;
use serde_json::json;

use crate::{
    AppState,
    api::models::{
        pagination::PaginatedResponse,
        users::{CurrentUser, ListUsersQuery, UserResponse, UserUpdate},
    },
    audit::{self, AuditEntry},
    auth::permissions::{self, RequiresPermission, operation, resource},
    db::{
        handlers::{Assignments, Repository, Users, assignments::ACCOUNT_DELETED_REASON, users::UserFilter},
        models::users::UserUpdateDBRequest,
    },
    errors::{Error, RejectionCode, Result},
    types::{Operation, Resource, UserId},
};

fn user_not_found(id: UserId) -> Error {
    Error::NotFound {
        resource: "User".to_string(),
        id: id.to_string(),
    }
}

/// Get the authenticated user's account
#[utoipa::path(
    get,
    path = "/users/current",
    tag = "users",
    responses(
        (status = 200, description = "Current user", body = UserResponse),
        (status = 401, description = "Not authenticated"),
    ),
    security(("session_token" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_current_user(State(state): State<AppState>, current_user: CurrentUser) -> Result<Json<UserResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let user = Users::new(&mut conn)
        .get_by_id(current_user.id)
        .await?
        .ok_or_else(|| user_not_found(current_user.id))?;
    Ok(Json(UserResponse::from(user)))
}

/// List users
#[utoipa::path(
    get,
    path = "/admin/users",
    tag = "users",
    params(ListUsersQuery),
    responses(
        (status = 200, description = "Page of users", body = PaginatedResponse<UserResponse>),
        (status = 403, description = "Insufficient permissions"),
    ),
    security(("session_token" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<ListUsersQuery>,
    _: RequiresPermission<resource::Users, operation::ReadAll>,
) -> Result<Json<PaginatedResponse<UserResponse>>> {
    let (skip, limit) = query.pagination.params();
    let filter = UserFilter::new(skip, limit).with_role(query.role).with_search(query.search);

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Users::new(&mut conn);
    let users = repo.list(&filter).await?;
    let total_count = repo.count(&filter).await?;

    Ok(Json(PaginatedResponse::new(
        users.into_iter().map(UserResponse::from).collect(),
        total_count,
        skip,
        limit,
    )))
}

/// Get a user by ID
#[utoipa::path(
    get,
    path = "/admin/users/{id}",
    tag = "users",
    params(("id" = uuid::Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "User", body = UserResponse),
        (status = 403, description = "Insufficient permissions"),
        (status = 404, description = "User not found"),
    ),
    security(("session_token" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_user(State(state): State<AppState>, Path(id): Path<UserId>, current_user: CurrentUser) -> Result<Json<UserResponse>> {
    if id != current_user.id {
        permissions::require(&current_user, Resource::Users, Operation::ReadAll)?;
    }

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let user = Users::new(&mut conn)
        .get_by_id(id)
        .await?
        .filter(|user| user.deleted_at.is_none())
        .ok_or_else(|| user_not_found(id))?;
    Ok(Json(UserResponse::from(user)))
}

/// Update a user's details or roles
///
/// Anyone may edit their own contact details. Changing roles, or editing someone else, needs
/// admin rights.
#[utoipa::path(
    patch,
    path = "/admin/users/{id}",
    tag = "users",
    request_body = UserUpdate,
    params(("id" = uuid::Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "Updated user", body = UserResponse),
        (status = 403, description = "Insufficient permissions"),
        (status = 404, description = "User not found"),
    ),
    security(("session_token" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<UserId>,
    current_user: CurrentUser,
    Json(update): Json<UserUpdate>,
) -> Result<Json<UserResponse>> {
    let is_self = id == current_user.id;
    if !is_self || update.roles.is_some() {
        permissions::require(&current_user, Resource::Users, Operation::UpdateAll)?;
    }

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Users::new(&mut conn);
    repo.get_by_id(id)
        .await?
        .filter(|user| user.deleted_at.is_none())
        .ok_or_else(|| user_not_found(id))?;

    let roles = update.roles.clone();
    let updated = repo.update(id, &UserUpdateDBRequest::new(update)).await?;
    drop(conn);

    if !is_self || roles.is_some() {
        audit::record(
            &state.db,
            &current_user,
            AuditEntry::new("user.update", "user", id).with_details(json!({ "roles": roles })),
        )
        .await;
    }

    Ok(Json(UserResponse::from(updated)))
}

/// Delete (anonymise) a user
///
/// The row stays so history keeps its references, but identifying data is replaced and the
/// account can no longer authenticate.
#[utoipa::path(
    delete,
    path = "/admin/users/{id}",
    tag = "users",
    params(("id" = uuid::Uuid, Path, description = "User ID")),
    responses(
        (status = 204, description = "User deleted"),
        (status = 403, description = "Insufficient permissions"),
        (status = 404, description = "User not found"),
        (status = 409, description = "The last admin cannot be deleted"),
    ),
    security(("session_token" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<UserId>,
    current_user: RequiresPermission<resource::Users, operation::DeleteAll>,
) -> Result<StatusCode> {
    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Users::new(&mut tx);

    let user = repo
        .get_by_id(id)
        .await?
        .filter(|user| user.deleted_at.is_none())
        .ok_or_else(|| user_not_found(id))?;

    if repo.is_last_admin(&user).await? {
        return Err(Error::rejected(RejectionCode::InvalidState, "The last admin account cannot be deleted"));
    }

    repo.anonymize(id).await?;
    let released = Assignments::new(&mut tx)
        .cancel_upcoming_for_volunteer(id, Some(ACCOUNT_DELETED_REASON), Utc::now())
        .await?;
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    audit::record(
        &state.db,
        &current_user,
        AuditEntry::new("user.delete", "user", id).with_details(json!({ "cancelled_assignments": released.len() })),
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}
