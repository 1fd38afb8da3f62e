use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

use crate::{
    AppState,
    api::models::{
        pagination::PaginatedResponse,
        tasks::{ListTasksQuery, TaskCreate, TaskResponse, TaskUpdate},
    },
    audit::{self, AuditEntry},
    auth::permissions::{RequiresPermission, operation, resource},
    db::{
        handlers::{Repository, Tasks, tasks::TaskFilter},
        models::tasks::{TaskCreateDBRequest, TaskUpdateDBRequest},
    },
    errors::{Error, Result},
    types::TaskId,
};

fn task_not_found(id: TaskId) -> Error {
    Error::NotFound {
        resource: "Task".to_string(),
        id: id.to_string(),
    }
}

/// List staff tasks
#[utoipa::path(
    get,
    path = "/tasks",
    tag = "tasks",
    params(ListTasksQuery),
    responses(
        (status = 200, description = "Page of tasks", body = PaginatedResponse<TaskResponse>),
        (status = 403, description = "Insufficient permissions"),
    ),
    security(("session_token" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_tasks(
    State(state): State<AppState>,
    Query(query): Query<ListTasksQuery>,
    _: RequiresPermission<resource::Tasks, operation::ReadAll>,
) -> Result<Json<PaginatedResponse<TaskResponse>>> {
    let (skip, limit) = query.pagination.params();
    let filter = TaskFilter::new(skip, limit)
        .with_status(query.status)
        .with_assignee(query.assignee_id);

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Tasks::new(&mut conn);
    let tasks = repo.list(&filter).await?;
    let total_count = repo.count(&filter).await?;

    Ok(Json(PaginatedResponse::new(
        tasks.into_iter().map(TaskResponse::from).collect(),
        total_count,
        skip,
        limit,
    )))
}

/// Create a task
#[utoipa::path(
    post,
    path = "/tasks",
    tag = "tasks",
    request_body = TaskCreate,
    responses(
        (status = 201, description = "Task created", body = TaskResponse),
        (status = 400, description = "Invalid task"),
    ),
    security(("session_token" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn create_task(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Tasks, operation::CreateAll>,
    Json(body): Json<TaskCreate>,
) -> Result<(StatusCode, Json<TaskResponse>)> {
    if body.title.trim().is_empty() {
        return Err(Error::BadRequest {
            message: "Task title is required".to_string(),
        });
    }

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let task = Tasks::new(&mut conn).create(&TaskCreateDBRequest::new(body, current_user.id)).await?;
    Ok((StatusCode::CREATED, Json(TaskResponse::from(task))))
}

/// Update a task
#[utoipa::path(
    patch,
    path = "/tasks/{id}",
    tag = "tasks",
    request_body = TaskUpdate,
    params(("id" = uuid::Uuid, Path, description = "Task ID")),
    responses(
        (status = 200, description = "Task updated", body = TaskResponse),
        (status = 404, description = "Task not found"),
    ),
    security(("session_token" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn update_task(
    State(state): State<AppState>,
    Path(id): Path<TaskId>,
    _: RequiresPermission<resource::Tasks, operation::UpdateAll>,
    Json(body): Json<TaskUpdate>,
) -> Result<Json<TaskResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let task = Tasks::new(&mut conn)
        .update(id, &TaskUpdateDBRequest::from(body))
        .await
        .map_err(|e| match e {
            crate::db::errors::DbError::NotFound => task_not_found(id),
            other => Error::Database(other),
        })?;
    Ok(Json(TaskResponse::from(task)))
}

/// Delete a task
#[utoipa::path(
    delete,
    path = "/tasks/{id}",
    tag = "tasks",
    params(("id" = uuid::Uuid, Path, description = "Task ID")),
    responses(
        (status = 204, description = "Task deleted"),
        (status = 404, description = "Task not found"),
    ),
    security(("session_token" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn delete_task(
    State(state): State<AppState>,
    Path(id): Path<TaskId>,
    current_user: RequiresPermission<resource::Tasks, operation::DeleteAll>,
) -> Result<StatusCode> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    if !Tasks::new(&mut conn).delete(id).await? {
        return Err(task_not_found(id));
    }
    drop(conn);

    audit::record(&state.db, &current_user, AuditEntry::new("task.delete", "task", id)).await;
    Ok(StatusCode::NO_CONTENT)
}
