//! Database repository for staff tasks.


use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    api::models::tasks::TaskStatus,
    db::{
        errors::{DbError, Result},
        handlers::repository::Repository,
        models::tasks::{TaskCreateDBRequest, TaskDBResponse, TaskUpdateDBRequest},
    },
    types::{TaskId, UserId, abbrev_uuid},
};

#[derive(Debug, Clone)]
pub struct TaskFilter {
    pub skip: i64,
    pub limit: i64,
    pub status: Option<TaskStatus>,
    pub assignee_id: Option<UserId>,
}

impl TaskFilter {
    pub fn new(skip: i64, limit: i64) -> Self {
        Self {
            skip,
            limit,
            status: None,
            assignee_id: None,
        }
    }

    pub fn with_status(mut self, status: Option<TaskStatus>) -> Self {
        self.status = status;
        self
    }

    pub fn with_assignee(mut self, assignee_id: Option<UserId>) -> Self {
        self.assignee_id = assignee_id;
        self
    }
}

pub struct Tasks<'c> {
    db: &'c mut PgConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for Tasks<'c> {
    type CreateRequest = TaskCreateDBRequest;
    type UpdateRequest = TaskUpdateDBRequest;
    type Response = TaskDBResponse;
    type Id = TaskId;
    type Filter = TaskFilter;

    #[instrument(skip(self, request), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let task = sqlx::query_as::<_, TaskDBResponse>(
            r#"
            INSERT INTO tasks (id, title, description, priority, assignee_id, due_date, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&request.title)
        .bind(&request.description)
        .bind(request.priority)
        .bind(request.assignee_id)
        .bind(request.due_date)
        .bind(request.created_by)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(task)
    }

    #[instrument(skip(self), fields(task_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let task = sqlx::query_as::<_, TaskDBResponse>("SELECT * FROM tasks WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(task)
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let tasks = sqlx::query_as::<_, TaskDBResponse>(
            r#"
            SELECT * FROM tasks
            WHERE ($1::task_status IS NULL OR status = $1)
              AND ($2::uuid IS NULL OR assignee_id = $2)
            ORDER BY due_date ASC NULLS LAST, created_at DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(filter.status)
        .bind(filter.assignee_id)
        .bind(filter.limit)
        .bind(filter.skip)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(tasks)
    }

    #[instrument(skip(self), fields(task_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = $1").bind(id).execute(&mut *self.db).await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(task_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let task = sqlx::query_as::<_, TaskDBResponse>(
            r#"
            UPDATE tasks SET
                title = COALESCE($2, title),
                description = COALESCE($3, description),
                status = COALESCE($4, status),
                priority = COALESCE($5, priority),
                assignee_id = COALESCE($6, assignee_id),
                due_date = COALESCE($7, due_date),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&request.title)
        .bind(&request.description)
        .bind(request.status)
        .bind(request.priority)
        .bind(request.assignee_id)
        .bind(request.due_date)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;
        Ok(task)
    }
}

impl<'c> Tasks<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, filter), err)]
    pub async fn count(&mut self, filter: &TaskFilter) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM tasks
            WHERE ($1::task_status IS NULL OR status = $1)
              AND ($2::uuid IS NULL OR assignee_id = $2)
            "#,
        )
        .bind(filter.status)
        .bind(filter.assignee_id)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(count)
    }
}
