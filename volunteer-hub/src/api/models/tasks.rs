use super::{pagination::Pagination, shifts::Priority};
use crate::db::models::tasks::TaskDBResponse;
use crate::types::{TaskId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "task_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Done,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TaskCreate {
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub assignee_id: Option<UserId>,
    pub due_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub assignee_id: Option<UserId>,
    pub due_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TaskResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: TaskId,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: Priority,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub assignee_id: Option<UserId>,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub created_by: Option<UserId>,
    pub due_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<TaskDBResponse> for TaskResponse {
    fn from(db: TaskDBResponse) -> Self {
        Self {
            id: db.id,
            title: db.title,
            description: db.description,
            status: db.status,
            priority: db.priority,
            assignee_id: db.assignee_id,
            created_by: db.created_by,
            due_date: db.due_date,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListTasksQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,

    pub status: Option<TaskStatus>,
    /// Only tasks assigned to this user
    #[param(value_type = Option<String>, format = "uuid")]
    pub assignee_id: Option<UserId>,
}
