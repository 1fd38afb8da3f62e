use crate::api::models::{
    shifts::Priority,
    tasks::{TaskCreate, TaskStatus, TaskUpdate},
};
use crate::types::{TaskId, UserId};
use chrono::{DateTime, Utc};
use sqlx::FromRow;

#[derive(Debug, Clone)]
pub struct TaskCreateDBRequest {
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub assignee_id: Option<UserId>,
    pub due_date: Option<DateTime<Utc>>,
    pub created_by: UserId,
}

impl TaskCreateDBRequest {
    pub fn new(api: TaskCreate, created_by: UserId) -> Self {
        Self {
            title: api.title.trim().to_string(),
            description: api.description,
            priority: api.priority,
            assignee_id: api.assignee_id,
            due_date: api.due_date,
            created_by,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TaskUpdateDBRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub assignee_id: Option<UserId>,
    pub due_date: Option<DateTime<Utc>>,
}

impl From<TaskUpdate> for TaskUpdateDBRequest {
    fn from(api: TaskUpdate) -> Self {
        Self {
            title: api.title,
            description: api.description,
            status: api.status,
            priority: api.priority,
            assignee_id: api.assignee_id,
            due_date: api.due_date,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct TaskDBResponse {
    pub id: TaskId,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: Priority,
    pub assignee_id: Option<UserId>,
    pub created_by: Option<UserId>,
    pub due_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
