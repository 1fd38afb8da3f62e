//! Database models for users.

use crate::api::models::users::{Role, UserUpdate};
use crate::types::UserId;
use chrono::{DateTime, Utc};

/// Database request for creating a new user
#[derive(Debug, Clone)]
pub struct UserCreateDBRequest {
    pub username: String,
    pub email: String,
    pub display_name: Option<String>,
    pub phone: Option<String>,
    pub is_admin: bool,
    pub roles: Vec<Role>,
    pub password_hash: Option<String>,
}

/// Database request for updating a user
#[derive(Debug, Clone, Default)]
pub struct UserUpdateDBRequest {
    pub display_name: Option<String>,
    pub phone: Option<String>,
    pub roles: Option<Vec<Role>>,
    pub password_hash: Option<String>,
}

impl UserUpdateDBRequest {
    pub fn new(update: UserUpdate) -> Self {
        Self {
            display_name: update.display_name,
            phone: update.phone,
            roles: update.roles,
            password_hash: None,
        }
    }
}

/// Database response for a user
#[derive(Debug, Clone)]
pub struct UserDBResponse {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub display_name: Option<String>,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    pub is_admin: bool,
    pub roles: Vec<Role>,
    pub password_hash: Option<String>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl UserDBResponse {
    /// Admin by flag or by role, matching the permission check on sessions.
    pub fn holds_admin(&self) -> bool {
        self.is_admin || self.roles.contains(&Role::Admin)
    }
}
