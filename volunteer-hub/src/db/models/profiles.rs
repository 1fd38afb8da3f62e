//! Database models for volunteer profiles.

use crate::api::models::profiles::{ProfileUpdate, TimeOfDay, VolunteerStatus};
use crate::db::models::applications::normalize_tags;
use crate::types::UserId;
use chrono::{DateTime, Utc};
use sqlx::FromRow;

#[derive(Debug, Clone)]
pub struct ProfileCreateDBRequest {
    pub user_id: UserId,
    pub skills: Vec<String>,
    pub roles: Vec<String>,
    pub preferred_time_of_day: Option<TimeOfDay>,
    pub bio: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ProfileUpdateDBRequest {
    pub skills: Option<Vec<String>>,
    pub roles: Option<Vec<String>>,
    pub preferred_time_of_day: Option<TimeOfDay>,
    pub bio: Option<String>,
    pub emergency_contact: Option<String>,
    pub status: Option<VolunteerStatus>,
}

impl From<ProfileUpdate> for ProfileUpdateDBRequest {
    fn from(api: ProfileUpdate) -> Self {
        Self {
            skills: api.skills.map(normalize_tags),
            roles: api.roles.map(normalize_tags),
            preferred_time_of_day: api.preferred_time_of_day,
            bio: api.bio,
            emergency_contact: api.emergency_contact,
            status: api.status,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ProfileDBResponse {
    pub user_id: UserId,
    pub skills: Vec<String>,
    pub roles: Vec<String>,
    pub preferred_time_of_day: Option<TimeOfDay>,
    pub bio: Option<String>,
    pub emergency_contact: Option<String>,
    pub status: VolunteerStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
