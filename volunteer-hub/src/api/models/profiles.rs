//! API models for volunteer profiles.

use crate::db::models::profiles::ProfileDBResponse;
use crate::types::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Part of the day a volunteer prefers to work.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "time_of_day", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TimeOfDay {
    /// 05:00 - 12:00
    Morning,
    /// 12:00 - 17:00
    Afternoon,
    /// 17:00 - 22:00
    Evening,
}

impl TimeOfDay {
    /// Bucket an hour of the day (0-23). Night hours belong to no bucket.
    pub fn from_hour(hour: u32) -> Option<Self> {
        match hour {
            5..=11 => Some(TimeOfDay::Morning),
            12..=16 => Some(TimeOfDay::Afternoon),
            17..=21 => Some(TimeOfDay::Evening),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "volunteer_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum VolunteerStatus {
    Active,
    Inactive,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProfileResponse {
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
    pub skills: Vec<String>,
    /// Job roles the volunteer can fill, e.g. "driver" or "kitchen"
    pub roles: Vec<String>,
    pub preferred_time_of_day: Option<TimeOfDay>,
    pub bio: Option<String>,
    pub emergency_contact: Option<String>,
    pub status: VolunteerStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ProfileDBResponse> for ProfileResponse {
    fn from(db: ProfileDBResponse) -> Self {
        Self {
            user_id: db.user_id,
            skills: db.skills,
            roles: db.roles,
            preferred_time_of_day: db.preferred_time_of_day,
            bio: db.bio,
            emergency_contact: db.emergency_contact,
            status: db.status,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ProfileUpdate {
    pub skills: Option<Vec<String>>,
    pub roles: Option<Vec<String>>,
    pub preferred_time_of_day: Option<TimeOfDay>,
    pub bio: Option<String>,
    pub emergency_contact: Option<String>,
    pub status: Option<VolunteerStatus>,
}
