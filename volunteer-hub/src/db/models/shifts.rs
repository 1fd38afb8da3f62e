//! Database models for shifts.

use crate::api::models::shifts::{Priority, ShiftCreate, ShiftStatus, ShiftUpdate};
use crate::db::models::applications::normalize_tags;
use crate::types::{ShiftId, UserId};
use chrono::{DateTime, Utc};
use sqlx::FromRow;

#[derive(Debug, Clone)]
pub struct ShiftCreateDBRequest {
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub required_role: Option<String>,
    pub required_skills: Vec<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub is_flexible: bool,
    pub flexible_slots: i32,
    pub minimum_hours: Option<f64>,
    pub maximum_hours: Option<f64>,
    pub priority: Priority,
    pub created_by: Option<UserId>,
}

impl ShiftCreateDBRequest {
    pub fn new(api: ShiftCreate, created_by: UserId) -> Self {
        Self {
            title: api.title.trim().to_string(),
            description: api.description,
            location: api.location,
            required_role: api.required_role.map(|r| r.trim().to_lowercase()).filter(|r| !r.is_empty()),
            required_skills: normalize_tags(api.required_skills),
            start_time: api.start_time,
            end_time: api.end_time,
            is_flexible: api.is_flexible,
            flexible_slots: if api.is_flexible { api.flexible_slots } else { 0 },
            minimum_hours: api.minimum_hours,
            maximum_hours: api.maximum_hours,
            priority: api.priority,
            created_by: Some(created_by),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ShiftUpdateDBRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub required_role: Option<String>,
    pub required_skills: Option<Vec<String>>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub flexible_slots: Option<i32>,
    pub minimum_hours: Option<f64>,
    pub maximum_hours: Option<f64>,
    pub priority: Option<Priority>,
    pub status: Option<ShiftStatus>,
}

impl From<ShiftUpdate> for ShiftUpdateDBRequest {
    fn from(api: ShiftUpdate) -> Self {
        Self {
            title: api.title,
            description: api.description,
            location: api.location,
            required_role: api.required_role.map(|r| r.trim().to_lowercase()),
            required_skills: api.required_skills.map(normalize_tags),
            start_time: api.start_time,
            end_time: api.end_time,
            flexible_slots: api.flexible_slots,
            minimum_hours: api.minimum_hours,
            maximum_hours: api.maximum_hours,
            priority: api.priority,
            status: api.status,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ShiftDBResponse {
    pub id: ShiftId,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub required_role: Option<String>,
    pub required_skills: Vec<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub is_flexible: bool,
    pub flexible_slots: i32,
    pub flexible_slots_used: i32,
    pub minimum_hours: Option<f64>,
    pub maximum_hours: Option<f64>,
    pub assigned_volunteer_id: Option<UserId>,
    pub priority: Priority,
    pub status: ShiftStatus,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ShiftDBResponse {
    pub fn available_slots(&self) -> i32 {
        if self.is_flexible {
            (self.flexible_slots - self.flexible_slots_used).max(0)
        } else if self.assigned_volunteer_id.is_none() {
            1
        } else {
            0
        }
    }

    pub fn duration_hours(&self) -> f64 {
        (self.end_time - self.start_time).num_seconds() as f64 / 3600.0
    }
}
