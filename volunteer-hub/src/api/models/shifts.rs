//! API models for shifts, signups and eligibility reports.

use super::pagination::Pagination;
use crate::db::models::shifts::ShiftDBResponse;
use crate::errors::RejectionBody;
use crate::types::{AssignmentId, ShiftId, UserId};
use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use utoipa::{IntoParams, ToSchema};

/// Priority shared by shifts, tasks, help requests and tickets.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "shift_priority", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "shift_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ShiftStatus {
    Open,
    Cancelled,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ShiftCreate {
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    /// Volunteer job role required to book, e.g. "driver"
    pub required_role: Option<String>,
    #[serde(default)]
    pub required_skills: Vec<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub is_flexible: bool,
    /// Number of volunteers a flexible shift accepts
    #[serde(default)]
    pub flexible_slots: i32,
    pub minimum_hours: Option<f64>,
    pub maximum_hours: Option<f64>,
    #[serde(default)]
    pub priority: Priority,
}

impl ShiftCreate {
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("Shift title is required".to_string());
        }
        validate_shape(
            self.start_time,
            self.end_time,
            self.is_flexible,
            self.flexible_slots,
            self.minimum_hours,
            self.maximum_hours,
        )
    }
}

/// Checks shared by create and update once the final field values are known.
pub fn validate_shape(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    is_flexible: bool,
    slots: i32,
    minimum_hours: Option<f64>,
    maximum_hours: Option<f64>,
) -> Result<(), String> {
    if end <= start {
        return Err("Shift end_time must be after start_time".to_string());
    }
    if is_flexible && slots < 1 {
        return Err("Flexible shifts need at least one slot".to_string());
    }
    if minimum_hours.is_some_and(|h| h <= 0.0) || maximum_hours.is_some_and(|h| h <= 0.0) {
        return Err("Minimum and maximum hours must be positive".to_string());
    }
    if let (Some(min), Some(max)) = (minimum_hours, maximum_hours)
        && min > max
    {
        return Err("minimum_hours cannot exceed maximum_hours".to_string());
    }
    Ok(())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ShiftUpdate {
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

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ShiftResponse {
    #[schema(value_type = String, format = "uuid")]
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
    /// Free places: remaining slots for flexible shifts, 0 or 1 for fixed ones
    pub available_slots: i32,
    pub minimum_hours: Option<f64>,
    pub maximum_hours: Option<f64>,
    #[schema(value_type = Option<String>, format = "uuid")]
    pub assigned_volunteer_id: Option<UserId>,
    pub priority: Priority,
    pub status: ShiftStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ShiftDBResponse> for ShiftResponse {
    fn from(db: ShiftDBResponse) -> Self {
        let available_slots = db.available_slots();
        Self {
            id: db.id,
            title: db.title,
            description: db.description,
            location: db.location,
            required_role: db.required_role,
            required_skills: db.required_skills,
            start_time: db.start_time,
            end_time: db.end_time,
            is_flexible: db.is_flexible,
            flexible_slots: db.flexible_slots,
            flexible_slots_used: db.flexible_slots_used,
            available_slots,
            minimum_hours: db.minimum_hours,
            maximum_hours: db.maximum_hours,
            assigned_volunteer_id: db.assigned_volunteer_id,
            priority: db.priority,
            status: db.status,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

#[serde_as]
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct ListShiftsQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,

    /// Only shifts starting at or after this instant
    pub from: Option<DateTime<Utc>>,
    /// Only shifts starting before this instant
    pub to: Option<DateTime<Utc>>,
    pub status: Option<ShiftStatus>,
    /// Only shifts that still have room
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub available: Option<bool>,
}

/// Booking request. Times of day are `HH:MM` and apply to the shift's date.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct SignupRequest {
    #[serde(default, deserialize_with = "deserialize_time_of_day")]
    #[schema(value_type = Option<String>, example = "09:00")]
    pub start_time: Option<NaiveTime>,
    #[serde(default, deserialize_with = "deserialize_time_of_day")]
    #[schema(value_type = Option<String>, example = "10:30")]
    pub end_time: Option<NaiveTime>,
    /// Stated length of the selection in hours
    pub duration: Option<f64>,
}

fn deserialize_time_of_day<'de, D>(deserializer: D) -> Result<Option<NaiveTime>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => NaiveTime::parse_from_str(s, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid time of day '{s}', expected HH:MM"))),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SignupResponse {
    #[schema(value_type = String, format = "uuid")]
    pub assignment_id: AssignmentId,
    #[schema(value_type = String, format = "uuid")]
    pub shift_id: ShiftId,
    pub shift_title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_hours: f64,
    pub is_flexible: bool,
    pub message: String,
}

/// Running statistics recomputed from the volunteer's assignment history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct VolunteerStats {
    /// Confirmed assignments that have not started yet
    pub open_shifts: i64,
    /// Hours on completed assignments
    pub lifetime_hours: f64,
    /// completed / total * 100
    pub reliability_score: f64,
    pub completed_shifts: i64,
    pub total_shifts: i64,
    pub cancelled_shifts: i64,
    pub no_shows: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct RequirementMatch {
    pub required_role: Option<String>,
    pub has_required_role: bool,
    pub required_skills: Vec<String>,
    pub matched_skills: Vec<String>,
    pub missing_skills: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ShiftValidationResponse {
    #[schema(value_type = String, format = "uuid")]
    pub shift_id: ShiftId,
    pub eligible: bool,
    /// Every failed check, in evaluation order
    pub reasons: Vec<RejectionBody>,
    pub warnings: Vec<String>,
    pub stats: VolunteerStats,
    pub requirements: RequirementMatch,
    pub recommendation_score: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RecommendedShift {
    pub shift: ShiftResponse,
    pub score: i32,
    pub matched_skills: Vec<String>,
}
