//! API models for shift assignments (bookings).

use super::pagination::Pagination;
use crate::db::models::assignments::AssignmentDBResponse;
use crate::types::{AssignmentId, ShiftId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "assignment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Confirmed,
    Cancelled,
    Completed,
    NoShow,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AssignmentResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: AssignmentId,
    #[schema(value_type = String, format = "uuid")]
    pub shift_id: ShiftId,
    pub shift_title: String,
    #[schema(value_type = String, format = "uuid")]
    pub volunteer_id: UserId,
    pub status: AssignmentStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_hours: f64,
    pub is_flexible: bool,
    pub hours_worked: Option<f64>,
    pub cancelled_at: Option<DateTime<Utc>>,
    /// Hours between cancellation and the booked start
    pub hours_notice: Option<f64>,
    pub cancellation_reason: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<AssignmentDBResponse> for AssignmentResponse {
    fn from(db: AssignmentDBResponse) -> Self {
        Self {
            id: db.id,
            shift_id: db.shift_id,
            shift_title: db.shift_title,
            volunteer_id: db.volunteer_id,
            status: db.status,
            start_time: db.start_time,
            end_time: db.end_time,
            duration_hours: db.duration_hours,
            is_flexible: db.is_flexible,
            hours_worked: db.hours_worked,
            cancelled_at: db.cancelled_at,
            hours_notice: db.hours_notice,
            cancellation_reason: db.cancellation_reason,
            completed_at: db.completed_at,
            created_at: db.created_at,
        }
    }
}

#[serde_as]
#[derive(Debug, Deserialize, IntoParams)]
pub struct ListAssignmentsQuery {
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,

    pub status: Option<AssignmentStatus>,
    /// Only assignments starting in the future
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub upcoming: Option<bool>,
    /// Staff listing only
    #[param(value_type = Option<String>, format = "uuid")]
    pub volunteer_id: Option<UserId>,
    /// Staff listing only
    #[param(value_type = Option<String>, format = "uuid")]
    pub shift_id: Option<ShiftId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct CancelRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct CompleteRequest {
    /// Hours actually worked. Defaults to the booked duration.
    pub hours_worked: Option<f64>,
}
