//! Database models for shift assignments.

use crate::api::models::assignments::AssignmentStatus;
use crate::types::{AssignmentId, ShiftId, UserId};
use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// A booking to insert. The shift's slot bookkeeping happens in the same transaction.
#[derive(Debug, Clone)]
pub struct AssignmentCreateDBRequest {
    pub shift_id: ShiftId,
    pub volunteer_id: UserId,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_hours: f64,
    pub is_flexible: bool,
}

#[derive(Debug, Clone, FromRow)]
pub struct AssignmentDBResponse {
    pub id: AssignmentId,
    pub shift_id: ShiftId,
    pub shift_title: String,
    pub volunteer_id: UserId,
    pub status: AssignmentStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_hours: f64,
    pub is_flexible: bool,
    pub hours_worked: Option<f64>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub hours_notice: Option<f64>,
    pub cancellation_reason: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
