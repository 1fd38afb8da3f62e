//! Dashboard summaries for volunteers and administrators.

use super::{assignments::AssignmentResponse, notifications::OutboxStats, shifts::VolunteerStats};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct VolunteerDashboard {
    pub stats: VolunteerStats,
    /// Next confirmed assignments, soonest first
    pub upcoming_assignments: Vec<AssignmentResponse>,
    pub warnings: Vec<String>,
    pub unread_messages: i64,
    pub unread_notifications: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct AdminDashboardStats {
    pub total_users: i64,
    pub active_volunteers: i64,
    pub pending_applications: i64,
    pub upcoming_shifts: i64,
    /// Upcoming open shifts that still have free places
    pub unfilled_shifts: i64,
    pub open_help_requests: i64,
    pub open_tickets: i64,
    pub total_volunteer_hours: f64,
    pub pending_privacy_requests: i64,
    pub outbox: OutboxStats,
}
