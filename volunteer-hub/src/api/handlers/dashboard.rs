use axum::{Json, extract::State};
use chrono::Utc;

use crate::{
    AppState,
    api::models::{
        applications::ApplicationStatus,
        assignments::{AssignmentResponse, AssignmentStatus},
        dashboard::{AdminDashboardStats, VolunteerDashboard},
        help_requests::HelpRequestStatus,
        privacy::PrivacyRequestStatus,
        shifts::ShiftStatus,
        support_tickets::TicketStatus,
    },
    auth::permissions::{RequiresPermission, operation, resource},
    db::handlers::{
        Applications, Assignments, HelpRequests, Messages, Notifications, Outbox, PrivacyRequests, Profiles, Shifts,
        SupportTickets, Users, applications::ApplicationFilter, privacy_requests::PrivacyRequestFilter, shifts::ShiftFilter,
        support_tickets::TicketFilter, users::UserFilter,
    },
    errors::{Error, Result},
    scheduling,
};

const UPCOMING_ON_DASHBOARD: usize = 5;

/// Volunteer dashboard
///
/// Statistics are recomputed from the full assignment history on every call.
#[utoipa::path(
    get,
    path = "/volunteer/dashboard/stats",
    tag = "dashboard",
    responses(
        (status = 200, description = "Volunteer summary", body = VolunteerDashboard),
    ),
    security(("session_token" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn volunteer_dashboard(
    State(state): State<AppState>,
    current_user: RequiresPermission<resource::Dashboard, operation::ReadOwn>,
) -> Result<Json<VolunteerDashboard>> {
    let now = Utc::now();
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;

    let history = Assignments::new(&mut conn).history(current_user.id).await?;
    let stats = scheduling::volunteer_stats(&history, now);

    // History is newest first
    let mut upcoming: Vec<AssignmentResponse> = history
        .into_iter()
        .filter(|a| a.status == AssignmentStatus::Confirmed && a.start_time > now)
        .map(AssignmentResponse::from)
        .collect();
    upcoming.sort_by_key(|a| a.start_time);
    upcoming.truncate(UPCOMING_ON_DASHBOARD);

    let unread_messages = Messages::new(&mut conn).unread_count(current_user.id).await?;
    let unread_notifications = Notifications::new(&mut conn).count(current_user.id, true).await?;

    Ok(Json(VolunteerDashboard {
        warnings: scheduling::warnings(&stats, state.config.scheduling.open_shift_warning_threshold),
        stats,
        upcoming_assignments: upcoming,
        unread_messages,
        unread_notifications,
    }))
}

/// Organisation-wide counters
#[utoipa::path(
    get,
    path = "/admin/dashboard/stats",
    tag = "dashboard",
    responses(
        (status = 200, description = "Admin summary", body = AdminDashboardStats),
        (status = 403, description = "Insufficient permissions"),
    ),
    security(("session_token" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn admin_dashboard(
    State(state): State<AppState>,
    _: RequiresPermission<resource::Dashboard, operation::ReadAll>,
) -> Result<Json<AdminDashboardStats>> {
    let now = Utc::now();
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;

    let total_users = Users::new(&mut conn).count(&UserFilter::new(0, 1)).await?;
    let active_volunteers = Profiles::new(&mut conn).count_active().await?;
    let pending_applications = Applications::new(&mut conn)
        .count(&ApplicationFilter::new(0, 1).with_status(Some(ApplicationStatus::Pending)))
        .await?;

    let upcoming = ShiftFilter::new(0, 1)
        .between(Some(now), None)
        .with_status(Some(ShiftStatus::Open));
    let mut shifts = Shifts::new(&mut conn);
    let upcoming_shifts = shifts.count(&upcoming).await?;
    let unfilled_shifts = shifts.count(&upcoming.available(true)).await?;

    let open_help_requests = HelpRequests::new(&mut conn).count(Some(HelpRequestStatus::Open)).await?;
    let open_tickets = SupportTickets::new(&mut conn)
        .count(&TicketFilter {
            skip: 0,
            limit: 1,
            status: Some(TicketStatus::Open),
            user_id: None,
        })
        .await?;
    let total_volunteer_hours = Assignments::new(&mut conn).total_completed_hours().await?;
    let pending_privacy_requests = PrivacyRequests::new(&mut conn)
        .count(&PrivacyRequestFilter {
            skip: 0,
            limit: 1,
            user_id: None,
            status: Some(PrivacyRequestStatus::Pending),
            kind: None,
        })
        .await?;
    let outbox = Outbox::new(&mut conn).stats().await?;

    Ok(Json(AdminDashboardStats {
        total_users,
        active_volunteers,
        pending_applications,
        upcoming_shifts,
        unfilled_shifts,
        open_help_requests,
        open_tickets,
        total_volunteer_hours,
        pending_privacy_requests,
        outbox,
    }))
}
