//! OpenAPI document for the REST API.
//!
//! Handler paths are declared relative to `/api/v1`; [`ApiPrefix`] rewrites them to the
//! mounted location so the document can be used as-is by generated clients.

use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};

use crate::{api, errors};

const API_PREFIX: &str = "/api/v1";

/// Session tokens are accepted either as a bearer token or as the session cookie.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "session_token",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .description(Some(
                        "Session token returned by `/auth/login`. Send it in the `Authorization` header:\n\n\
                        ```\nAuthorization: Bearer YOUR_TOKEN\n```",
                    ))
                    .build(),
            ),
        );
        components.add_security_scheme(
            "session_cookie",
            SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::with_description(
                "vhub_session",
                "Browser sessions carry the same token in a cookie",
            ))),
        );
    }
}

struct ApiPrefix;

impl Modify for ApiPrefix {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let paths = std::mem::take(&mut openapi.paths.paths);
        openapi.paths.paths = paths
            .into_iter()
            .map(|(path, item)| (format!("{API_PREFIX}{path}"), item))
            .collect();
    }
}

#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon, &ApiPrefix),
    paths(
        api::handlers::auth::get_registration_info,
        api::handlers::auth::register,
        api::handlers::auth::get_login_info,
        api::handlers::auth::login,
        api::handlers::auth::logout,
        api::handlers::auth::request_password_reset,
        api::handlers::auth::confirm_password_reset,
        api::handlers::auth::change_password,
        api::handlers::users::get_current_user,
        api::handlers::users::list_users,
        api::handlers::users::get_user,
        api::handlers::users::update_user,
        api::handlers::users::delete_user,
        api::handlers::applications::submit_application,
        api::handlers::applications::list_applications,
        api::handlers::applications::get_application,
        api::handlers::applications::approve_application,
        api::handlers::applications::reject_application,
        api::handlers::applications::bulk_action,
        api::handlers::profiles::get_profile,
        api::handlers::profiles::update_profile,
        api::handlers::shifts::list_shifts,
        api::handlers::shifts::get_shift,
        api::handlers::shifts::create_shift,
        api::handlers::shifts::update_shift,
        api::handlers::shifts::delete_shift,
        api::handlers::shifts::signup,
        api::handlers::shifts::validate_signup,
        api::handlers::shifts::recommended_shifts,
        api::handlers::assignments::list_my_assignments,
        api::handlers::assignments::cancel_assignment,
        api::handlers::assignments::list_assignments,
        api::handlers::assignments::complete_assignment,
        api::handlers::assignments::mark_no_show,
        api::handlers::dashboard::volunteer_dashboard,
        api::handlers::dashboard::admin_dashboard,
        api::handlers::tasks::list_tasks,
        api::handlers::tasks::create_task,
        api::handlers::tasks::update_task,
        api::handlers::tasks::delete_task,
        api::handlers::help_requests::create_help_request,
        api::handlers::help_requests::list_help_requests,
        api::handlers::help_requests::update_help_request,
        api::handlers::support_tickets::create_ticket,
        api::handlers::support_tickets::list_tickets,
        api::handlers::support_tickets::get_ticket,
        api::handlers::support_tickets::update_ticket,
        api::handlers::documents::upload_document,
        api::handlers::documents::list_documents,
        api::handlers::documents::get_document,
        api::handlers::documents::get_document_content,
        api::handlers::documents::delete_document,
        api::handlers::messages::send_message,
        api::handlers::messages::list_messages,
        api::handlers::messages::unread_count,
        api::handlers::messages::get_message,
        api::handlers::notifications::list_notifications,
        api::handlers::notifications::mark_all_read,
        api::handlers::notifications::mark_read,
        api::handlers::notifications::list_outbox,
        api::handlers::notifications::outbox_stats,
        api::handlers::notifications::retry_outbox_entry,
        api::handlers::audit_logs::list_audit_logs,
        api::handlers::privacy::request_export,
        api::handlers::privacy::request_deletion,
        api::handlers::privacy::list_my_requests,
        api::handlers::privacy::get_export,
        api::handlers::privacy::list_requests,
        api::handlers::privacy::process_request,
        api::handlers::privacy::reject_request,
    ),
    components(
        schemas(
            errors::RejectionCode,
            errors::RejectionBody,
            api::models::auth::RegistrationInfo,
            api::models::auth::LoginInfo,
            api::models::auth::RegisterRequest,
            api::models::auth::LoginRequest,
            api::models::auth::AuthResponse,
            api::models::auth::AuthSuccessResponse,
            api::models::auth::PasswordResetRequest,
            api::models::auth::PasswordResetConfirmRequest,
            api::models::auth::PasswordResetResponse,
            api::models::auth::ChangePasswordRequest,
            api::models::users::Role,
            api::models::users::UserResponse,
            api::models::users::UserUpdate,
            api::models::applications::ApplicationStatus,
            api::models::applications::ApplicationCreate,
            api::models::applications::ApplicationResponse,
            api::models::applications::ReviewRequest,
            api::models::applications::ApprovalResponse,
            api::models::applications::BulkAction,
            api::models::applications::BulkActionRequest,
            api::models::applications::BulkActionResponse,
            api::models::applications::BulkFailure,
            api::models::profiles::TimeOfDay,
            api::models::profiles::VolunteerStatus,
            api::models::profiles::ProfileResponse,
            api::models::profiles::ProfileUpdate,
            api::models::shifts::Priority,
            api::models::shifts::ShiftStatus,
            api::models::shifts::ShiftCreate,
            api::models::shifts::ShiftUpdate,
            api::models::shifts::ShiftResponse,
            api::models::shifts::SignupRequest,
            api::models::shifts::SignupResponse,
            api::models::shifts::VolunteerStats,
            api::models::shifts::RequirementMatch,
            api::models::shifts::ShiftValidationResponse,
            api::models::shifts::RecommendedShift,
            api::models::assignments::AssignmentStatus,
            api::models::assignments::AssignmentResponse,
            api::models::assignments::CancelRequest,
            api::models::assignments::CompleteRequest,
            api::models::dashboard::VolunteerDashboard,
            api::models::dashboard::AdminDashboardStats,
            api::models::tasks::TaskStatus,
            api::models::tasks::TaskCreate,
            api::models::tasks::TaskUpdate,
            api::models::tasks::TaskResponse,
            api::models::help_requests::HelpRequestStatus,
            api::models::help_requests::HelpRequestCreate,
            api::models::help_requests::HelpRequestUpdate,
            api::models::help_requests::HelpRequestResponse,
            api::models::support_tickets::TicketStatus,
            api::models::support_tickets::TicketCreate,
            api::models::support_tickets::TicketUpdate,
            api::models::support_tickets::TicketResponse,
            api::models::documents::DocumentResponse,
            api::models::documents::DocumentUpload,
            api::models::messages::Folder,
            api::models::messages::MessageCreate,
            api::models::messages::MessageResponse,
            api::models::messages::UnreadCount,
            api::models::notifications::NotificationResponse,
            api::models::notifications::MarkedRead,
            api::models::notifications::OutboxStatus,
            api::models::notifications::OutboxEntryResponse,
            api::models::notifications::OutboxStats,
            api::models::audit_logs::AuditLogResponse,
            api::models::privacy::PrivacyRequestKind,
            api::models::privacy::PrivacyRequestStatus,
            api::models::privacy::PrivacyRequestCreate,
            api::models::privacy::PrivacyRequestResponse,
            api::models::privacy::PrivacyRejectRequest,
        )
    ),
    tags(
        (name = "authentication", description = "Registration, login and password management"),
        (name = "users", description = "Accounts and roles"),
        (name = "applications", description = "Public volunteer applications and their review"),
        (name = "profiles", description = "Volunteer profiles: skills, availability and roles"),
        (name = "shifts", description = "Shift catalogue, signup, eligibility checks and recommendations.

Signups are checked against the scheduling rules. A rejected signup returns `{reason, code}` where
`code` is one of `TOO_LATE`, `REQUIREMENTS_NOT_MET`, `SHIFT_TAKEN`, `TIME_CONFLICT`, `CAPACITY_FULL`,
`INVALID_TIME_RANGE`, `NOT_CANCELLABLE` or `INVALID_STATE`."),
        (name = "assignments", description = "Bookings and their outcomes"),
        (name = "dashboard", description = "Volunteer and organisation summaries"),
        (name = "tasks", description = "Internal staff tasks"),
        (name = "help_requests", description = "Requests for help from the public"),
        (name = "support_tickets", description = "Support conversations with users and visitors"),
        (name = "documents", description = "Uploaded documents such as certificates and declarations"),
        (name = "messages", description = "Direct messages between accounts"),
        (name = "notifications", description = "In-app notifications and the email outbox"),
        (name = "audit_logs", description = "Trail of administrative actions"),
        (name = "privacy", description = "Data export and account deletion requests"),
    ),
    info(
        title = "Volunteer Hub API",
        version = "1.0.0",
        description = "Backend for running a charity's volunteer programme: applications, shift scheduling, \
        help requests, support tickets, documents, messaging and privacy requests.

## Authentication

Most endpoints need a session token from `POST /api/v1/auth/login`, sent as `Authorization: Bearer <token>` \
or in the session cookie. Public forms (applications, help requests, support tickets) accept anonymous callers.",
    ),
)]
pub struct ApiDoc;
