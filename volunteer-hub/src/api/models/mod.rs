//! API request and response data models.
//!
//! Everything here is annotated with `utoipa` so it shows up in the OpenAPI
//! document served at `/api/docs`.
//!
//! - [`auth`]: Login, registration and password management payloads
//! - [`users`]: Accounts, roles and the authenticated [`users::CurrentUser`]
//! - [`applications`], [`profiles`]: Volunteer onboarding
//! - [`shifts`], [`assignments`]: Scheduling and bookings
//! - [`dashboard`]: Volunteer and admin summaries
//! - [`tasks`], [`help_requests`], [`support_tickets`]: Operations
//! - [`documents`], [`messages`], [`notifications`]: Communication
//! - [`audit_logs`], [`privacy`]: Compliance

pub mod applications;
pub mod assignments;
pub mod audit_logs;
pub mod auth;
pub mod dashboard;
pub mod documents;
pub mod help_requests;
pub mod messages;
pub mod notifications;
pub mod pagination;
pub mod privacy;
pub mod profiles;
pub mod shifts;
pub mod support_tickets;
pub mod tasks;
pub mod users;
