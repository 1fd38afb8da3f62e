//! Database record models matching table schemas.
//!
//! `*DBRequest` structs carry validated input into a repository; `*DBResponse`
//! structs derive `sqlx::FromRow` and mirror a table row. API models in
//! [`crate::api::models`] convert from these with `From`, so the storage shape
//! can change without touching the wire format.

pub mod applications;
pub mod assignments;
pub mod audit_logs;
pub mod documents;
pub mod help_requests;
pub mod messages;
pub mod notifications;
pub mod password_reset_tokens;
pub mod privacy_requests;
pub mod profiles;
pub mod shifts;
pub mod support_tickets;
pub mod tasks;
pub mod users;
