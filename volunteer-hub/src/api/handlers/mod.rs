//! HTTP request handlers for all API endpoints.
//!
//! This module contains Axum route handlers organized by resource type.
//! Each handler is responsible for:
//! - Request validation and deserialization
//! - Authentication and authorization checks
//! - Reads and writes through the database repositories
//! - Response serialization
//!
//! # Handler Modules
//!
//! - [`auth`]: Login, registration, logout and password management
//! - [`users`]: The caller's account and admin user management
//! - [`applications`]: Public volunteer applications, review and bulk actions
//! - [`profiles`]: Volunteer profile
//! - [`shifts`]: Shift catalogue, signup, eligibility checks and recommendations
//! - [`assignments`]: Bookings: listing, cancellation, completion, no-shows
//! - [`dashboard`]: Volunteer and admin summaries
//! - [`tasks`], [`help_requests`], [`support_tickets`]: Operations
//! - [`documents`]: Multipart uploads and downloads
//! - [`messages`], [`notifications`]: Direct messages, in-app feed and the email outbox
//! - [`audit_logs`], [`privacy`]: Compliance
//!
//! # Authentication
//!
//! Handlers take a [`crate::api::models::users::CurrentUser`] (or `Option<CurrentUser>` on
//! public routes) or a [`crate::auth::permissions::RequiresPermission`] extractor.
//!
//! # Error Handling
//!
//! Handlers return [`crate::errors::Error`], which converts to the matching HTTP status.
//! Business rule rejections carry a `{reason, code}` body.

pub mod applications;
pub mod assignments;
pub mod audit_logs;
pub mod auth;
pub mod dashboard;
pub mod documents;
pub mod help_requests;
pub mod messages;
pub mod notifications;
pub mod privacy;
pub mod profiles;
pub mod shifts;
pub mod support_tickets;
pub mod tasks;
pub mod users;
