//! HTTP layer: axum route handlers and their request/response models.
//!
//! All routes live under `/api/v1`:
//!
//! - `/auth/*`: Registration, login, logout, password reset
//! - `/users/current`, `/admin/users/*`: Accounts and roles
//! - `/volunteer/*`: Applications, profile, signups, own assignments and dashboard
//! - `/shifts/*`: The shift catalogue
//! - `/tasks/*`, `/help-requests`, `/support-tickets/*`: Operations
//! - `/documents/*`, `/messages/*`, `/notifications/*`: Communication
//! - `/privacy/*`: Export and deletion requests
//! - `/admin/*`: Review, scheduling, outbox, audit and privacy administration
//!
//! The OpenAPI document is served at `/api/openapi.json` with a browsable
//! reference at `/api/docs`.

pub mod handlers;
pub mod models;
