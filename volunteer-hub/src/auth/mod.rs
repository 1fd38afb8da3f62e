//! Authentication and authorization system.
//!
//! - User authentication with signed JWT sessions
//! - Password hashing and validation
//! - Token revocation on logout
//! - Role based permission checks
//!
//! # Authentication
//!
//! Users log in via `/api/v1/auth/login` with email/password and receive a JWT.
//! The token is returned in the response body and set as an HTTP-only cookie, so
//! both API clients (`Authorization: Bearer <token>`) and browsers are served.
//!
//! Each token carries a unique `jti`. Logging out records the `jti` in the
//! `revoked_tokens` table, and the extractor refuses revoked tokens as well as
//! tokens belonging to deleted accounts.
//!
//! # Authorization
//!
//! Platform roles (Admin, Staff, Volunteer, Donor, Visitor) map to
//! `(Resource, Operation)` grants. See [`permissions`].
//!
//! # Modules
//!
//! - [`current_user`]: Extractors for getting the authenticated user in handlers
//! - [`password`]: Password hashing and verification using Argon2
//! - [`permissions`]: Role grants and the `RequiresPermission` extractor
//! - [`session`]: JWT session tokens
//! - [`utils`]: Cookie and username helpers
//!
//! # Usage in Handlers
//!
//! ```ignore
//! use volunteer_hub::api::models::users::CurrentUser;
//!
//! async fn protected_handler(current_user: CurrentUser) -> Result<String> {
//!     Ok(format!("Hello, {}!", current_user.username))
//! }
//!
//! // Anonymous callers allowed
//! async fn open_handler(current_user: Option<CurrentUser>) -> Result<String> { ... }
//! ```

pub mod current_user;
pub mod password;
pub mod permissions;
pub mod session;
pub mod utils;
