//! Repository implementations for database access.
//!
//! Each repository wraps a `&mut PgConnection` (a pooled connection or an open
//! transaction) and exposes strongly-typed queries for one table. Entities with
//! plain CRUD semantics implement the [`Repository`] trait; workflow-heavy ones
//! (assignments, the outbox, privacy requests) expose purpose-built methods instead.
//!
//! ```ignore
//! use volunteer_hub::db::handlers::{Repository, Users};
//!
//! let mut tx = pool.begin().await?;
//! let user = Users::new(&mut tx).get_by_id(user_id).await?;
//! tx.commit().await?;
//! ```
//!
//! Multi-row workflows (approving an application, booking a shift) open one
//! transaction and build several repositories over it in turn.

pub mod applications;
pub mod assignments;
pub mod audit_logs;
pub mod document_storage;
pub mod documents;
pub mod help_requests;
pub mod messages;
pub mod notifications;
pub mod outbox;
pub mod password_reset_tokens;
pub mod privacy_requests;
pub mod profiles;
pub mod repository;
pub mod revoked_tokens;
pub mod shifts;
pub mod support_tickets;
pub mod tasks;
pub mod users;

pub use applications::Applications;
pub use assignments::Assignments;
pub use audit_logs::AuditLogs;
pub use documents::Documents;
pub use help_requests::HelpRequests;
pub use messages::Messages;
pub use notifications::Notifications;
pub use outbox::Outbox;
pub use password_reset_tokens::PasswordResetTokens;
pub use privacy_requests::PrivacyRequests;
pub use profiles::Profiles;
pub use repository::Repository;
pub use revoked_tokens::RevokedTokens;
pub use shifts::Shifts;
pub use support_tickets::SupportTickets;
pub use tasks::Tasks;
pub use users::Users;
