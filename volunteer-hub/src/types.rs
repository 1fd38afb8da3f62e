//! Common type definitions and permission system types.
//!
//! This module defines:
//! - Type aliases for entity IDs (UserId, ShiftId, etc.)
//! - Permission and authorization types
//! - Resource and operation enums for access control
//!
//! # Permission System
//!
//! The permission system is based on three core types:
//!
//! - [`Resource`]: What entity type is being accessed (Shifts, Documents, ...)
//! - [`Operation`]: What action is being performed (Read, Create, Update, Delete)
//! - [`Permission`]: Authorization requirement combining resource and operation
//!
//! Operations come in two flavors:
//! - **All**: Unrestricted access to all entities (e.g., `ReadAll`, `DeleteAll`)
//! - **Own**: Restricted to the caller's own entities (e.g., `ReadOwn`, `UpdateOwn`)
//!
//! Which roles hold which permissions is decided in [`crate::auth::permissions`].

use std::fmt;
use uuid::Uuid;

pub type UserId = Uuid;
pub type ApplicationId = Uuid;
pub type ShiftId = Uuid;
pub type AssignmentId = Uuid;
pub type TaskId = Uuid;
pub type HelpRequestId = Uuid;
pub type TicketId = Uuid;
pub type DocumentId = Uuid;
pub type MessageId = Uuid;
pub type NotificationId = Uuid;
pub type OutboxId = Uuid;
pub type AuditLogId = Uuid;
pub type PrivacyRequestId = Uuid;

/// Abbreviate a UUID to its first 8 characters for more readable logs and traces
/// Example: "550e8400-e29b-41d4-a716-446655440000" -> "550e8400"
pub fn abbrev_uuid(uuid: &Uuid) -> String {
    uuid.to_string().chars().take(8).collect()
}

// *-All means unrestricted access, *-Own means restricted to own resources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateAll,
    CreateOwn,
    ReadAll,
    ReadOwn,
    UpdateAll,
    UpdateOwn,
    DeleteAll,
    DeleteOwn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Users,
    Applications,
    Profiles,
    Shifts,
    Assignments,
    Tasks,
    HelpRequests,
    SupportTickets,
    Documents,
    Messages,
    Notifications,
    AuditLogs,
    PrivacyRequests,
    Dashboard,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Permission {
    Allow(Resource, Operation),
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::CreateAll | Operation::CreateOwn => write!(f, "Create"),
            Operation::ReadAll | Operation::ReadOwn => write!(f, "Read"),
            Operation::UpdateAll | Operation::UpdateOwn => write!(f, "Update"),
            Operation::DeleteAll | Operation::DeleteOwn => write!(f, "Delete"),
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Resource::Users => "users",
            Resource::Applications => "volunteer applications",
            Resource::Profiles => "volunteer profiles",
            Resource::Shifts => "shifts",
            Resource::Assignments => "shift assignments",
            Resource::Tasks => "tasks",
            Resource::HelpRequests => "help requests",
            Resource::SupportTickets => "support tickets",
            Resource::Documents => "documents",
            Resource::Messages => "messages",
            Resource::Notifications => "notifications",
            Resource::AuditLogs => "audit logs",
            Resource::PrivacyRequests => "privacy requests",
            Resource::Dashboard => "dashboard",
        };
        f.write_str(name)
    }
}
