//! Role based access control.
//!
//! Each [`Role`] grants a fixed set of `(Resource, Operation)` pairs. Admin
//! accounts (the `is_admin` flag or the `Admin` role) hold every permission.
//! An `*All` grant implies the matching `*Own` grant.
//!
//! Handlers declare what they need with the [`RequiresPermission`] extractor:
//!
//! ```ignore
//! async fn create_shift(
//!     State(state): State<AppState>,
//!     current_user: RequiresPermission<resource::Shifts, operation::CreateAll>,
//!     Json(body): Json<ShiftCreate>,
//! ) -> Result<Json<ShiftResponse>> { ... }
//! ```
//!
//! Handlers that serve both owners and managers check
//! [`has_permission`] themselves and scope their query accordingly.

use std::{marker::PhantomData, ops::Deref};

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::{
    AppState,
    api::models::users::{CurrentUser, Role},
    errors::{Error, Result},
    types::{Operation, Permission, Resource},
};

use Operation::*;
use Resource::*;

/// Permissions every authenticated account holds.
const VISITOR: &[(Resource, Operation)] = &[
    (Users, ReadOwn),
    (Users, UpdateOwn),
    (Shifts, ReadAll),
    (Messages, CreateOwn),
    (Messages, ReadOwn),
    (Notifications, ReadOwn),
    (Notifications, UpdateOwn),
    (SupportTickets, CreateOwn),
    (SupportTickets, ReadOwn),
    (PrivacyRequests, CreateOwn),
    (PrivacyRequests, ReadOwn),
];

const DONOR: &[(Resource, Operation)] = &[(Documents, CreateOwn), (Documents, ReadOwn), (Documents, DeleteOwn)];

const VOLUNTEER: &[(Resource, Operation)] = &[
    (Profiles, ReadOwn),
    (Profiles, UpdateOwn),
    (Assignments, CreateOwn),
    (Assignments, ReadOwn),
    (Assignments, UpdateOwn),
    (Dashboard, ReadOwn),
    (Documents, CreateOwn),
    (Documents, ReadOwn),
    (Documents, DeleteOwn),
];

const STAFF: &[(Resource, Operation)] = &[
    (Users, ReadAll),
    (Applications, ReadAll),
    (Profiles, ReadAll),
    (Shifts, CreateAll),
    (Shifts, UpdateAll),
    (Assignments, ReadAll),
    (Assignments, UpdateAll),
    (Tasks, CreateAll),
    (Tasks, ReadAll),
    (Tasks, UpdateAll),
    (Tasks, DeleteAll),
    (HelpRequests, ReadAll),
    (HelpRequests, UpdateAll),
    (SupportTickets, ReadAll),
    (SupportTickets, UpdateAll),
    (Documents, ReadAll),
    (Documents, CreateOwn),
    (Documents, DeleteOwn),
    (Dashboard, ReadAll),
];

fn grants(role: Role) -> &'static [(Resource, Operation)] {
    match role {
        // Admin is handled before the table is consulted
        Role::Admin => &[],
        Role::Staff => STAFF,
        Role::Volunteer => VOLUNTEER,
        Role::Donor => DONOR,
        Role::Visitor => VISITOR,
    }
}

/// The `*All` operation that implies an `*Own` one.
fn widened(operation: Operation) -> Option<Operation> {
    match operation {
        CreateOwn => Some(CreateAll),
        ReadOwn => Some(ReadAll),
        UpdateOwn => Some(UpdateAll),
        DeleteOwn => Some(DeleteAll),
        _ => None,
    }
}

pub fn is_admin(user: &CurrentUser) -> bool {
    user.is_admin || user.has_role(Role::Admin)
}

pub fn has_permission(user: &CurrentUser, resource: Resource, operation: Operation) -> bool {
    if is_admin(user) {
        return true;
    }

    let wanted = [Some(operation), widened(operation)];
    user.roles
        .iter()
        .chain(std::iter::once(&Role::Visitor))
        .flat_map(|role| grants(*role))
        .any(|(r, op)| *r == resource && wanted.contains(&Some(*op)))
}

/// True when the caller may see every row of `resource`, not only their own.
pub fn can_read_all_resources(user: &CurrentUser, resource: Resource) -> bool {
    has_permission(user, resource, ReadAll)
}

pub fn require(user: &CurrentUser, resource: Resource, operation: Operation) -> Result<()> {
    if has_permission(user, resource, operation) {
        Ok(())
    } else {
        Err(Error::InsufficientPermissions {
            required: Permission::Allow(resource, operation),
            action: operation,
            resource: resource.to_string(),
        })
    }
}

pub trait ResourceMarker: Send + Sync {
    const RESOURCE: Resource;
}

pub trait OperationMarker: Send + Sync {
    const OPERATION: Operation;
}

macro_rules! markers {
    ($trait:ident, $assoc:ident, $ty:ident, [$($name:ident),* $(,)?]) => {
        $(
            pub struct $name;
            impl super::$trait for $name {
                const $assoc: super::$ty = super::$ty::$name;
            }
        )*
    };
}

pub mod resource {
    markers!(
        ResourceMarker,
        RESOURCE,
        Resource,
        [
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
        ]
    );
}

pub mod operation {
    markers!(
        OperationMarker,
        OPERATION,
        Operation,
        [CreateAll, CreateOwn, ReadAll, ReadOwn, UpdateAll, UpdateOwn, DeleteAll, DeleteOwn]
    );
}

/// Extractor that authenticates the caller and checks one permission.
/// Dereferences to the [`CurrentUser`].
pub struct RequiresPermission<R, O> {
    user: CurrentUser,
    _marker: PhantomData<fn() -> (R, O)>,
}

impl<R, O> RequiresPermission<R, O> {
    pub fn into_inner(self) -> CurrentUser {
        self.user
    }
}

impl<R, O> Deref for RequiresPermission<R, O> {
    type Target = CurrentUser;

    fn deref(&self) -> &CurrentUser {
        &self.user
    }
}

impl<R: ResourceMarker, O: OperationMarker> FromRequestParts<AppState> for RequiresPermission<R, O> {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let user = <CurrentUser as FromRequestParts<AppState>>::from_request_parts(parts, state).await?;
        require(&user, R::RESOURCE, O::OPERATION)?;
        Ok(Self {
            user,
            _marker: PhantomData,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn user_with(roles: Vec<Role>, is_admin: bool) -> CurrentUser {
        CurrentUser {
            id: Uuid::new_v4(),
            username: "someone".to_string(),
            email: "someone@example.org".to_string(),
            is_admin,
            roles,
            display_name: None,
            session_id: None,
        }
    }

    #[test]
    fn admin_holds_everything() {
        let flag = user_with(vec![], true);
        let role = user_with(vec![Role::Admin], false);
        for user in [flag, role] {
            assert!(has_permission(&user, AuditLogs, ReadAll));
            assert!(has_permission(&user, PrivacyRequests, UpdateAll));
            assert!(has_permission(&user, Users, DeleteAll));
        }
    }

    #[test]
    fn all_implies_own() {
        let staff = user_with(vec![Role::Staff], false);
        assert!(has_permission(&staff, Assignments, ReadOwn));
        assert!(has_permission(&staff, Tasks, DeleteOwn));
        assert!(!has_permission(&staff, AuditLogs, ReadAll));
    }

    #[test]
    fn own_does_not_imply_all() {
        let volunteer = user_with(vec![Role::Volunteer], false);
        assert!(has_permission(&volunteer, Assignments, CreateOwn));
        assert!(!has_permission(&volunteer, Assignments, ReadAll));
        assert!(!can_read_all_resources(&volunteer, Documents));
    }

    #[test]
    fn visitor_grants_apply_without_the_role() {
        let donor = user_with(vec![Role::Donor], false);
        assert!(has_permission(&donor, PrivacyRequests, CreateOwn));
        assert!(!has_permission(&donor, Profiles, ReadOwn));
    }

    #[test]
    fn require_reports_the_missing_permission() {
        let visitor = user_with(vec![Role::Visitor], false);
        let err = require(&visitor, Tasks, CreateAll).unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::FORBIDDEN);
        assert_eq!(err.user_message(), "Insufficient permissions to Create tasks");
    }
}
