// Static role model: the closed set of roles and the permissions each
// role carries. Pure lookups only - authorization state (break-glass
// elevation) lives in the services layer.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Base roles a portal account can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    AcademicHead,
    Faculty,
}

impl Role {
    /// Parse the wire/storage representation. Unknown strings map to
    /// `None` so a mistyped role never grants anything.
    pub fn from_wire(s: &str) -> Option<Role> {
        match s {
            "ADMIN" => Some(Role::Admin),
            "ACADEMIC_HEAD" => Some(Role::AcademicHead),
            "FACULTY" => Some(Role::Faculty),
            _ => None,
        }
    }

    pub fn as_wire(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::AcademicHead => "ACADEMIC_HEAD",
            Role::Faculty => "FACULTY",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// Capability tokens checked by handlers and services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Permission {
    /// Provision accounts, edit role assignments, archive users.
    ManageUsers,
    /// Trigger break-glass activation (either flow).
    ActivateBreakGlass,
    /// See every active break-glass session, not just one's own.
    ViewAllSessions,
    /// Query another user's break-glass status.
    QueryOtherStatus,
    /// Read the audit log.
    ViewAuditLog,
    /// Bulk-export audit entries for retention tooling.
    ExportAuditLog,
    /// Access the faculty load view.
    ViewFacultyLoad,
}

/// Permissions statically granted by one role.
fn grants(role: Role) -> &'static [Permission] {
    match role {
        Role::Admin => &[
            Permission::ManageUsers,
            Permission::ActivateBreakGlass,
            Permission::QueryOtherStatus,
            Permission::ViewAuditLog,
            Permission::ExportAuditLog,
            Permission::ViewFacultyLoad,
        ],
        Role::AcademicHead => &[
            Permission::ActivateBreakGlass,
            Permission::ViewAllSessions,
            Permission::ViewAuditLog,
            Permission::ViewFacultyLoad,
        ],
        Role::Faculty => &[Permission::ViewFacultyLoad],
    }
}

/// Union of permissions across all roles held.
pub fn permissions_of(roles: &[Role]) -> HashSet<Permission> {
    roles.iter().flat_map(|r| grants(*r).iter().copied()).collect()
}

/// Fails closed: no roles, or roles granting nothing, means `false`.
pub fn has_permission(roles: &[Role], permission: Permission) -> bool {
    roles.iter().any(|r| grants(*r).contains(&permission))
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RoleSetError {
    #[error("a user must hold at least one role")]
    Empty,
    #[error("a user cannot hold both ADMIN and ACADEMIC_HEAD")]
    AdminHeadExclusive,
}

/// A validated base role assignment. Construction enforces the
/// organizational exclusivity rule: ADMIN and ACADEMIC_HEAD never
/// coexist on one account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleSet(Vec<Role>);

impl RoleSet {
    pub fn new(roles: Vec<Role>) -> Result<Self, RoleSetError> {
        if roles.is_empty() {
            return Err(RoleSetError::Empty);
        }
        if roles.contains(&Role::Admin) && roles.contains(&Role::AcademicHead) {
            return Err(RoleSetError::AdminHeadExclusive);
        }
        let mut deduped: Vec<Role> = Vec::with_capacity(roles.len());
        for role in roles {
            if !deduped.contains(&role) {
                deduped.push(role);
            }
        }
        Ok(RoleSet(deduped))
    }

    pub fn roles(&self) -> &[Role] {
        &self.0
    }

    pub fn to_wire(&self) -> Vec<String> {
        self.0.iter().map(|r| r.as_wire().to_string()).collect()
    }
}

/// Decode a stored role list, dropping anything unrecognized.
pub fn roles_from_wire(stored: &[String]) -> Vec<Role> {
    stored.iter().filter_map(|s| Role::from_wire(s)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_round_trip() {
        for role in [Role::Admin, Role::AcademicHead, Role::Faculty] {
            assert_eq!(Role::from_wire(role.as_wire()), Some(role));
        }
        assert_eq!(Role::from_wire("SUPERUSER"), None);
    }

    #[test]
    fn unknown_roles_grant_nothing() {
        let roles = roles_from_wire(&["GODMODE".to_string()]);
        assert!(roles.is_empty());
        assert!(!has_permission(&roles, Permission::ManageUsers));
    }

    #[test]
    fn admin_holds_user_management() {
        assert!(has_permission(&[Role::Admin], Permission::ManageUsers));
        assert!(!has_permission(&[Role::AcademicHead], Permission::ManageUsers));
        assert!(!has_permission(&[Role::Faculty], Permission::ManageUsers));
    }

    #[test]
    fn activation_restricted_to_admin_and_head() {
        assert!(has_permission(&[Role::Admin], Permission::ActivateBreakGlass));
        assert!(has_permission(&[Role::AcademicHead], Permission::ActivateBreakGlass));
        assert!(!has_permission(&[Role::Faculty], Permission::ActivateBreakGlass));
    }

    #[test]
    fn permissions_union_across_roles() {
        let perms = permissions_of(&[Role::Faculty, Role::AcademicHead]);
        assert!(perms.contains(&Permission::ViewFacultyLoad));
        assert!(perms.contains(&Permission::ViewAllSessions));
        assert!(!perms.contains(&Permission::ManageUsers));
    }

    #[test]
    fn role_set_rejects_admin_head_pair() {
        let err = RoleSet::new(vec![Role::Admin, Role::AcademicHead]).unwrap_err();
        assert_eq!(err, RoleSetError::AdminHeadExclusive);
    }

    #[test]
    fn role_set_rejects_empty() {
        assert_eq!(RoleSet::new(vec![]).unwrap_err(), RoleSetError::Empty);
    }

    #[test]
    fn role_set_dedupes() {
        let set = RoleSet::new(vec![Role::Faculty, Role::Faculty]).unwrap();
        assert_eq!(set.roles(), &[Role::Faculty]);
    }
}
