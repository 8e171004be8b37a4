use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::roles::{self, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserStatus {
    Active,
    Archived,
}

impl UserStatus {
    pub fn from_wire(s: &str) -> Option<UserStatus> {
        match s {
            "ACTIVE" => Some(UserStatus::Active),
            "ARCHIVED" => Some(UserStatus::Archived),
            _ => None,
        }
    }

    pub fn as_wire(&self) -> &'static str {
        match self {
            UserStatus::Active => "ACTIVE",
            UserStatus::Archived => "ARCHIVED",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub status: String,
    pub base_roles: Vec<String>,
    pub department: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Typed view of the stored role list. Unknown strings are dropped,
    /// so a corrupted row can only lose privilege, never gain it.
    pub fn roles(&self) -> Vec<Role> {
        roles::roles_from_wire(&self.base_roles)
    }

    pub fn is_active(&self) -> bool {
        UserStatus::from_wire(&self.status) == Some(UserStatus::Active)
    }

    pub fn holds(&self, role: Role) -> bool {
        self.roles().contains(&role)
    }

    /// True when FACULTY is the user's only base role, the shape the
    /// delegated-promotion flow requires of its subject.
    pub fn is_faculty_only(&self) -> bool {
        self.roles() == [Role::Faculty]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn user_with_roles(stored: &[&str]) -> User {
        User {
            id: Uuid::new_v4(),
            email: "f1@example.edu".into(),
            name: "F One".into(),
            status: "ACTIVE".into(),
            base_roles: stored.iter().map(|s| s.to_string()).collect(),
            department: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn unknown_stored_role_is_dropped() {
        let user = user_with_roles(&["FACULTY", "WIZARD"]);
        assert_eq!(user.roles(), vec![Role::Faculty]);
        assert!(user.is_faculty_only());
    }

    #[test]
    fn faculty_only_requires_exactly_faculty() {
        assert!(user_with_roles(&["FACULTY"]).is_faculty_only());
        assert!(!user_with_roles(&["FACULTY", "ACADEMIC_HEAD"]).is_faculty_only());
        assert!(!user_with_roles(&["ADMIN"]).is_faculty_only());
    }

    #[test]
    fn archived_user_is_not_active() {
        let mut user = user_with_roles(&["FACULTY"]);
        user.status = "ARCHIVED".into();
        assert!(!user.is_active());
    }
}
