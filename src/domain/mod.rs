//! Domain types shared by the directory, the reset coordinator and the API.
//!
//! Role dispatch is resolved once here: every role knows which table holds
//! its accounts and which column identifies a user at login or reset time.

pub mod reset;

pub use reset::{NewResetRequest, ResetRequest, ResetSession, ResetStep};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The three kinds of account the portal knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Staff,
    Student,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Staff => "staff",
            Self::Student => "student",
        }
    }

    /// Table holding accounts of this role.
    #[must_use]
    pub const fn table(self) -> &'static str {
        match self {
            Self::Admin => "admins",
            Self::Staff => "staff",
            Self::Student => "students",
        }
    }

    /// Column a user types into the login and forgot-password forms.
    ///
    /// Admins sign in with a username, staff with their email address and
    /// students with the virtual id printed on their card.
    #[must_use]
    pub const fn lookup_column(self) -> &'static str {
        match self {
            Self::Admin => "username",
            Self::Staff => "email",
            Self::Student => "virtual_id",
        }
    }

    /// Human label for the identifier, used in validation messages.
    #[must_use]
    pub const fn identifier_label(self) -> &'static str {
        match self {
            Self::Admin => "username",
            Self::Staff => "email address",
            Self::Student => "virtual ID",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role '{0}', expected admin, staff or student")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "staff" => Ok(Self::Staff),
            "student" => Ok(Self::Student),
            _ => Err(UnknownRole(s.to_string())),
        }
    }
}

/// Row id of an account inside its role's table.
///
/// The same number means different people in different tables, so a
/// `UserId` is only meaningful next to a [`Role`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(i32);

impl UserId {
    #[must_use]
    pub const fn new(id: i32) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn value(&self) -> i32 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for UserId {
    fn from(id: i32) -> Self {
        Self::new(id)
    }
}

impl From<UserId> for i32 {
    fn from(id: UserId) -> Self {
        id.0
    }
}

/// Identity stored in the session after a successful login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub user_id: UserId,
    pub role: Role,
    pub display_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parses_case_insensitively() {
        assert_eq!("Admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!(" staff ".parse::<Role>().unwrap(), Role::Staff);
        assert_eq!("STUDENT".parse::<Role>().unwrap(), Role::Student);
        assert!("teacher".parse::<Role>().is_err());
        assert!("".parse::<Role>().is_err());
    }

    #[test]
    fn role_lookup_columns() {
        assert_eq!(Role::Admin.lookup_column(), "username");
        assert_eq!(Role::Staff.lookup_column(), "email");
        assert_eq!(Role::Student.lookup_column(), "virtual_id");
    }

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_string(&Role::Student).unwrap();
        assert_eq!(json, "\"student\"");
        let back: Role = serde_json::from_str("\"staff\"").unwrap();
        assert_eq!(back, Role::Staff);
    }

    #[test]
    fn user_id_is_transparent() {
        let id = UserId::new(7);
        assert_eq!(serde_json::to_string(&id).unwrap(), "7");
        assert_eq!(id.to_string(), "7");
        assert_eq!(i32::from(id), 7);
    }
}
