//! User model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A registered member of the site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    /// Username (unique)
    pub username: String,
    /// Email address (unique)
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    /// Password hash (argon2)
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: UserRole,
    pub date_joined: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl User {
    /// Create a new User with the given parameters.
    ///
    /// The password must already be hashed, see `services::password::hash_password`.
    pub fn new(
        username: String,
        email: String,
        first_name: String,
        last_name: String,
        password_hash: String,
        role: UserRole,
    ) -> Self {
        Self {
            id: 0, // Will be set by the database
            username,
            email,
            first_name,
            last_name,
            password_hash,
            role,
            date_joined: Utc::now(),
            last_login: None,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    /// Admins may edit anything, members only what they own.
    pub fn can_edit(&self, owner_id: i64) -> bool {
        self.is_admin() || self.id == owner_id
    }

    /// "First Last", or the username when both names are blank.
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name.trim(), self.last_name.trim());
        let full = full.trim();
        if full.is_empty() {
            self.username.clone()
        } else {
            full.to_string()
        }
    }
}

/// Public subset of a user, safe to hand to templates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserSummary {
    pub id: i64,
    pub username: String,
    pub is_admin: bool,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            is_admin: user.is_admin(),
        }
    }
}

/// User role for authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Manages categories and may edit any post or profile
    Admin,
    #[default]
    Member,
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserRole::Admin => write!(f, "admin"),
            UserRole::Member => write!(f, "member"),
        }
    }
}

impl FromStr for UserRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(UserRole::Admin),
            "member" => Ok(UserRole::Member),
            _ => Err(anyhow::anyhow!("Invalid user role: {}", s)),
        }
    }
}

/// Input for creating a new user
#[derive(Debug, Clone)]
pub struct CreateUserInput {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    /// Plain-text password, hashed by the service
    pub password: String,
    /// Second entry of the password, must equal `password`
    pub password_confirmation: String,
}

impl CreateUserInput {
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        let password = password.into();
        Self {
            username: username.into(),
            email: email.into(),
            first_name: String::new(),
            last_name: String::new(),
            password_confirmation: password.clone(),
            password,
        }
    }

    pub fn with_names(mut self, first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        self.first_name = first_name.into();
        self.last_name = last_name.into();
        self
    }

    pub fn with_confirmation(mut self, password_confirmation: impl Into<String>) -> Self {
        self.password_confirmation = password_confirmation.into();
        self
    }
}

/// Account settings a user can change about themself
#[derive(Debug, Clone)]
pub struct UpdateUserInput {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: i64, role: UserRole) -> User {
        let mut user = User::new(
            "alice".into(),
            "alice@example.com".into(),
            String::new(),
            String::new(),
            "hash".into(),
            role,
        );
        user.id = id;
        user
    }

    #[test]
    fn test_can_edit() {
        let member = user(1, UserRole::Member);
        assert!(member.can_edit(1));
        assert!(!member.can_edit(2));

        let admin = user(3, UserRole::Admin);
        assert!(admin.can_edit(1));
    }

    #[test]
    fn test_display_name() {
        let mut u = user(1, UserRole::Member);
        assert_eq!(u.display_name(), "alice");

        u.first_name = "Alice".into();
        u.last_name = "Martin".into();
        assert_eq!(u.display_name(), "Alice Martin");
    }

    #[test]
    fn test_role_parse_and_display() {
        assert_eq!("ADMIN".parse::<UserRole>().unwrap(), UserRole::Admin);
        assert_eq!("member".parse::<UserRole>().unwrap(), UserRole::Member);
        assert!("author".parse::<UserRole>().is_err());
        assert_eq!(UserRole::Member.to_string(), "member");
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let json = serde_json::to_string(&user(1, UserRole::Member)).unwrap();
        assert!(!json.contains("hash"));
        assert!(json.contains("\"role\":\"member\""));
    }
}
