use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Portal role. Missing or unrecognized roles read as `Student`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "Option<String>")]
pub enum Role {
    #[default]
    Student,
    Lecturer,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Lecturer => "lecturer",
            Role::Admin => "admin",
        }
    }

    /// Parse a role name, case-insensitively
    pub fn parse(name: &str) -> Option<Role> {
        match name.trim().to_ascii_lowercase().as_str() {
            "student" => Some(Role::Student),
            "lecturer" => Some(Role::Lecturer),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

impl From<Option<String>> for Role {
    fn from(name: Option<String>) -> Self {
        name.as_deref().and_then(Role::parse).unwrap_or_default()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cached snapshot of the server-side user.
///
/// Replaced wholesale on every login, never merged field by field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Role,
    /// Any further fields the server sends (department, year, bio, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UserProfile {
    /// String value of an additional profile field
    pub fn field(&self, name: &str) -> Option<&str> {
        self.extra.get(name).and_then(Value::as_str)
    }
}
