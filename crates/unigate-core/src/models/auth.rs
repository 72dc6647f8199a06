use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::user::{Role, UserProfile};

/// Profile fields that may appear at the top level of a login response
/// and take precedence over the nested `user` object.
const TOP_LEVEL_PROFILE_FIELDS: [&str; 3] = ["username", "email", "role"];

/// Access/refresh token pair.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access: String,
    pub refresh: String,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access", &"<redacted>")
            .field("refresh", &"<redacted>")
            .finish()
    }
}

/// Stored credentials plus the cached profile, if one could be read.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub credential: Credential,
    pub user: Option<UserProfile>,
}

/// Normalized login result: the tokens, the profile, and whatever else the
/// server put at the top level of its response.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginEnvelope {
    pub access: String,
    pub refresh: String,
    pub user: UserProfile,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LoginEnvelope {
    pub fn credential(&self) -> Credential {
        Credential {
            access: self.access.clone(),
            refresh: self.refresh.clone(),
        }
    }
}

impl fmt::Debug for LoginEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginEnvelope")
            .field("user", &self.user)
            .field("extra", &self.extra)
            .finish_non_exhaustive()
    }
}

/// The two login response shapes the portal has been seen to send.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum LoginResponse {
    /// `{"access", "refresh", "user": {...}, ...}`
    Nested {
        user: Map<String, Value>,
        #[serde(flatten)]
        top: Map<String, Value>,
    },
    /// `{"access", "refresh", "username", "email", "role", ...}`
    Flat(Map<String, Value>),
}

impl LoginResponse {
    /// Normalize into one envelope.
    ///
    /// Tokens are read from the top level first, then from `user`. The
    /// profile is the `user` object with `username`, `email` and `role`
    /// overridden by their top-level values where present.
    pub(crate) fn into_envelope(self) -> Result<LoginEnvelope, &'static str> {
        let (mut top, mut user) = match self {
            LoginResponse::Nested { user, top } => (top, user),
            LoginResponse::Flat(mut top) => {
                // A non-object `user` (usually null) carries nothing
                top.remove("user");
                (top, Map::new())
            }
        };

        let access = take_string(&mut top, "access").or_else(|| take_string(&mut user, "access"));
        let refresh =
            take_string(&mut top, "refresh").or_else(|| take_string(&mut user, "refresh"));
        let (access, refresh) = match (access, refresh) {
            (Some(access), Some(refresh)) => (access, refresh),
            _ => return Err("login response did not include access and refresh tokens"),
        };

        let mut profile = user;
        for field in TOP_LEVEL_PROFILE_FIELDS {
            if let Some(value) = top.get(field).filter(|v| !v.is_null()) {
                profile.insert(field.to_string(), value.clone());
            }
        }

        let user: UserProfile = serde_json::from_value(Value::Object(profile))
            .map_err(|_| "login response did not include a username")?;

        Ok(LoginEnvelope {
            access,
            refresh,
            user,
            extra: top,
        })
    }
}

fn take_string(map: &mut Map<String, Value>, key: &str) -> Option<String> {
    match map.get(key) {
        Some(Value::String(s)) if !s.is_empty() => {
            let s = s.clone();
            map.remove(key);
            Some(s)
        }
        _ => None,
    }
}

/// Account registration payload.
#[derive(Clone, Serialize, Deserialize)]
pub struct RegistrationForm {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub role: Role,
}

impl RegistrationForm {
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            password: password.into(),
            role: Role::default(),
        }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }
}

impl fmt::Debug for RegistrationForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrationForm")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalize(json: &str) -> Result<LoginEnvelope, &'static str> {
        serde_json::from_str::<LoginResponse>(json)
            .expect("login response should parse")
            .into_envelope()
    }

    #[test]
    fn test_flat_response() {
        let env = normalize(
            r#"{"access":"a","refresh":"r","username":"alice","email":"a@uni.edu","role":"admin","id":7}"#,
        )
        .unwrap();
        assert_eq!(env.credential(), Credential { access: "a".into(), refresh: "r".into() });
        assert_eq!(env.user.username, "alice");
        assert_eq!(env.user.role, Role::Admin);
        // Only identity fields are lifted into the profile
        assert!(env.user.extra.is_empty());
        assert_eq!(env.extra.get("id"), Some(&Value::from(7)));
        assert!(!env.extra.contains_key("access"));
    }

    #[test]
    fn test_nested_response_top_level_wins() {
        let env = normalize(
            r#"{
                "access": "a", "refresh": "r", "role": "lecturer",
                "user": {"username": "bob", "email": "b@uni.edu", "role": "student", "department": "Math"}
            }"#,
        )
        .unwrap();
        assert_eq!(env.user.username, "bob");
        assert_eq!(env.user.role, Role::Lecturer);
        assert_eq!(env.user.field("department"), Some("Math"));
        assert_eq!(env.extra.get("role"), Some(&Value::from("lecturer")));
    }

    #[test]
    fn test_tokens_nested_under_user() {
        let env = normalize(
            r#"{"user": {"access": "a", "refresh": "r", "username": "dana"}}"#,
        )
        .unwrap();
        assert_eq!(env.access, "a");
        assert_eq!(env.refresh, "r");
        assert_eq!(env.user.role, Role::Student);
        // Tokens never leak into the cached profile
        assert!(!env.user.extra.contains_key("access"));
    }

    #[test]
    fn test_missing_pieces_rejected() {
        assert!(normalize(r#"{"username":"x","access":"a"}"#).is_err());
        assert!(normalize(r#"{"access":"a","refresh":"r","user":null}"#).is_err());
        assert!(normalize(r#"{"access":"a","refresh":"r","user":null,"username":"x"}"#).is_ok());
    }

    #[test]
    fn test_registration_form_hides_password() {
        let form = RegistrationForm::new("eve", "e@uni.edu", "hunter2");
        assert_eq!(form.role, Role::Student);
        assert!(!format!("{:?}", form).contains("hunter2"));

        let body = serde_json::to_value(form.with_role(Role::Lecturer)).unwrap();
        assert_eq!(body["role"], "lecturer");
        assert_eq!(body["password"], "hunter2");
    }

    #[test]
    fn test_credential_debug_redacted() {
        let cred = Credential { access: "secret-a".into(), refresh: "secret-r".into() };
        let shown = format!("{:?}", cred);
        assert!(!shown.contains("secret"));
    }
}
