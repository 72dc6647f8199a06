use std::fmt;

use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

use crate::auth::StoreError;

/// Maximum number of characters of a raw error body carried in an error message
const MAX_ERROR_BODY_CHARS: usize = 100;

const LOGIN_FAILED: &str = "Login failed";
const REGISTRATION_FAILED: &str = "Registration failed. Please check your information and try again.";
const REQUEST_FAILED: &str = "Request failed";

/// Registration form fields the server may reject individually.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationField {
    Username,
    Email,
    Password,
    Role,
}

impl ValidationField {
    /// Order in which field errors are surfaced when several are reported.
    pub const PRECEDENCE: [ValidationField; 4] = [
        ValidationField::Username,
        ValidationField::Email,
        ValidationField::Password,
        ValidationField::Role,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationField::Username => "username",
            ValidationField::Email => "email",
            ValidationField::Password => "password",
            ValidationField::Role => "role",
        }
    }
}

impl fmt::Display for ValidationField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Cannot connect to server. Please check your connection and try again.")]
    Connection,

    #[error("Request timeout - server not responding")]
    Timeout,

    #[error("{message}")]
    ServerError { status: StatusCode, message: String },

    #[error("Not logged in - no authentication token")]
    AuthRequired,

    #[error("Session expired. Please login again.")]
    SessionExpired {
        #[source]
        source: Box<ApiError>,
    },

    #[error("No refresh token available")]
    NoRefreshToken,

    #[error("Token refresh failed (status {})", .0.as_u16())]
    RefreshRejected(StatusCode),

    #[error("{message}")]
    RequestError { status: StatusCode, message: String },

    #[error("{message}")]
    Validation {
        field: ValidationField,
        message: String,
    },

    #[error("Network error: {0}")]
    Network(#[source] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Credential storage error: {0}")]
    Storage(#[from] StoreError),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout
        } else {
            ApiError::Network(err)
        }
    }
}

impl ApiError {
    /// True when the user has to log in again before retrying.
    pub fn requires_login(&self) -> bool {
        matches!(self, ApiError::AuthRequired | ApiError::SessionExpired { .. })
    }

    /// HTTP status the server answered with, if the error came from a response.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::ServerError { status, .. } | ApiError::RequestError { status, .. } => {
                Some(*status)
            }
            ApiError::RefreshRejected(status) => Some(*status),
            _ => None,
        }
    }

    /// Truncate a response body to avoid carrying excessive data in messages
    fn truncate_body(body: &str) -> String {
        if body.chars().count() <= MAX_ERROR_BODY_CHARS {
            body.to_string()
        } else {
            body.chars().take(MAX_ERROR_BODY_CHARS).collect()
        }
    }

    fn unparseable(status: StatusCode, body: &str) -> Self {
        ApiError::ServerError {
            status,
            message: format!("Server error: {} - {}", status.as_u16(), Self::truncate_body(body)),
        }
    }

    /// Build the error for a rejected login.
    pub fn from_login_failure(status: StatusCode, body: &str) -> Self {
        match serde_json::from_str::<Value>(body) {
            Ok(parsed) => ApiError::ServerError {
                status,
                message: general_message(&parsed).unwrap_or_else(|| LOGIN_FAILED.to_string()),
            },
            Err(_) => Self::unparseable(status, body),
        }
    }

    /// Build the error for a rejected registration.
    ///
    /// Field errors win over general ones, in `ValidationField::PRECEDENCE`
    /// order, then `detail`, then `message`, then a generic message.
    pub fn from_registration_failure(status: StatusCode, body: &str) -> Self {
        let parsed = match serde_json::from_str::<Value>(body) {
            Ok(parsed) => parsed,
            Err(_) => return Self::unparseable(status, body),
        };

        for field in ValidationField::PRECEDENCE {
            if let Some(message) = parsed.get(field.as_str()).and_then(first_message) {
                return ApiError::Validation { field, message };
            }
        }

        ApiError::ServerError {
            status,
            message: general_message(&parsed).unwrap_or_else(|| REGISTRATION_FAILED.to_string()),
        }
    }

    /// Build the error for a failed authenticated request.
    pub fn from_request_failure(status: StatusCode, body: &str) -> Self {
        let message = serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|parsed| general_message(&parsed))
            .unwrap_or_else(|| REQUEST_FAILED.to_string());
        ApiError::RequestError { status, message }
    }
}

/// `detail`, falling back to `message`
fn general_message(body: &Value) -> Option<String> {
    body.get("detail")
        .and_then(first_message)
        .or_else(|| body.get("message").and_then(first_message))
}

/// A server message is either a string or a list whose first entry is one.
fn first_message(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.as_str(),
        Value::Array(items) => items.first()?.as_str()?,
        _ => return None,
    };
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}
