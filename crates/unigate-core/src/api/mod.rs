//! REST API client module for the university portal.
//!
//! This module provides the `SessionClient` for communicating with the
//! portal's REST API: login, registration, authenticated requests and
//! logout.
//!
//! The API uses JWT bearer token authentication. Access tokens are
//! short-lived; the client renews them through the refresh endpoint
//! when a request comes back 401 and retries that request once.

pub mod client;
pub mod error;

pub use client::{AuthRequest, SessionClient, SessionClientBuilder};
pub use error::{ApiError, ValidationField};
