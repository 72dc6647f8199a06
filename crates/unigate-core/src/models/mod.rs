//! Data models for portal entities.
//!
//! - `UserProfile`, `Role`: the cached snapshot of the logged-in user
//! - `Credential`, `Session`: the access/refresh token pair and its owner
//! - `LoginEnvelope`: the normalized login response
//! - `RegistrationForm`: the account registration payload
//! - `DashboardStats`: role-dependent dashboard counters

pub mod auth;
pub mod dashboard;
pub mod user;

pub use auth::{Credential, LoginEnvelope, RegistrationForm, Session};
pub(crate) use auth::LoginResponse;
pub use dashboard::DashboardStats;
pub use user::{Role, UserProfile};
