//! Core library for unigate.
//!
//! Provides the authenticated API session client used by the university
//! portal front-ends: token storage, login and registration, transparent
//! access-token refresh, and typed models for the portal's JSON payloads.

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

pub use api::{ApiError, AuthRequest, SessionClient, SessionClientBuilder};
pub use auth::{CredentialStore, FileStore, KeyringStore, MemoryStore, StoreError, StoreKey};
pub use config::{Config, StoreBackend};
pub use models::{
    Credential, DashboardStats, LoginEnvelope, RegistrationForm, Role, Session, UserProfile,
};
