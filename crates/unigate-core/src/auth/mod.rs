//! Credential storage for user sessions.
//!
//! This module provides:
//! - `CredentialStore`: the durable key-value slots a session lives in
//!   (access token, refresh token, cached user profile)
//! - `MemoryStore`: process-local storage, nothing survives exit
//! - `FileStore`: a JSON file in the user's data directory
//! - `KeyringStore`: secure OS-level storage via keyring
//!
//! Stores give no atomicity across keys; the session client treats a
//! half-written credential pair as no session at all.

pub mod credentials;
pub mod file;
pub mod memory;
pub mod store;

pub use credentials::KeyringStore;
pub use file::FileStore;
pub use memory::MemoryStore;
pub use store::{CredentialStore, StoreError, StoreKey};
