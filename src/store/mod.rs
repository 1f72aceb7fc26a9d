//! Credential persistence and the in-memory token manager.

pub mod db;
pub mod manager;

pub use db::{CredentialStore, TokenStore};
pub use manager::TokenManager;
