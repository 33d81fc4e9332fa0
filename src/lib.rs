//! Machine Auth - signed request authentication for machine callers
//!
//! Verifies HMAC-SHA256 signed HTTP requests and authorizes them against a
//! role permission bitmask.
//!
//! # Modules
//!
//! - [`api_auth`] - Signer, freshness check, roles, caches, authenticator, middleware
//! - [`config`] - YAML configuration
//! - [`db`] - PostgreSQL pool
//! - [`gateway`] - HTTP server exposing the guarded routes
//! - [`logging`] - Tracing subscriber setup

pub mod api_auth;
pub mod config;
pub mod db;
pub mod gateway;
pub mod logging;

// Convenient re-exports at crate root
pub use api_auth::{
    AuthError, AuthErrorCode, Authenticator, Credential, CredentialStore, MemoryCredentialStore,
    PgCredentialRepository, Role, SignedRequest, permissions,
};
pub use config::{AppConfig, AuthConfig};
