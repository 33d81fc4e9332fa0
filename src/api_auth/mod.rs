//! Request authentication and authorization for machine callers.
//!
//! Callers sign each request with an HMAC-SHA256 secret. The server rebuilds
//! the canonical string, compares signatures in constant time and then checks
//! the caller's role for the permission bit a route requires.
//!
//! ## Components
//! - `signer`: canonical string and signature computation
//! - `freshness`: timestamp window check
//! - `models`: permission bits, roles, credentials
//! - `store`: credential store traits and the in-memory store
//! - `repository`: PostgreSQL store
//! - `cache`: credential TTL cache and signature LRU cache
//! - `authenticator`: the two verification guards
//! - `provision`: credential registration
//! - `middleware`: Axum layers
//! - `error`: error codes (4001-4006)

pub mod authenticator;
pub mod cache;
pub mod error;
pub mod freshness;
pub mod middleware;
pub mod models;
pub mod provision;
pub mod repository;
pub mod signer;
pub mod store;

pub use authenticator::Authenticator;
pub use cache::{CredentialCache, SignatureCache};
pub use error::{AuthError, AuthErrorCode};
pub use middleware::{PermissionGuard, SignatureGuard, guard};
pub use models::{
    AuthenticatedCredential, Credential, Role, generate_key, has_permission, permissions,
};
pub use provision::{NewCredential, ProvisionError, bootstrap};
pub use repository::PgCredentialRepository;
pub use signer::{SignedRequest, compute_signature, sign_request};
pub use store::{
    CredentialAdmin, CredentialStore, MemoryCredentialStore, RoleProvider, StoreError,
};
