//! Request verification.
//!
//! [`Authenticator`] implements the two guards placed in front of protected
//! routes:
//!
//! 1. [`Authenticator::verify_signature`]: timestamp, access key, signature.
//! 2. [`Authenticator::verify_permission`]: access key, role permission bit.
//!
//! Both are read-only with respect to the credential store.

use std::sync::Arc;
use std::time::Duration;

use subtle::ConstantTimeEq;

use super::cache::{CredentialCache, SignatureCache};
use super::error::{AuthError, AuthErrorCode};
use super::freshness;
use super::models::{Credential, KEY_LEN, permissions};
use super::signer::{SignError, SignedRequest, X_ACCESS_KEY, X_SIGNATURE, X_TIMESTAMP};
use super::store::CredentialStore;
use crate::config::AuthConfig;

/// Shared verification state, built once at startup.
pub struct Authenticator {
    store: Arc<dyn CredentialStore>,
    credentials: CredentialCache,
    signatures: SignatureCache,
    window_minutes: u32,
}

impl Authenticator {
    /// Build an authenticator with fresh caches sized by `config`.
    pub fn new(store: Arc<dyn CredentialStore>, config: &AuthConfig) -> Self {
        Self::with_caches(
            store,
            CredentialCache::new(Duration::from_secs(config.credential_ttl_secs)),
            SignatureCache::new(config.signature_cache_size),
            config.freshness_window_minutes,
        )
    }

    pub fn with_caches(
        store: Arc<dyn CredentialStore>,
        credentials: CredentialCache,
        signatures: SignatureCache,
        window_minutes: u32,
    ) -> Self {
        Self {
            store,
            credentials,
            signatures,
            window_minutes,
        }
    }

    /// Verify timestamp freshness, caller identity and request signature.
    pub async fn verify_signature(
        &self,
        request: &SignedRequest,
    ) -> Result<Arc<Credential>, AuthError> {
        self.check_timestamp(request)?;

        let credential = self.resolve_credential(request).await?;

        let supplied = request
            .header_value(X_SIGNATURE)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                AuthError::invalid_input("Header X-Signature is missing")
                    .suggest("Sign the request as described in the API documentation")
            })?;

        let expected = self
            .signatures
            .get_or_compute(&credential.access_key, &credential.secret_key, request)
            .map_err(sign_error)?;

        if !bool::from(supplied.as_bytes().ct_eq(expected.as_bytes())) {
            tracing::warn!(
                access_key = %credential.access_key,
                "[auth] signature mismatch"
            );
            return Err(AuthError::from_code(AuthErrorCode::SignatureMismatch)
                .with_value(expected)
                .suggest("Sign the request as described in the API documentation"));
        }

        tracing::debug!(access_key = %credential.access_key, "[auth] signature verified");
        Ok(credential)
    }

    /// Verify the caller's role grants `required`.
    pub async fn verify_permission(
        &self,
        request: &SignedRequest,
        required: i32,
    ) -> Result<Arc<Credential>, AuthError> {
        let credential = self.resolve_credential(request).await?;

        if !credential.can(required) {
            tracing::warn!(
                access_key = %credential.access_key,
                required = permissions::name(required),
                "[auth] permission denied"
            );
            return Err(AuthError::from_code(AuthErrorCode::PermissionDenied)
                .with_value(permissions::name(required))
                .suggest("Ask an administrator to grant a role with this permission"));
        }

        Ok(credential)
    }

    fn check_timestamp(&self, request: &SignedRequest) -> Result<(), AuthError> {
        let raw = request.header_value(X_TIMESTAMP).ok_or_else(|| {
            AuthError::invalid_input("Header X-Timestamp is missing")
                .suggest("Send the current time as milliseconds since epoch")
        })?;

        let fresh = freshness::is_fresh(raw, self.window_minutes).map_err(|e| {
            AuthError::invalid_input(e.to_string())
                .with_value(raw)
                .suggest("Send the current time as milliseconds since epoch")
        })?;

        if !fresh {
            return Err(AuthError::from_code(AuthErrorCode::Expired)
                .with_value(raw)
                .suggest(format!(
                    "Requests are valid for {} minutes around server time",
                    self.window_minutes
                )));
        }
        Ok(())
    }

    async fn resolve_credential(
        &self,
        request: &SignedRequest,
    ) -> Result<Arc<Credential>, AuthError> {
        let access_key = request
            .header_value(X_ACCESS_KEY)
            .filter(|key| key.chars().count() == KEY_LEN)
            .ok_or_else(|| {
                let err = AuthError::invalid_input(format!(
                    "Header X-Access-Key must be exactly {} characters",
                    KEY_LEN
                ))
                .suggest("Use the access key issued for this caller");
                match request.header_value(X_ACCESS_KEY) {
                    Some(value) => err.with_value(value),
                    None => err,
                }
            })?;

        let credential = self
            .credentials
            .load(access_key, self.store.as_ref())
            .await
            .map_err(|e| {
                tracing::error!(access_key, "[auth] credential store failure: {}", e);
                AuthError::from_code(AuthErrorCode::InternalStoreFailure)
            })?
            .ok_or_else(|| unknown_credential(access_key))?;

        if !credential.is_enabled() {
            tracing::warn!(access_key, "[auth] disabled credential");
            return Err(unknown_credential(access_key));
        }
        Ok(credential)
    }

    pub fn credentials(&self) -> &CredentialCache {
        &self.credentials
    }

    pub fn signatures(&self) -> &SignatureCache {
        &self.signatures
    }

    pub fn window_minutes(&self) -> u32 {
        self.window_minutes
    }
}

fn unknown_credential(access_key: &str) -> AuthError {
    AuthError::from_code(AuthErrorCode::UnknownCredential)
        .with_value(access_key)
        .suggest("Check X-Access-Key or ask an administrator to register this caller")
}

fn sign_error(err: SignError) -> AuthError {
    let auth_err = AuthError::invalid_input(err.to_string());
    match err {
        SignError::MissingKeys => {
            auth_err.suggest("List the signed header names in X-Keys, comma separated")
        }
        SignError::InvalidBody => auth_err.suggest("Send the request body as UTF-8 text"),
        SignError::InvalidKey => auth_err,
    }
}
