//! Credential store interfaces.
//!
//! The verification path only reads credentials. Writes (provisioning,
//! enabling, role changes) go through the concrete store types.

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::models::{BUILTIN_ROLES, Credential, Role, apply_builtin};
use super::provision::{NewCredential, ProvisionError};

/// Credential store failure. Distinct from "not found".
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// Read access to registered credentials.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Look up a credential by its public access key.
    ///
    /// Returns `Ok(None)` when the key is not registered. Disabled
    /// credentials are returned as-is; callers decide what to do with them.
    async fn find_by_access_key(&self, access_key: &str) -> Result<Option<Credential>, StoreError>;
}

/// Read access to roles.
#[async_trait]
pub trait RoleProvider: Send + Sync {
    async fn find_default_role(&self) -> Result<Option<Role>, StoreError>;
    async fn find_by_name(&self, name: &str) -> Result<Option<Role>, StoreError>;
}

/// Write access used by provisioning and bootstrap.
#[async_trait]
pub trait CredentialAdmin: CredentialStore + RoleProvider {
    /// Validate and register a new credential. Never replaces an existing key.
    async fn provision(&self, new: NewCredential) -> Result<Credential, ProvisionError>;

    /// Returns `false` if the access key is unknown.
    async fn set_enabled(&self, access_key: &str, enabled: bool) -> Result<bool, StoreError>;

    /// Returns `false` if the access key or the role is unknown.
    async fn assign_role(&self, access_key: &str, role_name: &str) -> Result<bool, StoreError>;
}

/// In-process store for tests and database-less deployments.
#[derive(Default)]
pub struct MemoryCredentialStore {
    credentials: DashMap<String, Credential>,
    roles: DashMap<String, Role>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding the built-in roles.
    pub fn seeded() -> Self {
        let store = Self::new();
        store.seed_roles();
        store
    }

    /// Insert or refresh the built-in roles. Safe to call repeatedly.
    pub fn seed_roles(&self) {
        for (name, granted) in BUILTIN_ROLES {
            let mut role = self
                .roles
                .entry(name.to_string())
                .or_insert_with(|| Role::new(name));
            apply_builtin(&mut role, granted);
        }
    }

    pub fn insert_role(&self, role: Role) {
        self.roles.insert(role.name.clone(), role);
    }

    /// Register a credential, replacing any previous one with the same key.
    pub fn insert(&self, credential: Credential) {
        self.credentials
            .insert(credential.access_key.clone(), credential);
    }

    /// Validate and register a new credential. Existing keys are never replaced.
    pub async fn provision(&self, new: NewCredential) -> Result<Credential, ProvisionError> {
        let credential = new.build(self).await?;
        match self.credentials.entry(credential.access_key.clone()) {
            Entry::Occupied(_) => Err(ProvisionError::DuplicateAccessKey),
            Entry::Vacant(slot) => {
                slot.insert(credential.clone());
                tracing::info!(
                    name = %credential.name,
                    access_key = %credential.access_key,
                    "Provisioned credential"
                );
                Ok(credential)
            }
        }
    }

    /// Flip the enabled flag. Returns `false` if the key is unknown.
    pub fn set_enabled(&self, access_key: &str, enabled: bool) -> bool {
        match self.credentials.get_mut(access_key) {
            Some(mut credential) => {
                credential.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Attach a role by name. Returns `false` if either side is unknown.
    pub fn assign_role(&self, access_key: &str, role_name: &str) -> bool {
        let Some(role) = self.roles.get(role_name).map(|r| r.clone()) else {
            return false;
        };
        match self.credentials.get_mut(access_key) {
            Some(mut credential) => {
                credential.role = Some(role);
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, access_key: &str) -> Option<Credential> {
        self.credentials.remove(access_key).map(|(_, c)| c)
    }

    pub fn role_count(&self) -> usize {
        self.roles.len()
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn find_by_access_key(&self, access_key: &str) -> Result<Option<Credential>, StoreError> {
        Ok(self.credentials.get(access_key).map(|c| c.clone()))
    }
}

#[async_trait]
impl RoleProvider for MemoryCredentialStore {
    async fn find_default_role(&self) -> Result<Option<Role>, StoreError> {
        Ok(self
            .roles
            .iter()
            .find(|r| r.is_default)
            .map(|r| r.value().clone()))
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Role>, StoreError> {
        Ok(self.roles.get(name).map(|r| r.clone()))
    }
}

#[async_trait]
impl CredentialAdmin for MemoryCredentialStore {
    async fn provision(&self, new: NewCredential) -> Result<Credential, ProvisionError> {
        MemoryCredentialStore::provision(self, new).await
    }

    async fn set_enabled(&self, access_key: &str, enabled: bool) -> Result<bool, StoreError> {
        Ok(MemoryCredentialStore::set_enabled(self, access_key, enabled))
    }

    async fn assign_role(&self, access_key: &str, role_name: &str) -> Result<bool, StoreError> {
        Ok(MemoryCredentialStore::assign_role(self, access_key, role_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_auth::models::{DEFAULT_ROLE, permissions};

    fn credential(access_key: &str) -> Credential {
        Credential {
            name: "reporting".to_string(),
            description: Some("nightly export".to_string()),
            owner: "data-team".to_string(),
            access_key: access_key.to_string(),
            secret_key: "s".repeat(32),
            enabled: true,
            role: None,
        }
    }

    #[tokio::test]
    async fn test_find_by_access_key() {
        let store = MemoryCredentialStore::new();
        store.insert(credential("k1"));

        let found = store.find_by_access_key("k1").await.unwrap();
        assert_eq!(found.unwrap().owner, "data-team");
        assert!(store.find_by_access_key("k2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_seed_is_idempotent() {
        let store = MemoryCredentialStore::seeded();
        store.seed_roles();
        assert_eq!(store.role_count(), 4);

        let default = store.find_default_role().await.unwrap().unwrap();
        assert_eq!(default.name, DEFAULT_ROLE);
        assert!(default.has(permissions::READ));
        assert!(!default.has(permissions::WRITE));
    }

    #[tokio::test]
    async fn test_reseed_restores_drifted_role() {
        let store = MemoryCredentialStore::seeded();
        store.insert_role(Role::new("Owner").with(permissions::ADMIN));
        store.seed_roles();

        let owner = store.find_by_name("Owner").await.unwrap().unwrap();
        assert!(!owner.has(permissions::ADMIN));
        assert!(owner.has(permissions::DELETE));
    }

    #[tokio::test]
    async fn test_set_enabled_and_assign_role() {
        let store = MemoryCredentialStore::seeded();
        store.insert(credential("k1"));

        assert!(store.set_enabled("k1", false));
        assert!(!store.set_enabled("missing", false));
        assert!(store.assign_role("k1", "Executor"));
        assert!(!store.assign_role("k1", "Nobody"));

        let found = store.find_by_access_key("k1").await.unwrap().unwrap();
        assert!(!found.enabled);
        assert!(found.can(permissions::WRITE));
    }

    #[tokio::test]
    async fn test_provision_rejects_duplicate_key() {
        let store = MemoryCredentialStore::seeded();
        let keys = ("a".repeat(32), "b".repeat(32));

        let first = store
            .provision(NewCredential::new("first", "ops").with_keys(&keys.0, &keys.1))
            .await
            .unwrap();
        assert_eq!(first.role.as_ref().unwrap().name, DEFAULT_ROLE);

        let err = store
            .provision(NewCredential::new("second", "ops").with_keys(&keys.0, &keys.1))
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::DuplicateAccessKey));
        assert_eq!(store.len(), 1);
        let kept = store.find_by_access_key(&keys.0).await.unwrap().unwrap();
        assert_eq!(kept.name, "first");
    }
}
