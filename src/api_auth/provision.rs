//! Credential provisioning.
//!
//! Registration happens outside the verification path. A new credential gets
//! generated keys unless the caller supplies them, and the default role
//! unless one is named.

use super::models::{Credential, KEY_LEN, Role, generate_key};
use super::store::{CredentialAdmin, RoleProvider, StoreError};
use crate::config::BootstrapCredential;

const MAX_NAME_LEN: usize = 128;
const MAX_DESCRIPTION_LEN: usize = 256;
const MAX_OWNER_LEN: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("invalid {field}: {reason}")]
    InvalidField {
        field: &'static str,
        reason: &'static str,
    },
    #[error("role {0:?} does not exist")]
    UnknownRole(String),
    #[error("no default role configured, seed roles first")]
    NoDefaultRole,
    #[error("access key already registered")]
    DuplicateAccessKey,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Request to register a machine caller.
#[derive(Debug, Clone, Default)]
pub struct NewCredential {
    pub name: String,
    pub description: Option<String>,
    pub owner: String,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub role: Option<String>,
}

impl NewCredential {
    pub fn new(name: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            owner: owner.into(),
            ..Self::default()
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn with_keys(mut self, access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        self.access_key = Some(access_key.into());
        self.secret_key = Some(secret_key.into());
        self
    }

    pub fn validate(&self) -> Result<(), ProvisionError> {
        check_text("name", &self.name, MAX_NAME_LEN, false)?;
        check_text("owner", &self.owner, MAX_OWNER_LEN, false)?;
        if let Some(description) = &self.description {
            check_text("description", description, MAX_DESCRIPTION_LEN, true)?;
        }
        if let Some(key) = &self.access_key {
            check_key("access_key", key)?;
        }
        if let Some(key) = &self.secret_key {
            check_key("secret_key", key)?;
        }
        Ok(())
    }

    /// Validate, resolve the role and fill in missing keys.
    pub async fn build(self, roles: &dyn RoleProvider) -> Result<Credential, ProvisionError> {
        self.validate()?;

        let role: Role = match &self.role {
            Some(name) => roles
                .find_by_name(name)
                .await?
                .ok_or_else(|| ProvisionError::UnknownRole(name.clone()))?,
            None => roles
                .find_default_role()
                .await?
                .ok_or(ProvisionError::NoDefaultRole)?,
        };

        Ok(Credential {
            name: self.name,
            description: self.description,
            owner: self.owner,
            access_key: self.access_key.unwrap_or_else(generate_key),
            secret_key: self.secret_key.unwrap_or_else(generate_key),
            enabled: true,
            role: Some(role),
        })
    }
}

/// Register the credentials declared in configuration.
///
/// Keys that are already registered keep their stored secret; their role and
/// enabled flag are brought in line with the entry. Returns how many
/// credentials were newly created.
pub async fn bootstrap(
    admin: &dyn CredentialAdmin,
    entries: &[BootstrapCredential],
) -> Result<usize, ProvisionError> {
    let mut created = 0;
    for entry in entries {
        if admin.find_by_access_key(&entry.access_key).await?.is_some() {
            if let Some(role) = &entry.role {
                if !admin.assign_role(&entry.access_key, role).await? {
                    return Err(ProvisionError::UnknownRole(role.clone()));
                }
            }
            tracing::info!(
                name = %entry.name,
                access_key = %entry.access_key,
                "Bootstrap credential already registered"
            );
        } else {
            let mut new = NewCredential::new(&entry.name, &entry.owner)
                .with_keys(&entry.access_key, &entry.secret_key);
            new.description = entry.description.clone();
            new.role = entry.role.clone();
            admin.provision(new).await?;
            created += 1;
        }
        admin.set_enabled(&entry.access_key, entry.enabled).await?;
    }

    tracing::info!(created, total = entries.len(), "Bootstrap credentials applied");
    Ok(created)
}

fn check_text(
    field: &'static str,
    value: &str,
    max: usize,
    allow_empty: bool,
) -> Result<(), ProvisionError> {
    if !allow_empty && value.trim().is_empty() {
        return Err(ProvisionError::InvalidField {
            field,
            reason: "must not be empty",
        });
    }
    if value.chars().count() > max {
        return Err(ProvisionError::InvalidField {
            field,
            reason: "too long",
        });
    }
    Ok(())
}

fn check_key(field: &'static str, key: &str) -> Result<(), ProvisionError> {
    if key.len() != KEY_LEN || !key.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ProvisionError::InvalidField {
            field,
            reason: "must be 32 ASCII letters or digits",
        });
    }
    Ok(())
}
