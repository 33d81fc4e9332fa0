//! PostgreSQL credential repository.
//!
//! Provides the persistent [`CredentialStore`] and [`RoleProvider`] plus the
//! write operations used by provisioning and administration.
//! Uses runtime queries to avoid sqlx compile-time database connection.

use async_trait::async_trait;
use std::sync::Arc;

use super::models::{BUILTIN_ROLES, Credential, DEFAULT_ROLE, Role, apply_builtin};
use super::provision::{NewCredential, ProvisionError};
use super::store::{CredentialAdmin, CredentialStore, RoleProvider, StoreError};
use crate::db::{Database, SafeRow};

const CREATE_ROLES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS roles_tb (
    role_id     BIGSERIAL PRIMARY KEY,
    name        VARCHAR(16) NOT NULL UNIQUE,
    is_default  BOOLEAN NOT NULL DEFAULT FALSE,
    permissions INTEGER NOT NULL DEFAULT 0,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

const CREATE_MACHINE_USERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS machine_users_tb (
    user_id     BIGSERIAL PRIMARY KEY,
    name        VARCHAR(128) NOT NULL UNIQUE,
    description VARCHAR(256),
    owner       VARCHAR(64) NOT NULL,
    access_key  CHAR(32) NOT NULL UNIQUE,
    secret_key  CHAR(32) NOT NULL,
    is_enabled  BOOLEAN NOT NULL DEFAULT TRUE,
    role_id     BIGINT REFERENCES roles_tb(role_id),
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

const SELECT_CREDENTIAL: &str = r#"
SELECT u.name, u.description, u.owner, u.access_key, u.secret_key, u.is_enabled,
       r.name AS role_name, r.is_default AS role_is_default, r.permissions AS role_permissions
FROM machine_users_tb u
LEFT JOIN roles_tb r ON r.role_id = u.role_id
WHERE u.access_key = $1
"#;

/// Credential repository backed by PostgreSQL.
pub struct PgCredentialRepository {
    db: Arc<Database>,
}

impl PgCredentialRepository {
    /// Create a new repository with database connection.
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Create tables if they do not exist.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(CREATE_ROLES_TABLE)
            .execute(self.db.pool())
            .await?;
        sqlx::query(CREATE_MACHINE_USERS_TABLE)
            .execute(self.db.pool())
            .await?;
        tracing::info!("Credential schema ready");
        Ok(())
    }

    /// Insert or refresh the built-in roles.
    ///
    /// Existing roles are reset then re-granted, so re-running never
    /// duplicates rows or leaves stale bits. Exactly one role ends up default.
    pub async fn seed_roles(&self) -> Result<(), StoreError> {
        let mut tx = self.db.pool().begin().await?;

        for (name, granted) in BUILTIN_ROLES {
            let existing = sqlx::query(
                "SELECT name, is_default, permissions FROM roles_tb WHERE name = $1 FOR UPDATE",
            )
            .bind(name)
            .fetch_optional(&mut *tx)
            .await?;

            let mut role = match existing {
                Some(row) => Role::from_bits(
                    name,
                    row.require::<bool>("is_default")?,
                    row.require::<i32>("permissions")?,
                ),
                None => Role::new(name),
            };
            apply_builtin(&mut role, granted);

            sqlx::query(
                r#"
                INSERT INTO roles_tb (name, is_default, permissions)
                VALUES ($1, $2, $3)
                ON CONFLICT (name) DO UPDATE
                SET is_default = EXCLUDED.is_default,
                    permissions = EXCLUDED.permissions,
                    updated_at = NOW()
                "#,
            )
            .bind(&role.name)
            .bind(role.is_default)
            .bind(role.bits())
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("UPDATE roles_tb SET is_default = FALSE WHERE name <> $1 AND is_default")
            .bind(DEFAULT_ROLE)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::info!("Seeded {} built-in roles", BUILTIN_ROLES.len());
        Ok(())
    }

    /// Register a new credential.
    pub async fn create_credential(
        &self,
        new: NewCredential,
    ) -> Result<Credential, ProvisionError> {
        let credential = new.build(self).await?;
        let role_name = credential.role.as_ref().map(|r| r.name.as_str());

        let result = sqlx::query(
            r#"
            INSERT INTO machine_users_tb
                (name, description, owner, access_key, secret_key, is_enabled, role_id)
            VALUES ($1, $2, $3, $4, $5, $6, (SELECT role_id FROM roles_tb WHERE name = $7))
            "#,
        )
        .bind(&credential.name)
        .bind(&credential.description)
        .bind(&credential.owner)
        .bind(&credential.access_key)
        .bind(&credential.secret_key)
        .bind(credential.enabled)
        .bind(role_name)
        .execute(self.db.pool())
        .await;

        match result {
            Ok(_) => {
                tracing::info!(
                    name = %credential.name,
                    access_key = %credential.access_key,
                    "Provisioned credential"
                );
                Ok(credential)
            }
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                if db_err.constraint().is_some_and(|c| c.contains("access_key")) {
                    Err(ProvisionError::DuplicateAccessKey)
                } else {
                    Err(ProvisionError::InvalidField {
                        field: "name",
                        reason: "already registered",
                    })
                }
            }
            Err(e) => Err(ProvisionError::Store(e.into())),
        }
    }

    /// Enable or disable a credential.
    ///
    /// Verification keeps serving cached snapshots until their TTL runs out.
    pub async fn set_enabled(&self, access_key: &str, enabled: bool) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE machine_users_tb SET is_enabled = $2, updated_at = NOW() WHERE access_key = $1",
        )
        .bind(access_key)
        .bind(enabled)
        .execute(self.db.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Move a credential to another role.
    pub async fn assign_role(&self, access_key: &str, role_name: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE machine_users_tb
            SET role_id = r.role_id, updated_at = NOW()
            FROM roles_tb r
            WHERE machine_users_tb.access_key = $1 AND r.name = $2
            "#,
        )
        .bind(access_key)
        .bind(role_name)
        .execute(self.db.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    fn row_to_role(row: &sqlx::postgres::PgRow) -> Result<Role, sqlx::Error> {
        Ok(Role::from_bits(
            row.require::<String>("name")?,
            row.require::<bool>("is_default")?,
            row.require::<i32>("permissions")?,
        ))
    }

    fn row_to_credential(row: &sqlx::postgres::PgRow) -> Result<Credential, sqlx::Error> {
        let role = match row.try_get_log::<Option<String>>("role_name").flatten() {
            Some(name) => Some(Role::from_bits(
                name,
                row.require::<bool>("role_is_default")?,
                row.require::<i32>("role_permissions")?,
            )),
            None => None,
        };

        Ok(Credential {
            name: row.require("name")?,
            description: row.try_get_log::<Option<String>>("description").flatten(),
            owner: row.require("owner")?,
            access_key: row.require("access_key")?,
            secret_key: row.require("secret_key")?,
            enabled: row.require("is_enabled")?,
            role,
        })
    }
}

#[async_trait]
impl CredentialStore for PgCredentialRepository {
    async fn find_by_access_key(&self, access_key: &str) -> Result<Option<Credential>, StoreError> {
        let row = sqlx::query(SELECT_CREDENTIAL)
            .bind(access_key)
            .fetch_optional(self.db.pool())
            .await?;

        match row {
            Some(r) => Ok(Some(Self::row_to_credential(&r)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl RoleProvider for PgCredentialRepository {
    async fn find_default_role(&self) -> Result<Option<Role>, StoreError> {
        let row = sqlx::query(
            "SELECT name, is_default, permissions FROM roles_tb WHERE is_default ORDER BY role_id LIMIT 1",
        )
        .fetch_optional(self.db.pool())
        .await?;

        match row {
            Some(r) => Ok(Some(Self::row_to_role(&r)?)),
            None => Ok(None),
        }
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Role>, StoreError> {
        let row = sqlx::query("SELECT name, is_default, permissions FROM roles_tb WHERE name = $1")
            .bind(name)
            .fetch_optional(self.db.pool())
            .await?;

        match row {
            Some(r) => Ok(Some(Self::row_to_role(&r)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl CredentialAdmin for PgCredentialRepository {
    async fn provision(&self, new: NewCredential) -> Result<Credential, ProvisionError> {
        self.create_credential(new).await
    }

    async fn set_enabled(&self, access_key: &str, enabled: bool) -> Result<bool, StoreError> {
        PgCredentialRepository::set_enabled(self, access_key, enabled).await
    }

    async fn assign_role(&self, access_key: &str, role_name: &str) -> Result<bool, StoreError> {
        PgCredentialRepository::assign_role(self, access_key, role_name).await
    }
}
