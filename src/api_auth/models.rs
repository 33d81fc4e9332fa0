//! Credential and role models.
//!
//! A [`Credential`] is a registered machine caller. Its capabilities come from
//! exactly one [`Role`], whose permission bitmask is only ever changed through
//! [`Role::add`], [`Role::remove`] and [`Role::reset`].

use std::fmt;

use rand::Rng;
use rand::distributions::Alphanumeric;

/// Length of both the public access key and the secret key.
pub const KEY_LEN: usize = 32;

/// Permission flags.
pub mod permissions {
    /// Query resources
    pub const READ: i32 = 0x01;
    /// Create resources
    pub const WRITE: i32 = 0x02;
    /// Modify resources
    pub const UPDATE: i32 = 0x04;
    /// Delete resources
    pub const DELETE: i32 = 0x08;
    /// Administrative endpoints. Does not imply any other bit.
    pub const ADMIN: i32 = 0x10;

    /// Every defined bit, in ascending order.
    pub const ALL: [i32; 5] = [READ, WRITE, UPDATE, DELETE, ADMIN];

    /// Union of every defined bit.
    pub const MASK: i32 = READ | WRITE | UPDATE | DELETE | ADMIN;

    /// Human readable name of a single bit.
    pub fn name(bit: i32) -> &'static str {
        match bit {
            READ => "READ",
            WRITE => "WRITE",
            UPDATE => "UPDATE",
            DELETE => "DELETE",
            ADMIN => "ADMIN",
            _ => "UNKNOWN",
        }
    }
}

/// Check if a permission is granted.
pub fn has_permission(perms: i32, required: i32) -> bool {
    (perms & required) == required
}

/// A named set of permission bits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    /// Unique role name
    pub name: String,
    /// Whether newly provisioned credentials get this role
    pub is_default: bool,
    permissions: i32,
}

impl Role {
    /// Create a role with no permissions.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_default: false,
            permissions: 0,
        }
    }

    /// Rebuild a role from a stored bitmask.
    ///
    /// The stored value is replayed bit by bit so unknown bits are dropped.
    pub fn from_bits(name: impl Into<String>, is_default: bool, bits: i32) -> Self {
        let mut role = Self::new(name);
        role.is_default = is_default;
        for bit in permissions::ALL {
            if has_permission(bits, bit) {
                role.add(bit);
            }
        }
        role
    }

    /// Builder-style grant, used by seeding and tests.
    pub fn with(mut self, bit: i32) -> Self {
        self.add(bit);
        self
    }

    pub fn has(&self, bit: i32) -> bool {
        has_permission(self.permissions, bit)
    }

    /// Grant every defined bit in `bits`. Undefined bits are ignored.
    pub fn add(&mut self, bits: i32) {
        self.permissions |= bits & permissions::MASK;
    }

    /// Revoke every bit in `bits`, leaving the others untouched.
    pub fn remove(&mut self, bits: i32) {
        self.permissions &= !bits;
    }

    pub fn reset(&mut self) {
        self.permissions = 0;
    }

    /// Raw bitmask, for persistence.
    pub fn bits(&self) -> i32 {
        self.permissions
    }
}

/// Name of the role assigned when provisioning does not specify one.
pub const DEFAULT_ROLE: &str = "Follower";

/// The roles every deployment is seeded with, as (name, granted bits).
pub const BUILTIN_ROLES: [(&str, &[i32]); 4] = [
    ("Follower", &[permissions::READ]),
    ("Executor", &[permissions::READ, permissions::WRITE]),
    (
        "Owner",
        &[
            permissions::READ,
            permissions::WRITE,
            permissions::UPDATE,
            permissions::DELETE,
        ],
    ),
    (
        "Administrator",
        &[
            permissions::READ,
            permissions::WRITE,
            permissions::UPDATE,
            permissions::DELETE,
            permissions::ADMIN,
        ],
    ),
];

/// Bring `role` in line with its built-in definition.
///
/// Resets then re-adds, so running it twice leaves the same bits.
pub fn apply_builtin(role: &mut Role, granted: &[i32]) {
    role.reset();
    for bit in granted {
        role.add(*bit);
    }
    role.is_default = role.name == DEFAULT_ROLE;
}

/// The built-in roles as fresh values.
pub fn builtin_roles() -> Vec<Role> {
    BUILTIN_ROLES
        .iter()
        .map(|(name, granted)| {
            let mut role = Role::new(*name);
            apply_builtin(&mut role, granted);
            role
        })
        .collect()
}

/// A registered machine caller.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    /// Unique display name
    pub name: String,
    /// Free-form description
    pub description: Option<String>,
    /// Person or team responsible for this caller
    pub owner: String,
    /// Public identifier (32 chars)
    pub access_key: String,
    /// HMAC key (32 chars). Never serialized or printed.
    pub secret_key: String,
    /// Disabled credentials never authenticate
    pub enabled: bool,
    /// Role granting permissions
    pub role: Option<Role>,
}

impl Credential {
    /// Fail-closed permission check: no role, no access.
    pub fn can(&self, bit: i32) -> bool {
        self.role.as_ref().is_some_and(|role| role.has(bit))
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("name", &self.name)
            .field("owner", &self.owner)
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("enabled", &self.enabled)
            .field("role", &self.role.as_ref().map(|r| r.name.as_str()))
            .finish()
    }
}

/// Credential info injected into request extensions after authentication.
#[derive(Debug, Clone)]
pub struct AuthenticatedCredential {
    /// Display name of the caller
    pub name: String,
    /// Access key used for authentication
    pub access_key: String,
    /// Role name, if any
    pub role: Option<String>,
    /// Permission bitmask of the role (0 without a role)
    pub permissions: i32,
}

impl From<&Credential> for AuthenticatedCredential {
    fn from(credential: &Credential) -> Self {
        Self {
            name: credential.name.clone(),
            access_key: credential.access_key.clone(),
            role: credential.role.as_ref().map(|r| r.name.clone()),
            permissions: credential.role.as_ref().map_or(0, Role::bits),
        }
    }
}

/// Generate a random 32-character alphanumeric key.
pub fn generate_key() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(KEY_LEN)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential(role: Option<Role>) -> Credential {
        Credential {
            name: "billing-sync".to_string(),
            description: None,
            owner: "ops".to_string(),
            access_key: "a".repeat(KEY_LEN),
            secret_key: "s".repeat(KEY_LEN),
            enabled: true,
            role,
        }
    }

    #[test]
    fn test_permissions() {
        let read_only = permissions::READ;
        assert!(has_permission(read_only, permissions::READ));
        assert!(!has_permission(read_only, permissions::WRITE));

        let executor = permissions::READ | permissions::WRITE;
        assert!(has_permission(executor, permissions::READ));
        assert!(has_permission(executor, permissions::WRITE));
        assert!(!has_permission(executor, permissions::DELETE));
        assert!(has_permission(executor, executor));
    }

    #[test]
    fn test_role_add_remove() {
        let mut role = Role::new("custom");
        assert_eq!(role.bits(), 0);

        role.add(permissions::UPDATE);
        assert!(role.has(permissions::UPDATE));

        // adding twice does not double count
        role.add(permissions::UPDATE);
        assert_eq!(role.bits(), permissions::UPDATE);

        role.remove(permissions::UPDATE);
        assert!(!role.has(permissions::UPDATE));

        // removing an absent bit is a no-op
        role.remove(permissions::UPDATE);
        assert_eq!(role.bits(), 0);
    }

    #[test]
    fn test_multi_bit_add_on_partial_role() {
        let mut role = Role::new("Follower").with(permissions::READ);
        role.add(permissions::READ | permissions::WRITE);

        assert_eq!(role.bits(), permissions::READ | permissions::WRITE);
        assert!(!role.has(permissions::UPDATE));
    }

    #[test]
    fn test_multi_bit_remove_on_partial_role() {
        let mut role = Role::new("Executor")
            .with(permissions::READ)
            .with(permissions::UPDATE);
        role.remove(permissions::READ | permissions::WRITE);

        assert_eq!(role.bits(), permissions::UPDATE);
        assert!(!role.has(permissions::READ));
    }

    #[test]
    fn test_add_ignores_undefined_bits() {
        let mut role = Role::new("custom");
        role.add(0x40 | permissions::DELETE);
        assert_eq!(role.bits(), permissions::DELETE);
    }

    #[test]
    fn test_role_reset() {
        let mut role = Role::new("all");
        for bit in permissions::ALL {
            role.add(bit);
        }
        role.reset();
        for bit in permissions::ALL {
            assert!(!role.has(bit), "{} survived reset", permissions::name(bit));
        }
    }

    #[test]
    fn test_admin_does_not_imply_other_bits() {
        let role = Role::new("admin-only").with(permissions::ADMIN);
        assert!(role.has(permissions::ADMIN));
        assert!(!role.has(permissions::READ));
        assert!(!role.has(permissions::DELETE));
    }

    #[test]
    fn test_from_bits_drops_unknown() {
        let role = Role::from_bits("weird", false, 0x40 | permissions::READ);
        assert_eq!(role.bits(), permissions::READ);
    }

    #[test]
    fn test_builtin_roles() {
        let roles = builtin_roles();
        assert_eq!(roles.len(), 4);
        assert_eq!(roles.iter().filter(|r| r.is_default).count(), 1);

        let follower = &roles[0];
        assert_eq!(follower.name, DEFAULT_ROLE);
        assert_eq!(follower.bits(), permissions::READ);

        let admin = roles.iter().find(|r| r.name == "Administrator").unwrap();
        assert_eq!(admin.bits(), 0x1F);
    }

    #[test]
    fn test_apply_builtin_is_idempotent() {
        let mut role = Role::new("Executor").with(permissions::ADMIN);
        apply_builtin(&mut role, &[permissions::READ, permissions::WRITE]);
        let once = role.clone();
        apply_builtin(&mut role, &[permissions::READ, permissions::WRITE]);
        assert_eq!(role, once);
        assert!(!role.has(permissions::ADMIN));
        assert!(!role.is_default);
    }

    #[test]
    fn test_credential_can() {
        let follower = Role::new("Follower").with(permissions::READ);
        let cred = credential(Some(follower));
        assert!(cred.can(permissions::READ));
        assert!(!cred.can(permissions::WRITE));
    }

    #[test]
    fn test_credential_without_role_is_denied() {
        let cred = credential(None);
        for bit in permissions::ALL {
            assert!(!cred.can(bit));
        }
    }

    #[test]
    fn test_debug_redacts_secret() {
        let cred = credential(None);
        let printed = format!("{:?}", cred);
        assert!(!printed.contains(&cred.secret_key));
        assert!(printed.contains("<redacted>"));
    }

    #[test]
    fn test_generate_key() {
        let a = generate_key();
        let b = generate_key();
        assert_eq!(a.len(), KEY_LEN);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }
}
