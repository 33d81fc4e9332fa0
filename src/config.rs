use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    /// PostgreSQL connection URL. Without it credentials live in memory only.
    #[serde(default)]
    pub postgres_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    /// Largest request body buffered for signature verification
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

fn default_body_limit() -> usize {
    1024 * 1024
}

/// Request verification settings.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct AuthConfig {
    /// Accepted distance between X-Timestamp and server time, either direction
    pub freshness_window_minutes: u32,
    /// Lifetime of a cached credential lookup
    pub credential_ttl_secs: u64,
    /// Number of memoized signatures
    pub signature_cache_size: usize,
    /// Insert the built-in roles at startup
    pub auto_seed_roles: bool,
    /// Credentials registered (or refreshed) at startup
    pub bootstrap_credentials: Vec<BootstrapCredential>,
}

/// A credential declared in configuration.
///
/// Keys are required so callers can be configured with them ahead of time.
#[derive(Serialize, Deserialize, Clone)]
pub struct BootstrapCredential {
    pub name: String,
    pub owner: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Role name; the default role when omitted
    #[serde(default)]
    pub role: Option<String>,
    pub access_key: String,
    pub secret_key: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl std::fmt::Debug for BootstrapCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootstrapCredential")
            .field("name", &self.name)
            .field("owner", &self.owner)
            .field("role", &self.role)
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("enabled", &self.enabled)
            .finish()
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            freshness_window_minutes: 15,
            credential_ttl_secs: 180,
            signature_cache_size: 128,
            auto_seed_roles: true,
            bootstrap_credentials: Vec::new(),
        }
    }
}

impl AuthConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.freshness_window_minutes > 0,
            "auth.freshness_window_minutes must be positive"
        );
        anyhow::ensure!(
            self.signature_cache_size > 0,
            "auth.signature_cache_size must be positive"
        );
        Ok(())
    }
}

impl AppConfig {
    pub fn load(env: &str) -> anyhow::Result<Self> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path))?;
        Self::from_yaml(&content).with_context(|| format!("Invalid config: {}", config_path))
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml::from_str(content).context("Failed to parse config yaml")?;
        config.auth.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
log_level: info
log_dir: ./logs
log_file: machine_auth.log
use_json: false
rotation: daily
gateway:
  host: 0.0.0.0
  port: 8080
"#;

    #[test]
    fn test_auth_defaults() {
        let config = AppConfig::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.auth.freshness_window_minutes, 15);
        assert_eq!(config.auth.credential_ttl_secs, 180);
        assert_eq!(config.auth.signature_cache_size, 128);
        assert_eq!(config.gateway.body_limit_bytes, 1024 * 1024);
        assert!(config.postgres_url.is_none());
    }

    #[test]
    fn test_auth_override() {
        let yaml = format!("{}auth:\n  freshness_window_minutes: 10\n", MINIMAL);
        let config = AppConfig::from_yaml(&yaml).unwrap();
        assert_eq!(config.auth.freshness_window_minutes, 10);
        assert_eq!(config.auth.credential_ttl_secs, 180);
    }

    #[test]
    fn test_zero_window_rejected() {
        let yaml = format!("{}auth:\n  freshness_window_minutes: 0\n", MINIMAL);
        assert!(AppConfig::from_yaml(&yaml).is_err());
    }

    #[test]
    fn test_shipped_dev_config() {
        let config = AppConfig::load("dev").unwrap();
        assert!(config.postgres_url.is_none());
        assert_eq!(config.auth.freshness_window_minutes, 15);
        assert!(!config.auth.bootstrap_credentials.is_empty());
    }

    #[test]
    fn test_bootstrap_credentials() {
        let yaml = format!(
            "{}auth:\n  bootstrap_credentials:\n    - name: ci\n      owner: platform\n      access_key: {}\n      secret_key: {}\n",
            MINIMAL,
            "a".repeat(32),
            "b".repeat(32)
        );
        let config = AppConfig::from_yaml(&yaml).unwrap();
        let entry = &config.auth.bootstrap_credentials[0];
        assert_eq!(entry.name, "ci");
        assert!(entry.enabled);
        assert!(entry.role.is_none());
        assert!(!format!("{:?}", entry).contains(&"b".repeat(32)));
    }

    #[test]
    fn test_missing_file() {
        assert!(AppConfig::load("does-not-exist").is_err());
    }
}
