//! Machine Auth gateway
//!
//! ```text
//! request ──▶ signature guard ──▶ permission guard ──▶ handler
//!               (timestamp,         (role bit)
//!                access key,
//!                HMAC)
//! ```
//!
//! Credentials come from PostgreSQL when `postgres_url` is configured,
//! otherwise from an in-memory store. Either way the built-in roles and the
//! configured `auth.bootstrap_credentials` are applied at startup.

use std::sync::Arc;

use machine_auth::api_auth::provision::bootstrap;
use machine_auth::api_auth::{
    Authenticator, CredentialStore, MemoryCredentialStore, PgCredentialRepository,
};
use machine_auth::config::AppConfig;
use machine_auth::db::Database;
use machine_auth::gateway::{self, state::AppState};
use machine_auth::logging;

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

fn get_port_override() -> anyhow::Result<Option<u16>> {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if args[i] == "--port" && i + 1 < args.len() {
            let port = args[i + 1]
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid --port {}: {}", args[i + 1], e))?;
            return Ok(Some(port));
        }
    }
    Ok(None)
}

async fn open_store(
    config: &AppConfig,
) -> anyhow::Result<(Arc<dyn CredentialStore>, Option<Arc<Database>>)> {
    match &config.postgres_url {
        Some(url) => {
            let db = Arc::new(Database::connect(url).await?);
            let repo = PgCredentialRepository::new(db.clone());
            repo.ensure_schema().await?;
            if config.auth.auto_seed_roles {
                repo.seed_roles().await?;
            }
            bootstrap(&repo, &config.auth.bootstrap_credentials).await?;
            Ok((Arc::new(repo), Some(db)))
        }
        None => {
            tracing::warn!("postgres_url not set, credentials are held in memory");
            let store = MemoryCredentialStore::new();
            if config.auth.auto_seed_roles {
                store.seed_roles();
            }
            bootstrap(&store, &config.auth.bootstrap_credentials).await?;
            Ok((Arc::new(store), None))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let mut config = AppConfig::load(&env)?;
    if let Some(port) = get_port_override()? {
        config.gateway.port = port;
    }

    let _log_guard = logging::init_logging(&config);
    tracing::info!(
        env = %env,
        version = %gateway::handlers::version(),
        "Starting machine auth gateway"
    );

    let (store, pg_db) = open_store(&config).await?;
    let auth = Arc::new(Authenticator::new(store, &config.auth));
    tracing::info!(
        window_minutes = config.auth.freshness_window_minutes,
        credential_ttl_secs = config.auth.credential_ttl_secs,
        signature_cache_size = config.auth.signature_cache_size,
        "Authenticator ready"
    );

    let state = Arc::new(AppState::new(
        auth,
        pg_db,
        config.gateway.body_limit_bytes,
    ));
    gateway::run_server(&config.gateway.host, config.gateway.port, state).await
}
