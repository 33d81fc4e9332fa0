//! Gateway handlers

use axum::{Extension, Json, extract::State, http::StatusCode};
use std::sync::Arc;

use super::state::AppState;
use super::types::{
    AdminPingData, ApiResponse, CacheClearData, CacheStatsData, EchoData, HealthData, WhoAmIData,
    error_codes,
};
use crate::api_auth::{AuthenticatedCredential, has_permission, permissions};

pub fn version() -> String {
    format!("{}+{}", env!("CARGO_PKG_VERSION"), env!("GIT_HASH"))
}

/// Health check endpoint
///
/// - Healthy: 200 OK + {code: 0, data: {version, timestamp_ms}}
/// - Database configured but unreachable: 503 + {code: 5001}
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<HealthData>>, (StatusCode, Json<ApiResponse<()>>)> {
    if let Some(db) = &state.pg_db {
        if let Err(e) = db.health_check().await {
            tracing::error!("[HEALTH] PostgreSQL ping failed: {}", e);
            return Err((
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse::<()>::error(
                    error_codes::SERVICE_UNAVAILABLE,
                    "unavailable",
                )),
            ));
        }
    }

    Ok(Json(ApiResponse::success(HealthData {
        version: version(),
        timestamp_ms: chrono::Utc::now().timestamp_millis(),
    })))
}

/// Describe the authenticated caller. Requires READ.
pub async fn whoami(
    Extension(caller): Extension<AuthenticatedCredential>,
) -> Json<ApiResponse<WhoAmIData>> {
    let granted = permissions::ALL
        .iter()
        .filter(|bit| has_permission(caller.permissions, **bit))
        .map(|bit| permissions::name(*bit).to_string())
        .collect();

    Json(ApiResponse::success(WhoAmIData {
        name: caller.name,
        access_key: caller.access_key,
        role: caller.role,
        permissions: granted,
    }))
}

/// Return the signed body unchanged. Requires WRITE.
pub async fn echo(
    Extension(caller): Extension<AuthenticatedCredential>,
    body: String,
) -> Json<ApiResponse<EchoData>> {
    Json(ApiResponse::success(EchoData {
        caller: caller.name,
        body,
    }))
}

/// Liveness of the admin surface plus cache counters. Requires ADMIN.
pub async fn admin_ping(State(state): State<Arc<AppState>>) -> Json<ApiResponse<AdminPingData>> {
    let credentials = state.auth.credentials();
    let signatures = state.auth.signatures();

    Json(ApiResponse::success(AdminPingData {
        pong: true,
        window_minutes: state.auth.window_minutes(),
        credential_ttl_secs: credentials.ttl().as_secs(),
        credential_cache: CacheStatsData {
            entries: credentials.len(),
            hits: credentials.stats().hits(),
            misses: credentials.stats().misses(),
        },
        signature_cache: CacheStatsData {
            entries: signatures.len(),
            hits: signatures.stats().hits(),
            misses: signatures.stats().misses(),
        },
    }))
}

/// Drop every cached credential and signature. Requires ADMIN.
///
/// Disabled or re-roled credentials take effect on their next request
/// instead of after the TTL.
pub async fn admin_clear_caches(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthenticatedCredential>,
) -> Json<ApiResponse<CacheClearData>> {
    let credentials = state.auth.credentials();
    let signatures = state.auth.signatures();
    let cleared = CacheClearData {
        credentials: credentials.len(),
        signatures: signatures.len(),
    };
    credentials.clear();
    signatures.clear();

    tracing::info!(
        caller = %caller.name,
        credentials = cleared.credentials,
        signatures = cleared.signatures,
        "[ADMIN] caches cleared"
    );
    Json(ApiResponse::success(cleared))
}
