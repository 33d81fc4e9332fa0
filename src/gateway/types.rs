//! API response types
//!
//! Successful responses are wrapped in [`ApiResponse`]. Authentication
//! failures use [`crate::api_auth::error::AuthErrorResponse`].

use serde::{Deserialize, Serialize};

/// Unified API response wrapper
///
/// - code: 0 = success, non-zero = error code
/// - msg: short message description
/// - data: actual data (success) or null (error)
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub code: i32,
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: error_codes::SUCCESS,
            msg: "ok".to_string(),
            data: Some(data),
        }
    }

    pub fn error(code: i32, msg: impl Into<String>) -> ApiResponse<()> {
        ApiResponse {
            code,
            msg: msg.into(),
            data: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthData {
    /// Crate version and git hash
    pub version: String,
    /// Server timestamp in milliseconds
    pub timestamp_ms: i64,
}

/// The authenticated caller as seen by the server.
#[derive(Debug, Serialize, Deserialize)]
pub struct WhoAmIData {
    pub name: String,
    pub access_key: String,
    pub role: Option<String>,
    pub permissions: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EchoData {
    pub caller: String,
    pub body: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CacheStatsData {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AdminPingData {
    pub pong: bool,
    /// Accepted clock skew either side of server time
    pub window_minutes: u32,
    pub credential_ttl_secs: u64,
    pub credential_cache: CacheStatsData,
    pub signature_cache: CacheStatsData,
}

/// Entries dropped by a cache flush.
#[derive(Debug, Serialize, Deserialize)]
pub struct CacheClearData {
    pub credentials: usize,
    pub signatures: usize,
}

pub mod error_codes {
    pub const SUCCESS: i32 = 0;
    pub const SERVICE_UNAVAILABLE: i32 = 5001;
}
