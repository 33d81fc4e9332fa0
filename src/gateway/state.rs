use std::sync::Arc;

use crate::api_auth::Authenticator;
use crate::db::Database;

/// Shared gateway state.
#[derive(Clone)]
pub struct AppState {
    /// Request verifier used by the guards
    pub auth: Arc<Authenticator>,
    /// PostgreSQL, when credentials are persisted
    pub pg_db: Option<Arc<Database>>,
    /// Largest body the signature guard buffers
    pub body_limit: usize,
}

impl AppState {
    pub fn new(auth: Arc<Authenticator>, pg_db: Option<Arc<Database>>, body_limit: usize) -> Self {
        Self {
            auth,
            pg_db,
            body_limit,
        }
    }
}
