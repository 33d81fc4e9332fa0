pub mod handlers;
pub mod state;
pub mod types;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::api_auth::{guard, permissions};
use state::AppState;

/// Build the gateway router.
///
/// Each protected route carries its own permission guard, layered under the
/// shared signature guard.
pub fn build_router(state: Arc<AppState>) -> Router {
    let protected = |router: Router<Arc<AppState>>, required: i32| {
        guard(router, state.auth.clone(), state.body_limit, required)
    };

    let public_routes = Router::new().route("/health", get(handlers::health_check));

    let read_routes = protected(
        Router::new().route("/whoami", get(handlers::whoami)),
        permissions::READ,
    );
    let write_routes = protected(
        Router::new().route("/echo", post(handlers::echo)),
        permissions::WRITE,
    );
    let admin_routes = protected(
        Router::new()
            .route("/ping", get(handlers::admin_ping))
            .route("/cache/clear", post(handlers::admin_clear_caches)),
        permissions::ADMIN,
    );

    Router::new()
        .nest(
            "/api/v1",
            public_routes
                .merge(read_routes)
                .merge(write_routes)
                .nest("/admin", admin_routes),
        )
        .with_state(state)
}

/// Bind and serve until the server stops.
pub async fn run_server(host: &str, port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = build_router(state);

    let addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to bind to {}: {} (port {} may already be in use)",
            addr,
            e,
            port
        )
    })?;

    tracing::info!("Gateway listening on http://{}", addr);
    tracing::info!("Public API: /api/v1/health");
    tracing::info!("Signed API: /api/v1/whoami, /api/v1/echo, /api/v1/admin/*");

    axum::serve(listener, app).await?;
    Ok(())
}
