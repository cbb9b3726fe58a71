//! HTTP surface: router assembly and the serve loop.

pub mod admission;
pub mod auth;
pub mod handlers;
pub mod queue;
pub mod state;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;
use tracing::info;

pub use queue::{dispatch_loop, PendingQueue, PendingTask};
pub use state::AppState;

/// Assemble the full router. Every route sits behind the bearer check.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/chat/completions", post(handlers::chat_completions))
        .route("/v1/models", get(handlers::list_models))
        .route("/v1/cookies", get(handlers::get_cookies))
        .route("/admin/status", get(handlers::admin_status))
        .route(
            "/admin/logs",
            get(handlers::admin_logs).delete(handlers::admin_logs_reset),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until `shutdown` resolves.
pub async fn serve(
    state: Arc<AppState>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let port = state.config.server.port;
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "Listening");
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
