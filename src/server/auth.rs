//! Bearer-token middleware.
//!
//! One shared token guards every protected route. Rejections use the
//! taxonomy's UNAUTHORIZED shape, not axum's default.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::{core::error::GatewayError, server::state::AppState};

pub async fn require_bearer(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let presented = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match presented {
        Some(token) if token == state.config.server.auth => next.run(request).await,
        _ => GatewayError::unauthorized().into_response(),
    }
}
