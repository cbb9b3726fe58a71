//! HTTP handlers.

use std::{collections::HashSet, sync::Arc};

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use openai_wire::{ChatCompletionRequest, ModelEntry, ModelList};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::oneshot;
use tracing::debug;

use crate::{
    core::error::{ErrorCode, GatewayError},
    server::{
        admission,
        queue::{PendingTask, TaskResult},
        state::AppState,
    },
    streaming::{chat_completion_id, render_content, SseChannel},
};

/// Owner string for bare (unqualified) model entries.
const INTERNAL_OWNER: &str = "internal_server";

// ============================================================================
// POST /v1/chat/completions
// ============================================================================

pub async fn chat_completions(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatCompletionRequest>,
) -> Response {
    if state.is_draining() {
        return GatewayError::new(ErrorCode::ServerBusy, "server is shutting down")
            .into_response();
    }

    let task = match admission::admit(&state, request) {
        Ok(task) => task,
        Err(error) => return error.into_response(),
    };

    let model = task.requested_model.clone();
    let streaming = task.streaming;
    let (responder, receiver) = oneshot::channel::<TaskResult>();
    state.queue.push(PendingTask { task, responder });

    if streaming {
        stream_response(&state, model, receiver)
    } else {
        unary_response(model, receiver).await
    }
}

async fn unary_response(model: String, receiver: oneshot::Receiver<TaskResult>) -> Response {
    match receiver.await {
        Ok(Ok(output)) => match render_content(&output) {
            Ok(content) => Json(openai_wire::ChatCompletionResponse::assistant(
                chat_completion_id(),
                model,
                content,
            ))
            .into_response(),
            Err(error) => error.into_response(),
        },
        Ok(Err(error)) => error.into_response(),
        Err(_) => GatewayError::internal("task was dropped before completion").into_response(),
    }
}

/// Start the SSE response immediately: keepalives flow while the task waits
/// its turn, and a waiter task bridges the oneshot result into frames.
fn stream_response(
    state: &AppState,
    model: String,
    receiver: oneshot::Receiver<TaskResult>,
) -> Response {
    let (channel, body) = SseChannel::new(
        chat_completion_id(),
        model,
        state.config.server.keepalive.mode,
    );
    let keepalive = channel.spawn_keepalive();

    let writer = channel.clone();
    tokio::spawn(async move {
        let mut receiver = receiver;
        let result = tokio::select! {
            result = &mut receiver => result,
            _ = writer.closed() => {
                // Client hung up; returning drops the receiver, which
                // cancels the task (queued: removed, in-flight: flagged).
                debug!("Streaming client disconnected");
                keepalive.abort();
                return;
            }
        };

        match result {
            Ok(Ok(output)) => match render_content(&output) {
                Ok(content) => {
                    writer.send_content(content).await;
                    writer.finish().await;
                }
                Err(error) => writer.send_error(&error).await,
            },
            Ok(Err(error)) => writer.send_error(&error).await,
            Err(_) => {
                writer
                    .send_error(&GatewayError::internal("task was dropped before completion"))
                    .await
            }
        }
        keepalive.abort();
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .body(body)
        .unwrap_or_else(|_| {
            GatewayError::internal("failed to build streaming response").into_response()
        })
}

// ============================================================================
// GET /v1/models
// ============================================================================

/// Every model appears twice: bare id owned by the gateway, and
/// `<adapterType>/<id>` owned by its adapter.
pub async fn list_models(State(state): State<Arc<AppState>>) -> Response {
    let mut entries = Vec::new();
    let mut seen_bare = HashSet::new();

    for adapter_type in state.registry.adapter_types() {
        for descriptor in state.registry.list_models(adapter_type) {
            if seen_bare.insert(descriptor.id.clone()) {
                entries.push(ModelEntry::new(&descriptor.id, INTERNAL_OWNER));
            }
            entries.push(ModelEntry::new(
                format!("{adapter_type}/{}", descriptor.id),
                adapter_type,
            ));
        }
    }

    Json(ModelList::new(entries)).into_response()
}

// ============================================================================
// GET /v1/cookies
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CookiesQuery {
    pub domain: Option<String>,
}

pub async fn get_cookies(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CookiesQuery>,
) -> Response {
    let Some(worker) = state.pool.first_initialized() else {
        return GatewayError::new(
            ErrorCode::BrowserNotInitialized,
            "no worker is initialized yet",
        )
        .into_response();
    };
    match worker.cookies(query.domain.as_deref()).await {
        Ok(cookies) => Json(cookies).into_response(),
        Err(error) => error.into_response(),
    }
}

// ============================================================================
// Admin
// ============================================================================

pub async fn admin_status(State(state): State<Arc<AppState>>) -> Response {
    Json(json!({
        "status": "ok",
        "workers": state.pool.max_concurrent(),
        "busy": state.pool.total_busy(),
        "queued": state.queue.len(),
    }))
    .into_response()
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub lines: Option<usize>,
}

pub async fn admin_logs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LogsQuery>,
) -> Response {
    let lines = state.log_buffer.tail(query.lines.unwrap_or(100));
    Json(json!({ "object": "list", "lines": lines })).into_response()
}

pub async fn admin_logs_reset(State(state): State<Arc<AppState>>) -> Response {
    let cleared = state.log_buffer.len();
    state.log_buffer.clear();
    Json(json!({ "cleared": cleared })).into_response()
}
