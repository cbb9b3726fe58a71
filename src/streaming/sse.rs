//! SSE channel with keepalive heartbeats.
//!
//! One producer writes frames (`data: <json>\n\n`), heartbeats, and the
//! `data: [DONE]\n\n` terminator into an mpsc channel whose receiver is the
//! response body. Every write passes through one "still writable" guard:
//! after the terminal or error frame, and after the client hangs up, writes
//! are no-ops. The heartbeat task stops exactly when the channel ends.

use std::{
    io,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use axum::body::Body;
use bytes::Bytes;
use openai_wire::ChatCompletionStreamChunk;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

use crate::{config::KeepaliveMode, core::error::GatewayError};

/// Heartbeat period, inside the 10–15 s window the contract allows.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(12);

/// Frames buffered before the producer backpressures.
const SSE_CHANNEL_SIZE: usize = 64;

#[derive(Clone)]
pub struct SseChannel {
    tx: mpsc::Sender<Result<Bytes, io::Error>>,
    ended: Arc<AtomicBool>,
    id: String,
    model: String,
    mode: KeepaliveMode,
}

impl SseChannel {
    /// Create a channel and the response body fed by it.
    pub fn new(id: impl Into<String>, model: impl Into<String>, mode: KeepaliveMode) -> (Self, Body) {
        let (tx, rx) = mpsc::channel::<Result<Bytes, io::Error>>(SSE_CHANNEL_SIZE);
        let body = Body::from_stream(ReceiverStream::new(rx));
        (
            Self {
                tx,
                ended: Arc::new(AtomicBool::new(false)),
                id: id.into(),
                model: model.into(),
                mode,
            },
            body,
        )
    }

    pub fn is_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst) || self.tx.is_closed()
    }

    /// Resolves when the client side of the stream is gone.
    pub async fn closed(&self) {
        self.tx.closed().await
    }

    /// Send one `data:` frame. No-op once the channel has ended.
    async fn send_json<T: Serialize>(&self, frame: &T) -> bool {
        let json = serde_json::to_string(frame).unwrap_or_else(|_| "{}".to_string());
        self.send_raw(Bytes::from(format!("data: {json}\n\n"))).await
    }

    async fn send_raw(&self, bytes: Bytes) -> bool {
        if self.is_ended() {
            return false;
        }
        self.tx.send(Ok(bytes)).await.is_ok()
    }

    /// Content chunk with `finish_reason: null`.
    pub async fn send_content(&self, content: String) -> bool {
        let chunk = ChatCompletionStreamChunk::content(&self.id, &self.model, content);
        self.send_json(&chunk).await
    }

    /// Terminal chunk + `[DONE]`. Closes the write guard first so no
    /// heartbeat can land after the terminator.
    pub async fn finish(&self) {
        if self.ended.swap(true, Ordering::SeqCst) {
            return;
        }
        let chunk = ChatCompletionStreamChunk::done(&self.id, &self.model);
        self.send_terminal(&chunk).await;
    }

    /// One OpenAI error frame + `[DONE]`, closing the channel the same way.
    pub async fn send_error(&self, error: &GatewayError) {
        if self.ended.swap(true, Ordering::SeqCst) {
            return;
        }
        self.send_terminal(&error.body()).await;
    }

    /// Emit the final `data:` frame and the `[DONE]` terminator, bypassing
    /// the (already closed) guard.
    async fn send_terminal<T: Serialize>(&self, frame: &T) {
        let json = serde_json::to_string(frame).unwrap_or_else(|_| "{}".to_string());
        let _ = self.tx.send(Ok(Bytes::from(format!("data: {json}\n\n")))).await;
        let _ = self
            .tx
            .send(Ok(Bytes::from_static(b"data: [DONE]\n\n")))
            .await;
    }

    /// One heartbeat in the configured mode.
    pub async fn heartbeat(&self) -> bool {
        match self.mode {
            KeepaliveMode::Comment => self.send_raw(Bytes::from_static(b":keepalive\n\n")).await,
            KeepaliveMode::Content => {
                let chunk = ChatCompletionStreamChunk::heartbeat(&self.id, &self.model);
                self.send_json(&chunk).await
            }
        }
    }

    /// Spawn the heartbeat loop. It exits when the channel ends (terminal
    /// or error frame sent) or the client disconnects.
    pub fn spawn_keepalive(&self) -> tokio::task::JoinHandle<()> {
        let channel = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
            // The first tick fires immediately; skip it so the first
            // heartbeat lands a full period after admission.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if channel.is_ended() || !channel.heartbeat().await {
                    break;
                }
            }
            debug!("Keepalive loop stopped");
        })
    }
}
