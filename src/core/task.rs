//! Task snapshot and cooperative cancellation.

use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::adapters::ModelKey;

/// Cooperative cancellation flag threaded through the adapter context.
///
/// Setting it is best-effort: the adapter consults it between suspension
/// points and is not required to short-circuit mid-upload.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Snapshot of one admitted request. Created on admission, destroyed on
/// completion or error.
#[derive(Debug)]
pub struct Task {
    /// Requested model, possibly `adapterType/model`-qualified. Empty id
    /// means the adapter's default applies.
    pub model_key: ModelKey,
    /// Raw model string as the client sent it (echoed back in responses).
    pub requested_model: String,
    pub prompt: String,
    /// Decoded image attachments, at most the configured limit.
    pub image_paths: Vec<PathBuf>,
    pub streaming: bool,
    pub admitted_at: DateTime<Utc>,
    /// Name of the worker the task was dispatched to; filled on dispatch.
    pub assigned_worker: Option<String>,
    /// Uninterpreted request fields, surfaced to the adapter as meta.
    pub meta: Map<String, Value>,
    pub cancel: CancelFlag,
}

impl Task {
    pub fn new(
        requested_model: String,
        prompt: String,
        image_paths: Vec<PathBuf>,
        streaming: bool,
        meta: Map<String, Value>,
    ) -> Self {
        Self {
            model_key: ModelKey::parse(&requested_model),
            requested_model,
            prompt,
            image_paths,
            streaming,
            admitted_at: Utc::now(),
            assigned_worker: None,
            meta,
            cancel: CancelFlag::new(),
        }
    }

    pub fn has_images(&self) -> bool {
        !self.image_paths.is_empty()
    }
}
