//! Adapter contract and registry.
//!
//! An adapter drives one external web UI. The engine addresses adapters by
//! their type tag and speaks only this narrow protocol: resolve a model,
//! compute the entry URL, install navigation handlers, generate. Adapters
//! are a fixed set of values registered at startup; the registry is
//! immutable afterwards and safe for concurrent reads.

pub mod navigation;
mod registry;

use std::{path::{Path, PathBuf}, sync::Arc};

use async_trait::async_trait;
pub use navigation::{NavigationHandler, NavigationHandlerFn};
pub use registry::AdapterRegistry;
use serde::{Deserialize, Serialize};

pub use crate::config::AdapterSettings;
use crate::{
    config::{ProxyConfig, WorkerConfig},
    core::{
        error::GatewayError,
        page::Page,
        task::CancelFlag,
        worker::PageAuthLock,
    },
};

// ============================================================================
// Model descriptors
// ============================================================================

/// Output modality of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Text,
    Image,
}

/// Per-(adapter, model) declaration of whether attached images are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImagePolicy {
    Forbidden,
    Optional,
    Required,
}

/// A model an adapter serves: the stable public id, the opaque identifier
/// the upstream UI understands, and routing-relevant attributes.
/// Registered at startup, immutable thereafter.
#[derive(Debug, Clone)]
pub struct ModelDescriptor {
    pub id: String,
    pub upstream_id: String,
    pub modality: Modality,
    pub image_policy: ImagePolicy,
}

impl ModelDescriptor {
    pub fn new(id: impl Into<String>, upstream_id: impl Into<String>, modality: Modality) -> Self {
        Self {
            id: id.into(),
            upstream_id: upstream_id.into(),
            modality,
            image_policy: ImagePolicy::Forbidden,
        }
    }

    pub fn with_image_policy(mut self, policy: ImagePolicy) -> Self {
        self.image_policy = policy;
        self
    }
}

// ============================================================================
// Model keys
// ============================================================================

/// A requested model identifier: plain (`gpt-web`) or qualified with an
/// adapter type (`alpha/gpt-web`). The qualified form binds resolution to
/// the named adapter only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelKey {
    pub adapter_type: Option<String>,
    pub id: String,
}

impl ModelKey {
    pub fn parse(raw: &str) -> Self {
        match raw.split_once('/') {
            Some((adapter_type, id)) if !adapter_type.is_empty() && !id.is_empty() => Self {
                adapter_type: Some(adapter_type.to_string()),
                id: id.to_string(),
            },
            _ => Self {
                adapter_type: None,
                id: raw.to_string(),
            },
        }
    }

    /// Whether this key may resolve against the given adapter type.
    pub fn binds_to(&self, adapter_type: &str) -> bool {
        match &self.adapter_type {
            Some(t) => t == adapter_type,
            None => true,
        }
    }
}

impl std::fmt::Display for ModelKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.adapter_type {
            Some(t) => write!(f, "{}/{}", t, self.id),
            None => f.write_str(&self.id),
        }
    }
}

// ============================================================================
// Generate operation
// ============================================================================

/// Read-only context handed to an adapter for one generate call.
pub struct SubContext<'a> {
    pub page: Arc<dyn Page>,
    pub settings: &'a AdapterSettings,
    pub proxy: Option<&'a ProxyConfig>,
    pub user_data_dir: &'a Path,
    /// The worker's cooperative page mutex. Hold it across input sequences
    /// that must not race a background navigation handler.
    pub page_auth: Arc<PageAuthLock>,
    /// Cooperative cancellation; consulted between suspension points.
    pub cancel: CancelFlag,
}

/// One generation request as the adapter sees it.
pub struct GenerateRequest<'a> {
    pub prompt: &'a str,
    pub image_paths: &'a [PathBuf],
    pub model_key: &'a ModelKey,
    pub meta: &'a serde_json::Map<String, serde_json::Value>,
}

/// Image payload produced by an image adapter.
#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub mime: String,
    pub base64: String,
}

/// Result of a generate call. `text` may carry concatenated media data URIs
/// (some upstreams return video that way); it is passed through verbatim.
#[derive(Debug, Clone, Default)]
pub struct GenerateOutput {
    pub text: Option<String>,
    pub image: Option<GeneratedImage>,
}

impl GenerateOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            image: None,
        }
    }

    pub fn image(mime: impl Into<String>, base64: impl Into<String>) -> Self {
        Self {
            text: None,
            image: Some(GeneratedImage {
                mime: mime.into(),
                base64: base64.into(),
            }),
        }
    }
}

// ============================================================================
// Adapter trait
// ============================================================================

/// A driver for one external web service.
///
/// Implementations own their DOM protocol end to end: navigating into a
/// clean conversation state, uploading images (path-based; PNG, JPEG, GIF,
/// WebP), typing through the human-emulating keyboard helper, submitting,
/// matching the upstream response by URL substring, and extracting text or
/// media. Errors surface as the contract strings classified by
/// [`crate::core::error::normalize_error`].
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Type tag this adapter is addressed by.
    fn adapter_type(&self) -> &str;

    fn display_name(&self) -> &str;

    /// Models this adapter serves. Stable for the process lifetime.
    fn models(&self) -> &[ModelDescriptor];

    /// Entry URL, computed from the adapter's settings block and the
    /// worker's configuration.
    fn target_url(
        &self,
        settings: &AdapterSettings,
        worker: &WorkerConfig,
    ) -> Result<String, GatewayError>;

    /// Handlers invoked on every page navigation, in order. Handlers that
    /// perform input must hold the worker's page-auth lock first.
    fn navigation_handlers(&self) -> Vec<NavigationHandler> {
        Vec::new()
    }

    /// Drive the page through one generation.
    async fn generate(
        &self,
        ctx: &SubContext<'_>,
        request: GenerateRequest<'_>,
    ) -> Result<GenerateOutput, GatewayError>;
}

/// Resolve a model key against an adapter's descriptor set. An empty id
/// resolves to the adapter's first (default) model.
pub(crate) fn find_descriptor<'a>(
    adapter: &'a dyn Adapter,
    key: &ModelKey,
) -> Option<&'a ModelDescriptor> {
    if !key.binds_to(adapter.adapter_type()) {
        return None;
    }
    if key.id.is_empty() {
        return adapter.models().first();
    }
    adapter.models().iter().find(|d| d.id == key.id)
}
