//! Adapter registry.
//!
//! Maps adapter-type tags to adapter values and answers model-resolution
//! queries. Built once at startup from the fixed adapter set named by the
//! configuration; immutable afterwards.

use std::{collections::HashMap, sync::Arc};

use crate::{
    adapters::{
        find_descriptor, Adapter, ImagePolicy, Modality, ModelDescriptor, ModelKey,
        NavigationHandler,
    },
    config::{AdapterSettings, WorkerConfig},
    core::error::GatewayError,
};

#[derive(Default)]
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn Adapter>>,
    /// Registration order, used when a plain model id matches several types.
    order: Vec<String>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter. Startup-time only; duplicate type tags are a
    /// programming error.
    pub fn register(&mut self, adapter: Arc<dyn Adapter>) {
        let tag = adapter.adapter_type().to_string();
        assert!(
            !self.adapters.contains_key(&tag),
            "adapter type '{tag}' registered twice"
        );
        self.order.push(tag.clone());
        self.adapters.insert(tag, adapter);
    }

    pub fn adapter(&self, adapter_type: &str) -> Option<Arc<dyn Adapter>> {
        self.adapters.get(adapter_type).cloned()
    }

    pub fn has_adapter(&self, adapter_type: &str) -> bool {
        self.adapters.contains_key(adapter_type)
    }

    /// All registered type tags in registration order.
    pub fn adapter_types(&self) -> &[String] {
        &self.order
    }

    /// Resolve a model against one adapter type. Returns the upstream id and
    /// descriptor, or `None` when the type is unknown or does not serve the
    /// model (callers that need to distinguish use [`has_adapter`]).
    ///
    /// [`has_adapter`]: AdapterRegistry::has_adapter
    pub fn resolve_model<'a>(
        &'a self,
        adapter_type: &str,
        key: &ModelKey,
    ) -> Option<(&'a str, &'a ModelDescriptor)> {
        let adapter = self.adapters.get(adapter_type)?;
        let descriptor = find_descriptor(adapter.as_ref(), key)?;
        Some((descriptor.upstream_id.as_str(), descriptor))
    }

    pub fn supports_model(&self, adapter_type: &str, key: &ModelKey) -> bool {
        self.resolve_model(adapter_type, key).is_some()
    }

    pub fn image_policy(&self, adapter_type: &str, key: &ModelKey) -> Option<ImagePolicy> {
        self.resolve_model(adapter_type, key)
            .map(|(_, d)| d.image_policy)
    }

    pub fn model_type(&self, adapter_type: &str, key: &ModelKey) -> Option<Modality> {
        self.resolve_model(adapter_type, key).map(|(_, d)| d.modality)
    }

    pub fn list_models(&self, adapter_type: &str) -> &[ModelDescriptor] {
        self.adapters
            .get(adapter_type)
            .map(|a| a.models())
            .unwrap_or(&[])
    }

    pub fn target_url(
        &self,
        adapter_type: &str,
        settings: &AdapterSettings,
        worker: &WorkerConfig,
    ) -> Result<String, GatewayError> {
        let adapter = self.adapters.get(adapter_type).ok_or_else(|| {
            GatewayError::internal(format!("unknown adapter type '{adapter_type}'"))
        })?;
        adapter.target_url(settings, worker)
    }

    pub fn navigation_handlers(&self, adapter_type: &str) -> Vec<NavigationHandler> {
        self.adapters
            .get(adapter_type)
            .map(|a| a.navigation_handlers())
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("adapters", &self.order)
            .finish()
    }
}
