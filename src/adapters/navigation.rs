//! Navigation handler chain.
//!
//! Adapters register handlers that react to page navigations (login expiry,
//! cookie refresh, banner dismissal). A worker merges the handlers of all
//! its member adapters into one ordered chain and installs it as the page's
//! single navigation listener.

use std::{future::Future, pin::Pin, sync::Arc};

use tracing::debug;

use crate::core::page::{NavigationEvent, NavigationListener};

/// Boxed async navigation callback.
pub type NavigationHandlerFn =
    dyn Fn(NavigationEvent) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync;

/// A named handler, so chain composition stays observable in logs.
#[derive(Clone)]
pub struct NavigationHandler {
    pub name: &'static str,
    pub handler: Arc<NavigationHandlerFn>,
}

impl NavigationHandler {
    pub fn new<F, Fut>(name: &'static str, f: F) -> Self
    where
        F: Fn(NavigationEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            name,
            handler: Arc::new(move |event| Box::pin(f(event))),
        }
    }
}

impl std::fmt::Debug for NavigationHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NavigationHandler")
            .field("name", &self.name)
            .finish()
    }
}

/// Compose an ordered handler list into a single page listener. Every
/// handler fires on every navigation, in registration order.
pub fn compose_chain(handlers: Vec<NavigationHandler>) -> NavigationListener {
    Arc::new(move |event: NavigationEvent| {
        let handlers = handlers.clone();
        Box::pin(async move {
            for h in &handlers {
                debug!(handler = h.name, url = %event.url, "Running navigation handler");
                (h.handler)(event.clone()).await;
            }
        })
    })
}
