//! Browser instances.
//!
//! An instance is an isolation boundary: one browser process, one cookie and
//! local-storage identity, one user-data directory, one resolved proxy. All
//! workers of an instance share the browser as tabs; workers of different
//! instances never share storage. The browser is launched lazily by the
//! first worker init and lives until instance shutdown.

use std::{path::PathBuf, sync::Arc};

use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::{
    config::{InstanceConfig, ProxyConfig},
    core::page::{Browser, BrowserLauncher, LaunchOptions, Page, PageError, PageResult},
};

pub struct Instance {
    name: String,
    user_data_dir: PathBuf,
    proxy: Option<ProxyConfig>,
    launcher: Arc<dyn BrowserLauncher>,
    browser: OnceCell<Arc<dyn Browser>>,
}

impl Instance {
    /// Build an instance from its validated configuration. `global_proxy`
    /// participates in the instance-over-global precedence.
    pub fn from_config(
        config: &InstanceConfig,
        data_dir: &std::path::Path,
        global_proxy: Option<&ProxyConfig>,
        launcher: Arc<dyn BrowserLauncher>,
    ) -> Self {
        Self {
            name: config.name.clone(),
            user_data_dir: config.user_data_dir(data_dir),
            proxy: config.resolved_proxy(global_proxy),
            launcher,
            browser: OnceCell::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn user_data_dir(&self) -> &std::path::Path {
        &self.user_data_dir
    }

    pub fn proxy(&self) -> Option<&ProxyConfig> {
        self.proxy.as_ref()
    }

    /// The shared browser handle, launching it on first use. Subsequent
    /// workers of this instance reuse the process and append tabs.
    pub async fn browser(&self) -> PageResult<Arc<dyn Browser>> {
        self.browser
            .get_or_try_init(|| async {
                std::fs::create_dir_all(&self.user_data_dir)
                    .map_err(|e| PageError::LaunchFailed(e.to_string()))?;
                info!(
                    instance = %self.name,
                    user_data_dir = %self.user_data_dir.display(),
                    proxied = self.proxy.is_some(),
                    "Launching browser"
                );
                self.launcher
                    .launch(LaunchOptions {
                        user_data_dir: self.user_data_dir.clone(),
                        proxy: self.proxy.clone(),
                    })
                    .await
            })
            .await
            .cloned()
    }

    /// Open a new tab in this instance's browser.
    pub async fn new_page(&self) -> PageResult<Arc<dyn Page>> {
        self.browser().await?.new_page().await
    }

    /// Close the browser process. Called on shutdown only; tabs owned by
    /// workers become invalid.
    pub async fn shutdown(&self) {
        if let Some(browser) = self.browser.get() {
            if let Err(e) = browser.close().await {
                warn!(instance = %self.name, error = %e, "Browser close failed");
            }
        }
    }
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("name", &self.name)
            .field("user_data_dir", &self.user_data_dir)
            .field("proxied", &self.proxy.is_some())
            .field("launched", &self.browser.initialized())
            .finish()
    }
}
