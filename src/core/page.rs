//! Page lifecycle contract.
//!
//! The anti-fingerprint launcher, the human-emulating input driver, and all
//! DOM interaction are external collaborators. The engine sees them only
//! through these traits: a [`BrowserLauncher`] produces a [`Browser`], a
//! browser hosts [`Page`] tabs, and a page accepts navigation plus a single
//! navigation-event listener (the worker installs the merged handler chain
//! of its member adapters there).

use std::{fmt, future::Future, path::PathBuf, pin::Pin, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ProxyConfig;

pub type PageResult<T> = Result<T, PageError>;

/// Substrate-level failures. The worker maps these onto the adapter error
/// vocabulary (`PAGE_CLOSED` and friends) before classification.
#[derive(Debug, Clone, Error)]
pub enum PageError {
    #[error("PAGE_CLOSED")]
    Closed,
    #[error("PAGE_CRASHED")]
    Crashed,
    #[error("PAGE_INVALID")]
    Invalid,
    #[error("Timeout navigating to {0}")]
    NavigationTimeout(String),
    #[error("browser launch failed: {0}")]
    LaunchFailed(String),
}

/// A cookie as exposed by `/v1/cookies`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
}

/// A page navigation event, delivered to the worker's merged handler chain.
#[derive(Debug, Clone)]
pub struct NavigationEvent {
    pub url: String,
}

/// Async navigation listener installed on a page. At most one listener is
/// active per page; the worker composes all member-adapter handlers into it.
pub type NavigationListener =
    Arc<dyn Fn(NavigationEvent) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// One browser tab.
#[async_trait]
pub trait Page: Send + Sync {
    /// Navigate the page to `url`, resolving when the load settles.
    async fn goto(&self, url: &str) -> PageResult<()>;

    /// Current location of the page.
    async fn url(&self) -> PageResult<String>;

    /// Cookies of the page's context, optionally filtered by domain suffix.
    async fn cookies(&self, domain: Option<&str>) -> PageResult<Vec<Cookie>>;

    /// Install (or replace) the page's navigation listener.
    async fn set_navigation_listener(&self, listener: NavigationListener) -> PageResult<()>;

    fn is_closed(&self) -> bool;

    async fn close(&self) -> PageResult<()>;
}

/// A browser process hosting one or more tabs.
#[async_trait]
pub trait Browser: Send + Sync {
    /// Open a new tab in this browser.
    async fn new_page(&self) -> PageResult<Arc<dyn Page>>;

    /// Close the process and every tab it hosts.
    async fn close(&self) -> PageResult<()>;
}

/// Options handed to the external launcher.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub user_data_dir: PathBuf,
    pub proxy: Option<ProxyConfig>,
}

/// The external anti-fingerprint browser launcher.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self, options: LaunchOptions) -> PageResult<Arc<dyn Browser>>;
}

impl fmt::Debug for dyn Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page").finish_non_exhaustive()
    }
}

impl PageError {
    /// The adapter-contract error string for this failure.
    pub fn as_contract_str(&self) -> String {
        self.to_string()
    }
}
