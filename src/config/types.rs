//! Configuration schema types.
//!
//! Field names follow the YAML file's camelCase where the file has history
//! (queueBuffer, mergeTypes, userDataMark); serde aliases accept snake_case
//! for new deployments.

use std::{collections::HashMap, path::PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Free-form per-adapter settings (`backend.adapter.<type>.*`).
pub type AdapterSettings = HashMap<String, Value>;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub backend: BackendConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    /// Shared bearer token; at least 10 characters.
    #[serde(default)]
    pub auth: String,
    #[serde(default)]
    pub keepalive: KeepaliveConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            auth: String::new(),
            keepalive: KeepaliveConfig::default(),
        }
    }
}

fn default_port() -> u16 {
    3000
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct KeepaliveConfig {
    #[serde(default)]
    pub mode: KeepaliveMode,
}

/// How streaming heartbeats are framed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KeepaliveMode {
    /// `:keepalive` SSE comment line, invisible to conforming clients.
    #[default]
    Comment,
    /// Empty-delta content chunk, survives comment-stripping clients.
    Content,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BrowserConfig {
    #[serde(default)]
    pub proxy: Option<ProxyConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProxyConfig {
    #[serde(default = "default_true")]
    pub enable: bool,
    #[serde(rename = "type")]
    pub proxy_type: ProxyType,
    pub host: String,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passwd: Option<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyType {
    Http,
    Socks5,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    #[serde(default = "default_queue_buffer", alias = "queueBuffer")]
    pub queue_buffer: usize,
    #[serde(default = "default_image_limit", alias = "imageLimit")]
    pub image_limit: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            queue_buffer: default_queue_buffer(),
            image_limit: default_image_limit(),
        }
    }
}

fn default_queue_buffer() -> usize {
    2
}

fn default_image_limit() -> usize {
    5
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub pool: PoolConfig,
    /// `backend.adapter.<adapterType>` blocks, handed to adapters verbatim.
    #[serde(default)]
    pub adapter: HashMap<String, AdapterSettings>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PoolConfig {
    #[serde(default)]
    pub strategy: Strategy,
    #[serde(default)]
    pub failover: FailoverConfig,
    #[serde(default)]
    pub instances: Vec<InstanceConfig>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    #[default]
    LeastBusy,
    RoundRobin,
    Random,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FailoverConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_max_retries", alias = "maxRetries")]
    pub max_retries: usize,
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: default_max_retries(),
        }
    }
}

fn default_max_retries() -> usize {
    2
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InstanceConfig {
    pub name: String,
    /// Optional suffix distinguishing this instance's user-data directory.
    #[serde(default, alias = "userDataMark", skip_serializing_if = "Option::is_none")]
    pub user_data_mark: Option<String>,
    /// Instance-level proxy. Present+enabled overrides the global proxy;
    /// present+disabled forces a direct connection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<ProxyConfig>,
    pub workers: Vec<WorkerConfig>,
}

impl InstanceConfig {
    /// Directory name under `data/` owned by this instance's browser.
    pub fn user_data_dir_name(&self) -> String {
        match &self.user_data_mark {
            Some(mark) => format!("{}UserData_{}", self.name, mark),
            None => format!("{}UserData", self.name),
        }
    }

    /// Full user-data path under the data directory.
    pub fn user_data_dir(&self, data_dir: &std::path::Path) -> PathBuf {
        data_dir.join(self.user_data_dir_name())
    }

    /// Apply the instance-over-global proxy precedence.
    pub fn resolved_proxy(&self, global: Option<&ProxyConfig>) -> Option<ProxyConfig> {
        match &self.proxy {
            Some(p) if p.enable => Some(p.clone()),
            Some(_) => None, // explicitly disabled: direct even with a global proxy
            None => global.filter(|p| p.enable).cloned(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkerConfig {
    pub name: String,
    /// Single-worker adapter type. Mutually exclusive with `merge_types`.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub adapter_type: Option<String>,
    /// Merge-worker member types, in routing order.
    #[serde(default, alias = "mergeTypes", skip_serializing_if = "Option::is_none")]
    pub merge_types: Option<Vec<String>>,
    /// Adapter the merge worker parks on while idle.
    #[serde(default, alias = "mergeMonitor", skip_serializing_if = "Option::is_none")]
    pub merge_monitor: Option<String>,
}
