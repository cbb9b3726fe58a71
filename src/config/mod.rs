//! Gateway configuration.
//!
//! Loaded from `data/config.yaml`; a root-level `config.yaml` left by older
//! deployments is migrated into place on startup. Structural problems
//! (duplicate worker names, short auth token, merge worker without members)
//! are startup errors, never runtime surprises.

mod types;

use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::info;
pub use types::{
    AdapterSettings, BackendConfig, BrowserConfig, FailoverConfig, GatewayConfig, InstanceConfig,
    KeepaliveConfig, KeepaliveMode, PoolConfig, ProxyConfig, ProxyType, QueueConfig, ServerConfig,
    Strategy, WorkerConfig,
};

/// Minimum accepted length for the shared bearer token.
const MIN_AUTH_LEN: usize = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Load the configuration, migrating a root-level `config.yaml` into
/// `data/config.yaml` if the target does not exist yet.
pub fn load(data_dir: &Path) -> Result<GatewayConfig, ConfigError> {
    let target = data_dir.join("config.yaml");
    let legacy = Path::new("config.yaml");

    if !target.exists() && legacy.exists() {
        fs::create_dir_all(data_dir).map_err(|source| ConfigError::Io {
            path: data_dir.to_path_buf(),
            source,
        })?;
        fs::copy(legacy, &target).map_err(|source| ConfigError::Io {
            path: target.clone(),
            source,
        })?;
        info!(from = %legacy.display(), to = %target.display(), "Migrated legacy config file");
    }

    let raw = fs::read_to_string(&target).map_err(|source| ConfigError::Io {
        path: target.clone(),
        source,
    })?;
    let config: GatewayConfig = serde_yaml::from_str(&raw)?;
    validate(&config)?;
    Ok(config)
}

/// Parse and validate a config from a YAML string (used by tests and
/// `check-config`).
pub fn from_str(raw: &str) -> Result<GatewayConfig, ConfigError> {
    let config: GatewayConfig = serde_yaml::from_str(raw)?;
    validate(&config)?;
    Ok(config)
}

/// Structural validation beyond what serde enforces.
pub fn validate(config: &GatewayConfig) -> Result<(), ConfigError> {
    if config.server.auth.len() < MIN_AUTH_LEN {
        return Err(ConfigError::Invalid(format!(
            "server.auth must be at least {MIN_AUTH_LEN} characters"
        )));
    }

    let mut instance_names = HashSet::new();
    let mut data_dirs = HashSet::new();
    let mut worker_names = HashSet::new();

    for instance in &config.backend.pool.instances {
        if !instance_names.insert(instance.name.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "duplicate instance name '{}'",
                instance.name
            )));
        }
        let dir = instance.user_data_dir_name();
        if !data_dirs.insert(dir.clone()) {
            return Err(ConfigError::Invalid(format!(
                "user-data directory '{dir}' is claimed by more than one instance"
            )));
        }
        if instance.workers.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "instance '{}' declares no workers",
                instance.name
            )));
        }
        for worker in &instance.workers {
            if !worker_names.insert(worker.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate worker name '{}'",
                    worker.name
                )));
            }
            validate_worker(worker)?;
        }
    }
    Ok(())
}

fn validate_worker(worker: &WorkerConfig) -> Result<(), ConfigError> {
    match (&worker.adapter_type, &worker.merge_types) {
        (None, None) => Err(ConfigError::Invalid(format!(
            "worker '{}' needs either 'type' or 'merge_types'",
            worker.name
        ))),
        (Some(_), Some(_)) => Err(ConfigError::Invalid(format!(
            "worker '{}' sets both 'type' and 'merge_types'",
            worker.name
        ))),
        (None, Some(types)) => {
            if types.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "worker '{}' has an empty merge_types list",
                    worker.name
                )));
            }
            if let Some(monitor) = &worker.merge_monitor {
                if !types.contains(monitor) {
                    return Err(ConfigError::Invalid(format!(
                        "worker '{}': merge_monitor '{monitor}' is not a member type",
                        worker.name
                    )));
                }
            }
            Ok(())
        }
        (Some(_), None) => {
            if worker.merge_monitor.is_some() {
                return Err(ConfigError::Invalid(format!(
                    "worker '{}': merge_monitor requires merge_types",
                    worker.name
                )));
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = r#"
server:
  port: 3000
  auth: "0123456789ab"
backend:
  pool:
    instances:
      - name: main
        workers:
          - name: w1
            type: alpha
"#;

    #[test]
    fn parses_minimal_config() {
        let config = from_str(BASE).unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.queue.queue_buffer, 2);
        assert_eq!(config.queue.image_limit, 5);
        assert_eq!(config.backend.pool.strategy, Strategy::LeastBusy);
        assert!(config.backend.pool.failover.enabled);
        assert_eq!(config.backend.pool.failover.max_retries, 2);
        assert_eq!(config.server.keepalive.mode, KeepaliveMode::Comment);
    }

    #[test]
    fn rejects_short_auth() {
        let raw = BASE.replace("0123456789ab", "short");
        let err = from_str(&raw).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_duplicate_worker_names() {
        let raw = r#"
server:
  auth: "0123456789ab"
backend:
  pool:
    instances:
      - name: a
        workers:
          - { name: w1, type: alpha }
      - name: b
        workers:
          - { name: w1, type: beta }
"#;
        let err = from_str(raw).unwrap_err();
        assert!(err.to_string().contains("duplicate worker name"));
    }

    #[test]
    fn rejects_duplicate_instance_names() {
        let raw = r#"
server:
  auth: "0123456789ab"
backend:
  pool:
    instances:
      - name: same
        workers:
          - { name: w1, type: alpha }
      - name: same
        workers:
          - { name: w2, type: beta }
"#;
        let err = from_str(raw).unwrap_err();
        assert!(err.to_string().contains("duplicate instance name"));
    }

    #[test]
    fn rejects_worker_without_type() {
        let raw = r#"
server:
  auth: "0123456789ab"
backend:
  pool:
    instances:
      - name: a
        workers:
          - { name: w1 }
"#;
        let err = from_str(raw).unwrap_err();
        assert!(err.to_string().contains("needs either"));
    }

    #[test]
    fn rejects_monitor_outside_members() {
        let raw = r#"
server:
  auth: "0123456789ab"
backend:
  pool:
    instances:
      - name: a
        workers:
          - name: w1
            mergeTypes: [alpha, beta]
            mergeMonitor: gamma
"#;
        let err = from_str(raw).unwrap_err();
        assert!(err.to_string().contains("not a member type"));
    }

    #[test]
    fn parses_merge_worker_and_proxy() {
        let raw = r#"
server:
  auth: "0123456789ab"
  keepalive:
    mode: content
browser:
  proxy:
    enable: true
    type: socks5
    host: 127.0.0.1
    port: 1080
backend:
  pool:
    strategy: round_robin
    failover:
      enabled: false
      maxRetries: 0
    instances:
      - name: a
        proxy:
          enable: false
          type: http
          host: unused
          port: 1
        workers:
          - name: w1
            mergeTypes: [alpha, beta]
            mergeMonitor: alpha
"#;
        let config = from_str(raw).unwrap();
        assert_eq!(config.server.keepalive.mode, KeepaliveMode::Content);
        assert_eq!(config.backend.pool.strategy, Strategy::RoundRobin);
        assert!(!config.backend.pool.failover.enabled);
        let instance = &config.backend.pool.instances[0];
        // Instance proxy present but disabled: direct connection.
        assert!(instance.resolved_proxy(config.browser.proxy.as_ref()).is_none());
        let worker = &instance.workers[0];
        assert_eq!(
            worker.merge_types.as_deref(),
            Some(&["alpha".to_string(), "beta".to_string()][..])
        );
    }

    #[test]
    fn global_proxy_applies_when_instance_silent() {
        let raw = r#"
server:
  auth: "0123456789ab"
browser:
  proxy:
    enable: true
    type: http
    host: proxy.local
    port: 8080
backend:
  pool:
    instances:
      - name: a
        workers:
          - { name: w1, type: alpha }
"#;
        let config = from_str(raw).unwrap();
        let instance = &config.backend.pool.instances[0];
        let proxy = instance.resolved_proxy(config.browser.proxy.as_ref()).unwrap();
        assert_eq!(proxy.host, "proxy.local");
    }
}
