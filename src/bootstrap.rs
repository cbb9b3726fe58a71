//! Gateway assembly and lifecycle.
//!
//! Startup order is fixed: preflight → registry → instances in config order
//! → workers sequentially (workers of one instance share its browser) →
//! dispatch loop → listener. The launcher and the adapter set are injected
//! here; they are the seams where the external browser-driver stack plugs
//! into the engine.

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{bail, Context};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::{
    adapters::{Adapter, AdapterRegistry},
    config::GatewayConfig,
    core::{instance::Instance, page::BrowserLauncher, Worker},
    observability::LogBuffer,
    policies,
    pool::Pool,
    server::{self, AppState, PendingQueue},
};

/// Bounded grace period for in-flight tasks at shutdown.
const DRAIN_GRACE: Duration = Duration::from_secs(30);

pub struct GatewayBuilder {
    config: GatewayConfig,
    data_dir: PathBuf,
    launcher: Option<Arc<dyn BrowserLauncher>>,
    adapters: Vec<Arc<dyn Adapter>>,
    login_mode: bool,
    log_buffer: LogBuffer,
}

impl GatewayBuilder {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            data_dir: PathBuf::from("data"),
            launcher: None,
            adapters: Vec::new(),
            login_mode: false,
            log_buffer: LogBuffer::new(),
        }
    }

    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn launcher(mut self, launcher: Arc<dyn BrowserLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    pub fn adapter(mut self, adapter: Arc<dyn Adapter>) -> Self {
        self.adapters.push(adapter);
        self
    }

    /// Login mode: navigation handlers stay uninstalled so a human can
    /// authenticate in the page without the chain interfering.
    pub fn login_mode(mut self, enabled: bool) -> Self {
        self.login_mode = enabled;
        self
    }

    pub fn log_buffer(mut self, buffer: LogBuffer) -> Self {
        self.log_buffer = buffer;
        self
    }

    /// Assemble the gateway. Cross-checks the configuration against the
    /// compiled-in adapter set; mismatches are startup errors.
    pub fn build(self) -> anyhow::Result<Gateway> {
        let Some(launcher) = self.launcher else {
            bail!("no browser launcher available");
        };
        if self.adapters.is_empty() {
            bail!("no adapters compiled into this build");
        }

        let mut registry = AdapterRegistry::new();
        for adapter in self.adapters {
            registry.register(adapter);
        }
        let registry = Arc::new(registry);

        let config = Arc::new(self.config);
        let adapter_settings = Arc::new(config.backend.adapter.clone());

        let mut instances = Vec::new();
        let mut workers: Vec<Arc<Worker>> = Vec::new();
        let mut memberships: Vec<(usize, Arc<Worker>)> = Vec::new();

        for instance_config in &config.backend.pool.instances {
            let instance = Arc::new(Instance::from_config(
                instance_config,
                &self.data_dir,
                config.browser.proxy.as_ref(),
                launcher.clone(),
            ));
            let instance_index = instances.len();
            instances.push(instance);

            for worker_config in &instance_config.workers {
                for adapter_type in worker_config
                    .adapter_type
                    .iter()
                    .chain(worker_config.merge_types.iter().flatten())
                {
                    if !registry.has_adapter(adapter_type) {
                        bail!(
                            "worker '{}' references unknown adapter type '{}'",
                            worker_config.name,
                            adapter_type
                        );
                    }
                }
                let worker = Arc::new(Worker::new(
                    worker_config.clone(),
                    registry.clone(),
                    adapter_settings.clone(),
                    config.backend.pool.failover.clone(),
                ));
                workers.push(worker.clone());
                memberships.push((instance_index, worker));
            }
        }
        if workers.is_empty() {
            bail!("configuration declares no workers");
        }

        let policy = policies::from_strategy(config.backend.pool.strategy);
        let pool = Arc::new(Pool::new(
            workers,
            policy,
            config.backend.pool.failover.clone(),
        ));
        let queue = Arc::new(PendingQueue::new());
        let temp_dir = self.data_dir.join("temp");

        let state = Arc::new(AppState::new(
            config,
            registry,
            pool,
            queue,
            self.log_buffer,
            temp_dir,
        ));

        Ok(Gateway {
            state,
            instances,
            memberships,
            login_mode: self.login_mode,
            data_dir: self.data_dir,
        })
    }
}

pub struct Gateway {
    state: Arc<AppState>,
    instances: Vec<Arc<Instance>>,
    memberships: Vec<(usize, Arc<Worker>)>,
    login_mode: bool,
    data_dir: PathBuf,
}

impl Gateway {
    pub fn builder(config: GatewayConfig) -> GatewayBuilder {
        GatewayBuilder::new(config)
    }

    pub fn state(&self) -> Arc<AppState> {
        self.state.clone()
    }

    /// Initialize every worker sequentially in configuration order; the
    /// first worker of an instance launches its browser, the rest add tabs.
    pub async fn init_workers(&self) -> anyhow::Result<()> {
        std::fs::create_dir_all(self.data_dir.join("temp"))
            .context("creating data/temp directory")?;
        for (instance_index, worker) in &self.memberships {
            let instance = self.instances[*instance_index].clone();
            worker
                .init(instance, self.login_mode)
                .await
                .with_context(|| format!("initializing worker '{}'", worker.name()))?;
        }
        Ok(())
    }

    /// Full lifecycle: init, dispatch loop, HTTP listener, drain, teardown.
    pub async fn run(
        self,
        shutdown: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        self.init_workers().await?;

        let (stop_tx, stop_rx) = watch::channel(false);
        {
            let state = self.state.clone();
            tokio::spawn(async move {
                shutdown.await;
                info!("Shutdown signal received, draining");
                state.start_draining();
                let _ = stop_tx.send(true);
            });
        }

        let dispatch = {
            let pool = self.state.pool.clone();
            let queue = self.state.queue.clone();
            let mut rx = stop_rx.clone();
            tokio::spawn(server::dispatch_loop(pool, queue, async move {
                let _ = rx.wait_for(|stopped| *stopped).await;
            }))
        };

        let serve_shutdown = {
            let mut rx = stop_rx.clone();
            async move {
                let _ = rx.wait_for(|stopped| *stopped).await;
            }
        };
        server::serve(self.state.clone(), serve_shutdown).await?;

        self.drain().await;
        let _ = dispatch.await;
        for instance in &self.instances {
            instance.shutdown().await;
        }
        info!("Gateway stopped");
        Ok(())
    }

    /// Wait for in-flight tasks within the grace period.
    async fn drain(&self) {
        let deadline = tokio::time::Instant::now() + DRAIN_GRACE;
        loop {
            let busy = self.state.pool.total_busy();
            if busy == 0 {
                return;
            }
            if tokio::time::Instant::now() >= deadline {
                warn!(busy, "Drain grace period expired with tasks in flight");
                return;
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }
}
