//! Shared server state.

use std::{
    path::PathBuf,
    sync::atomic::{AtomicBool, Ordering},
    sync::Arc,
};

use crate::{
    adapters::AdapterRegistry,
    config::GatewayConfig,
    observability::LogBuffer,
    pool::Pool,
    server::queue::PendingQueue,
};

pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub registry: Arc<AdapterRegistry>,
    pub pool: Arc<Pool>,
    pub queue: Arc<PendingQueue>,
    pub log_buffer: LogBuffer,
    /// Staging area for decoded image uploads (`data/temp/`).
    pub temp_dir: PathBuf,
    draining: AtomicBool,
}

impl AppState {
    pub fn new(
        config: Arc<GatewayConfig>,
        registry: Arc<AdapterRegistry>,
        pool: Arc<Pool>,
        queue: Arc<PendingQueue>,
        log_buffer: LogBuffer,
        temp_dir: PathBuf,
    ) -> Self {
        Self {
            config,
            registry,
            pool,
            queue,
            log_buffer,
            temp_dir,
            draining: AtomicBool::new(false),
        }
    }

    /// Flip into drain mode: admission refuses new work while in-flight
    /// tasks finish.
    pub fn start_draining(&self) {
        self.draining.store(true, Ordering::SeqCst);
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::SeqCst)
    }
}
