//! Worker pool and scheduler.
//!
//! The pool owns every worker, answers candidate queries for a model key,
//! and executes dispatched tasks with cross-worker failover. Its maximum
//! concurrency is exactly the worker count; refusing or queueing beyond
//! that is admission's job.

pub mod failover;

use std::sync::Arc;

use tracing::{debug, warn};

use crate::{
    adapters::{GenerateOutput, ImagePolicy, ModelKey},
    config::FailoverConfig,
    core::{error::GatewayError, task::Task, Worker},
    policies::Policy,
};
use failover::run_failover;

pub struct Pool {
    workers: Vec<Arc<Worker>>,
    policy: Arc<dyn Policy>,
    failover: FailoverConfig,
}

/// One entry of a pool-level failover list. The head carries the dispatch
/// loop's reservation; later entries reserve opportunistically.
#[derive(Clone)]
struct PoolCandidate {
    worker: Arc<Worker>,
    pre_reserved: bool,
}

impl Pool {
    pub fn new(workers: Vec<Arc<Worker>>, policy: Arc<dyn Policy>, failover: FailoverConfig) -> Self {
        Self {
            workers,
            policy,
            failover,
        }
    }

    pub fn workers(&self) -> &[Arc<Worker>] {
        &self.workers
    }

    /// Maximum in-flight tasks: one per worker.
    pub fn max_concurrent(&self) -> usize {
        self.workers.len()
    }

    /// Sum of busy counters across all workers.
    pub fn total_busy(&self) -> usize {
        self.workers.iter().map(|w| w.busy()).sum()
    }

    pub fn any_initialized(&self) -> bool {
        self.workers.iter().any(|w| w.is_initialized())
    }

    pub fn first_initialized(&self) -> Option<Arc<Worker>> {
        self.workers.iter().find(|w| w.is_initialized()).cloned()
    }

    /// Ordered candidate list for a model key.
    ///
    /// Filters to supporting workers, applies image-aware dispatch (when the
    /// request carries images and some candidate accepts them, candidates
    /// that forbid them are dropped), then orders by the configured policy.
    pub fn candidates(
        &self,
        key: &ModelKey,
        has_images: bool,
    ) -> Result<Vec<Arc<Worker>>, GatewayError> {
        let mut supporting: Vec<Arc<Worker>> = self
            .workers
            .iter()
            .filter(|w| w.supports(key))
            .cloned()
            .collect();

        if has_images {
            let any_accepts = supporting.iter().any(|w| {
                matches!(
                    w.image_policy(key),
                    Some(ImagePolicy::Optional) | Some(ImagePolicy::Required)
                )
            });
            if any_accepts {
                supporting.retain(|w| {
                    !matches!(w.image_policy(key), Some(ImagePolicy::Forbidden) | None)
                });
            }
        }

        if supporting.is_empty() {
            return Err(GatewayError::invalid_model(&key.to_string()));
        }
        Ok(self.policy.order(supporting))
    }

    /// Reserve a worker for dispatch: the first idle candidate in policy
    /// order. Returns the reservation plus the full ordered list (failover
    /// walks the rest), or `None` when every candidate is busy.
    #[allow(clippy::type_complexity)]
    pub fn reserve(
        &self,
        key: &ModelKey,
        has_images: bool,
    ) -> Result<Option<(Arc<Worker>, Vec<Arc<Worker>>)>, GatewayError> {
        let ordered = self.candidates(key, has_images)?;
        for worker in &ordered {
            if worker.try_reserve() {
                return Ok(Some((worker.clone(), ordered.clone())));
            }
        }
        Ok(None)
    }

    /// Execute a dispatched task. `reserved` holds the dispatch loop's
    /// reservation; `ordered` is the candidate list it was drawn from.
    /// Exactly one result or error comes back, and every reservation taken
    /// here is released before returning.
    pub async fn execute(
        &self,
        task: &Task,
        reserved: Arc<Worker>,
        ordered: Vec<Arc<Worker>>,
    ) -> Result<GenerateOutput, GatewayError> {
        let mut candidates = self.failover_list(reserved, ordered);

        // A lone candidate's failure surfaces with its own code; wrapping
        // as FAILOVER_EXHAUSTED is reserved for walking a real list.
        if candidates.len() == 1 {
            return self.attempt(candidates.remove(0), task).await;
        }

        run_failover(
            &candidates,
            self.failover.max_retries,
            |candidate| self.attempt(candidate, task),
            |candidate, error, attempt| {
                warn!(
                    worker = %candidate.worker.name(),
                    attempt,
                    error = %error,
                    "Worker attempt failed, failing over"
                );
            },
        )
        .await
    }

    fn failover_list(
        &self,
        reserved: Arc<Worker>,
        ordered: Vec<Arc<Worker>>,
    ) -> Vec<PoolCandidate> {
        let mut list = vec![PoolCandidate {
            worker: reserved.clone(),
            pre_reserved: true,
        }];
        if self.failover.enabled {
            for worker in ordered {
                if worker.name() != reserved.name() {
                    list.push(PoolCandidate {
                        worker,
                        pre_reserved: false,
                    });
                }
            }
        }
        list
    }

    async fn attempt(
        &self,
        candidate: PoolCandidate,
        task: &Task,
    ) -> Result<GenerateOutput, GatewayError> {
        if !candidate.pre_reserved && !candidate.worker.try_reserve() {
            // Busy candidates are skipped for free; the skip never reaches a
            // client unless it is the only thing left to report.
            return Err(GatewayError::internal(format!(
                "worker '{}' is busy, skipped",
                candidate.worker.name()
            )));
        }
        debug!(
            worker = %candidate.worker.name(),
            model = %task.model_key,
            streaming = task.streaming,
            "Attempting task on worker"
        );
        let result = candidate.worker.generate(task).await;
        candidate.worker.release();
        result
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("workers", &self.workers.len())
            .field("policy", &self.policy.name())
            .field("failover", &self.failover.enabled)
            .finish()
    }
}
