//! Pending queue and the dispatch loop.
//!
//! Admission pushes tasks into one global FIFO; a single loop scans it in
//! order and hands each task to the first idle candidate worker. A head
//! task whose candidates are all busy does not block later tasks with an
//! idle candidate; throughput wins over strict arrival order. Entries whose
//! client hung up are dropped during the scan.

use std::{collections::VecDeque, sync::Arc, time::Duration};

use parking_lot::Mutex;
use tokio::sync::{oneshot, Notify};
use tracing::{debug, info, warn};

use crate::{
    adapters::GenerateOutput,
    core::{error::GatewayError, task::Task, Worker, WorkerKind},
    pool::Pool,
};

/// Fallback scan period; covers wakeups lost to races.
const DISPATCH_TICK: Duration = Duration::from_millis(200);

pub type TaskResult = Result<GenerateOutput, GatewayError>;

/// A task waiting for a worker, paired with its response channel.
pub struct PendingTask {
    pub task: Task,
    pub responder: oneshot::Sender<TaskResult>,
}

#[derive(Default)]
pub struct PendingQueue {
    inner: Mutex<VecDeque<PendingTask>>,
    notify: Notify,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn push(&self, pending: PendingTask) {
        self.inner.lock().push_back(pending);
        self.notify.notify_one();
    }

    pub fn notify(&self) {
        self.notify.notify_one();
    }

    /// Whether some queued task could run on `worker`.
    pub fn has_task_for(&self, worker: &Worker) -> bool {
        self.inner
            .lock()
            .iter()
            .any(|p| worker.supports(&p.task.model_key))
    }

    async fn wait(&self) {
        tokio::select! {
            _ = self.notify.notified() => {}
            _ = tokio::time::sleep(DISPATCH_TICK) => {}
        }
    }
}

/// Run the dispatch loop until `shutdown` resolves. In-flight executions
/// are spawned tasks and drain on their own.
pub async fn dispatch_loop(
    pool: Arc<Pool>,
    queue: Arc<PendingQueue>,
    shutdown: impl std::future::Future<Output = ()>,
) {
    info!("Dispatch loop started");
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!(pending = queue.len(), "Dispatch loop stopping");
                return;
            }
            _ = queue.wait() => {
                dispatch_ready(&pool, &queue);
            }
        }
    }
}

/// One scan over the queue: dispatch every task that has an idle candidate.
fn dispatch_ready(pool: &Arc<Pool>, queue: &Arc<PendingQueue>) {
    let mut pending = queue.inner.lock();
    let mut index = 0;
    while index < pending.len() {
        let entry = &pending[index];

        // Client hung up while queued: drop without dispatching.
        if entry.responder.is_closed() {
            debug!(model = %entry.task.model_key, "Dropping cancelled queued task");
            if let Some(dropped) = pending.remove(index) {
                cleanup_images(&dropped.task);
            }
            continue;
        }

        match pool.reserve(&entry.task.model_key, entry.task.has_images()) {
            Ok(Some((worker, ordered))) => {
                let Some(mut dispatched) = pending.remove(index) else {
                    continue;
                };
                dispatched.task.assigned_worker = Some(worker.name().to_string());
                spawn_execution(pool.clone(), queue.clone(), dispatched, worker, ordered);
            }
            Ok(None) => {
                // All candidates busy; later tasks may still find a worker.
                index += 1;
            }
            Err(error) => {
                // Registry is immutable, so this should have been caught at
                // admission; answer the client rather than stall the queue.
                warn!(model = %entry.task.model_key, error = %error, "Queued task became unroutable");
                if let Some(dropped) = pending.remove(index) {
                    cleanup_images(&dropped.task);
                    let _ = dropped.responder.send(Err(error));
                }
            }
        }
    }
}

fn spawn_execution(
    pool: Arc<Pool>,
    queue: Arc<PendingQueue>,
    pending: PendingTask,
    worker: Arc<Worker>,
    ordered: Vec<Arc<Worker>>,
) {
    tokio::spawn(async move {
        let PendingTask { task, mut responder } = pending;
        debug!(
            worker = %worker.name(),
            model = %task.model_key,
            queued_for = ?(chrono::Utc::now() - task.admitted_at).to_std().unwrap_or_default(),
            "Dispatching task"
        );

        let result = {
            let execute = pool.execute(&task, worker.clone(), ordered);
            tokio::pin!(execute);
            let mut cancel_armed = true;
            loop {
                tokio::select! {
                    result = &mut execute => break result,
                    _ = responder.closed(), if cancel_armed => {
                        // Best-effort: the adapter observes the flag between
                        // suspension points; the worker frees when it returns.
                        debug!(worker = %worker.name(), "Client disconnected mid-flight");
                        task.cancel.cancel();
                        cancel_armed = false;
                    }
                }
            }
        };

        cleanup_images(&task);
        if responder.send(result).is_err() {
            debug!(worker = %worker.name(), "Result discarded, client already gone");
        }

        // The worker just freed; wake the scan, then park merge workers
        // that have nothing routable waiting.
        queue.notify();
        if matches!(worker.kind(), WorkerKind::Merge { monitor: Some(_), .. })
            && !queue.has_task_for(&worker)
        {
            if let Err(error) = worker.navigate_to_monitor().await {
                warn!(worker = %worker.name(), error = %error, "Monitor parking failed");
            }
        }
    });
}

fn cleanup_images(task: &Task) {
    for path in &task.image_paths {
        if let Err(error) = std::fs::remove_file(path) {
            if error.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %error, "Temp image cleanup failed");
            }
        }
    }
}
