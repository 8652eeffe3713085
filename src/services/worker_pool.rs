use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::sleep;
use tracing::Instrument;

use crate::error::AppError;
use crate::services::queue::{FailureOutcome, Task, TaskId, TaskQueue};

/// `failed_reason` recorded when a handler panics instead of returning.
pub const HANDLER_PANICKED: &str = "Task handler panicked";

/// Work performed for one reserved task.
///
/// Returning `Err` hands the task back to the queue, which retries it with
/// backoff until its attempts are exhausted.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: &Task, progress: &ProgressReporter) -> Result<(), AppError>;
}

/// Reports percent-complete for the task currently being handled.
#[derive(Clone)]
pub struct ProgressReporter {
    queue: Arc<dyn TaskQueue>,
    task_id: TaskId,
}

impl ProgressReporter {
    pub fn new(queue: Arc<dyn TaskQueue>, task_id: TaskId) -> Self {
        Self { queue, task_id }
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Progress is advisory, so a failed write is logged and dropped.
    pub async fn report(&self, percent: u8) {
        if let Err(e) = self.queue.update_progress(self.task_id, percent).await {
            tracing::warn!(task_id = %self.task_id, percent, error = %e, "Failed to report progress");
        }
    }
}

/// Pulls tasks off a [`TaskQueue`] and runs up to `concurrency` of them at once.
pub struct WorkerPool {
    queue: Arc<dyn TaskQueue>,
    handler: Arc<dyn TaskHandler>,
    concurrency: usize,
    poll_interval: Duration,
}

impl WorkerPool {
    pub fn new(
        queue: Arc<dyn TaskQueue>,
        handler: Arc<dyn TaskHandler>,
        concurrency: usize,
        poll_interval: Duration,
    ) -> Self {
        Self {
            queue,
            handler,
            concurrency: concurrency.max(1),
            poll_interval,
        }
    }

    /// Run until `shutdown` resolves, then wait for in-flight tasks to settle.
    pub async fn run(self, shutdown: impl Future<Output = ()>) {
        let permits = Arc::new(Semaphore::new(self.concurrency));
        tokio::pin!(shutdown);

        tracing::info!(concurrency = self.concurrency, "Worker pool started");

        loop {
            let permit = tokio::select! {
                _ = &mut shutdown => break,
                permit = permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            // reserve() is never cancelled: a dropped reply would leave the
            // task active until its lease runs out.
            match self.queue.reserve().await {
                Ok(Some(task)) => {
                    self.spawn_task(task, permit);
                    self.record_depth().await;
                }
                Ok(None) => {
                    drop(permit);
                    tracing::trace!("No tasks available, sleeping");
                    self.record_depth().await;
                    tokio::select! {
                        _ = &mut shutdown => break,
                        _ = sleep(self.poll_interval) => {}
                    }
                }
                Err(e) => {
                    drop(permit);
                    tracing::error!(error = %e, "Failed to reserve task, will retry");
                    tokio::select! {
                        _ = &mut shutdown => break,
                        _ = sleep(self.poll_interval) => {}
                    }
                }
            }
        }

        tracing::info!("Worker pool draining in-flight tasks");
        let _ = permits.acquire_many(self.concurrency as u32).await;
        tracing::info!("Worker pool stopped");
    }

    fn spawn_task(&self, task: Task, permit: OwnedSemaphorePermit) {
        let queue = Arc::clone(&self.queue);
        let handler = Arc::clone(&self.handler);
        let span = tracing::info_span!(
            "task",
            task_id = %task.id,
            kind = %task.payload.kind(),
            attempt = task.attempts_made,
        );

        tokio::spawn(
            async move {
                run_task(queue, handler, task).await;
                drop(permit);
            }
            .instrument(span),
        );
    }

    async fn record_depth(&self) {
        match self.queue.depth().await {
            Ok(depth) => metrics::gauge!("import_queue_depth").set(depth as f64),
            Err(e) => tracing::debug!(error = %e, "Failed to read queue depth"),
        }
    }
}

async fn run_task(queue: Arc<dyn TaskQueue>, handler: Arc<dyn TaskHandler>, task: Task) {
    let id = task.id;
    let reporter = ProgressReporter::new(Arc::clone(&queue), id);

    // The handler runs in its own task so a panic surfaces as a JoinError
    // here and the reservation is still settled.
    let handled = tokio::spawn(
        async move { handler.handle(&task, &reporter).await }.in_current_span(),
    )
    .await;

    match handled {
        Ok(Ok(())) => {
            if let Err(e) = queue.complete(id).await {
                tracing::error!(error = %e, "Failed to mark task complete");
            }
        }
        Ok(Err(err)) => settle_failure(queue.as_ref(), id, &err.to_string()).await,
        Err(join_err) => {
            let reason = if join_err.is_panic() {
                HANDLER_PANICKED
            } else {
                "Task handler cancelled"
            };
            tracing::error!(error = %join_err, "Task handler did not return");
            settle_failure(queue.as_ref(), id, reason).await;
        }
    }
}

async fn settle_failure(queue: &dyn TaskQueue, id: TaskId, reason: &str) {
    match queue.fail(id, reason).await {
        Ok(FailureOutcome::Retrying { attempt, delay }) => {
            tracing::warn!(
                error = reason,
                next_attempt = attempt,
                delay_ms = delay.as_millis() as u64,
                "Task failed, retry scheduled"
            );
        }
        Ok(FailureOutcome::Exhausted) => {
            tracing::error!(error = reason, "Task failed after final attempt");
        }
        Err(e) => {
            tracing::error!(error = reason, queue_error = %e, "Failed to record task failure");
        }
    }
}
