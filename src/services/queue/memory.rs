use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use super::{
    Backoff, EnqueueOptions, FailureOutcome, QueueError, Task, TaskHandle, TaskId, TaskPayload,
    TaskQueue, TaskState, TaskStatus, DEFAULT_LEASE, LEASE_EXPIRED,
};

/// In-process task queue with the same semantics as [`super::RedisTaskQueue`].
///
/// State lives only as long as the process, so this backend is for
/// single-binary deployments and tests. Time is read from the tokio clock, so
/// paused-time tests can step through backoff delays and lease expiry.
pub struct MemoryTaskQueue {
    inner: Mutex<Inner>,
    lease: Duration,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    tasks: HashMap<TaskId, Entry>,
    waiting: VecDeque<TaskId>,
    delayed: Vec<(Instant, TaskId)>,
}

struct Entry {
    payload: TaskPayload,
    state: TaskState,
    progress: u8,
    attempts_made: u32,
    max_attempts: u32,
    backoff: Backoff,
    failed_reason: Option<String>,
    lease_until: Option<Instant>,
}

impl Inner {
    fn promote_due(&mut self, now: Instant) {
        let mut due = Vec::new();
        self.delayed.retain(|(ready_at, id)| {
            if *ready_at <= now {
                due.push((*ready_at, *id));
                false
            } else {
                true
            }
        });
        due.sort();
        self.waiting.extend(due.into_iter().map(|(_, id)| id));
    }

    /// Requeue active tasks whose lease has lapsed, or fail them when no
    /// attempts remain.
    fn reclaim_expired(&mut self, now: Instant) {
        let mut expired: Vec<(Instant, TaskId)> = self
            .tasks
            .iter()
            .filter_map(|(id, entry)| match entry.lease_until {
                Some(until) if entry.state == TaskState::Active && until <= now => {
                    Some((until, *id))
                }
                _ => None,
            })
            .collect();
        expired.sort();

        for (_, id) in expired {
            let Some(entry) = self.tasks.get_mut(&id) else {
                continue;
            };
            entry.lease_until = None;
            entry.failed_reason = Some(LEASE_EXPIRED.to_string());

            if entry.attempts_made < entry.max_attempts {
                tracing::warn!(task_id = %id, attempts = entry.attempts_made, "Reclaiming task with expired lease");
                entry.state = TaskState::Waiting;
                self.waiting.push_back(id);
            } else {
                tracing::error!(task_id = %id, attempts = entry.attempts_made, "Task lease expired on final attempt");
                entry.state = TaskState::Failed;
            }
        }
    }
}

impl Default for MemoryTaskQueue {
    fn default() -> Self {
        Self {
            inner: Mutex::default(),
            lease: DEFAULT_LEASE,
        }
    }
}

impl MemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override how long a reservation lasts without a progress report.
    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // Mutations never leave the maps half-updated.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl TaskQueue for MemoryTaskQueue {
    async fn enqueue(
        &self,
        payload: TaskPayload,
        options: EnqueueOptions,
    ) -> Result<TaskHandle, QueueError> {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = TaskId(inner.next_id);
        let kind = payload.kind();

        inner.tasks.insert(
            id,
            Entry {
                payload,
                state: TaskState::Waiting,
                progress: 0,
                attempts_made: 0,
                max_attempts: options.attempts,
                backoff: options.backoff,
                failed_reason: None,
                lease_until: None,
            },
        );
        inner.waiting.push_back(id);

        Ok(TaskHandle { id, kind })
    }

    async fn reserve(&self) -> Result<Option<Task>, QueueError> {
        let now = Instant::now();
        let mut inner = self.lock();
        inner.promote_due(now);
        inner.reclaim_expired(now);

        let Some(id) = inner.waiting.pop_front() else {
            return Ok(None);
        };
        let entry = inner
            .tasks
            .get_mut(&id)
            .ok_or(QueueError::UnknownTask(id))?;
        entry.state = TaskState::Active;
        entry.progress = 0;
        entry.attempts_made += 1;
        entry.lease_until = Some(now + self.lease);

        Ok(Some(Task {
            id,
            payload: entry.payload.clone(),
            attempts_made: entry.attempts_made,
            max_attempts: entry.max_attempts,
        }))
    }

    async fn update_progress(&self, id: TaskId, progress: u8) -> Result<(), QueueError> {
        let mut inner = self.lock();
        let entry = inner
            .tasks
            .get_mut(&id)
            .ok_or(QueueError::UnknownTask(id))?;
        if entry.state == TaskState::Active {
            entry.progress = entry.progress.max(progress.min(100));
            entry.lease_until = Some(Instant::now() + self.lease);
        }
        Ok(())
    }

    async fn complete(&self, id: TaskId) -> Result<(), QueueError> {
        let mut inner = self.lock();
        let entry = inner
            .tasks
            .get_mut(&id)
            .ok_or(QueueError::UnknownTask(id))?;
        entry.state = TaskState::Completed;
        entry.lease_until = None;
        Ok(())
    }

    async fn fail(&self, id: TaskId, reason: &str) -> Result<FailureOutcome, QueueError> {
        let mut inner = self.lock();
        let entry = inner
            .tasks
            .get_mut(&id)
            .ok_or(QueueError::UnknownTask(id))?;
        entry.failed_reason = Some(reason.to_string());
        entry.lease_until = None;

        if entry.attempts_made < entry.max_attempts {
            entry.state = TaskState::Waiting;
            let attempt = entry.attempts_made + 1;
            let delay = entry.backoff.delay_for(entry.attempts_made);
            inner.delayed.push((Instant::now() + delay, id));
            Ok(FailureOutcome::Retrying { attempt, delay })
        } else {
            entry.state = TaskState::Failed;
            Ok(FailureOutcome::Exhausted)
        }
    }

    async fn status(&self, id: TaskId) -> Result<Option<TaskStatus>, QueueError> {
        let inner = self.lock();
        Ok(inner.tasks.get(&id).map(|entry| TaskStatus {
            id,
            state: entry.state,
            progress: entry.progress,
            payload: entry.payload.clone(),
            failed_reason: entry.failed_reason.clone(),
            attempts_made: entry.attempts_made,
            max_attempts: entry.max_attempts,
        }))
    }

    async fn depth(&self) -> Result<u64, QueueError> {
        let inner = self.lock();
        Ok((inner.waiting.len() + inner.delayed.len()) as u64)
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        Ok(())
    }
}
