//! Durable, at-least-once task queue.
//!
//! Tasks are appended with [`TaskQueue::enqueue`], handed to exactly one
//! worker at a time through [`TaskQueue::reserve`], and settled with
//! [`TaskQueue::complete`] or [`TaskQueue::fail`]. Failed tasks are retried
//! with exponential backoff until their attempt budget is spent. Settled tasks
//! are retained so their status can still be read afterwards.
//!
//! A reservation is a lease. A task whose lease runs out before it is settled
//! (the worker died or hung) is handed out again on a later `reserve`.

mod memory;
mod redis_queue;

pub use memory::MemoryTaskQueue;
pub use redis_queue::RedisTaskQueue;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use strum::{Display, EnumString};
use uuid::Uuid;

/// How long a reservation stays valid without a progress report.
pub const DEFAULT_LEASE: Duration = Duration::from_secs(300);

/// `failed_reason` recorded when a reservation lapses without being settled.
pub const LEASE_EXPIRED: &str = "Task lease expired before it was settled";

/// Queue-assigned task identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaskId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(TaskId)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskKind {
    Import,
    Delete,
}

/// Import a Drive folder into the job identified by `job_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportPayload {
    pub job_id: Uuid,
    pub folder_id: String,
    pub max_images: i32,
}

/// Remove a stored object whose asset row is already gone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletePayload {
    pub asset_id: i64,
    pub storage_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskPayload {
    Import(ImportPayload),
    Delete(DeletePayload),
}

impl TaskPayload {
    pub fn kind(&self) -> TaskKind {
        match self {
            TaskPayload::Import(_) => TaskKind::Import,
            TaskPayload::Delete(_) => TaskKind::Delete,
        }
    }
}

/// Lifecycle of a task as seen by status readers.
///
/// A task waiting out a retry backoff reports `Waiting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TaskState {
    Waiting,
    Active,
    Completed,
    Failed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed)
    }
}

/// Exponential retry delay: `base * 2^(attempt - 1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
}

impl Backoff {
    const MAX_EXPONENT: u32 = 16;

    pub fn exponential(base: Duration) -> Self {
        Self { base }
    }

    /// Delay before the next attempt after `attempts_made` failed attempts.
    pub fn delay_for(&self, attempts_made: u32) -> Duration {
        let exponent = attempts_made.saturating_sub(1).min(Self::MAX_EXPONENT);
        self.base.saturating_mul(1u32 << exponent)
    }
}

/// Per-task queue policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnqueueOptions {
    pub attempts: u32,
    pub backoff: Backoff,
}

impl Default for EnqueueOptions {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Backoff::exponential(Duration::from_secs(5)),
        }
    }
}

/// Returned by `enqueue`; the task has been durably recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskHandle {
    pub id: TaskId,
    pub kind: TaskKind,
}

/// A reserved task handed to a worker.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: TaskId,
    pub payload: TaskPayload,
    /// Attempts made so far, including the current one.
    pub attempts_made: u32,
    pub max_attempts: u32,
}

impl Task {
    /// True when a failure of this attempt will not be retried.
    pub fn is_final_attempt(&self) -> bool {
        self.attempts_made >= self.max_attempts
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatus {
    pub id: TaskId,
    pub state: TaskState,
    pub progress: u8,
    pub payload: TaskPayload,
    pub failed_reason: Option<String>,
    pub attempts_made: u32,
    pub max_attempts: u32,
}

/// What the queue decided after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    Retrying { attempt: u32, delay: Duration },
    Exhausted,
}

#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Durably append a task and return without waiting for processing.
    async fn enqueue(
        &self,
        payload: TaskPayload,
        options: EnqueueOptions,
    ) -> Result<TaskHandle, QueueError>;

    /// Claim the oldest ready task, if any, and mark it active under a fresh
    /// lease with progress reset to 0. Expired leases are reclaimed first.
    async fn reserve(&self) -> Result<Option<Task>, QueueError>;

    /// Record progress for an active task and renew its lease. Lower values
    /// than the stored one are ignored.
    async fn update_progress(&self, id: TaskId, progress: u8) -> Result<(), QueueError>;

    async fn complete(&self, id: TaskId) -> Result<(), QueueError>;

    async fn fail(&self, id: TaskId, reason: &str) -> Result<FailureOutcome, QueueError>;

    async fn status(&self, id: TaskId) -> Result<Option<TaskStatus>, QueueError>;

    /// Tasks waiting to run, including those in backoff.
    async fn depth(&self) -> Result<u64, QueueError>;

    async fn health_check(&self) -> Result<(), QueueError>;
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Task {0} not found")]
    UnknownTask(TaskId),

    #[error("Corrupt task record {id}: {reason}")]
    Corrupt { id: TaskId, reason: String },
}
