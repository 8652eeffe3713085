use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use super::{
    Backoff, EnqueueOptions, FailureOutcome, QueueError, Task, TaskHandle, TaskId, TaskPayload,
    TaskQueue, TaskState, TaskStatus, DEFAULT_LEASE, LEASE_EXPIRED,
};

const DEFAULT_PREFIX: &str = "image_import";
const SWEEP_BATCH: usize = 32;

/// Raise progress only while the task is active and only upwards, and renew
/// its lease.
const RAISE_PROGRESS: &str = r#"
if redis.call('HGET', KEYS[1], 'state') ~= 'active' then
  return 0
end
local current = tonumber(redis.call('HGET', KEYS[1], 'progress') or '0')
if tonumber(ARGV[1]) > current then
  redis.call('HSET', KEYS[1], 'progress', ARGV[1])
end
redis.call('ZADD', KEYS[2], 'XX', ARGV[2], ARGV[3])
return 1
"#;

/// Promote due retries, reclaim expired leases, then claim the oldest waiting
/// id under a new lease. Returns the claimed id or nil.
///
/// KEYS: delayed, waiting, active.
/// ARGV: now millis, batch, lease-until millis, task key prefix, lapse reason.
const RESERVE: &str = r#"
local now = tonumber(ARGV[1])

local due = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', now, 'LIMIT', 0, ARGV[2])
for _, id in ipairs(due) do
  redis.call('ZREM', KEYS[1], id)
  redis.call('LPUSH', KEYS[2], id)
end

local expired = redis.call('ZRANGEBYSCORE', KEYS[3], '-inf', now, 'LIMIT', 0, ARGV[2])
for _, id in ipairs(expired) do
  redis.call('ZREM', KEYS[3], id)
  local key = ARGV[4] .. id
  local made = tonumber(redis.call('HGET', key, 'attempts_made') or '0')
  local max = tonumber(redis.call('HGET', key, 'max_attempts') or '1')
  if made < max then
    redis.call('HSET', key, 'state', 'waiting', 'failed_reason', ARGV[5])
    redis.call('LPUSH', KEYS[2], id)
  else
    redis.call('HSET', key, 'state', 'failed', 'failed_reason', ARGV[5], 'finished_at', now)
  end
end

local id = redis.call('RPOP', KEYS[2])
if not id then
  return false
end
local key = ARGV[4] .. id
redis.call('HSET', key, 'state', 'active', 'progress', '0')
redis.call('HINCRBY', key, 'attempts_made', 1)
redis.call('ZADD', KEYS[3], ARGV[3], id)
return id
"#;

/// Redis-backed task queue.
///
/// Layout under the key prefix:
/// - `task_seq`: id counter
/// - `task:{id}`: hash with payload, state, progress, attempt bookkeeping
/// - `waiting`: list of ready ids (LPUSH in, RPOP out)
/// - `active`: sorted set of ids held by a worker, scored by lease expiry millis
/// - `delayed`: sorted set of ids in backoff, scored by ready-at millis
///
/// The reserve script builds task keys from the prefix, so all keys must live
/// on one node.
pub struct RedisTaskQueue {
    client: redis::Client,
    prefix: String,
    lease: Duration,
    raise_progress: redis::Script,
    claim: redis::Script,
}

impl RedisTaskQueue {
    pub fn new(redis_url: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url).map_err(QueueError::Redis)?;
        Ok(Self {
            client,
            prefix: DEFAULT_PREFIX.to_string(),
            lease: DEFAULT_LEASE,
            raise_progress: redis::Script::new(RAISE_PROGRESS),
            claim: redis::Script::new(RESERVE),
        })
    }

    /// Override how long a reservation lasts without a progress report.
    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    fn lease_until(&self) -> i64 {
        now_millis() + self.lease.as_millis() as i64
    }

    /// Namespace all keys under `prefix` (isolates test runs sharing a server).
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    fn key(&self, name: &str) -> String {
        format!("{}:{}", self.prefix, name)
    }

    fn task_key(&self, id: TaskId) -> String {
        format!("{}:task:{}", self.prefix, id)
    }

    async fn connection(&self) -> Result<MultiplexedConnection, QueueError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)
    }

    async fn load(
        &self,
        conn: &mut MultiplexedConnection,
        id: TaskId,
    ) -> Result<Option<TaskRecord>, QueueError> {
        let fields: HashMap<String, String> = conn.hgetall(self.task_key(id)).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        TaskRecord::parse(id, &fields).map(Some)
    }
}

#[async_trait]
impl TaskQueue for RedisTaskQueue {
    async fn enqueue(
        &self,
        payload: TaskPayload,
        options: EnqueueOptions,
    ) -> Result<TaskHandle, QueueError> {
        let mut conn = self.connection().await?;
        let kind = payload.kind();
        let payload_json = serde_json::to_string(&payload).map_err(QueueError::Serialize)?;

        let seq: u64 = conn.incr(self.key("task_seq"), 1).await?;
        let id = TaskId(seq);

        let fields = [
            ("payload", payload_json),
            ("state", TaskState::Waiting.to_string()),
            ("progress", "0".to_string()),
            ("attempts_made", "0".to_string()),
            ("max_attempts", options.attempts.to_string()),
            ("backoff_ms", options.backoff.base.as_millis().to_string()),
        ];

        redis::pipe()
            .atomic()
            .hset_multiple(self.task_key(id), &fields)
            .ignore()
            .lpush(self.key("waiting"), id.0)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;

        Ok(TaskHandle { id, kind })
    }

    async fn reserve(&self) -> Result<Option<Task>, QueueError> {
        let mut conn = self.connection().await?;

        let claimed: Option<u64> = self
            .claim
            .key(self.key("delayed"))
            .key(self.key("waiting"))
            .key(self.key("active"))
            .arg(now_millis())
            .arg(SWEEP_BATCH)
            .arg(self.lease_until())
            .arg(self.key("task:"))
            .arg(LEASE_EXPIRED)
            .invoke_async(&mut conn)
            .await?;
        let Some(raw) = claimed else {
            return Ok(None);
        };
        let id = TaskId(raw);

        let record = self
            .load(&mut conn, id)
            .await?
            .ok_or(QueueError::UnknownTask(id))?;
        Ok(Some(Task {
            id,
            payload: record.payload,
            attempts_made: record.attempts_made,
            max_attempts: record.max_attempts,
        }))
    }

    async fn update_progress(&self, id: TaskId, progress: u8) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        let _applied: i64 = self
            .raise_progress
            .key(self.task_key(id))
            .key(self.key("active"))
            .arg(u32::from(progress.min(100)))
            .arg(self.lease_until())
            .arg(id.0)
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn complete(&self, id: TaskId) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        let key = self.task_key(id);
        let exists: bool = conn.exists(&key).await?;
        if !exists {
            return Err(QueueError::UnknownTask(id));
        }

        redis::pipe()
            .atomic()
            .hset(&key, "state", TaskState::Completed.to_string())
            .ignore()
            .hset(&key, "finished_at", now_millis())
            .ignore()
            .zrem(self.key("active"), id.0)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn fail(&self, id: TaskId, reason: &str) -> Result<FailureOutcome, QueueError> {
        let mut conn = self.connection().await?;
        let record = self
            .load(&mut conn, id)
            .await?
            .ok_or(QueueError::UnknownTask(id))?;
        let key = self.task_key(id);

        if record.attempts_made < record.max_attempts {
            let delay = record.backoff.delay_for(record.attempts_made);
            let ready_at = now_millis() + delay.as_millis() as i64;

            redis::pipe()
                .atomic()
                .hset(&key, "state", TaskState::Waiting.to_string())
                .ignore()
                .hset(&key, "failed_reason", reason)
                .ignore()
                .zrem(self.key("active"), id.0)
                .ignore()
                .zadd(self.key("delayed"), id.0, ready_at)
                .ignore()
                .query_async::<()>(&mut conn)
                .await?;

            Ok(FailureOutcome::Retrying {
                attempt: record.attempts_made + 1,
                delay,
            })
        } else {
            redis::pipe()
                .atomic()
                .hset(&key, "state", TaskState::Failed.to_string())
                .ignore()
                .hset(&key, "failed_reason", reason)
                .ignore()
                .hset(&key, "finished_at", now_millis())
                .ignore()
                .zrem(self.key("active"), id.0)
                .ignore()
                .query_async::<()>(&mut conn)
                .await?;

            Ok(FailureOutcome::Exhausted)
        }
    }

    async fn status(&self, id: TaskId) -> Result<Option<TaskStatus>, QueueError> {
        let mut conn = self.connection().await?;
        Ok(self.load(&mut conn, id).await?.map(|record| TaskStatus {
            id,
            state: record.state,
            progress: record.progress,
            payload: record.payload,
            failed_reason: record.failed_reason,
            attempts_made: record.attempts_made,
            max_attempts: record.max_attempts,
        }))
    }

    async fn depth(&self) -> Result<u64, QueueError> {
        let mut conn = self.connection().await?;
        let (waiting, delayed): (u64, u64) = redis::pipe()
            .llen(self.key("waiting"))
            .zcard(self.key("delayed"))
            .query_async(&mut conn)
            .await?;
        Ok(waiting + delayed)
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }
}

/// Decoded `task:{id}` hash.
#[derive(Debug)]
struct TaskRecord {
    payload: TaskPayload,
    state: TaskState,
    progress: u8,
    attempts_made: u32,
    max_attempts: u32,
    backoff: Backoff,
    failed_reason: Option<String>,
}

impl TaskRecord {
    fn parse(id: TaskId, fields: &HashMap<String, String>) -> Result<Self, QueueError> {
        let payload = serde_json::from_str(required(id, fields, "payload")?)?;
        let backoff_ms: u64 = parsed(id, fields, "backoff_ms")?;

        Ok(Self {
            payload,
            state: parsed(id, fields, "state")?,
            progress: parsed(id, fields, "progress")?,
            attempts_made: parsed(id, fields, "attempts_made")?,
            max_attempts: parsed(id, fields, "max_attempts")?,
            backoff: Backoff::exponential(Duration::from_millis(backoff_ms)),
            failed_reason: fields.get("failed_reason").cloned(),
        })
    }
}

fn required<'a>(
    id: TaskId,
    fields: &'a HashMap<String, String>,
    name: &str,
) -> Result<&'a str, QueueError> {
    fields
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| QueueError::Corrupt {
            id,
            reason: format!("missing field `{name}`"),
        })
}

fn parsed<T: FromStr>(
    id: TaskId,
    fields: &HashMap<String, String>,
    name: &str,
) -> Result<T, QueueError> {
    required(id, fields, name)?
        .parse()
        .map_err(|_| QueueError::Corrupt {
            id,
            reason: format!("unparsable field `{name}`"),
        })
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
