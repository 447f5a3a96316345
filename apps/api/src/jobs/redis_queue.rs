//! Redis-backed job queue.
//!
//! Layout under `folio:<queue>:`
//! - `<job key>`  hash with `state` and `job` (JSON)
//! - `wait`       list of job keys ready to run (LPUSH / RPOP)
//! - `delayed`    sorted set of job keys scored by the unix millis they become due

use async_trait::async_trait;
use chrono::Utc;
use redis::{AsyncCommands, RedisError, Script};
use tracing::{debug, info};

use crate::errors::AppError;
use crate::jobs::queue::{EnqueueOutcome, FailOutcome, Job, JobQueue, JobState};

const KEY_NAMESPACE: &str = "folio";

/// Adds a job only if its key is not held by a live job.
const ADD_SCRIPT: &str = r#"
local state = redis.call('HGET', KEYS[1], 'state')
if state == 'waiting' or state == 'delayed' or state == 'active' then
  return 0
end
redis.call('DEL', KEYS[1])
redis.call('HSET', KEYS[1], 'state', 'waiting', 'job', ARGV[1])
redis.call('LPUSH', KEYS[2], ARGV[2])
return 1
"#;

/// Moves due delayed keys onto the wait list, then pops the oldest waiting key.
const RESERVE_SCRIPT: &str = r#"
local due = redis.call('ZRANGEBYSCORE', KEYS[2], '-inf', ARGV[1])
for _, key in ipairs(due) do
  redis.call('ZREM', KEYS[2], key)
  redis.call('LPUSH', KEYS[1], key)
end
return redis.call('RPOP', KEYS[1])
"#;

pub struct RedisJobQueue {
    client: redis::Client,
    queue_name: String,
}

impl RedisJobQueue {
    pub fn new(client: redis::Client, queue_name: impl Into<String>) -> Self {
        Self {
            client,
            queue_name: queue_name.into(),
        }
    }

    fn job_hash(&self, key: &str) -> String {
        format!("{KEY_NAMESPACE}:{}:{key}", self.queue_name)
    }

    fn wait_list(&self) -> String {
        format!("{KEY_NAMESPACE}:{}:wait", self.queue_name)
    }

    fn delayed_set(&self) -> String {
        format!("{KEY_NAMESPACE}:{}:delayed", self.queue_name)
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, AppError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(queue_error)
    }

    async fn write_job(
        &self,
        con: &mut redis::aio::MultiplexedConnection,
        job: &Job,
    ) -> Result<(), AppError> {
        let encoded = encode_job(job)?;
        con.hset_multiple::<_, _, _, ()>(
            self.job_hash(&job.key),
            &[("state", job.state.as_str().to_string()), ("job", encoded)],
        )
        .await
        .map_err(queue_error)
    }

    /// Deletes the job hash and any stale wait-list or delayed-set entry for it.
    async fn remove_job(
        &self,
        con: &mut redis::aio::MultiplexedConnection,
        key: &str,
    ) -> Result<(), AppError> {
        redis::pipe()
            .atomic()
            .del(self.job_hash(key))
            .ignore()
            .lrem(self.wait_list(), 0, key)
            .ignore()
            .zrem(self.delayed_set(), key)
            .ignore()
            .query_async::<_, ()>(con)
            .await
            .map_err(queue_error)
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn get_job(&self, key: &str) -> Result<Option<Job>, AppError> {
        let mut con = self.connection().await?;
        let raw: Option<String> = con
            .hget(self.job_hash(key), "job")
            .await
            .map_err(queue_error)?;
        raw.as_deref().map(decode_job).transpose()
    }

    async fn add(&self, job: Job) -> Result<EnqueueOutcome, AppError> {
        let mut con = self.connection().await?;
        let encoded = encode_job(&Job {
            state: JobState::Waiting,
            ..job.clone()
        })?;

        let added: i32 = Script::new(ADD_SCRIPT)
            .key(self.job_hash(&job.key))
            .key(self.wait_list())
            .arg(encoded)
            .arg(&job.key)
            .invoke_async(&mut con)
            .await
            .map_err(queue_error)?;

        if added == 1 {
            info!("Enqueued job {} on {}", job.key, self.queue_name);
            Ok(EnqueueOutcome::Enqueued)
        } else {
            debug!("Job {} already live on {}", job.key, self.queue_name);
            Ok(EnqueueOutcome::Duplicate)
        }
    }

    async fn reserve(&self) -> Result<Option<Job>, AppError> {
        let mut con = self.connection().await?;
        let script = Script::new(RESERVE_SCRIPT);

        // Keys whose job was removed or is no longer claimable are skipped.
        loop {
            let key: Option<String> = script
                .key(self.wait_list())
                .key(self.delayed_set())
                .arg(Utc::now().timestamp_millis())
                .invoke_async(&mut con)
                .await
                .map_err(queue_error)?;

            let Some(key) = key else {
                return Ok(None);
            };

            let raw: Option<String> = con
                .hget(self.job_hash(&key), "job")
                .await
                .map_err(queue_error)?;
            let Some(raw) = raw else {
                debug!("Skipping stale wait-list entry {key}");
                continue;
            };

            let mut job = decode_job(&raw)?;
            if !matches!(job.state, JobState::Waiting | JobState::Delayed) {
                debug!("Skipping {key} in state {}", job.state.as_str());
                continue;
            }
            job.state = JobState::Active;
            self.write_job(&mut con, &job).await?;
            return Ok(Some(job));
        }
    }

    async fn complete(&self, key: &str) -> Result<(), AppError> {
        let Some(mut job) = self.get_job(key).await? else {
            return Ok(());
        };
        let mut con = self.connection().await?;

        if job.opts.remove_on_complete {
            self.remove_job(&mut con, key).await?;
        } else {
            job.state = JobState::Completed;
            self.write_job(&mut con, &job).await?;
        }
        info!("Job {key} completed");
        Ok(())
    }

    async fn fail(&self, key: &str, reason: &str) -> Result<FailOutcome, AppError> {
        let mut job = self
            .get_job(key)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Job {key} not found")))?;
        let mut con = self.connection().await?;

        let outcome = job.record_failure(reason);
        match outcome {
            FailOutcome::Retrying { attempt, delay } => {
                self.write_job(&mut con, &job).await?;
                let due = Utc::now().timestamp_millis() + delay.as_millis() as i64;
                con.zadd::<_, _, _, ()>(self.delayed_set(), key, due)
                    .await
                    .map_err(queue_error)?;
                info!(
                    "Job {key} failed ({reason}); attempt {attempt} in {}ms",
                    delay.as_millis()
                );
            }
            FailOutcome::Dropped => {
                if job.opts.remove_on_fail {
                    self.remove_job(&mut con, key).await?;
                } else {
                    self.write_job(&mut con, &job).await?;
                }
                info!(
                    "Job {key} dropped after {} attempts: {reason}",
                    job.attempts_made
                );
            }
        }
        Ok(outcome)
    }
}

fn queue_error(e: RedisError) -> AppError {
    AppError::Queue(e.to_string())
}

fn encode_job(job: &Job) -> Result<String, AppError> {
    serde_json::to_string(job).map_err(|e| AppError::Queue(format!("Failed to encode job: {e}")))
}

fn decode_job(raw: &str) -> Result<Job, AppError> {
    serde_json::from_str(raw).map_err(|e| AppError::Queue(format!("Corrupt job record: {e}")))
}
