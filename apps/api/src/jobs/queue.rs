//! Job queue contract.
//!
//! At most one *live* job (waiting, delayed or active) exists per key; adding a
//! job whose key is live is a no-op. Failed jobs are retried with a fixed
//! backoff until the attempt budget is spent, then dropped. Delivery is
//! at-least-once, so workers must treat their own writes as idempotent.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;

pub const JOB_NAME: &str = "processResumeJob";
pub const JOB_KEY_PREFIX: &str = "JobId:";

/// Idempotency key of the extraction job for a portfolio.
pub fn job_key(portfolio_id: Uuid) -> String {
    format!("{JOB_KEY_PREFIX}{portfolio_id}")
}

/// Recovers the portfolio id from a job key produced by [`job_key`].
pub fn portfolio_id_from_key(key: &str) -> Option<Uuid> {
    key.strip_prefix(JOB_KEY_PREFIX)
        .and_then(|id| Uuid::parse_str(id).ok())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPayload {
    pub portfolio_id: Uuid,
    pub key: String,
    pub resume_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOptions {
    pub remove_on_complete: bool,
    pub remove_on_fail: bool,
    pub attempts: u32,
    pub backoff_ms: u64,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            remove_on_complete: true,
            remove_on_fail: true,
            attempts: 2,
            backoff_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Waiting,
    Delayed,
    Active,
    Completed,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Waiting => "waiting",
            JobState::Delayed => "delayed",
            JobState::Active => "active",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }

    /// A live job blocks re-adding its key.
    pub fn is_live(&self) -> bool {
        matches!(self, JobState::Waiting | JobState::Delayed | JobState::Active)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub key: String,
    pub name: String,
    pub payload: JobPayload,
    pub opts: JobOptions,
    pub state: JobState,
    pub attempts_made: u32,
    pub failed_reason: Option<String>,
}

impl Job {
    /// A fresh extraction job for `portfolio_id`, keyed by [`job_key`].
    pub fn extraction(portfolio_id: Uuid, resume_url: String, opts: JobOptions) -> Self {
        let key = job_key(portfolio_id);
        Self {
            key: key.clone(),
            name: JOB_NAME.to_string(),
            payload: JobPayload {
                portfolio_id,
                key,
                resume_url,
            },
            opts,
            state: JobState::Waiting,
            attempts_made: 0,
            failed_reason: None,
        }
    }

    /// Records a failed attempt and decides whether the job runs again.
    pub fn record_failure(&mut self, reason: &str) -> FailOutcome {
        self.attempts_made += 1;
        self.failed_reason = Some(reason.to_string());

        if self.attempts_made < self.opts.attempts {
            self.state = JobState::Delayed;
            FailOutcome::Retrying {
                attempt: self.attempts_made + 1,
                delay: Duration::from_millis(self.opts.backoff_ms),
            }
        } else {
            self.state = JobState::Failed;
            FailOutcome::Dropped
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnqueueOutcome {
    Enqueued,
    /// A live job already holds the key; nothing was added.
    Duplicate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum FailOutcome {
    Retrying {
        attempt: u32,
        #[serde(serialize_with = "serialize_millis")]
        delay: Duration,
    },
    /// Attempt budget exhausted; the job is gone from the queue.
    Dropped,
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn get_job(&self, key: &str) -> Result<Option<Job>, AppError>;

    /// Adds `job` unless a live job already holds its key. Atomic per key.
    async fn add(&self, job: Job) -> Result<EnqueueOutcome, AppError>;

    /// Promotes due delayed jobs, then claims the oldest waiting job.
    async fn reserve(&self) -> Result<Option<Job>, AppError>;

    async fn complete(&self, key: &str) -> Result<(), AppError>;

    /// Fails with `NotFound` when no job holds `key`.
    async fn fail(&self, key: &str, reason: &str) -> Result<FailOutcome, AppError>;
}
