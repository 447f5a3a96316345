//! Worker protocol: how the out-of-process extraction worker reports results.
//!
//! Completion writes the record before the job is removed. A failed write is
//! reported back to the queue as a failed attempt, so the job is retried after
//! its backoff or, once the budget is spent, dropped with the record marked
//! ERROR. Repeated reports are harmless: the record only leaves PROCESSING once.

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::jobs::queue::{portfolio_id_from_key, FailOutcome, JobQueue};
use crate::models::portfolio::PortfolioData;
use crate::storage::PortfolioStore;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobCompletion {
    pub portfolio_id: Uuid,
    /// `false` when the record was already terminal (or missing).
    pub applied: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobFailure {
    pub portfolio_id: Uuid,
    #[serde(flatten)]
    pub outcome: FailOutcome,
    /// Whether this report moved the record to ERROR.
    pub marked_error: bool,
}

/// Stores the extracted data (PROCESSING → READY) and retires the job.
pub async fn complete_job(
    store: &dyn PortfolioStore,
    queue: &dyn JobQueue,
    key: &str,
    data: PortfolioData,
) -> Result<JobCompletion, AppError> {
    let portfolio_id = resolve_portfolio_id(queue, key).await?;

    let applied = match store.complete(portfolio_id, &data).await {
        Ok(applied) => applied,
        Err(e) => {
            warn!("Failed to store result of {key}: {e}");
            let reason = format!("Failed to store result: {e}");
            if let Err(release) = fail_job(store, queue, key, &reason).await {
                warn!("Could not release {key} after failed write: {release}");
            }
            return Err(e);
        }
    };
    if !applied {
        warn!("Portfolio {portfolio_id} was not PROCESSING; completion of {key} ignored");
    }

    queue.complete(key).await?;
    Ok(JobCompletion {
        portfolio_id,
        applied,
    })
}

/// Records a failed attempt; once the attempt budget is spent the record moves to ERROR.
pub async fn fail_job(
    store: &dyn PortfolioStore,
    queue: &dyn JobQueue,
    key: &str,
    reason: &str,
) -> Result<JobFailure, AppError> {
    let portfolio_id = resolve_portfolio_id(queue, key).await?;

    let outcome = queue.fail(key, reason).await?;
    let marked_error = match outcome {
        FailOutcome::Retrying { .. } => false,
        FailOutcome::Dropped => {
            info!("Job {key} exhausted its attempts; marking portfolio {portfolio_id} ERROR");
            store.fail(portfolio_id).await?
        }
    };

    Ok(JobFailure {
        portfolio_id,
        outcome,
        marked_error,
    })
}

async fn resolve_portfolio_id(queue: &dyn JobQueue, key: &str) -> Result<Uuid, AppError> {
    if let Some(job) = queue.get_job(key).await? {
        return Ok(job.payload.portfolio_id);
    }
    portfolio_id_from_key(key)
        .ok_or_else(|| AppError::InvalidInput(format!("'{key}' is not a portfolio job key")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::coordinator::{enqueue_job, JobRequest};
    use crate::jobs::queue::{job_key, JobState};
    use crate::models::portfolio::PortfolioStatus;
    use crate::testing::{MemoryJobQueue, MemoryPortfolioStore};

    async fn submitted(store: &MemoryPortfolioStore, queue: &MemoryJobQueue) -> Uuid {
        let id = Uuid::new_v4();
        store.create(id).await.unwrap();
        enqueue_job(
            queue,
            JobRequest {
                portfolio_id: id,
                resume_url: "https://blob/resume.pdf".into(),
            },
        )
        .await
        .unwrap();
        id
    }

    fn data() -> PortfolioData {
        PortfolioData {
            name: "Ada".into(),
            title: "Engineer".into(),
            summary: "Numbers".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_completion_marks_ready_and_removes_job() {
        let store = MemoryPortfolioStore::new();
        let queue = MemoryJobQueue::new();
        let id = submitted(&store, &queue).await;
        let key = job_key(id);
        queue.reserve().await.unwrap().unwrap();

        let completion = complete_job(&store, &queue, &key, data()).await.unwrap();

        assert!(completion.applied);
        assert_eq!(
            store.fetch(id).await.unwrap().unwrap().status,
            PortfolioStatus::Ready
        );
        assert!(queue.get_job(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_completion_is_ignored() {
        let store = MemoryPortfolioStore::new();
        let queue = MemoryJobQueue::new();
        let id = submitted(&store, &queue).await;
        let key = job_key(id);

        complete_job(&store, &queue, &key, data()).await.unwrap();
        let mut other = data();
        other.name = "Someone else".into();
        let second = complete_job(&store, &queue, &key, other).await.unwrap();

        assert!(!second.applied);
        let stored = store.fetch(id).await.unwrap().unwrap().data.unwrap();
        assert_eq!(stored.name, "Ada");
    }

    #[tokio::test]
    async fn test_first_failure_retries_without_touching_record() {
        let store = MemoryPortfolioStore::new();
        let queue = MemoryJobQueue::new();
        let id = submitted(&store, &queue).await;

        let failure = fail_job(&store, &queue, &job_key(id), "timeout").await.unwrap();

        assert!(matches!(failure.outcome, FailOutcome::Retrying { attempt: 2, .. }));
        assert!(!failure.marked_error);
        assert_eq!(
            store.fetch(id).await.unwrap().unwrap().status,
            PortfolioStatus::Processing
        );
        assert_eq!(queue.live_jobs(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_job_marks_record_error() {
        let store = MemoryPortfolioStore::new();
        let queue = MemoryJobQueue::new();
        let id = submitted(&store, &queue).await;
        let key = job_key(id);

        fail_job(&store, &queue, &key, "first").await.unwrap();
        let failure = fail_job(&store, &queue, &key, "second").await.unwrap();

        assert_eq!(failure.outcome, FailOutcome::Dropped);
        assert!(failure.marked_error);
        assert_eq!(
            store.fetch(id).await.unwrap().unwrap().status,
            PortfolioStatus::Error
        );
        assert_eq!(queue.live_jobs(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_write_releases_job_for_retry() {
        let store = MemoryPortfolioStore::new();
        let queue = MemoryJobQueue::new();
        let id = submitted(&store, &queue).await;
        let key = job_key(id);
        queue.reserve().await.unwrap().unwrap();
        store.fail_completes();

        let err = complete_job(&store, &queue, &key, data()).await.unwrap_err();
        assert!(matches!(err, AppError::Storage(_)));

        let job = queue.get_job(&key).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Delayed);
        assert_eq!(job.attempts_made, 1);
        assert!(queue.reserve().await.unwrap().is_none());

        tokio::time::advance(std::time::Duration::from_millis(job.opts.backoff_ms)).await;
        let retried = queue.reserve().await.unwrap().unwrap();
        assert_eq!(retried.key, key);
    }

    #[tokio::test]
    async fn test_failed_write_on_last_attempt_marks_error() {
        let store = MemoryPortfolioStore::new();
        let queue = MemoryJobQueue::new();
        let id = submitted(&store, &queue).await;
        let key = job_key(id);
        fail_job(&store, &queue, &key, "first").await.unwrap();
        store.fail_completes();

        complete_job(&store, &queue, &key, data()).await.unwrap_err();

        assert_eq!(queue.live_jobs(), 0);
        assert_eq!(
            store.fetch(id).await.unwrap().unwrap().status,
            PortfolioStatus::Error
        );
        let outcome = enqueue_job(
            &queue,
            JobRequest {
                portfolio_id: id,
                resume_url: "https://blob/resume.pdf".into(),
            },
        )
        .await
        .unwrap();
        assert_eq!(outcome, crate::jobs::EnqueueOutcome::Enqueued);
    }

    #[tokio::test]
    async fn test_unknown_key_is_rejected() {
        let store = MemoryPortfolioStore::new();
        let queue = MemoryJobQueue::new();
        let err = complete_job(&store, &queue, "bogus", data()).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }
}
