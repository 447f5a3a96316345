//! In-memory collaborators for unit tests, with failure injection.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::time::Instant;
use uuid::Uuid;

use crate::config::Config;
use crate::errors::AppError;
use crate::jobs::queue::{EnqueueOutcome, FailOutcome, Job, JobQueue, JobState};
use crate::models::portfolio::{PortfolioData, PortfolioRecord, PortfolioStatus};
use crate::state::AppState;
use crate::status::{ChangeFeed, ChangeKind, RecordChange};
use crate::storage::{BlobBucket, BlobStore, PortfolioStore, Upload};

pub fn pdf_upload() -> Upload {
    Upload {
        file_name: "resume.pdf".to_string(),
        content_type: "application/pdf".to_string(),
        bytes: Bytes::from_static(b"%PDF-1.7 resume"),
    }
}

pub fn docx_upload() -> Upload {
    Upload {
        file_name: "resume.docx".to_string(),
        content_type: "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            .to_string(),
        bytes: Bytes::from_static(b"PK\x03\x04"),
    }
}

pub fn image_upload() -> Upload {
    Upload {
        file_name: "me.png".to_string(),
        content_type: "image/png".to_string(),
        bytes: Bytes::from_static(b"\x89PNG"),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Record store
// ────────────────────────────────────────────────────────────────────────────

struct StoredPortfolio {
    status: PortfolioStatus,
    data_id: Option<Uuid>,
}

#[derive(Default)]
struct StoreInner {
    portfolios: HashMap<Uuid, StoredPortfolio>,
    data: HashMap<Uuid, PortfolioData>,
}

#[derive(Default)]
pub struct MemoryPortfolioStore {
    inner: Mutex<StoreInner>,
    feed: Mutex<Option<ChangeFeed>>,
    fail_creates: AtomicBool,
    fail_photo_writes: AtomicBool,
    fail_completes: AtomicBool,
}

impl MemoryPortfolioStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes every write to `feed`, like the Postgres trigger does.
    pub fn attach_feed(&self, feed: ChangeFeed) {
        *self.feed.lock().unwrap() = Some(feed);
    }

    pub fn fail_creates(&self) {
        self.fail_creates.store(true, Ordering::SeqCst);
    }

    pub fn fail_photo_writes(&self) {
        self.fail_photo_writes.store(true, Ordering::SeqCst);
    }

    pub fn fail_completes(&self) {
        self.fail_completes.store(true, Ordering::SeqCst);
    }

    pub fn record_count(&self) -> usize {
        self.inner.lock().unwrap().portfolios.len()
    }

    pub fn ids(&self) -> Vec<Uuid> {
        self.inner.lock().unwrap().portfolios.keys().copied().collect()
    }

    fn publish(&self, event: ChangeKind, id: Uuid, status: PortfolioStatus) {
        if let Some(feed) = self.feed.lock().unwrap().as_ref() {
            feed.publish(RecordChange {
                event,
                id,
                status: Some(status),
            });
        }
    }

    fn transition(&self, id: Uuid, status: PortfolioStatus, data: Option<&PortfolioData>) -> bool {
        {
            let mut inner = self.inner.lock().unwrap();
            let is_processing = matches!(
                inner.portfolios.get(&id),
                Some(p) if p.status == PortfolioStatus::Processing
            );
            if !is_processing {
                return false;
            }
            let data_id = data.map(|d| {
                let data_id = Uuid::new_v4();
                inner.data.insert(data_id, d.clone());
                data_id
            });
            if let Some(portfolio) = inner.portfolios.get_mut(&id) {
                portfolio.status = status;
                portfolio.data_id = data_id;
            }
        }
        self.publish(ChangeKind::Update, id, status);
        true
    }
}

#[async_trait]
impl PortfolioStore for MemoryPortfolioStore {
    async fn create(&self, id: Uuid) -> Result<(), AppError> {
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(AppError::Storage("insert rejected".to_string()));
        }
        self.inner.lock().unwrap().portfolios.insert(
            id,
            StoredPortfolio {
                status: PortfolioStatus::Processing,
                data_id: None,
            },
        );
        self.publish(ChangeKind::Insert, id, PortfolioStatus::Processing);
        Ok(())
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<PortfolioRecord>, AppError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.portfolios.get(&id).map(|p| {
            let data = p.data_id.and_then(|data_id| inner.data.get(&data_id).cloned());
            PortfolioRecord::new(id, p.status, data)
        }))
    }

    async fn data_row_id(&self, id: Uuid) -> Result<Option<Uuid>, AppError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .portfolios
            .get(&id)
            .and_then(|p| p.data_id))
    }

    async fn update_photo(&self, data_row_id: Uuid, url: &str) -> Result<u64, AppError> {
        if self.fail_photo_writes.load(Ordering::SeqCst) {
            return Err(AppError::Storage("update rejected".to_string()));
        }
        let mut inner = self.inner.lock().unwrap();
        match inner.data.get_mut(&data_row_id) {
            Some(data) => {
                data.photo = Some(url.to_string());
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn complete(&self, id: Uuid, data: &PortfolioData) -> Result<bool, AppError> {
        if self.fail_completes.load(Ordering::SeqCst) {
            return Err(AppError::Storage("transaction aborted".to_string()));
        }
        Ok(self.transition(id, PortfolioStatus::Ready, Some(data)))
    }

    async fn fail(&self, id: Uuid) -> Result<bool, AppError> {
        Ok(self.transition(id, PortfolioStatus::Error, None))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Blob store
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryBlobStore {
    urls: Mutex<Vec<String>>,
    fail: AtomicBool,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_uploads(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn uploaded_urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(&self, bucket: BlobBucket, upload: &Upload) -> Result<String, AppError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::Storage("bucket unavailable".to_string()));
        }
        let mut urls = self.urls.lock().unwrap();
        let folder = match bucket {
            BlobBucket::Resume => "resume",
            BlobBucket::Profile => "profile",
        };
        let url = format!(
            "memory://{folder}/{}-{}",
            upload.file_name,
            urls.len()
        );
        urls.push(url.clone());
        Ok(url)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Job queue
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct QueueInner {
    jobs: HashMap<String, Job>,
    waiting: VecDeque<String>,
    delayed: Vec<(Instant, String)>,
}

#[derive(Default)]
pub struct MemoryJobQueue {
    inner: Mutex<QueueInner>,
    fail_adds: AtomicBool,
}

impl MemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_adds(&self) {
        self.fail_adds.store(true, Ordering::SeqCst);
    }

    pub fn live_jobs(&self) -> usize {
        self.inner
            .lock()
            .unwrap()
            .jobs
            .values()
            .filter(|job| job.state.is_live())
            .count()
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn get_job(&self, key: &str) -> Result<Option<Job>, AppError> {
        Ok(self.inner.lock().unwrap().jobs.get(key).cloned())
    }

    async fn add(&self, job: Job) -> Result<EnqueueOutcome, AppError> {
        if self.fail_adds.load(Ordering::SeqCst) {
            return Err(AppError::Queue("connection refused".to_string()));
        }
        let mut inner = self.inner.lock().unwrap();
        if inner.jobs.get(&job.key).is_some_and(|j| j.state.is_live()) {
            return Ok(EnqueueOutcome::Duplicate);
        }
        let key = job.key.clone();
        inner.jobs.insert(
            key.clone(),
            Job {
                state: JobState::Waiting,
                ..job
            },
        );
        inner.waiting.push_back(key);
        Ok(EnqueueOutcome::Enqueued)
    }

    async fn reserve(&self) -> Result<Option<Job>, AppError> {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();
        let (due, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut inner.delayed)
            .into_iter()
            .partition(|(ready_at, _)| *ready_at <= now);
        inner.delayed = pending;
        inner.waiting.extend(due.into_iter().map(|(_, key)| key));

        while let Some(key) = inner.waiting.pop_front() {
            if let Some(job) = inner.jobs.get_mut(&key) {
                if matches!(job.state, JobState::Waiting | JobState::Delayed) {
                    job.state = JobState::Active;
                    return Ok(Some(job.clone()));
                }
            }
        }
        Ok(None)
    }

    async fn complete(&self, key: &str) -> Result<(), AppError> {
        let mut inner = self.inner.lock().unwrap();
        let remove = match inner.jobs.get_mut(key) {
            Some(job) if job.opts.remove_on_complete => true,
            Some(job) => {
                job.state = JobState::Completed;
                false
            }
            None => false,
        };
        if remove {
            inner.jobs.remove(key);
            inner.waiting.retain(|k| k != key);
            inner.delayed.retain(|(_, k)| k != key);
        }
        Ok(())
    }

    async fn fail(&self, key: &str, reason: &str) -> Result<FailOutcome, AppError> {
        let mut inner = self.inner.lock().unwrap();
        let job = inner
            .jobs
            .get_mut(key)
            .ok_or_else(|| AppError::NotFound(format!("Job {key} not found")))?;

        let outcome = job.record_failure(reason);
        let remove_on_fail = job.opts.remove_on_fail;
        match outcome {
            FailOutcome::Retrying { delay, .. } => {
                inner.delayed.push((Instant::now() + delay, key.to_string()));
            }
            FailOutcome::Dropped if remove_on_fail => {
                inner.jobs.remove(key);
                inner.waiting.retain(|k| k != key);
                inner.delayed.retain(|(_, k)| k != key);
            }
            FailOutcome::Dropped => {}
        }
        Ok(outcome)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// App state
// ────────────────────────────────────────────────────────────────────────────

pub fn test_config() -> Config {
    Config {
        database_url: "postgres://localhost/folio_test".to_string(),
        redis_url: "redis://localhost:6379".to_string(),
        s3_endpoint: "http://localhost:9000".to_string(),
        s3_public_url: "http://localhost:9000".to_string(),
        resume_bucket: "resume".to_string(),
        profile_bucket: "profile".to_string(),
        aws_access_key_id: "test".to_string(),
        aws_secret_access_key: "test".to_string(),
        demo_portfolio_id: Some("00000000-0000-4000-8000-000000000000".to_string()),
        queue_name: "processQueue".to_string(),
        max_upload_bytes: 10 * 1024 * 1024,
        port: 0,
        rust_log: "debug".to_string(),
    }
}

pub struct TestApp {
    pub state: AppState,
    pub store: Arc<MemoryPortfolioStore>,
    pub blobs: Arc<MemoryBlobStore>,
    pub queue: Arc<MemoryJobQueue>,
}

pub fn test_app() -> TestApp {
    let store = Arc::new(MemoryPortfolioStore::new());
    let blobs = Arc::new(MemoryBlobStore::new());
    let queue = Arc::new(MemoryJobQueue::new());
    let feed = ChangeFeed::default();
    store.attach_feed(feed.clone());

    let state = AppState {
        store: store.clone(),
        blobs: blobs.clone(),
        queue: queue.clone(),
        feed,
        config: test_config(),
    };

    TestApp {
        state,
        store,
        blobs,
        queue,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_retried_job_becomes_ready_after_backoff() {
        let queue = MemoryJobQueue::new();
        let job = Job::extraction(Uuid::new_v4(), "u".into(), Default::default());
        let key = job.key.clone();
        queue.add(job).await.unwrap();
        queue.reserve().await.unwrap().unwrap();
        queue.fail(&key, "flaky").await.unwrap();

        assert!(queue.reserve().await.unwrap().is_none());
        tokio::time::advance(Duration::from_millis(5000)).await;
        let retried = queue.reserve().await.unwrap().unwrap();
        assert_eq!(retried.attempts_made, 1);
        assert_eq!(retried.state, JobState::Active);
    }

    #[tokio::test]
    async fn test_completed_job_frees_its_key() {
        let queue = MemoryJobQueue::new();
        let id = Uuid::new_v4();
        let job = Job::extraction(id, "u".into(), Default::default());
        let key = job.key.clone();
        queue.add(job.clone()).await.unwrap();
        queue.complete(&key).await.unwrap();
        assert_eq!(queue.add(job).await.unwrap(), EnqueueOutcome::Enqueued);
    }
}
