//! Generation Coordinator: orchestrates a résumé submission.
//!
//! Flow: validate media type → upload résumé → create PROCESSING record →
//!       enqueue job keyed by portfolio id → grant capability → return id.
//!
//! Each step only runs once the previous one succeeded, so a failure never
//! leaves a record without an upload or a job without a record. A failure at
//! the final step leaves the record in PROCESSING with no job behind it.

use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::capability::CapabilityStore;
use crate::errors::AppError;
use crate::jobs::{EnqueueOutcome, Job, JobOptions, JobQueue};
use crate::storage::{BlobBucket, BlobStore, PortfolioStore, Upload};

/// The only résumé media type accepted.
pub const ACCEPTED_RESUME_TYPE: &str = "application/pdf";

/// Body of the job submission endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRequest {
    pub portfolio_id: Uuid,
    pub resume_url: String,
}

/// Runs the full submission pipeline and returns the new portfolio id.
///
/// On success the caller's capability set holds a grant for the id.
pub async fn submit_resume(
    store: &dyn PortfolioStore,
    blobs: &dyn BlobStore,
    queue: &dyn JobQueue,
    capabilities: &mut CapabilityStore,
    resume: Upload,
) -> Result<Uuid, AppError> {
    // Step 0: reject anything that is not a PDF before touching storage
    if !is_accepted_resume(&resume.content_type) {
        return Err(AppError::InvalidInput(format!(
            "File type should be PDF only (got '{}')",
            resume.content_type
        )));
    }
    if resume.bytes.is_empty() {
        return Err(AppError::InvalidInput("Résumé file is empty".to_string()));
    }

    // Step 1: upload résumé
    let resume_url = blobs.upload(BlobBucket::Resume, &resume).await?;
    info!("Uploaded résumé '{}' to {}", resume.file_name, resume_url);

    // Step 2: create record (must exist before the job can be observed)
    let portfolio_id = Uuid::new_v4();
    store.create(portfolio_id).await?;
    info!("Created portfolio {portfolio_id} with status PROCESSING");

    // Step 3: enqueue extraction job
    if let Err(e) = enqueue_job(
        queue,
        JobRequest {
            portfolio_id,
            resume_url,
        },
    )
    .await
    {
        warn!("Portfolio {portfolio_id} left in PROCESSING: job submission failed");
        return Err(e);
    }

    capabilities.grant(&portfolio_id.to_string());
    Ok(portfolio_id)
}

/// Submits the extraction job for a portfolio unless one is already live.
///
/// A duplicate submission is a silent success.
pub async fn enqueue_job(
    queue: &dyn JobQueue,
    request: JobRequest,
) -> Result<EnqueueOutcome, AppError> {
    let job = Job::extraction(
        request.portfolio_id,
        request.resume_url,
        JobOptions::default(),
    );
    let key = job.key.clone();

    let outcome = queue.add(job).await?;
    match outcome {
        EnqueueOutcome::Enqueued => info!("Job {key} added"),
        EnqueueOutcome::Duplicate => info!("Job {key} already exists, skipping"),
    }
    Ok(outcome)
}

/// Matches the declared media type, ignoring case and parameters such as `charset`.
pub fn is_accepted_resume(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(|essence| essence.trim().eq_ignore_ascii_case(ACCEPTED_RESUME_TYPE))
        .unwrap_or(false)
}
