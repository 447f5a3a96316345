//! Profile image mutation.
//!
//! Flow: upload image → resolve the portfolio's data row → set `photo`.
//! Callers are responsible for the capability check; this operation does not
//! enforce it. The record status is never touched.

use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::storage::{BlobBucket, BlobStore, PortfolioStore, Upload};

/// Replaces the profile photo and returns the new photo URL.
///
/// Fails with `NotFound` when the portfolio has no data row and with `Storage`
/// when the upload or the write fails; in both cases the previous photo stays.
pub async fn update_photo(
    store: &dyn PortfolioStore,
    blobs: &dyn BlobStore,
    portfolio_id: Uuid,
    image: Upload,
) -> Result<String, AppError> {
    if !image.content_type.trim().to_ascii_lowercase().starts_with("image/") {
        return Err(AppError::InvalidInput(format!(
            "Profile photo must be an image (got '{}')",
            image.content_type
        )));
    }

    let photo_url = blobs.upload(BlobBucket::Profile, &image).await?;

    let data_row_id = store.data_row_id(portfolio_id).await?.ok_or_else(|| {
        AppError::NotFound(format!("Could not find portfolio data for {portfolio_id}"))
    })?;

    let written = store.update_photo(data_row_id, &photo_url).await?;
    if written == 0 {
        return Err(AppError::NotFound(format!(
            "Portfolio data row {data_row_id} not found"
        )));
    }

    info!("Updated photo of portfolio {portfolio_id}");
    Ok(photo_url)
}
