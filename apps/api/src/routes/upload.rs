use axum::extract::multipart::MultipartError;
use axum::extract::Multipart;
use axum::http::StatusCode;

use crate::errors::AppError;
use crate::storage::Upload;

/// Reads the named file field from a multipart body.
pub async fn read_upload(multipart: &mut Multipart, field_name: &str) -> Result<Upload, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, "Malformed multipart body"))?
    {
        if field.name() != Some(field_name) {
            continue;
        }

        let file_name = field.file_name().unwrap_or("upload").to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| multipart_error(e, &format!("Failed to read '{field_name}'")))?;

        return Ok(Upload {
            file_name,
            content_type,
            bytes,
        });
    }

    Err(AppError::InvalidInput(format!(
        "Missing multipart field '{field_name}'"
    )))
}

/// Body-limit overruns are reported as 413; anything else is a client formatting error.
fn multipart_error(e: MultipartError, context: &str) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(format!("{context}: upload exceeds the size limit"))
    } else {
        AppError::InvalidInput(format!("{context}: {e}"))
    }
}
