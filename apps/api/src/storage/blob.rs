//! Blob store: opaque `upload(bytes) → url` over S3-compatible object storage.

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;

/// A file received from a client, ready to be stored.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

/// Logical destination of an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobBucket {
    Resume,
    Profile,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores the upload and returns its public URL.
    async fn upload(&self, bucket: BlobBucket, upload: &Upload) -> Result<String, AppError>;
}

/// S3 / MinIO backed blob store with publicly readable objects.
pub struct S3BlobStore {
    client: aws_sdk_s3::Client,
    resume_bucket: String,
    profile_bucket: String,
    public_url: String,
}

impl S3BlobStore {
    pub fn new(
        client: aws_sdk_s3::Client,
        resume_bucket: String,
        profile_bucket: String,
        public_url: String,
    ) -> Self {
        Self {
            client,
            resume_bucket,
            profile_bucket,
            public_url: public_url.trim_end_matches('/').to_string(),
        }
    }

    fn bucket_name(&self, bucket: BlobBucket) -> &str {
        match bucket {
            BlobBucket::Resume => &self.resume_bucket,
            BlobBucket::Profile => &self.profile_bucket,
        }
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn upload(&self, bucket: BlobBucket, upload: &Upload) -> Result<String, AppError> {
        let bucket_name = self.bucket_name(bucket);
        let key = object_key(&upload.file_name, Utc::now().timestamp_millis(), Uuid::new_v4());

        self.client
            .put_object()
            .bucket(bucket_name)
            .key(&key)
            .body(ByteStream::from(upload.bytes.clone()))
            .content_type(&upload.content_type)
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("S3 upload failed: {e}")))?;

        info!("Uploaded {} bytes to s3://{}/{}", upload.bytes.len(), bucket_name, key);

        Ok(public_object_url(&self.public_url, bucket_name, &key))
    }
}

/// Builds a unique object key: `<unix millis>-<nonce>-<file name>`.
///
/// The nonce keeps concurrent uploads of the same file name apart. The name
/// is reduced to URL-unreserved characters so the key is a single, literal
/// path segment of the public URL.
pub fn object_key(file_name: &str, millis: i64, nonce: Uuid) -> String {
    let cleaned: String = file_name
        .trim()
        .chars()
        .map(|c| match c {
            c if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '~') => c,
            _ => '_',
        })
        .collect();
    let cleaned = if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    };
    format!("{millis}-{}-{cleaned}", nonce.simple())
}

pub fn public_object_url(public_url: &str, bucket: &str, key: &str) -> String {
    format!("{}/{}/{}", public_url.trim_end_matches('/'), bucket, key)
}
