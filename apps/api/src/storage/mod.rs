// Persistence seams: blob uploads (S3 / MinIO) and the portfolio record store (Postgres).
// Both are traits so the pipeline can run against in-memory doubles in tests.

pub mod blob;
pub mod records;

pub use blob::{BlobBucket, BlobStore, S3BlobStore, Upload};
pub use records::{PgPortfolioStore, PortfolioStore};
