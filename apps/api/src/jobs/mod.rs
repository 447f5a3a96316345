// Background extraction jobs: the deduplicating queue contract, its Redis backend,
// and the worker-facing completion protocol.

pub mod handlers;
pub mod queue;
pub mod redis_queue;
pub mod worker;

pub use queue::{job_key, EnqueueOutcome, FailOutcome, Job, JobOptions, JobPayload, JobQueue};
pub use redis_queue::RedisJobQueue;
