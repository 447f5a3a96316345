// Portfolio reads, live status, and the capability-gated photo mutation.

pub mod handlers;
pub mod photo;
