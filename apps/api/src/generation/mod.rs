// Portfolio generation: accept a résumé, create the PROCESSING record and
// schedule the deduplicated extraction job.

pub mod coordinator;
pub mod handlers;
