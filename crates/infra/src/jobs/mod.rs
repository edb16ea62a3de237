//! Durable-style job queue for deferred inspection work, with retry,
//! backoff and a dead-letter list.
//!
//! - `Job`: one `InspectionTask` plus attempt bookkeeping
//! - `JobStore`: claimable storage (in-memory here)
//! - `JobExecutor`: runs claimed jobs through per-kind handlers

pub mod executor;
pub mod store;
pub mod types;

pub use executor::{ExecutorStats, JobExecutor, JobExecutorConfig, JobExecutorHandle};
pub use store::{InMemoryJobStore, JobStats, JobStore, JobStoreError};
pub use types::{
    BackoffStrategy, DeadLetterEntry, Job, AttemptRecord, JobId, JobKind, JobResult, JobStatus,
    RetryPolicy,
};
