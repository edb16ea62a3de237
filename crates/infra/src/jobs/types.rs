//! Jobs: an inspection task plus the bookkeeping needed to retry it.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use readiness_core::TenantId;
use readiness_inspection::InspectionTask;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

/// Handler routing key; one per `InspectionTask` variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Ensure,
    Reevaluate,
    Resync,
    Propagate,
}

impl JobKind {
    pub const ALL: [JobKind; 4] = [
        JobKind::Ensure,
        JobKind::Reevaluate,
        JobKind::Resync,
        JobKind::Propagate,
    ];

    pub fn of(task: &InspectionTask) -> Self {
        match task {
            InspectionTask::Ensure { .. } => JobKind::Ensure,
            InspectionTask::Reevaluate { .. } => JobKind::Reevaluate,
            InspectionTask::Resync { .. } => JobKind::Resync,
            InspectionTask::Propagate { .. } => JobKind::Propagate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    /// Last attempt failed; waiting for the backoff to elapse.
    Failed { error: String, attempt: u32 },
    DeadLettered { error: String, attempts: u32 },
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::DeadLettered { .. })
    }

    pub fn is_claimable(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Failed { .. })
    }
}

/// Delay growth between attempts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    Fixed,
    Linear,
    #[default]
    Exponential,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Attempts in total, first run included.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub strategy: BackoffStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential(5, Duration::from_millis(500), Duration::from_secs(60))
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self::fixed(1, Duration::ZERO)
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            max_delay: delay,
            strategy: BackoffStrategy::Fixed,
        }
    }

    pub fn linear(max_attempts: u32, step: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: step,
            max_delay,
            strategy: BackoffStrategy::Linear,
        }
    }

    pub fn exponential(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            strategy: BackoffStrategy::Exponential,
        }
    }

    /// Wait after the `failed`-th failed attempt (1-based), capped at `max_delay`.
    pub fn backoff(&self, failed: u32) -> Duration {
        let step = match (self.strategy, failed) {
            (_, 0) => return Duration::ZERO,
            (BackoffStrategy::Fixed, _) => self.base_delay,
            (BackoffStrategy::Linear, n) => self.base_delay.saturating_mul(n),
            (BackoffStrategy::Exponential, n) => {
                self.base_delay.saturating_mul(2_u32.saturating_pow(n - 1))
            }
        };
        step.min(self.max_delay)
    }

    pub fn allows_another(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub tenant_id: TenantId,
    pub kind: JobKind,
    pub task: InspectionTask,
    pub status: JobStatus,
    pub retry_policy: RetryPolicy,
    /// Attempts started so far.
    pub attempt: u32,
    pub enqueued_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Backoff: not claimable before this instant.
    pub not_before: Option<DateTime<Utc>>,
    pub attempts: Vec<AttemptRecord>,
}

impl Job {
    pub fn new(task: InspectionTask) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            tenant_id: task.tenant_id(),
            kind: JobKind::of(&task),
            task,
            status: JobStatus::Pending,
            retry_policy: RetryPolicy::default(),
            attempt: 0,
            enqueued_at: now,
            updated_at: now,
            not_before: None,
            attempts: Vec::new(),
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.not_before.is_none_or(|at| now >= at)
    }

    pub fn begin_attempt(&mut self) {
        self.attempt += 1;
        self.status = JobStatus::Running;
        self.updated_at = Utc::now();
    }

    pub fn complete(&mut self, started_at: DateTime<Utc>) {
        self.finish_attempt(started_at, None);
        self.status = JobStatus::Completed;
        self.not_before = None;
    }

    /// Record a failed attempt. Schedules a retry while the policy allows one,
    /// otherwise the job ends dead-lettered.
    pub fn fail(&mut self, error: String, started_at: DateTime<Utc>) {
        let now = self.finish_attempt(started_at, Some(error.clone()));
        let attempt = self.attempt;

        self.status = if self.retry_policy.allows_another(attempt) {
            let wait = chrono::Duration::from_std(self.retry_policy.backoff(attempt))
                .unwrap_or(chrono::Duration::zero());
            self.not_before = Some(now + wait);
            JobStatus::Failed { error, attempt }
        } else {
            self.not_before = None;
            JobStatus::DeadLettered {
                error,
                attempts: attempt,
            }
        };
    }

    /// Fresh start after being pulled out of the dead-letter list.
    pub fn reset(&mut self) {
        self.status = JobStatus::Pending;
        self.attempt = 0;
        self.not_before = None;
        self.attempts.clear();
        self.updated_at = Utc::now();
    }

    fn finish_attempt(&mut self, started_at: DateTime<Utc>, error: Option<String>) -> DateTime<Utc> {
        let now = Utc::now();
        self.attempts.push(AttemptRecord {
            attempt: self.attempt,
            started_at,
            finished_at: now,
            error,
        });
        self.updated_at = now;
        now
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobResult {
    Success,
    Failure(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub job: Job,
    pub dead_lettered_at: DateTime<Utc>,
    pub reason: String,
}
