//! Runs claimed jobs through per-kind handlers on a background thread.

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, error, info, warn};

use readiness_core::TenantId;

use super::store::{JobStore, JobStoreError};
use super::types::{Job, JobKind, JobResult, JobStatus};

pub type JobHandler = Box<dyn Fn(&Job) -> JobResult + Send + Sync>;

#[derive(Debug, Clone)]
pub struct JobExecutorConfig {
    /// Sleep between polls of an empty queue.
    pub poll_interval: Duration,
    /// Thread name, also used as the log field.
    pub name: String,
    pub tenant_id: Option<TenantId>,
}

impl Default for JobExecutorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            name: "inspection-jobs".to_string(),
            tenant_id: None,
        }
    }
}

impl JobExecutorConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_tenant(mut self, tenant_id: Option<TenantId>) -> Self {
        self.tenant_id = tenant_id;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct ExecutorStats {
    pub jobs_processed: u64,
    pub jobs_succeeded: u64,
    pub jobs_failed: u64,
    pub jobs_dead_lettered: u64,
    pub uptime_secs: u64,
}

impl ExecutorStats {
    fn record(&mut self, job: &Job) {
        self.jobs_processed += 1;
        match job.status {
            JobStatus::Completed => self.jobs_succeeded += 1,
            JobStatus::DeadLettered { .. } => {
                self.jobs_failed += 1;
                self.jobs_dead_lettered += 1;
            }
            _ => self.jobs_failed += 1,
        }
    }
}

#[derive(Debug)]
pub struct JobExecutorHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
    stats: Arc<Mutex<ExecutorStats>>,
}

impl JobExecutorHandle {
    /// Stop claiming and wait for the job in flight.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }

    pub fn stats(&self) -> ExecutorStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

pub struct JobExecutor<S: JobStore> {
    store: S,
    handlers: HashMap<JobKind, JobHandler>,
}

impl<S: JobStore + 'static> JobExecutor<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            handlers: HashMap::new(),
        }
    }

    pub fn register_handler<F>(&mut self, kind: JobKind, handler: F)
    where
        F: Fn(&Job) -> JobResult + Send + Sync + 'static,
    {
        self.handlers.insert(kind, Box::new(handler));
    }

    pub fn has_handler(&self, kind: JobKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Run a job that was claimed from the store, then write the outcome back:
    /// completed, scheduled for retry, or moved to the dead-letter list.
    pub fn execute_one(&self, job: &mut Job) -> Result<(), String> {
        let started = Utc::now();
        let outcome = match self.handlers.get(&job.kind) {
            Some(handler) => handler(job),
            None => JobResult::Failure(format!("no handler for {:?} jobs", job.kind)),
        };

        let error = match outcome {
            JobResult::Success => {
                job.complete(started);
                self.store.update(job).map_err(|e| e.to_string())?;
                debug!(job_id = %job.id, task = job.task.name(), "job completed");
                return Ok(());
            }
            JobResult::Failure(error) => error,
        };

        job.fail(error.clone(), started);
        let stored = if matches!(job.status, JobStatus::DeadLettered { .. }) {
            warn!(
                job_id = %job.id,
                task = job.task.name(),
                product_id = %job.task.product_id(),
                attempts = job.attempt,
                error = %error,
                "job dead-lettered"
            );
            self.store.dead_letter(job.clone(), error.clone())
        } else {
            self.store.update(job)
        };
        stored.map_err(|e| e.to_string())?;
        Err(error)
    }

    /// Drive the queue on the calling thread until no job is due; returns the
    /// number of jobs run.
    pub fn run_until_idle(&self, tenant_id: Option<TenantId>) -> Result<usize, JobStoreError> {
        let mut ran = 0;
        while let Some(mut job) = self.store.claim_next(tenant_id)? {
            if let Err(e) = self.execute_one(&mut job) {
                debug!(job_id = %job.id, error = %e, status = ?job.status, "job failed");
            }
            ran += 1;
        }
        Ok(ran)
    }

    pub fn spawn(self, config: JobExecutorConfig) -> io::Result<JobExecutorHandle>
    where
        S: Send,
    {
        let (shutdown, shutdown_rx) = mpsc::channel::<()>();
        let stats = Arc::new(Mutex::new(ExecutorStats::default()));
        let shared = stats.clone();

        let join = thread::Builder::new()
            .name(config.name.clone())
            .spawn(move || self.poll(config, shutdown_rx, shared))?;

        Ok(JobExecutorHandle {
            shutdown,
            join: Some(join),
            stats,
        })
    }

    fn poll(
        self,
        config: JobExecutorConfig,
        shutdown: mpsc::Receiver<()>,
        stats: Arc<Mutex<ExecutorStats>>,
    ) {
        info!(executor = %config.name, "job executor started");
        let started = Instant::now();

        loop {
            let claimed = self.store.claim_next(config.tenant_id);
            let idle = match claimed {
                Ok(Some(mut job)) => {
                    debug!(
                        executor = %config.name,
                        job_id = %job.id,
                        task = job.task.name(),
                        attempt = job.attempt,
                        "claimed job"
                    );
                    let _ = self.execute_one(&mut job);
                    if let Ok(mut s) = stats.lock() {
                        s.record(&job);
                    }
                    false
                }
                Ok(None) => true,
                Err(e) => {
                    error!(executor = %config.name, error = %e, "failed to claim job");
                    true
                }
            };

            if let Ok(mut s) = stats.lock() {
                s.uptime_secs = started.elapsed().as_secs();
            }

            // Sleeping on the shutdown channel wakes up as soon as shutdown is asked.
            let wait = if idle { config.poll_interval } else { Duration::ZERO };
            match shutdown.recv_timeout(wait) {
                Err(mpsc::RecvTimeoutError::Timeout) => continue,
                Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }

        info!(executor = %config.name, "job executor stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use readiness_catalog::ProductId;
    use readiness_inspection::InspectionTask;

    use super::*;
    use crate::jobs::store::InMemoryJobStore;
    use crate::jobs::types::RetryPolicy;

    fn resync(tenant_id: TenantId) -> Job {
        Job::new(InspectionTask::Resync {
            tenant_id,
            product_id: ProductId::new(),
        })
    }

    #[test]
    fn successful_job_completes() {
        let store = InMemoryJobStore::arc();
        let mut executor = JobExecutor::new(store.clone());
        executor.register_handler(JobKind::Resync, |_job| JobResult::Success);

        let tenant = TenantId::new();
        store.enqueue(resync(tenant)).unwrap();

        let mut claimed = store.claim_next(Some(tenant)).unwrap().unwrap();
        assert!(executor.execute_one(&mut claimed).is_ok());
        assert_eq!(claimed.status, JobStatus::Completed);
        assert_eq!(store.stats(tenant).unwrap().completed, 1);
    }

    #[test]
    fn failing_job_retries_then_dead_letters() {
        let store = InMemoryJobStore::arc();
        let mut executor = JobExecutor::new(store.clone());
        executor.register_handler(JobKind::Resync, |_job| {
            JobResult::Failure("store unavailable".to_string())
        });

        let tenant = TenantId::new();
        store
            .enqueue(resync(tenant).with_retry_policy(RetryPolicy::fixed(2, Duration::ZERO)))
            .unwrap();

        let mut claimed = store.claim_next(Some(tenant)).unwrap().unwrap();
        assert!(executor.execute_one(&mut claimed).is_err());
        assert!(matches!(claimed.status, JobStatus::Failed { .. }));

        let mut claimed = store.claim_next(Some(tenant)).unwrap().unwrap();
        assert!(executor.execute_one(&mut claimed).is_err());
        assert!(matches!(claimed.status, JobStatus::DeadLettered { .. }));

        assert_eq!(store.list_dead_letters(tenant, 10).unwrap().len(), 1);
        assert!(store.claim_next(Some(tenant)).unwrap().is_none());
    }

    #[test]
    fn missing_handler_fails_the_job() {
        let store = InMemoryJobStore::arc();
        let executor = JobExecutor::new(store.clone());
        let tenant = TenantId::new();
        store
            .enqueue(resync(tenant).with_retry_policy(RetryPolicy::no_retry()))
            .unwrap();

        let mut claimed = store.claim_next(Some(tenant)).unwrap().unwrap();
        let err = executor.execute_one(&mut claimed).unwrap_err();
        assert!(err.contains("no handler"));
        assert_eq!(store.stats(tenant).unwrap().dead_lettered, 1);
    }

    #[test]
    fn run_until_idle_drains_due_jobs() {
        let store = InMemoryJobStore::arc();
        let mut executor = JobExecutor::new(store.clone());
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        executor.register_handler(JobKind::Resync, move |_job| {
            counter.fetch_add(1, Ordering::SeqCst);
            JobResult::Success
        });

        let tenant = TenantId::new();
        for _ in 0..3 {
            store.enqueue(resync(tenant)).unwrap();
        }

        assert_eq!(executor.run_until_idle(Some(tenant)).unwrap(), 3);
        assert_eq!(runs.load(Ordering::SeqCst), 3);
        assert_eq!(executor.run_until_idle(Some(tenant)).unwrap(), 0);
    }

    #[test]
    fn spawned_executor_processes_and_shuts_down() {
        let store = InMemoryJobStore::arc();
        let mut executor = JobExecutor::new(store.clone());
        executor.register_handler(JobKind::Resync, |_job| JobResult::Success);

        let tenant = TenantId::new();
        store.enqueue(resync(tenant)).unwrap();

        let handle = executor
            .spawn(JobExecutorConfig::default().with_poll_interval(Duration::from_millis(5)))
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while handle.stats().jobs_succeeded < 1 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(handle.stats().jobs_succeeded, 1);
        handle.shutdown();
    }
}
