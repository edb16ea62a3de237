//! Job storage: a claimable queue plus a dead-letter list, per tenant.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;

use readiness_core::TenantId;

use super::types::{DeadLetterEntry, Job, JobId, JobStatus};

pub trait JobStore: Send + Sync {
    /// Add a job. If the same task is already pending, that job absorbs this
    /// one and its id is returned.
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError>;

    fn get(&self, tenant_id: TenantId, job_id: JobId) -> Result<Option<Job>, JobStoreError>;

    fn update(&self, job: &Job) -> Result<(), JobStoreError>;

    /// Take the oldest due job (optionally for one tenant) and start an attempt.
    fn claim_next(&self, tenant_id: Option<TenantId>) -> Result<Option<Job>, JobStoreError>;

    /// Jobs of a tenant in enqueue order; `status` matches on the variant only.
    fn list_by_status(
        &self,
        tenant_id: TenantId,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Result<Vec<Job>, JobStoreError>;

    fn dead_letter(&self, job: Job, reason: String) -> Result<(), JobStoreError>;

    fn list_dead_letters(
        &self,
        tenant_id: TenantId,
        limit: usize,
    ) -> Result<Vec<DeadLetterEntry>, JobStoreError>;

    /// Move a dead letter back into the queue with its attempts reset.
    fn retry_dead_letter(&self, tenant_id: TenantId, job_id: JobId) -> Result<Job, JobStoreError>;

    fn stats(&self, tenant_id: TenantId) -> Result<JobStats, JobStoreError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("job {0} belongs to another tenant")]
    TenantIsolation(JobId),
    #[error("job already exists: {0}")]
    AlreadyExists(JobId),
    #[error("job store unavailable: {0}")]
    Storage(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct JobStats {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub dead_lettered: usize,
}

impl JobStats {
    /// Jobs that will still run: pending, running or waiting to retry.
    pub fn outstanding(&self) -> usize {
        self.pending + self.running + self.failed
    }

    fn count(&mut self, status: &JobStatus) {
        match status {
            JobStatus::Pending => self.pending += 1,
            JobStatus::Running => self.running += 1,
            JobStatus::Completed => self.completed += 1,
            JobStatus::Failed { .. } => self.failed += 1,
            JobStatus::DeadLettered { .. } => self.dead_lettered += 1,
        }
    }
}

#[derive(Debug, Default)]
struct Queue {
    jobs: HashMap<JobId, Job>,
    dead: HashMap<JobId, DeadLetterEntry>,
}

impl Queue {
    fn owned(&self, tenant_id: TenantId, job_id: JobId) -> Result<Option<&Job>, JobStoreError> {
        match self.jobs.get(&job_id) {
            Some(job) if job.tenant_id != tenant_id => Err(JobStoreError::TenantIsolation(job_id)),
            found => Ok(found),
        }
    }
}

/// Single-process job store; one lock guards queue and dead letters together.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    inner: RwLock<Queue>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn read<T>(&self, f: impl FnOnce(&Queue) -> Result<T, JobStoreError>) -> Result<T, JobStoreError> {
        let queue = self
            .inner
            .read()
            .map_err(|_| JobStoreError::Storage("lock poisoned".to_string()))?;
        f(&queue)
    }

    fn write<T>(
        &self,
        f: impl FnOnce(&mut Queue) -> Result<T, JobStoreError>,
    ) -> Result<T, JobStoreError> {
        let mut queue = self
            .inner
            .write()
            .map_err(|_| JobStoreError::Storage("lock poisoned".to_string()))?;
        f(&mut queue)
    }
}

impl JobStore for InMemoryJobStore {
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError> {
        self.write(|q| {
            if q.jobs.contains_key(&job.id) {
                return Err(JobStoreError::AlreadyExists(job.id));
            }
            let waiting = q
                .jobs
                .values()
                .find(|j| j.status == JobStatus::Pending && j.task == job.task);
            if let Some(existing) = waiting {
                return Ok(existing.id);
            }
            let id = job.id;
            q.jobs.insert(id, job);
            Ok(id)
        })
    }

    fn get(&self, tenant_id: TenantId, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        self.read(|q| Ok(q.owned(tenant_id, job_id)?.cloned()))
    }

    fn update(&self, job: &Job) -> Result<(), JobStoreError> {
        self.write(|q| {
            let slot = q.jobs.get_mut(&job.id).ok_or(JobStoreError::NotFound(job.id))?;
            *slot = job.clone();
            Ok(())
        })
    }

    fn claim_next(&self, tenant_id: Option<TenantId>) -> Result<Option<Job>, JobStoreError> {
        let now = Utc::now();
        self.write(|q| {
            let Some(job) = q
                .jobs
                .values_mut()
                .filter(|j| j.status.is_claimable() && j.is_due(now))
                .filter(|j| tenant_id.is_none_or(|t| j.tenant_id == t))
                .min_by_key(|j| (j.enqueued_at, j.id))
            else {
                return Ok(None);
            };
            job.begin_attempt();
            Ok(Some(job.clone()))
        })
    }

    fn list_by_status(
        &self,
        tenant_id: TenantId,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Result<Vec<Job>, JobStoreError> {
        let wanted = status.as_ref().map(std::mem::discriminant);
        self.read(|q| {
            let mut jobs: Vec<Job> = q
                .jobs
                .values()
                .filter(|j| j.tenant_id == tenant_id)
                .filter(|j| wanted.is_none_or(|d| std::mem::discriminant(&j.status) == d))
                .cloned()
                .collect();
            jobs.sort_by_key(|j| (j.enqueued_at, j.id));
            jobs.truncate(limit);
            Ok(jobs)
        })
    }

    fn dead_letter(&self, mut job: Job, reason: String) -> Result<(), JobStoreError> {
        self.write(|q| {
            q.jobs.remove(&job.id);
            job.status = JobStatus::DeadLettered {
                error: reason.clone(),
                attempts: job.attempt,
            };
            job.updated_at = Utc::now();
            q.dead.insert(
                job.id,
                DeadLetterEntry {
                    dead_lettered_at: job.updated_at,
                    job,
                    reason,
                },
            );
            Ok(())
        })
    }

    fn list_dead_letters(
        &self,
        tenant_id: TenantId,
        limit: usize,
    ) -> Result<Vec<DeadLetterEntry>, JobStoreError> {
        self.read(|q| {
            let mut entries: Vec<DeadLetterEntry> = q
                .dead
                .values()
                .filter(|e| e.job.tenant_id == tenant_id)
                .cloned()
                .collect();
            entries.sort_by_key(|e| (e.dead_lettered_at, e.job.id));
            entries.truncate(limit);
            Ok(entries)
        })
    }

    fn retry_dead_letter(&self, tenant_id: TenantId, job_id: JobId) -> Result<Job, JobStoreError> {
        self.write(|q| {
            match q.dead.get(&job_id) {
                None => return Err(JobStoreError::NotFound(job_id)),
                Some(e) if e.job.tenant_id != tenant_id => {
                    return Err(JobStoreError::TenantIsolation(job_id));
                }
                Some(_) => {}
            }
            let mut job = q
                .dead
                .remove(&job_id)
                .map(|e| e.job)
                .ok_or(JobStoreError::NotFound(job_id))?;
            job.reset();
            q.jobs.insert(job_id, job.clone());
            Ok(job)
        })
    }

    fn stats(&self, tenant_id: TenantId) -> Result<JobStats, JobStoreError> {
        self.read(|q| {
            let mut stats = JobStats::default();
            q.jobs
                .values()
                .filter(|j| j.tenant_id == tenant_id)
                .for_each(|j| stats.count(&j.status));
            q.dead
                .values()
                .filter(|e| e.job.tenant_id == tenant_id)
                .for_each(|e| stats.count(&e.job.status));
            Ok(stats)
        })
    }
}

impl<S> JobStore for Arc<S>
where
    S: JobStore + ?Sized,
{
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError> {
        (**self).enqueue(job)
    }

    fn get(&self, tenant_id: TenantId, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        (**self).get(tenant_id, job_id)
    }

    fn update(&self, job: &Job) -> Result<(), JobStoreError> {
        (**self).update(job)
    }

    fn claim_next(&self, tenant_id: Option<TenantId>) -> Result<Option<Job>, JobStoreError> {
        (**self).claim_next(tenant_id)
    }

    fn list_by_status(
        &self,
        tenant_id: TenantId,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Result<Vec<Job>, JobStoreError> {
        (**self).list_by_status(tenant_id, status, limit)
    }

    fn dead_letter(&self, job: Job, reason: String) -> Result<(), JobStoreError> {
        (**self).dead_letter(job, reason)
    }

    fn list_dead_letters(
        &self,
        tenant_id: TenantId,
        limit: usize,
    ) -> Result<Vec<DeadLetterEntry>, JobStoreError> {
        (**self).list_dead_letters(tenant_id, limit)
    }

    fn retry_dead_letter(&self, tenant_id: TenantId, job_id: JobId) -> Result<Job, JobStoreError> {
        (**self).retry_dead_letter(tenant_id, job_id)
    }

    fn stats(&self, tenant_id: TenantId) -> Result<JobStats, JobStoreError> {
        (**self).stats(tenant_id)
    }
}

#[cfg(test)]
mod tests {
    use readiness_catalog::ProductId;
    use readiness_inspection::{CheckKind, InspectionTask};

    use super::*;

    fn ensure(tenant_id: TenantId) -> Job {
        Job::new(InspectionTask::Ensure {
            tenant_id,
            product_id: ProductId::new(),
        })
    }

    #[test]
    fn claims_in_enqueue_order() {
        let store = InMemoryJobStore::new();
        let tenant = TenantId::new();

        let first = store.enqueue(ensure(tenant)).unwrap();
        let second = store.enqueue(ensure(tenant)).unwrap();

        let claimed = store.claim_next(Some(tenant)).unwrap().unwrap();
        assert_eq!(claimed.id, first);
        assert_eq!(claimed.status, JobStatus::Running);
        assert_eq!(claimed.attempt, 1);

        assert_eq!(store.claim_next(Some(tenant)).unwrap().unwrap().id, second);
        assert!(store.claim_next(Some(tenant)).unwrap().is_none());
    }

    #[test]
    fn identical_pending_tasks_coalesce() {
        let store = InMemoryJobStore::new();
        let tenant = TenantId::new();
        let task = InspectionTask::Reevaluate {
            tenant_id: tenant,
            product_id: ProductId::new(),
            checks: [CheckKind::HasImages].into_iter().collect(),
        };

        let first = store.enqueue(Job::new(task.clone())).unwrap();
        assert_eq!(store.enqueue(Job::new(task.clone())).unwrap(), first);
        assert_eq!(store.stats(tenant).unwrap().pending, 1);

        // A running copy may already have read stale data, so a new one queues.
        store.claim_next(Some(tenant)).unwrap();
        assert_ne!(store.enqueue(Job::new(task)).unwrap(), first);
    }

    #[test]
    fn tenants_cannot_see_each_others_jobs() {
        let store = InMemoryJobStore::new();
        let owner = TenantId::new();
        let other = TenantId::new();

        let job_id = store.enqueue(ensure(owner)).unwrap();

        assert!(matches!(
            store.get(other, job_id),
            Err(JobStoreError::TenantIsolation(id)) if id == job_id
        ));
        assert!(store.claim_next(Some(other)).unwrap().is_none());
        assert!(store.claim_next(None).unwrap().is_some());
    }

    #[test]
    fn dead_letters_can_be_requeued() {
        let store = InMemoryJobStore::new();
        let tenant = TenantId::new();
        let job_id = store.enqueue(ensure(tenant)).unwrap();

        let mut claimed = store.claim_next(Some(tenant)).unwrap().unwrap();
        claimed.fail("store unavailable".to_string(), Utc::now());
        store
            .dead_letter(claimed, "max attempts reached".to_string())
            .unwrap();

        assert!(store.get(tenant, job_id).unwrap().is_none());
        let dead = store.list_dead_letters(tenant, 10).unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].job.id, job_id);
        assert_eq!(store.stats(tenant).unwrap().dead_lettered, 1);

        assert!(matches!(
            store.retry_dead_letter(TenantId::new(), job_id),
            Err(JobStoreError::TenantIsolation(_))
        ));

        let requeued = store.retry_dead_letter(tenant, job_id).unwrap();
        assert_eq!(requeued.status, JobStatus::Pending);
        assert_eq!(requeued.attempt, 0);
        assert!(store.list_dead_letters(tenant, 10).unwrap().is_empty());
        assert_eq!(store.claim_next(Some(tenant)).unwrap().unwrap().id, job_id);
    }

    #[test]
    fn stats_and_status_listing() {
        let store = InMemoryJobStore::new();
        let tenant = TenantId::new();

        for _ in 0..5 {
            store.enqueue(ensure(tenant)).unwrap();
        }
        store.claim_next(Some(tenant)).unwrap();
        store.claim_next(Some(tenant)).unwrap();

        let stats = store.stats(tenant).unwrap();
        assert_eq!((stats.pending, stats.running), (3, 2));
        assert_eq!(stats.outstanding(), 5);

        let running = store
            .list_by_status(tenant, Some(JobStatus::Running), 10)
            .unwrap();
        assert_eq!(running.len(), 2);
        assert_eq!(store.list_by_status(tenant, None, 4).unwrap().len(), 4);
    }
}
