//! `TaskQueue` over the job store, and the job handlers that run inspection
//! tasks through the service.

use std::sync::Arc;

use tracing::debug;

use readiness_events::{EventBus, EventEnvelope};
use readiness_inspection::{
    InspectionEvent, InspectionStore, InspectionTask, ReadinessService, TaskQueue, TaskQueueError,
};

use crate::jobs::{Job, JobExecutor, JobKind, JobResult, JobStore, RetryPolicy};

/// Persists every task as a job with the configured retry policy.
#[derive(Debug, Clone)]
pub struct JobTaskQueue<S> {
    store: S,
    retry_policy: RetryPolicy,
}

impl<S: JobStore> JobTaskQueue<S> {
    pub fn new(store: S, retry_policy: RetryPolicy) -> Self {
        Self {
            store,
            retry_policy,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S: JobStore> TaskQueue for JobTaskQueue<S> {
    fn enqueue(&self, task: InspectionTask) -> Result<(), TaskQueueError> {
        let name = task.name();
        let job = Job::new(task).with_retry_policy(self.retry_policy.clone());
        let job_id = self
            .store
            .enqueue(job)
            .map_err(|e| TaskQueueError::Unavailable(e.to_string()))?;
        debug!(%job_id, task = name, "inspection task queued");
        Ok(())
    }
}

/// Route every job kind to `ReadinessService::run_task`.
pub fn register_inspection_handlers<J, S, B>(
    executor: &mut JobExecutor<J>,
    service: Arc<ReadinessService<S, B>>,
) where
    J: JobStore + 'static,
    S: InspectionStore + 'static,
    B: EventBus<EventEnvelope<InspectionEvent>> + 'static,
{
    for kind in JobKind::ALL {
        let service = service.clone();
        executor.register_handler(kind, move |job| match service.run_task(&job.task) {
            Ok(()) => JobResult::Success,
            Err(e) => JobResult::Failure(e.to_string()),
        });
    }
}

#[cfg(test)]
mod tests {
    use readiness_catalog::{InMemoryCatalog, ProductKind};
    use readiness_core::TenantId;
    use readiness_events::InMemoryEventBus;
    use readiness_inspection::{CheckKind, InMemoryInspectionStore, ReconciliationEngine};

    use super::*;
    use crate::jobs::{InMemoryJobStore, JobStatus};

    #[test]
    fn enqueued_tasks_become_jobs_with_the_policy() {
        let jobs = InMemoryJobStore::arc();
        let queue = JobTaskQueue::new(jobs.clone(), RetryPolicy::no_retry());
        let tenant = TenantId::new();
        let product_id = readiness_catalog::ProductId::new();

        queue
            .enqueue(InspectionTask::Ensure {
                tenant_id: tenant,
                product_id,
            })
            .unwrap();

        let pending = jobs
            .list_by_status(tenant, Some(JobStatus::Pending), 10)
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].kind, JobKind::Ensure);
        assert_eq!(pending[0].retry_policy, RetryPolicy::no_retry());
    }

    #[test]
    fn handlers_run_tasks_through_the_service() {
        let catalog = Arc::new(InMemoryCatalog::new());
        let store = Arc::new(InMemoryInspectionStore::new());
        let bus = Arc::new(InMemoryEventBus::<EventEnvelope<InspectionEvent>>::new());
        let engine = Arc::new(ReconciliationEngine::new(catalog.clone(), store.clone(), bus));
        let jobs = InMemoryJobStore::arc();
        let queue = Arc::new(JobTaskQueue::new(jobs.clone(), RetryPolicy::no_retry()));
        let service = Arc::new(ReadinessService::new(engine, queue.clone()));

        let mut executor = JobExecutor::new(jobs.clone());
        register_inspection_handlers(&mut executor, service.clone());
        assert!(JobKind::ALL.iter().all(|k| executor.has_handler(*k)));

        let tenant = TenantId::new();
        let (product_id, _) = catalog.create_product(tenant, ProductKind::Simple).unwrap();
        queue
            .enqueue(InspectionTask::Ensure {
                tenant_id: tenant,
                product_id,
            })
            .unwrap();
        // A deleted product's task completes as a no-op.
        queue
            .enqueue(InspectionTask::Resync {
                tenant_id: tenant,
                product_id: readiness_catalog::ProductId::new(),
            })
            .unwrap();

        assert_eq!(executor.run_until_idle(Some(tenant)).unwrap(), 2);
        assert_eq!(jobs.stats(tenant).unwrap().completed, 2);

        let summary = service.readiness(tenant, product_id).unwrap().unwrap();
        assert!(summary.flags.has_missing_required);
        assert!(
            summary
                .open_checks
                .iter()
                .any(|c| c.check_kind == CheckKind::HasPrice)
        );
    }
}
