//! Single-process wiring: catalog, inspection store, buses, engine, service,
//! job queue/executor and the bus workers.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::info;

use readiness_catalog::{CatalogChange, CatalogReader};
use readiness_core::TenantId;
use readiness_events::{EventBus, EventEnvelope, InMemoryBusError, InMemoryEventBus, Subscription};
use readiness_inspection::{
    ExecutionMode, InMemoryInspectionStore, InspectionEvent, ReadinessService, ReconciliationEngine,
};

use crate::config::ReadinessConfig;
use crate::jobs::{
    InMemoryJobStore, JobExecutor, JobExecutorHandle, JobStats, JobStore, JobStoreError,
};
use crate::task_queue::{JobTaskQueue, register_inspection_handlers};
use crate::workers::{
    WorkerHandle, catalog_envelope, spawn_catalog_change_worker, spawn_readiness_feedback_worker,
};

pub type SharedInspectionStore = Arc<InMemoryInspectionStore>;
pub type InspectionEventBus = Arc<InMemoryEventBus<EventEnvelope<InspectionEvent>>>;
pub type CatalogChangeBus = Arc<InMemoryEventBus<EventEnvelope<CatalogChange>>>;
pub type RuntimeService = ReadinessService<SharedInspectionStore, InspectionEventBus>;

pub struct ReadinessRuntime {
    config: ReadinessConfig,
    service: Arc<RuntimeService>,
    changes: CatalogChangeBus,
    events: InspectionEventBus,
    jobs: Arc<InMemoryJobStore>,
    sequence: AtomicU64,
    workers: Vec<WorkerHandle>,
    executor: Option<JobExecutorHandle>,
}

impl ReadinessRuntime {
    pub fn start(config: ReadinessConfig, catalog: Arc<dyn CatalogReader>) -> io::Result<Self> {
        let store: SharedInspectionStore = Arc::new(InMemoryInspectionStore::new());
        let events: InspectionEventBus = Arc::new(InMemoryEventBus::new());
        let changes: CatalogChangeBus = Arc::new(InMemoryEventBus::new());
        let jobs = InMemoryJobStore::arc();

        let queue = Arc::new(JobTaskQueue::new(jobs.clone(), config.retry_policy()));
        let engine = Arc::new(ReconciliationEngine::new(catalog, store, events.clone()));
        let service = Arc::new(ReadinessService::new(engine, queue));

        let mut executor = JobExecutor::new(jobs.clone());
        register_inspection_handlers(&mut executor, service.clone());
        let executor = executor.spawn(config.executor_config())?;

        let mut workers = vec![spawn_catalog_change_worker(
            &changes,
            config.tenant,
            service.clone(),
            config.execution_mode,
        )?];
        if config.execution_mode == ExecutionMode::Deferred {
            workers.push(spawn_readiness_feedback_worker(
                &events,
                config.tenant,
                service.clone(),
            )?);
        }

        info!(
            mode = %config.execution_mode,
            tenant = ?config.tenant,
            workers = workers.len(),
            "readiness runtime started"
        );

        Ok(Self {
            config,
            service,
            changes,
            events,
            jobs,
            sequence: AtomicU64::new(0),
            workers,
            executor: Some(executor),
        })
    }

    pub fn config(&self) -> &ReadinessConfig {
        &self.config
    }

    pub fn service(&self) -> &Arc<RuntimeService> {
        &self.service
    }

    pub fn changes(&self) -> &CatalogChangeBus {
        &self.changes
    }

    pub fn subscribe_events(&self) -> Subscription<EventEnvelope<InspectionEvent>> {
        self.events.subscribe()
    }

    pub fn jobs(&self) -> &Arc<InMemoryJobStore> {
        &self.jobs
    }

    /// Publish a change on the catalog change bus for the workers to pick up.
    pub fn publish_change(
        &self,
        tenant_id: TenantId,
        change: CatalogChange,
    ) -> Result<(), InMemoryBusError> {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        self.changes
            .publish(catalog_envelope(tenant_id, sequence, change))
    }

    pub fn job_stats(&self, tenant_id: TenantId) -> Result<JobStats, JobStoreError> {
        self.jobs.stats(tenant_id)
    }

    /// Stop the workers, then the executor, waiting for in-flight work.
    pub fn shutdown(mut self) {
        for worker in self.workers.drain(..) {
            worker.shutdown();
        }
        if let Some(executor) = self.executor.take() {
            executor.shutdown();
        }
        info!("readiness runtime stopped");
    }
}
