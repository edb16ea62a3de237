use std::collections::BTreeSet;
use std::io::{BufRead, Write};
use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;
use tracing::{debug, info, warn};

use readiness_catalog::{CatalogChange, CatalogReader, ProductId};
use readiness_core::TenantId;
use readiness_events::{EventBus, EventEnvelope, InMemoryEventBus, Subscription};
use readiness_infra::jobs::{InMemoryJobStore, JobExecutor, JobStats, JobStore};
use readiness_infra::workers::readiness_change;
use readiness_infra::{JobTaskQueue, ReadinessConfig, register_inspection_handlers};
use readiness_inspection::{
    ExecutionMode, InMemoryInspectionStore, InspectionEvent, ReadinessService,
    ReadinessSummary, ReconciliationEngine,
};

type Store = Arc<InMemoryInspectionStore>;
type Bus = Arc<InMemoryEventBus<EventEnvelope<InspectionEvent>>>;

/// Counters for one replay run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplayReport {
    pub changes: usize,
    pub skipped_lines: usize,
    pub failed_changes: usize,
    pub jobs_run: usize,
    pub feedback_rounds: usize,
    pub dead_letters: usize,
}

/// Runs changes on the calling thread; deferred jobs and readiness feedback
/// are driven until nothing is left to do.
pub struct Replayer {
    mode: ExecutionMode,
    tenant: Option<TenantId>,
    service: Arc<ReadinessService<Store, Bus>>,
    executor: JobExecutor<Arc<InMemoryJobStore>>,
    jobs: Arc<InMemoryJobStore>,
    events: Subscription<EventEnvelope<InspectionEvent>>,
    touched: BTreeSet<(TenantId, ProductId)>,
    report: ReplayReport,
}

impl Replayer {
    pub fn new(config: &ReadinessConfig, catalog: Arc<dyn CatalogReader>) -> Self {
        let store: Store = Arc::new(InMemoryInspectionStore::new());
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let events = bus.subscribe();
        let jobs = InMemoryJobStore::arc();

        let queue = Arc::new(JobTaskQueue::new(jobs.clone(), config.retry_policy()));
        let engine = Arc::new(ReconciliationEngine::new(catalog, store, bus));
        let service = Arc::new(ReadinessService::new(engine, queue));

        let mut executor = JobExecutor::new(jobs.clone());
        register_inspection_handlers(&mut executor, service.clone());

        Self {
            mode: config.execution_mode,
            tenant: config.tenant,
            service,
            executor,
            jobs,
            events,
            touched: BTreeSet::new(),
            report: ReplayReport::default(),
        }
    }

    pub fn service(&self) -> &Arc<ReadinessService<Store, Bus>> {
        &self.service
    }

    /// Inspect products that exist before the first replayed change: ensure
    /// each inspection, then re-check ancestors once every component has one.
    pub fn bootstrap(
        &mut self,
        products: impl IntoIterator<Item = (TenantId, ProductId)>,
    ) -> anyhow::Result<usize> {
        let products: Vec<_> = products
            .into_iter()
            .filter(|(tenant_id, _)| self.tenant.is_none_or(|t| t == *tenant_id))
            .collect();

        for (tenant_id, product_id) in &products {
            let created = CatalogChange::ProductCreated {
                product_id: *product_id,
            };
            self.service
                .handle(*tenant_id, &created, self.mode)
                .with_context(|| format!("inspecting snapshot product {product_id}"))?;
            self.touched.insert((*tenant_id, *product_id));
        }
        self.settle()?;

        for (tenant_id, product_id) in &products {
            let changed = CatalogChange::ReadinessChanged {
                product_id: *product_id,
            };
            self.service
                .handle(*tenant_id, &changed, self.mode)
                .with_context(|| format!("re-checking ancestors of {product_id}"))?;
        }
        self.settle()?;

        info!(products = products.len(), "snapshot products inspected");
        Ok(products.len())
    }

    /// Handle one change and settle everything it caused.
    pub fn apply(&mut self, envelope: &EventEnvelope<CatalogChange>) -> anyhow::Result<()> {
        let tenant_id = envelope.tenant_id();
        if self.tenant.is_some_and(|t| t != tenant_id) {
            debug!(%tenant_id, "skipping change for another tenant");
            return Ok(());
        }
        let change = envelope.payload();
        self.report.changes += 1;

        let report = match self.service.handle(tenant_id, change, self.mode) {
            Ok(report) => report,
            Err(e) => {
                self.report.failed_changes += 1;
                warn!(%tenant_id, change = change.name(), error = %e, "change failed");
                return Ok(());
            }
        };
        if let Some(product_id) = change.subject() {
            self.touched.insert((tenant_id, product_id));
        }
        self.touched
            .extend(report.reevaluated.iter().map(|(p, _)| (tenant_id, *p)));

        self.settle()
    }

    /// Run queued jobs and feed required-readiness flips back until quiet.
    fn settle(&mut self) -> anyhow::Result<()> {
        loop {
            self.report.jobs_run += self
                .executor
                .run_until_idle(self.tenant)
                .context("running inspection jobs")?;

            let mut fed_back = false;
            for envelope in self.events.drain() {
                let event = envelope.payload();
                self.touched.insert((envelope.tenant_id(), event.product_id()));
                if self.mode == ExecutionMode::Inline {
                    continue;
                }
                if let Some(change) = readiness_change(event) {
                    self.service
                        .handle(envelope.tenant_id(), &change, ExecutionMode::Deferred)
                        .context("feeding readiness flip back")?;
                    fed_back = true;
                }
            }

            if !fed_back {
                return Ok(());
            }
            self.report.feedback_rounds += 1;
        }
    }

    /// Read JSON lines until EOF. Blank lines are ignored; unparsable lines
    /// are logged and counted.
    pub fn replay(&mut self, input: impl BufRead) -> anyhow::Result<()> {
        for (n, line) in input.lines().enumerate() {
            let line = line.context("reading change stream")?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<EventEnvelope<CatalogChange>>(&line) {
                Ok(envelope) => self.apply(&envelope)?,
                Err(e) => {
                    self.report.skipped_lines += 1;
                    warn!(line = n + 1, error = %e, "skipping malformed change");
                }
            }
        }
        Ok(())
    }

    /// Current readiness of every product the replay touched that still has
    /// an inspection.
    pub fn summaries(&self) -> anyhow::Result<Vec<ReadinessSummary>> {
        let mut summaries = Vec::new();
        for (tenant_id, product_id) in &self.touched {
            if let Some(summary) = self.service.readiness(*tenant_id, *product_id)? {
                summaries.push(summary);
            }
        }
        Ok(summaries)
    }

    pub fn write_summaries(&self, mut out: impl Write) -> anyhow::Result<()> {
        for summary in self.summaries()? {
            serde_json::to_writer(&mut out, &summary)?;
            out.write_all(b"\n")?;
        }
        out.flush()?;
        Ok(())
    }

    pub fn job_stats(&self) -> anyhow::Result<JobStats> {
        let mut total = JobStats::default();
        let tenants: BTreeSet<TenantId> = self.touched.iter().map(|(t, _)| *t).collect();
        for tenant_id in tenants {
            let stats = self.jobs.stats(tenant_id)?;
            total.pending += stats.pending;
            total.running += stats.running;
            total.completed += stats.completed;
            total.failed += stats.failed;
            total.dead_lettered += stats.dead_lettered;
        }
        Ok(total)
    }

    pub fn finish(mut self) -> anyhow::Result<ReplayReport> {
        self.report.dead_letters = self.job_stats()?.dead_lettered;
        info!(
            changes = self.report.changes,
            skipped = self.report.skipped_lines,
            failed = self.report.failed_changes,
            jobs = self.report.jobs_run,
            feedback_rounds = self.report.feedback_rounds,
            "replay finished"
        );
        Ok(self.report)
    }
}
