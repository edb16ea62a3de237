//! Entry point for catalog changes and deferred tasks.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use readiness_catalog::{CatalogChange, ProductId};
use readiness_core::TenantId;
use readiness_events::{EventBus, EventEnvelope};

use crate::dispatch::{EventDispatch, StandardDispatch};
use crate::engine::ReconciliationEngine;
use crate::error::InspectionError;
use crate::events::InspectionEvent;
use crate::propagate::{ExecutionMode, InvalidationPropagator, PropagationReport};
use crate::record::ReadinessFlags;
use crate::rules::{Applicability, CheckKind, CheckSet};
use crate::store::InspectionStore;
use crate::tasks::{InspectionTask, TaskQueue};

/// A check that is currently not passing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenCheck {
    pub check_kind: CheckKind,
    pub applicability: Applicability,
    pub reason: Option<String>,
}

/// What downstream eligibility checks read about a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessSummary {
    pub product_id: ProductId,
    #[serde(flatten)]
    pub flags: ReadinessFlags,
    pub open_checks: Vec<OpenCheck>,
}

impl ReadinessSummary {
    pub fn is_publishable(&self) -> bool {
        !self.flags.has_missing_required
    }
}

pub struct ReadinessService<S, B> {
    engine: Arc<ReconciliationEngine<S, B>>,
    propagator: InvalidationPropagator<S, B>,
    dispatch: Arc<dyn EventDispatch>,
    queue: Arc<dyn TaskQueue>,
}

impl<S, B> ReadinessService<S, B>
where
    S: InspectionStore,
    B: EventBus<EventEnvelope<InspectionEvent>>,
{
    pub fn new(engine: Arc<ReconciliationEngine<S, B>>, queue: Arc<dyn TaskQueue>) -> Self {
        let dispatch = Arc::new(StandardDispatch::new(engine.catalog().clone()));
        Self {
            propagator: InvalidationPropagator::new(engine.clone(), queue.clone()),
            engine,
            dispatch,
            queue,
        }
    }

    pub fn with_dispatch(mut self, dispatch: Arc<dyn EventDispatch>) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub fn engine(&self) -> &Arc<ReconciliationEngine<S, B>> {
        &self.engine
    }

    pub fn propagator(&self) -> &InvalidationPropagator<S, B> {
        &self.propagator
    }

    /// React to one catalog mutation: lifecycle first, then invalidation.
    pub fn handle(
        &self,
        tenant_id: TenantId,
        change: &CatalogChange,
        mode: ExecutionMode,
    ) -> Result<PropagationReport, InspectionError> {
        let mut report = PropagationReport::default();
        match change {
            CatalogChange::ProductCreated { product_id }
            | CatalogChange::ProductKindChanged { product_id } => {
                self.ensure(tenant_id, *product_id, mode, &mut report)?;
            }
            CatalogChange::ProductDeleted { product_id, .. } => {
                self.engine.forget(tenant_id, *product_id)?;
            }
            _ => {}
        }

        for invalidation in self.dispatch.on_entity_changed(tenant_id, change)? {
            report.merge(self.propagator.propagate(
                tenant_id,
                invalidation.product_id,
                &invalidation.checks,
                mode,
            )?);
        }
        debug!(
            %tenant_id,
            change = change.name(),
            %mode,
            reevaluated = report.reevaluated.len(),
            enqueued = report.enqueued,
            "catalog change handled"
        );
        Ok(report)
    }

    fn ensure(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        mode: ExecutionMode,
        report: &mut PropagationReport,
    ) -> Result<(), InspectionError> {
        match mode {
            ExecutionMode::Inline => {
                if self.engine.ensure_inspection(tenant_id, product_id)?.flipped_required() {
                    report.required_flips.push(product_id);
                }
            }
            ExecutionMode::Deferred => {
                self.queue.enqueue(InspectionTask::Ensure {
                    tenant_id,
                    product_id,
                })?;
                report.enqueued += 1;
            }
        }
        Ok(())
    }

    /// Run a deferred task. A task for a product that has since been deleted
    /// is a no-op.
    pub fn run_task(&self, task: &InspectionTask) -> Result<(), InspectionError> {
        let result = match task {
            InspectionTask::Ensure {
                tenant_id,
                product_id,
            } => self.engine.ensure_inspection(*tenant_id, *product_id).map(drop),
            InspectionTask::Reevaluate {
                tenant_id,
                product_id,
                checks,
            } => self
                .engine
                .reevaluate_checks(*tenant_id, *product_id, checks)
                .map(drop),
            InspectionTask::Resync {
                tenant_id,
                product_id,
            } => self.engine.resync(*tenant_id, *product_id).map(drop),
            InspectionTask::Propagate {
                tenant_id,
                product_id,
                checks,
            } => self
                .propagator
                .propagate(*tenant_id, *product_id, checks, ExecutionMode::Inline)
                .map(drop),
        };
        match result {
            Err(InspectionError::ProductNotFound(product_id)) => {
                debug!(task = task.name(), %product_id, "product is gone, skipping task");
                Ok(())
            }
            other => other,
        }
    }

    /// Queue a full resync of the given products.
    pub fn schedule_resync(
        &self,
        tenant_id: TenantId,
        products: impl IntoIterator<Item = ProductId>,
    ) -> Result<usize, InspectionError> {
        let mut scheduled = 0;
        for product_id in products {
            self.queue.enqueue(InspectionTask::Resync {
                tenant_id,
                product_id,
            })?;
            scheduled += 1;
        }
        info!(%tenant_id, scheduled, "resync scheduled");
        Ok(scheduled)
    }

    /// Queue a whole propagation walk to run on a worker.
    pub fn schedule_propagation(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        checks: CheckSet,
    ) -> Result<(), InspectionError> {
        self.queue.enqueue(InspectionTask::Propagate {
            tenant_id,
            product_id,
            checks,
        })?;
        Ok(())
    }

    pub fn readiness(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> Result<Option<ReadinessSummary>, InspectionError> {
        Ok(self
            .engine
            .inspection(tenant_id, product_id)?
            .map(|inspection| ReadinessSummary {
                product_id,
                flags: inspection.flags(),
                open_checks: inspection
                    .checks()
                    .iter()
                    .filter(|c| !c.passed)
                    .map(|c| OpenCheck {
                        check_kind: c.check_kind,
                        applicability: c.applicability,
                        reason: c.reason.clone(),
                    })
                    .collect(),
            }))
    }
}
