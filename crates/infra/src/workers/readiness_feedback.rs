//! Turns required-information flips on the inspection event stream back into
//! `ReadinessChanged` catalog changes so ancestors re-check their components.
//!
//! Only needed in deferred mode: inline propagation already reaches every
//! ancestor in the same walk.

use std::io;
use std::sync::Arc;

use tracing::debug;

use readiness_catalog::CatalogChange;
use readiness_core::TenantId;
use readiness_events::{EventBus, EventEnvelope};
use readiness_inspection::{ExecutionMode, InspectionEvent, InspectionStore, ReadinessService};

use super::{BusWorker, WorkerHandle};

/// The catalog change an inspection event implies, if any.
pub fn readiness_change(event: &InspectionEvent) -> Option<CatalogChange> {
    event.flips_required().then(|| CatalogChange::ReadinessChanged {
        product_id: event.product_id(),
    })
}

pub fn spawn_readiness_feedback_worker<S, B>(
    events: &B,
    tenant_id: Option<TenantId>,
    service: Arc<ReadinessService<S, B>>,
) -> io::Result<WorkerHandle>
where
    S: InspectionStore + 'static,
    B: EventBus<EventEnvelope<InspectionEvent>> + 'static,
{
    BusWorker::spawn(
        "readiness-feedback",
        events,
        tenant_id,
        move |envelope: EventEnvelope<InspectionEvent>| {
            let Some(change) = readiness_change(envelope.payload()) else {
                return Ok(());
            };
            debug!(
                tenant_id = %envelope.tenant_id(),
                product_id = %envelope.payload().product_id(),
                "readiness flipped, re-checking ancestors"
            );
            service
                .handle(envelope.tenant_id(), &change, ExecutionMode::Deferred)
                .map(drop)
        },
    )
}
