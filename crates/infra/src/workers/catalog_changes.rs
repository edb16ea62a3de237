//! Feeds catalog change envelopes into `ReadinessService::handle`.

use std::io;
use std::sync::Arc;

use readiness_catalog::CatalogChange;
use readiness_core::{AggregateId, TenantId};
use readiness_events::{EventBus, EventEnvelope};
use readiness_inspection::{ExecutionMode, InspectionEvent, InspectionStore, ReadinessService};

use super::{BusWorker, WorkerHandle};

pub const CATALOG_SUBJECT: &str = "product";
const PRODUCT_TYPE_SUBJECT: &str = "product_type";

/// Wrap a change for the catalog change bus. Changes that are not about one
/// product use the product type as their subject.
pub fn catalog_envelope(
    tenant_id: TenantId,
    sequence_number: u64,
    change: CatalogChange,
) -> EventEnvelope<CatalogChange> {
    let (subject_id, subject_type) = match (&change, change.subject()) {
        (_, Some(product_id)) => (product_id.as_aggregate(), CATALOG_SUBJECT),
        (CatalogChange::ProductTypeRulesChanged { product_type }, None) => (
            AggregateId::from_uuid(*product_type.as_uuid()),
            PRODUCT_TYPE_SUBJECT,
        ),
        (_, None) => (AggregateId::new(), CATALOG_SUBJECT),
    };
    EventEnvelope::new(tenant_id, subject_id, subject_type, sequence_number, change)
}

pub fn spawn_catalog_change_worker<CB, S, B>(
    changes: &CB,
    tenant_id: Option<TenantId>,
    service: Arc<ReadinessService<S, B>>,
    mode: ExecutionMode,
) -> io::Result<WorkerHandle>
where
    CB: EventBus<EventEnvelope<CatalogChange>>,
    S: InspectionStore + 'static,
    B: EventBus<EventEnvelope<InspectionEvent>> + 'static,
{
    BusWorker::spawn(
        "catalog-changes",
        changes,
        tenant_id,
        move |envelope: EventEnvelope<CatalogChange>| {
            service
                .handle(envelope.tenant_id(), envelope.payload(), mode)
                .map(drop)
        },
    )
}
