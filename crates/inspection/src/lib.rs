//! Readiness inspection engine.
//!
//! Keeps one inspection per catalog product up to date: which checks apply to
//! the product's kind, whether each passes, and two aggregate flags that say
//! whether required or optional information is missing.
//!
//! ```text
//! CatalogChange ─▶ EventDispatch ─▶ InvalidationPropagator ─▶ ReconciliationEngine ─▶ InspectionStore
//!                                        │ (deferred)                 │
//!                                        ▼                            ▼
//!                                    TaskQueue                 InspectionEvent bus
//! ```

pub mod checks;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod events;
pub mod propagate;
pub mod record;
pub mod registry;
pub mod rules;
pub mod service;
pub mod store;
pub mod tasks;

pub use dispatch::{EventDispatch, Invalidation, StandardDispatch, structural_checks};
pub use engine::{ReconcileOutcome, ReconciliationEngine};
pub use error::InspectionError;
pub use events::{CheckTransition, INSPECTION_SUBJECT, InspectionEvent, ReadinessFlip};
pub use propagate::{ExecutionMode, InvalidationPropagator, PropagationReport};
pub use record::{CheckSubRecord, Inspection, InspectionRecord, ReadinessFlags};
pub use registry::{CheckContext, CheckDefinition, CheckError, CheckFailed, CheckRegistry};
pub use rules::{ApplicableCheck, Applicability, CheckKind, CheckSet, RuleCatalog, RuleEntry};
pub use service::{OpenCheck, ReadinessService, ReadinessSummary};
pub use store::{InMemoryInspectionStore, InspectionStore, InspectionStoreError, ReadinessReader};
pub use tasks::{InMemoryTaskQueue, InspectionTask, TaskQueue, TaskQueueError};

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use readiness_catalog::{InMemoryCatalog, ProductId, ProductKind};
    use readiness_core::TenantId;
    use readiness_events::{Event, EventBus, EventEnvelope, InMemoryEventBus, Subscription};

    use crate::engine::ReconciliationEngine;
    use crate::events::InspectionEvent;
    use crate::propagate::InvalidationPropagator;
    use crate::record::Inspection;
    use crate::service::ReadinessService;
    use crate::store::InMemoryInspectionStore;

    pub(crate) type TestStore = Arc<InMemoryInspectionStore>;
    pub(crate) type TestBus = Arc<InMemoryEventBus<EventEnvelope<InspectionEvent>>>;
    pub(crate) type TestEngine = ReconciliationEngine<TestStore, TestBus>;
    pub(crate) type TestPropagator = InvalidationPropagator<TestStore, TestBus>;
    pub(crate) type TestService = ReadinessService<TestStore, TestBus>;

    pub(crate) struct Harness {
        pub tenant: TenantId,
        pub catalog: Arc<InMemoryCatalog>,
        pub store: TestStore,
        pub bus: TestBus,
        pub engine: Arc<TestEngine>,
        events: Subscription<EventEnvelope<InspectionEvent>>,
    }

    impl Harness {
        pub fn new() -> Self {
            let catalog = Arc::new(InMemoryCatalog::new());
            let store = Arc::new(InMemoryInspectionStore::new());
            let bus: TestBus = Arc::new(InMemoryEventBus::new());
            let events = bus.subscribe();
            let engine = Arc::new(ReconciliationEngine::new(
                catalog.clone(),
                store.clone(),
                bus.clone(),
            ));
            Self {
                tenant: TenantId::new(),
                catalog,
                store,
                bus,
                engine,
                events,
            }
        }

        pub fn product(&self, kind: ProductKind) -> ProductId {
            self.catalog.create_product(self.tenant, kind).unwrap().0
        }

        pub fn inspection(&self, product_id: ProductId) -> Inspection {
            self.engine
                .inspection(self.tenant, product_id)
                .unwrap()
                .expect("inspection exists")
        }

        /// Registry signal for check transitions, event type otherwise.
        pub fn signals(&self) -> Vec<String> {
            self.events
                .drain()
                .into_iter()
                .map(|envelope| match envelope.payload() {
                    InspectionEvent::CheckPassed(t) | InspectionEvent::CheckFailed(t) => t.signal.clone(),
                    other => other.event_type().to_string(),
                })
                .collect()
        }
    }
}
