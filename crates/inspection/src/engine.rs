//! Reconciliation engine.
//!
//! Every public operation is one atomic unit for one product: load the
//! inspection, work on a private copy, recompute the aggregate flags once,
//! commit if anything changed, then publish the events the unit produced.
//! An error anywhere before the commit leaves the stored inspection as it was.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use readiness_catalog::{CatalogReader, ProductId, ProductKind};
use readiness_core::{AggregateRoot, TenantId};
use readiness_events::{EventBus, EventEnvelope};

use crate::error::InspectionError;
use crate::events::{CheckTransition, INSPECTION_SUBJECT, InspectionEvent, ReadinessFlip};
use crate::record::{Inspection, ReadinessFlags};
use crate::registry::{CheckContext, CheckError, CheckRegistry};
use crate::rules::{CheckKind, CheckSet, RuleCatalog};
use crate::store::InspectionStore;

/// What one atomic unit did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub created: bool,
    pub added: Vec<CheckKind>,
    pub removed: Vec<CheckKind>,
    /// Checks whose predicate ran, in evaluation order.
    pub evaluated: Vec<CheckKind>,
    pub flags: ReadinessFlags,
    pub committed: bool,
    pub events: Vec<InspectionEvent>,
}

impl ReconcileOutcome {
    pub fn flipped_required(&self) -> bool {
        self.events.iter().any(InspectionEvent::flips_required)
    }
}

struct UnitOfWork {
    inspection: Inspection,
    dirty: bool,
    events: Vec<InspectionEvent>,
    outcome: ReconcileOutcome,
}

impl UnitOfWork {
    fn open(inspection: Inspection) -> Self {
        Self {
            inspection,
            dirty: false,
            events: Vec::new(),
            outcome: ReconcileOutcome::default(),
        }
    }

    fn create(inspection: Inspection) -> Self {
        let mut unit = Self::open(inspection);
        unit.dirty = true;
        unit.outcome.created = true;
        unit
    }
}

pub struct ReconciliationEngine<S, B> {
    catalog: Arc<dyn CatalogReader>,
    rules: Arc<RuleCatalog>,
    registry: Arc<CheckRegistry>,
    store: S,
    bus: B,
}

impl<S, B> ReconciliationEngine<S, B>
where
    S: InspectionStore,
    B: EventBus<EventEnvelope<InspectionEvent>>,
{
    /// Engine with the standard rule catalog and check registry.
    pub fn new(catalog: Arc<dyn CatalogReader>, store: S, bus: B) -> Self {
        Self {
            catalog,
            rules: Arc::new(RuleCatalog::standard()),
            registry: Arc::new(CheckRegistry::standard()),
            store,
            bus,
        }
    }

    pub fn with_rules(mut self, rules: RuleCatalog) -> Self {
        self.rules = Arc::new(rules);
        self
    }

    pub fn with_registry(mut self, registry: CheckRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    pub fn catalog(&self) -> &Arc<dyn CatalogReader> {
        &self.catalog
    }

    pub fn rules(&self) -> &RuleCatalog {
        &self.rules
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn inspection(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> Result<Option<Inspection>, InspectionError> {
        Ok(self.store.load(tenant_id, product_id)?)
    }

    /// Create the inspection if missing and make its sub-records match the
    /// rule catalog for the product's current kind. Only new sub-records are
    /// evaluated.
    pub fn ensure_inspection(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> Result<ReconcileOutcome, InspectionError> {
        self.reconcile(tenant_id, product_id, false)
            .inspect_err(|e| warn!(%tenant_id, %product_id, error = %e, "ensure_inspection aborted"))
    }

    /// Like [`Self::ensure_inspection`] but evaluates every sub-record.
    pub fn resync(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> Result<ReconcileOutcome, InspectionError> {
        self.reconcile(tenant_id, product_id, true)
            .inspect_err(|e| warn!(%tenant_id, %product_id, error = %e, "resync aborted"))
    }

    pub fn reevaluate(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        check_kind: CheckKind,
    ) -> Result<ReconcileOutcome, InspectionError> {
        self.reevaluate_checks(tenant_id, product_id, &CheckSet::from([check_kind]))
    }

    /// Re-run the given checks on an existing inspection, in sort order, as a
    /// single unit. Kinds without a sub-record are skipped; a product without
    /// an inspection is a no-op.
    pub fn reevaluate_checks(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        checks: &CheckSet,
    ) -> Result<ReconcileOutcome, InspectionError> {
        self.reevaluate_unit(tenant_id, product_id, checks)
            .inspect_err(|e| warn!(%tenant_id, %product_id, error = %e, "reevaluation aborted"))
    }

    /// Rewrite the aggregate flags from the stored sub-records.
    pub fn recompute_aggregate(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> Result<ReconcileOutcome, InspectionError> {
        match self.store.load(tenant_id, product_id)? {
            Some(inspection) => self.commit(UnitOfWork::open(inspection)),
            None => Ok(ReconcileOutcome::default()),
        }
    }

    /// Drop the inspection of a deleted product.
    pub fn forget(&self, tenant_id: TenantId, product_id: ProductId) -> Result<bool, InspectionError> {
        let removed = self.store.delete(tenant_id, product_id)?;
        if removed {
            info!(%tenant_id, %product_id, "inspection removed");
        }
        Ok(removed)
    }

    fn product_kind(&self, tenant_id: TenantId, product_id: ProductId) -> Result<ProductKind, InspectionError> {
        self.catalog
            .kind(tenant_id, product_id)?
            .ok_or(InspectionError::ProductNotFound(product_id))
    }

    fn context(&self, tenant_id: TenantId, product_id: ProductId, kind: ProductKind) -> CheckContext<'_> {
        CheckContext {
            tenant_id,
            product_id,
            kind,
            catalog: self.catalog.as_ref(),
            readiness: &self.store,
        }
    }

    fn reconcile(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        evaluate_existing: bool,
    ) -> Result<ReconcileOutcome, InspectionError> {
        let kind = self.product_kind(tenant_id, product_id)?;
        let mut unit = match self.store.load(tenant_id, product_id)? {
            Some(inspection) => UnitOfWork::open(inspection),
            None => UnitOfWork::create(Inspection::new(tenant_id, product_id)),
        };
        let desired = self.rules.applicable(kind);

        let dropped = unit
            .inspection
            .retain_checks(|k| desired.iter().any(|d| d.check_kind == k));
        for sub in dropped {
            debug!(%tenant_id, %product_id, check = %sub.check_kind, "check no longer applies");
            unit.outcome.removed.push(sub.check_kind);
            unit.dirty = true;
        }

        let mut to_evaluate = Vec::new();
        let mut reordered = false;
        for wanted in &desired {
            match unit.inspection.check_mut(wanted.check_kind) {
                Some(existing) => {
                    if existing.applicability != wanted.applicability
                        || existing.sort_order != wanted.sort_order
                    {
                        existing.applicability = wanted.applicability;
                        existing.sort_order = wanted.sort_order;
                        reordered = true;
                        unit.dirty = true;
                    }
                    if evaluate_existing {
                        to_evaluate.push(wanted.check_kind);
                    }
                }
                None => {
                    unit.inspection
                        .add_check(wanted.check_kind, wanted.applicability, wanted.sort_order);
                    unit.outcome.added.push(wanted.check_kind);
                    unit.dirty = true;
                    to_evaluate.push(wanted.check_kind);
                }
            }
        }
        if reordered {
            unit.inspection.resort();
        }

        let ctx = self.context(tenant_id, product_id, kind);
        for check_kind in to_evaluate {
            self.evaluate(&mut unit, &ctx, check_kind)?;
        }
        self.commit(unit)
    }

    fn reevaluate_unit(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        checks: &CheckSet,
    ) -> Result<ReconcileOutcome, InspectionError> {
        let Some(inspection) = self.store.load(tenant_id, product_id)? else {
            debug!(%tenant_id, %product_id, "no inspection to re-evaluate");
            return Ok(ReconcileOutcome::default());
        };
        let kind = self.product_kind(tenant_id, product_id)?;
        let mut unit = UnitOfWork::open(inspection);

        let targets: Vec<CheckKind> = unit
            .inspection
            .checks()
            .iter()
            .map(|c| c.check_kind)
            .filter(|k| checks.contains(k))
            .collect();
        let ctx = self.context(tenant_id, product_id, kind);
        for check_kind in targets {
            self.evaluate(&mut unit, &ctx, check_kind)?;
        }
        self.commit(unit)
    }

    fn evaluate(
        &self,
        unit: &mut UnitOfWork,
        ctx: &CheckContext<'_>,
        check_kind: CheckKind,
    ) -> Result<(), InspectionError> {
        let definition = self.registry.get(check_kind)?;
        let reason = match definition.evaluate(ctx) {
            Ok(()) => None,
            Err(CheckError::Failed(failed)) => Some(failed.reason),
            Err(CheckError::Catalog(e)) => return Err(e.into()),
            Err(CheckError::Store(e)) => return Err(e.into()),
        };
        let passed = reason.is_none();

        let Some(sub) = unit.inspection.check_mut(check_kind) else {
            return Ok(());
        };
        let was_passed = sub.passed;
        if sub.passed != passed || sub.reason != reason {
            sub.passed = passed;
            sub.reason = reason.clone();
            unit.dirty = true;
        }
        unit.outcome.evaluated.push(check_kind);

        if was_passed != passed {
            debug!(
                tenant_id = %ctx.tenant_id,
                product_id = %ctx.product_id,
                check = %check_kind,
                passed,
                "check outcome changed"
            );
            let transition = CheckTransition {
                tenant_id: ctx.tenant_id,
                product_id: ctx.product_id,
                check_kind,
                signal: definition.signal(passed).to_string(),
                reason,
                occurred_at: Utc::now(),
            };
            unit.events.push(if passed {
                InspectionEvent::CheckPassed(transition)
            } else {
                InspectionEvent::CheckFailed(transition)
            });
        }
        Ok(())
    }

    fn commit(&self, mut unit: UnitOfWork) -> Result<ReconcileOutcome, InspectionError> {
        let tenant_id = unit.inspection.tenant_id();
        let product_id = unit.inspection.product_id();
        let flip = || ReadinessFlip {
            tenant_id,
            product_id,
            occurred_at: Utc::now(),
        };

        let change = unit.inspection.recompute_flags();
        if change.before.has_missing_required != change.after.has_missing_required {
            info!(
                %tenant_id,
                %product_id,
                has_missing_required = change.after.has_missing_required,
                "required readiness changed"
            );
            unit.events.push(if change.after.has_missing_required {
                InspectionEvent::MissingInfoDetected(flip())
            } else {
                InspectionEvent::MissingInfoResolved(flip())
            });
        }
        if change.before.has_missing_optional != change.after.has_missing_optional {
            debug!(
                %tenant_id,
                %product_id,
                has_missing_optional = change.after.has_missing_optional,
                "optional readiness changed"
            );
            unit.events.push(if change.after.has_missing_optional {
                InspectionEvent::MissingOptionalInfoDetected(flip())
            } else {
                InspectionEvent::MissingOptionalInfoResolved(flip())
            });
        }
        unit.dirty |= change.is_changed();
        unit.outcome.flags = change.after;

        if !unit.dirty {
            return Ok(unit.outcome);
        }

        unit.inspection.bump_version();
        self.store.save(&unit.inspection)?;
        unit.outcome.committed = true;
        if unit.outcome.created {
            info!(%tenant_id, %product_id, checks = unit.inspection.checks().len(), "inspection created");
        }

        let sequence_number = unit.inspection.version();
        let envelopes: Vec<_> = unit
            .events
            .iter()
            .cloned()
            .map(|event| {
                EventEnvelope::new(
                    tenant_id,
                    product_id.as_aggregate(),
                    INSPECTION_SUBJECT,
                    sequence_number,
                    event,
                )
            })
            .collect();
        unit.outcome.events = unit.events;
        self.bus
            .publish_all(envelopes)
            .map_err(|e| InspectionError::Publish(format!("{e:?}")))?;
        Ok(unit.outcome)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use proptest::prelude::*;

    use readiness_catalog::{InMemoryCatalog, RelationKind};
    use readiness_events::Subscription;

    use super::*;
    use crate::rules::{Applicability, RuleEntry};
    use crate::store::InMemoryInspectionStore;
    use crate::testing::{Harness, TestBus};

    #[test]
    fn new_simple_product_gets_its_checks_evaluated() {
        let h = Harness::new();
        let p = h.product(ProductKind::Simple);

        let outcome = h.engine.ensure_inspection(h.tenant, p).unwrap();

        assert!(outcome.created && outcome.committed);
        assert_eq!(
            outcome.added.iter().copied().collect::<CheckSet>(),
            RuleCatalog::standard().applicable_kinds(ProductKind::Simple)
        );
        assert_eq!(outcome.added, outcome.evaluated);

        let inspection = h.inspection(p);
        assert_eq!(inspection.version(), 1);
        assert!(inspection.is_consistent());
        assert!(inspection.record().has_missing_required);
        assert!(inspection.record().has_missing_optional);
        let images = inspection.check(CheckKind::HasImages).unwrap();
        assert!(!images.passed);
        assert_eq!(images.reason.as_deref(), Some("product has no images"));
        assert!(inspection.check(CheckKind::MissingRequiredProperties).unwrap().passed);

        let signals = h.signals();
        assert!(signals.contains(&"inspection.missing_required_properties.passed".to_string()));
        assert!(signals.contains(&"inspection.missing_info.detected".to_string()));
        assert!(signals.contains(&"inspection.missing_optional_info.detected".to_string()));
        assert!(!signals.iter().any(|s| s.ends_with(".failed")));
    }

    #[test]
    fn repeated_reconciliation_commits_nothing() {
        let h = Harness::new();
        let p = h.product(ProductKind::Bundle);
        h.engine.ensure_inspection(h.tenant, p).unwrap();
        h.signals();

        let again = h.engine.ensure_inspection(h.tenant, p).unwrap();
        let resync = h.engine.resync(h.tenant, p).unwrap();

        assert!(!again.committed && !resync.committed);
        assert!(again.evaluated.is_empty());
        assert_eq!(resync.evaluated.len(), h.inspection(p).checks().len());
        assert_eq!(h.inspection(p).version(), 1);
        assert!(h.signals().is_empty());
    }

    #[test]
    fn fixing_data_flips_checks_and_flags() {
        let h = Harness::new();
        let p = h.product(ProductKind::Dropship);
        h.engine.ensure_inspection(h.tenant, p).unwrap();
        h.signals();

        h.catalog.attach_image(h.tenant, p).unwrap();
        let outcome = h.engine.reevaluate(h.tenant, p, CheckKind::HasImages).unwrap();
        assert_eq!(outcome.evaluated, vec![CheckKind::HasImages]);
        assert!(!outcome.flipped_required());
        assert_eq!(h.signals(), vec!["inspection.has_images.passed".to_string()]);

        h.catalog.set_price(h.tenant, p, true).unwrap();
        h.catalog.link_supplier_product(h.tenant, p).unwrap();
        h.catalog
            .set_product_type(h.tenant, p, Some(readiness_core::ProductTypeId::new()))
            .unwrap();
        let outcome = h
            .engine
            .reevaluate_checks(
                h.tenant,
                p,
                &CheckSet::from([
                    CheckKind::HasPrice,
                    CheckKind::MissingSupplierProducts,
                    CheckKind::MissingProductType,
                ]),
            )
            .unwrap();
        assert!(outcome.flipped_required());
        assert!(!outcome.flags.has_missing_required);
        assert_eq!(
            outcome.evaluated,
            vec![
                CheckKind::HasPrice,
                CheckKind::MissingProductType,
                CheckKind::MissingSupplierProducts
            ]
        );
        assert!(h.signals().contains(&"inspection.missing_info.resolved".to_string()));
        assert_eq!(h.inspection(p).version(), 3);
    }

    #[test]
    fn failing_again_keeps_the_latest_reason_without_signalling() {
        let h = Harness::new();
        let bundle = h.product(ProductKind::Bundle);
        let item = h.product(ProductKind::Simple);
        h.catalog.relate(h.tenant, RelationKind::BundleItem, bundle, item).unwrap();
        h.catalog.set_active(h.tenant, item, false).unwrap();
        h.engine.ensure_inspection(h.tenant, bundle).unwrap();
        h.signals();

        let other = h.product(ProductKind::Simple);
        h.catalog.relate(h.tenant, RelationKind::BundleItem, bundle, other).unwrap();
        h.catalog.set_active(h.tenant, other, false).unwrap();
        let outcome = h
            .engine
            .reevaluate(h.tenant, bundle, CheckKind::InactiveComponents)
            .unwrap();

        assert!(outcome.committed);
        assert!(outcome.events.is_empty());
        let reason = h
            .inspection(bundle)
            .check(CheckKind::InactiveComponents)
            .unwrap()
            .reason
            .clone()
            .unwrap();
        assert!(reason.contains(&other.to_string()));
    }

    #[test]
    fn kind_change_swaps_sub_records_in_one_unit() {
        let h = Harness::new();
        let p = h.product(ProductKind::Simple);
        h.engine.ensure_inspection(h.tenant, p).unwrap();

        h.catalog.set_kind(h.tenant, p, ProductKind::Bundle).unwrap();
        let outcome = h.engine.ensure_inspection(h.tenant, p).unwrap();

        assert!(!outcome.created);
        assert_eq!(outcome.removed, vec![CheckKind::MissingStock]);
        assert_eq!(
            outcome.added,
            vec![
                CheckKind::MissingBundleItems,
                CheckKind::ItemsMismatchProductType,
                CheckKind::InactiveComponents,
                CheckKind::ComponentsMissingInformation,
            ]
        );
        assert!(outcome.added.iter().all(|k| outcome.evaluated.contains(k)));

        let inspection = h.inspection(p);
        assert_eq!(inspection.version(), 2);
        assert!(inspection.is_consistent());
        for kind in &outcome.added {
            let sub = inspection.check(*kind).unwrap();
            assert!(sub.passed || sub.reason.is_some(), "{kind} was never evaluated");
        }
        assert_eq!(
            inspection.check(CheckKind::MissingBundleItems).unwrap().reason.as_deref(),
            Some("bundle has no items")
        );
        assert!(!h.engine.resync(h.tenant, p).unwrap().committed);
        let orders: Vec<_> = inspection.checks().iter().map(|c| c.sort_order).collect();
        assert!(orders.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn unknown_product_is_an_error_and_stores_nothing() {
        let h = Harness::new();
        let missing = ProductId::new();
        assert!(matches!(
            h.engine.ensure_inspection(h.tenant, missing),
            Err(InspectionError::ProductNotFound(id)) if id == missing
        ));
        assert!(h.engine.inspection(h.tenant, missing).unwrap().is_none());
    }

    #[test]
    fn missing_predicate_aborts_the_whole_unit() {
        let catalog = Arc::new(InMemoryCatalog::new());
        let tenant = TenantId::new();
        let (p, _) = catalog.create_product(tenant, ProductKind::Simple).unwrap();
        let store = Arc::new(InMemoryInspectionStore::new());
        let bus: TestBus = Arc::new(readiness_events::InMemoryEventBus::new());
        let events = bus.subscribe();

        let partial = CheckRegistry::standard().without(CheckKind::MissingStock);
        let engine = ReconciliationEngine::new(catalog, store.clone(), bus).with_registry(partial);

        assert!(matches!(
            engine.ensure_inspection(tenant, p),
            Err(InspectionError::UnknownCheckKind(CheckKind::MissingStock))
        ));
        assert!(store.load(tenant, p).unwrap().is_none());
        assert!(events.drain().is_empty());
    }

    #[test]
    fn applicability_changes_are_picked_up() {
        let h = Harness::new();
        let p = h.product(ProductKind::Supplier);
        h.catalog.set_price(h.tenant, p, true).unwrap();
        h.engine.ensure_inspection(h.tenant, p).unwrap();
        assert!(!h.inspection(p).record().has_missing_required);
        assert_eq!(
            h.inspection(p).check(CheckKind::MissingProductType).unwrap().applicability,
            Applicability::Optional
        );

        let mut entries = RuleCatalog::standard().entries().to_vec();
        entries[2] = RuleEntry::new(CheckKind::MissingProductType, [Applicability::Required; 6]);
        let engine = ReconciliationEngine::new(
            h.catalog.clone(),
            h.store.clone(),
            h.bus.clone(),
        )
        .with_rules(RuleCatalog::from_entries(entries).unwrap());

        let outcome = engine.ensure_inspection(h.tenant, p).unwrap();
        assert!(outcome.committed);
        assert!(outcome.flags.has_missing_required);
        assert!(outcome.flipped_required());
    }

    #[test]
    fn recompute_repairs_nothing_on_consistent_inspections() {
        let h = Harness::new();
        let p = h.product(ProductKind::Simple);
        h.engine.ensure_inspection(h.tenant, p).unwrap();
        let outcome = h.engine.recompute_aggregate(h.tenant, p).unwrap();
        assert!(!outcome.committed);
        assert!(outcome.flags.has_missing_required);
        assert!(!h.engine.recompute_aggregate(h.tenant, ProductId::new()).unwrap().committed);
    }

    #[test]
    fn forget_removes_the_inspection() {
        let h = Harness::new();
        let p = h.product(ProductKind::Simple);
        h.engine.ensure_inspection(h.tenant, p).unwrap();
        assert!(h.engine.forget(h.tenant, p).unwrap());
        assert!(!h.engine.forget(h.tenant, p).unwrap());
        assert!(h.engine.inspection(h.tenant, p).unwrap().is_none());
    }

    #[derive(Debug)]
    struct ClosedBus;

    impl EventBus<EventEnvelope<InspectionEvent>> for ClosedBus {
        type Error = &'static str;

        fn publish(&self, _message: EventEnvelope<InspectionEvent>) -> Result<(), Self::Error> {
            Err("bus closed")
        }

        fn subscribe(&self) -> Subscription<EventEnvelope<InspectionEvent>> {
            Subscription::new(mpsc::channel().1)
        }
    }

    #[test]
    fn publish_failure_is_reported_after_commit() {
        let catalog = Arc::new(InMemoryCatalog::new());
        let tenant = TenantId::new();
        let (p, _) = catalog.create_product(tenant, ProductKind::Simple).unwrap();
        let store = Arc::new(InMemoryInspectionStore::new());
        let engine = ReconciliationEngine::new(catalog, store.clone(), ClosedBus);

        assert!(matches!(
            engine.ensure_inspection(tenant, p),
            Err(InspectionError::Publish(_))
        ));
        assert!(store.load(tenant, p).unwrap().is_some());
    }

    fn any_kind() -> impl Strategy<Value = ProductKind> {
        proptest::sample::select(ProductKind::ALL.to_vec())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn sub_records_always_match_the_current_kind(kinds in prop::collection::vec(any_kind(), 1..6)) {
            let h = Harness::new();
            let p = h.product(kinds[0]);
            for kind in &kinds {
                h.catalog.set_kind(h.tenant, p, *kind).unwrap();
                h.engine.ensure_inspection(h.tenant, p).unwrap();

                let inspection = h.inspection(p);
                let present: CheckSet = inspection.checks().iter().map(|c| c.check_kind).collect();
                prop_assert_eq!(present, h.engine.rules().applicable_kinds(*kind));
                prop_assert!(inspection.is_consistent());
                prop_assert!(inspection.checks().windows(2).all(|w| w[0].sort_order < w[1].sort_order));
            }
        }
    }
}
