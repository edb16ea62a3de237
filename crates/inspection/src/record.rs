//! Inspection aggregate: one record per product plus one sub-record per
//! applicable check.

use serde::{Deserialize, Serialize};

use readiness_catalog::ProductId;
use readiness_core::{AggregateRoot, InspectionId, TenantId};

use crate::rules::{Applicability, CheckKind};

/// Product-level readiness summary. The booleans are derived from the
/// sub-records and only ever written by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectionRecord {
    pub id: InspectionId,
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub has_missing_required: bool,
    pub has_missing_optional: bool,
}

/// Outcome of one check for one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckSubRecord {
    pub inspection_id: InspectionId,
    pub check_kind: CheckKind,
    pub applicability: Applicability,
    pub passed: bool,
    /// Why the last evaluation failed. Cleared on pass.
    pub reason: Option<String>,
    pub sort_order: u32,
}

/// The two aggregate flags, computed from a set of sub-records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessFlags {
    pub has_missing_required: bool,
    pub has_missing_optional: bool,
}

impl ReadinessFlags {
    pub fn compute<'a>(checks: impl IntoIterator<Item = &'a CheckSubRecord>) -> Self {
        checks
            .into_iter()
            .filter(|c| !c.passed)
            .fold(Self::default(), |mut flags, c| {
                match c.applicability {
                    Applicability::Required => flags.has_missing_required = true,
                    Applicability::Optional => flags.has_missing_optional = true,
                    Applicability::None => {}
                }
                flags
            })
    }
}

/// Flag values before and after a recompute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlagChange {
    pub before: ReadinessFlags,
    pub after: ReadinessFlags,
}

impl FlagChange {
    pub fn is_changed(&self) -> bool {
        self.before != self.after
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inspection {
    record: InspectionRecord,
    /// Kept sorted by `sort_order`; at most one per check kind.
    checks: Vec<CheckSubRecord>,
    version: u64,
}

impl Inspection {
    /// Fresh inspection with no sub-records. Not stored until committed.
    pub fn new(tenant_id: TenantId, product_id: ProductId) -> Self {
        Self {
            record: InspectionRecord {
                id: InspectionId::new(),
                tenant_id,
                product_id,
                has_missing_required: false,
                has_missing_optional: false,
            },
            checks: Vec::new(),
            version: 0,
        }
    }

    pub fn record(&self) -> &InspectionRecord {
        &self.record
    }

    pub fn tenant_id(&self) -> TenantId {
        self.record.tenant_id
    }

    pub fn product_id(&self) -> ProductId {
        self.record.product_id
    }

    pub fn flags(&self) -> ReadinessFlags {
        ReadinessFlags {
            has_missing_required: self.record.has_missing_required,
            has_missing_optional: self.record.has_missing_optional,
        }
    }

    pub fn checks(&self) -> &[CheckSubRecord] {
        &self.checks
    }

    pub fn check(&self, kind: CheckKind) -> Option<&CheckSubRecord> {
        self.checks.iter().find(|c| c.check_kind == kind)
    }

    pub(crate) fn check_mut(&mut self, kind: CheckKind) -> Option<&mut CheckSubRecord> {
        self.checks.iter_mut().find(|c| c.check_kind == kind)
    }

    /// Stored flags agree with the sub-records.
    pub fn is_consistent(&self) -> bool {
        self.flags() == ReadinessFlags::compute(&self.checks)
    }

    /// Add a sub-record for a kind that has none yet. New sub-records start
    /// out not passed until evaluated.
    pub(crate) fn add_check(&mut self, check_kind: CheckKind, applicability: Applicability, sort_order: u32) {
        if self.check(check_kind).is_some() {
            return;
        }
        let sub = CheckSubRecord {
            inspection_id: self.record.id,
            check_kind,
            applicability,
            passed: false,
            reason: None,
            sort_order,
        };
        let at = self.checks.partition_point(|c| c.sort_order <= sort_order);
        self.checks.insert(at, sub);
    }

    /// Drop sub-records whose kind fails `keep`; returns the dropped ones.
    pub(crate) fn retain_checks(&mut self, keep: impl Fn(CheckKind) -> bool) -> Vec<CheckSubRecord> {
        let (kept, dropped): (Vec<_>, Vec<_>) = std::mem::take(&mut self.checks)
            .into_iter()
            .partition(|c| keep(c.check_kind));
        self.checks = kept;
        dropped
    }

    /// Restore the sort invariant after `sort_order` values were rewritten.
    pub(crate) fn resort(&mut self) {
        self.checks.sort_by_key(|c| c.sort_order);
    }

    /// Rewrite the aggregate flags from the sub-records.
    pub(crate) fn recompute_flags(&mut self) -> FlagChange {
        let before = self.flags();
        let after = ReadinessFlags::compute(&self.checks);
        self.record.has_missing_required = after.has_missing_required;
        self.record.has_missing_optional = after.has_missing_optional;
        FlagChange { before, after }
    }

    pub(crate) fn bump_version(&mut self) -> u64 {
        self.version += 1;
        self.version
    }
}

impl AggregateRoot for Inspection {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.record.product_id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn inspection() -> Inspection {
        Inspection::new(TenantId::new(), ProductId::new())
    }

    #[test]
    fn sub_records_stay_sorted_and_unique() {
        let mut i = inspection();
        i.add_check(CheckKind::MissingStock, Applicability::Optional, 6);
        i.add_check(CheckKind::HasImages, Applicability::Required, 0);
        i.add_check(CheckKind::HasPrice, Applicability::Required, 1);
        i.add_check(CheckKind::HasImages, Applicability::Optional, 0);

        let kinds: Vec<_> = i.checks().iter().map(|c| c.check_kind).collect();
        assert_eq!(
            kinds,
            vec![CheckKind::HasImages, CheckKind::HasPrice, CheckKind::MissingStock]
        );
        assert_eq!(
            i.check(CheckKind::HasImages).unwrap().applicability,
            Applicability::Required
        );
        assert!(i.checks().iter().all(|c| c.inspection_id == i.record().id));
    }

    #[test]
    fn flags_follow_failing_sub_records() {
        let mut i = inspection();
        i.add_check(CheckKind::HasImages, Applicability::Required, 0);
        i.add_check(CheckKind::MissingEanCode, Applicability::Optional, 5);

        let change = i.recompute_flags();
        assert!(change.is_changed());
        assert!(i.record().has_missing_required);
        assert!(i.record().has_missing_optional);

        i.check_mut(CheckKind::HasImages).unwrap().passed = true;
        assert!(!i.is_consistent());
        i.recompute_flags();
        assert!(i.is_consistent());
        assert!(!i.record().has_missing_required);
        assert!(i.record().has_missing_optional);
    }

    #[test]
    fn empty_inspection_is_ready() {
        let mut i = inspection();
        assert!(!i.recompute_flags().is_changed());
        assert_eq!(i.flags(), ReadinessFlags::default());
    }

    #[test]
    fn retain_returns_dropped_sub_records() {
        let mut i = inspection();
        i.add_check(CheckKind::HasImages, Applicability::Required, 0);
        i.add_check(CheckKind::HasPrice, Applicability::Required, 1);
        let dropped = i.retain_checks(|k| k == CheckKind::HasPrice);
        assert_eq!(dropped.len(), 1);
        assert_eq!(dropped[0].check_kind, CheckKind::HasImages);
        assert_eq!(i.checks().len(), 1);
    }

    fn any_applicability() -> impl Strategy<Value = Applicability> {
        prop_oneof![Just(Applicability::Required), Just(Applicability::Optional)]
    }

    proptest! {
        #[test]
        fn flags_are_any_failing_check_per_applicability(
            outcomes in prop::collection::vec((any_applicability(), any::<bool>()), 0..17)
        ) {
            let mut i = inspection();
            for (position, (applicability, passed)) in outcomes.iter().enumerate() {
                let kind = CheckKind::ALL[position];
                i.add_check(kind, *applicability, position as u32);
                i.check_mut(kind).unwrap().passed = *passed;
            }
            i.recompute_flags();

            let missing = |wanted: Applicability| {
                outcomes.iter().any(|(a, passed)| *a == wanted && !passed)
            };
            prop_assert_eq!(i.record().has_missing_required, missing(Applicability::Required));
            prop_assert_eq!(i.record().has_missing_optional, missing(Applicability::Optional));
            prop_assert!(i.is_consistent());
        }
    }
}
