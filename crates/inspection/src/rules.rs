//! Rule catalog: which check kinds apply to which product kinds, and how strictly.
//!
//! Static configuration versioned with the code. Lookups are total: a check kind
//! without an entry is [`Applicability::None`] for every product kind.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use readiness_catalog::ProductKind;
use readiness_core::{DomainError, DomainResult};

/// A named business rule a product must satisfy before it can be listed or sold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    HasImages,
    HasPrice,
    MissingProductType,
    MissingRequiredProperties,
    MissingOptionalProperties,
    MissingEanCode,
    MissingStock,
    MissingVariations,
    DuplicateVariations,
    ConfiguratorIncomplete,
    VariationsMismatchProductType,
    MissingBundleItems,
    ItemsMismatchProductType,
    MissingBillOfMaterials,
    InactiveComponents,
    ComponentsMissingInformation,
    MissingSupplierProducts,
}

/// Set of check kinds, iterated in declaration order.
pub type CheckSet = BTreeSet<CheckKind>;

impl CheckKind {
    pub const ALL: [CheckKind; 17] = [
        CheckKind::HasImages,
        CheckKind::HasPrice,
        CheckKind::MissingProductType,
        CheckKind::MissingRequiredProperties,
        CheckKind::MissingOptionalProperties,
        CheckKind::MissingEanCode,
        CheckKind::MissingStock,
        CheckKind::MissingVariations,
        CheckKind::DuplicateVariations,
        CheckKind::ConfiguratorIncomplete,
        CheckKind::VariationsMismatchProductType,
        CheckKind::MissingBundleItems,
        CheckKind::ItemsMismatchProductType,
        CheckKind::MissingBillOfMaterials,
        CheckKind::InactiveComponents,
        CheckKind::ComponentsMissingInformation,
        CheckKind::MissingSupplierProducts,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            CheckKind::HasImages => "has_images",
            CheckKind::HasPrice => "has_price",
            CheckKind::MissingProductType => "missing_product_type",
            CheckKind::MissingRequiredProperties => "missing_required_properties",
            CheckKind::MissingOptionalProperties => "missing_optional_properties",
            CheckKind::MissingEanCode => "missing_ean_code",
            CheckKind::MissingStock => "missing_stock",
            CheckKind::MissingVariations => "missing_variations",
            CheckKind::DuplicateVariations => "duplicate_variations",
            CheckKind::ConfiguratorIncomplete => "configurator_incomplete",
            CheckKind::VariationsMismatchProductType => "variations_mismatch_product_type",
            CheckKind::MissingBundleItems => "missing_bundle_items",
            CheckKind::ItemsMismatchProductType => "items_mismatch_product_type",
            CheckKind::MissingBillOfMaterials => "missing_bill_of_materials",
            CheckKind::InactiveComponents => "inactive_components",
            CheckKind::ComponentsMissingInformation => "components_missing_information",
            CheckKind::MissingSupplierProducts => "missing_supplier_products",
        }
    }

    /// Structural checks judge a product by its components rather than its own data.
    pub const fn is_structural(self) -> bool {
        matches!(
            self,
            CheckKind::MissingVariations
                | CheckKind::DuplicateVariations
                | CheckKind::ConfiguratorIncomplete
                | CheckKind::VariationsMismatchProductType
                | CheckKind::MissingBundleItems
                | CheckKind::ItemsMismatchProductType
                | CheckKind::MissingBillOfMaterials
                | CheckKind::InactiveComponents
                | CheckKind::ComponentsMissingInformation
        )
    }

    /// Check kinds an ancestor must re-run when this kind is invalidated on a child.
    ///
    /// Own-data checks can only move the child's readiness, which the parent sees
    /// through `components_missing_information`. Structural checks also re-run
    /// their counterpart one level up.
    pub fn ancestor_checks(self) -> CheckSet {
        let mut lifted = CheckSet::from([CheckKind::ComponentsMissingInformation]);
        if self.is_structural() {
            lifted.insert(self);
        }
        lifted
    }
}

impl core::fmt::Display for CheckKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Union of [`CheckKind::ancestor_checks`] over a set.
pub fn lift_to_ancestors(checks: &CheckSet) -> CheckSet {
    checks.iter().flat_map(|k| k.ancestor_checks()).collect()
}

/// Severity with which a check applies to a product kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Applicability {
    Required,
    Optional,
    None,
}

impl Applicability {
    pub const fn is_applicable(self) -> bool {
        !matches!(self, Applicability::None)
    }
}

/// One row of the rule catalog: applicability per product kind, indexed by
/// [`ProductKind::index`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleEntry {
    pub check_kind: CheckKind,
    pub applicability: [Applicability; 6],
}

impl RuleEntry {
    pub const fn new(check_kind: CheckKind, applicability: [Applicability; 6]) -> Self {
        Self {
            check_kind,
            applicability,
        }
    }

    pub const fn for_kind(&self, kind: ProductKind) -> Applicability {
        self.applicability[kind.index()]
    }
}

/// A check that applies to some product kind, with its display position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplicableCheck {
    pub check_kind: CheckKind,
    pub applicability: Applicability,
    pub sort_order: u32,
}

const R: Applicability = Applicability::Required;
const O: Applicability = Applicability::Optional;
const N: Applicability = Applicability::None;

//                                                        simple conf bundle manuf drop supplier
const STANDARD_RULES: [RuleEntry; 17] = [
    RuleEntry::new(CheckKind::HasImages, [R, R, R, R, R, N]),
    RuleEntry::new(CheckKind::HasPrice, [R, N, R, R, R, R]),
    RuleEntry::new(CheckKind::MissingProductType, [R, R, R, R, R, O]),
    RuleEntry::new(CheckKind::MissingRequiredProperties, [R, R, R, R, R, N]),
    RuleEntry::new(CheckKind::MissingOptionalProperties, [O, O, O, O, O, N]),
    RuleEntry::new(CheckKind::MissingEanCode, [O, N, O, O, O, O]),
    RuleEntry::new(CheckKind::MissingStock, [O, N, N, O, N, N]),
    RuleEntry::new(CheckKind::MissingVariations, [N, R, N, N, N, N]),
    RuleEntry::new(CheckKind::DuplicateVariations, [N, R, N, N, N, N]),
    RuleEntry::new(CheckKind::ConfiguratorIncomplete, [N, R, N, N, N, N]),
    RuleEntry::new(CheckKind::VariationsMismatchProductType, [N, R, N, N, N, N]),
    RuleEntry::new(CheckKind::MissingBundleItems, [N, N, R, N, N, N]),
    RuleEntry::new(CheckKind::ItemsMismatchProductType, [N, N, O, N, N, N]),
    RuleEntry::new(CheckKind::MissingBillOfMaterials, [N, N, N, R, N, N]),
    RuleEntry::new(CheckKind::InactiveComponents, [N, O, R, R, N, N]),
    RuleEntry::new(CheckKind::ComponentsMissingInformation, [N, R, R, R, N, N]),
    RuleEntry::new(CheckKind::MissingSupplierProducts, [N, N, N, N, R, N]),
];

/// The rule catalog. Entry position is the sub-record `sort_order`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleCatalog {
    entries: Vec<RuleEntry>,
}

impl Default for RuleCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

impl RuleCatalog {
    pub fn standard() -> Self {
        Self {
            entries: STANDARD_RULES.to_vec(),
        }
    }

    /// Build a catalog from explicit rows. At most one row per check kind.
    pub fn from_entries(entries: Vec<RuleEntry>) -> DomainResult<Self> {
        let mut seen = CheckSet::new();
        for entry in &entries {
            if !seen.insert(entry.check_kind) {
                return Err(DomainError::validation(format!(
                    "rule catalog has more than one entry for {}",
                    entry.check_kind
                )));
            }
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[RuleEntry] {
        &self.entries
    }

    pub fn applicability(&self, check_kind: CheckKind, product_kind: ProductKind) -> Applicability {
        self.entries
            .iter()
            .find(|e| e.check_kind == check_kind)
            .map(|e| e.for_kind(product_kind))
            .unwrap_or(Applicability::None)
    }

    /// Checks that apply to `product_kind`, in ascending `sort_order`.
    pub fn applicable(&self, product_kind: ProductKind) -> Vec<ApplicableCheck> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.for_kind(product_kind).is_applicable())
            .map(|(position, e)| ApplicableCheck {
                check_kind: e.check_kind,
                applicability: e.for_kind(product_kind),
                sort_order: position as u32,
            })
            .collect()
    }

    pub fn applicable_kinds(&self, product_kind: ProductKind) -> CheckSet {
        self.applicable(product_kind)
            .into_iter()
            .map(|c| c.check_kind)
            .collect()
    }
}
