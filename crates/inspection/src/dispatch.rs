//! Event dispatch: translate a catalog mutation into the `(product, checks)`
//! pairs it can invalidate.
//!
//! Stateless apart from catalog reads needed to find the affected products
//! (products of a type, parents of a product).

use std::sync::Arc;

use readiness_catalog::{CatalogChange, CatalogReader, ProductId, RelationKind};
use readiness_core::TenantId;

use crate::error::InspectionError;
use crate::rules::{CheckKind, CheckSet};

/// Checks to re-run on one product. The propagator takes it from there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invalidation {
    pub product_id: ProductId,
    pub checks: CheckSet,
}

impl Invalidation {
    pub fn new(product_id: ProductId, checks: impl IntoIterator<Item = CheckKind>) -> Self {
        Self {
            product_id,
            checks: checks.into_iter().collect(),
        }
    }
}

pub trait EventDispatch: Send + Sync {
    fn on_entity_changed(
        &self,
        tenant_id: TenantId,
        change: &CatalogChange,
    ) -> Result<Vec<Invalidation>, InspectionError>;
}

/// Checks of a parent that look at its children through `relation`.
pub fn structural_checks(relation: RelationKind) -> CheckSet {
    let own = match relation {
        RelationKind::Variation => &[
            CheckKind::MissingVariations,
            CheckKind::DuplicateVariations,
            CheckKind::ConfiguratorIncomplete,
            CheckKind::VariationsMismatchProductType,
        ][..],
        RelationKind::BundleItem => &[
            CheckKind::MissingBundleItems,
            CheckKind::ItemsMismatchProductType,
        ][..],
        RelationKind::BomComponent => &[CheckKind::MissingBillOfMaterials][..],
    };
    own.iter()
        .copied()
        .chain([
            CheckKind::InactiveComponents,
            CheckKind::ComponentsMissingInformation,
        ])
        .collect()
}

/// Checks of a parent that compare its children's product type or property values.
fn parent_type_checks(relation: RelationKind) -> &'static [CheckKind] {
    match relation {
        RelationKind::Variation => &[
            CheckKind::DuplicateVariations,
            CheckKind::ConfiguratorIncomplete,
            CheckKind::VariationsMismatchProductType,
        ],
        RelationKind::BundleItem => &[CheckKind::ItemsMismatchProductType],
        RelationKind::BomComponent => &[],
    }
}

const PRODUCT_TYPE_CHECKS: [CheckKind; 8] = [
    CheckKind::MissingProductType,
    CheckKind::MissingRequiredProperties,
    CheckKind::MissingOptionalProperties,
    CheckKind::MissingEanCode,
    CheckKind::DuplicateVariations,
    CheckKind::ConfiguratorIncomplete,
    CheckKind::VariationsMismatchProductType,
    CheckKind::ItemsMismatchProductType,
];

const PROPERTY_CHECKS: [CheckKind; 2] = [
    CheckKind::MissingRequiredProperties,
    CheckKind::MissingOptionalProperties,
];

const TYPE_RULE_CHECKS: [CheckKind; 4] = [
    CheckKind::MissingRequiredProperties,
    CheckKind::MissingOptionalProperties,
    CheckKind::DuplicateVariations,
    CheckKind::ConfiguratorIncomplete,
];

fn own(product_id: ProductId, check: CheckKind) -> Result<Vec<Invalidation>, InspectionError> {
    Ok(vec![Invalidation::new(product_id, [check])])
}

/// The mapping used in production.
pub struct StandardDispatch {
    catalog: Arc<dyn CatalogReader>,
}

impl StandardDispatch {
    pub fn new(catalog: Arc<dyn CatalogReader>) -> Self {
        Self { catalog }
    }

    /// One invalidation per parent of `product_id`, with checks chosen by relation.
    fn for_parents(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        checks_for: impl Fn(RelationKind) -> CheckSet,
    ) -> Result<Vec<Invalidation>, InspectionError> {
        let mut out = Vec::new();
        for relation in RelationKind::ALL {
            let checks = checks_for(relation);
            if checks.is_empty() {
                continue;
            }
            for parent in self.catalog.parents(tenant_id, product_id, relation)? {
                out.push(Invalidation {
                    product_id: parent,
                    checks: checks.clone(),
                });
            }
        }
        Ok(out)
    }
}

impl EventDispatch for StandardDispatch {
    fn on_entity_changed(
        &self,
        tenant_id: TenantId,
        change: &CatalogChange,
    ) -> Result<Vec<Invalidation>, InspectionError> {
        match change {
            // A new product has no parents yet; its own checks run when it is ensured.
            CatalogChange::ProductCreated { .. } => Ok(Vec::new()),
            CatalogChange::ProductKindChanged { product_id } => {
                Ok(vec![Invalidation::new(*product_id, CheckKind::ALL)])
            }
            CatalogChange::ProductDeleted { former_parents, .. } => Ok(former_parents
                .iter()
                .map(|(relation, parent)| Invalidation {
                    product_id: *parent,
                    checks: structural_checks(*relation),
                })
                .collect()),
            CatalogChange::ProductActivationChanged { product_id } => {
                self.for_parents(tenant_id, *product_id, |relation| {
                    let mut checks = CheckSet::from([CheckKind::InactiveComponents]);
                    if relation == RelationKind::Variation {
                        checks.insert(CheckKind::MissingVariations);
                    }
                    checks
                })
            }
            CatalogChange::EanChanged { product_id } => own(*product_id, CheckKind::MissingEanCode),
            CatalogChange::ImageAttached { product_id } | CatalogChange::ImageDetached { product_id } => {
                own(*product_id, CheckKind::HasImages)
            }
            CatalogChange::PriceCreated { product_id } | CatalogChange::PriceDeleted { product_id } => {
                own(*product_id, CheckKind::HasPrice)
            }
            CatalogChange::StockChanged { product_id } => own(*product_id, CheckKind::MissingStock),
            CatalogChange::SupplierProductLinked { product_id }
            | CatalogChange::SupplierProductUnlinked { product_id } => {
                own(*product_id, CheckKind::MissingSupplierProducts)
            }
            CatalogChange::RelationAdded {
                relation,
                parent_id,
                ..
            }
            | CatalogChange::RelationRemoved {
                relation,
                parent_id,
                ..
            } => Ok(vec![Invalidation {
                product_id: *parent_id,
                checks: structural_checks(*relation),
            }]),
            CatalogChange::PropertyValueChanged {
                product_id,
                is_product_type: true,
                ..
            } => {
                let mut out = vec![Invalidation::new(*product_id, PRODUCT_TYPE_CHECKS)];
                out.extend(self.for_parents(tenant_id, *product_id, |relation| {
                    parent_type_checks(relation).iter().copied().collect()
                })?);
                Ok(out)
            }
            CatalogChange::PropertyValueChanged {
                product_id,
                is_product_type: false,
                ..
            } => {
                let mut out = vec![Invalidation::new(*product_id, PROPERTY_CHECKS)];
                out.extend(self.for_parents(tenant_id, *product_id, |relation| match relation {
                    RelationKind::Variation => CheckSet::from([
                        CheckKind::DuplicateVariations,
                        CheckKind::ConfiguratorIncomplete,
                    ]),
                    RelationKind::BundleItem | RelationKind::BomComponent => CheckSet::new(),
                })?);
                Ok(out)
            }
            CatalogChange::ProductTypeRulesChanged { product_type } => Ok(self
                .catalog
                .products_with_type(tenant_id, *product_type)?
                .into_iter()
                .map(|product_id| Invalidation::new(product_id, TYPE_RULE_CHECKS))
                .collect()),
            CatalogChange::ReadinessChanged { product_id } => {
                self.for_parents(tenant_id, *product_id, |_| {
                    CheckSet::from([CheckKind::ComponentsMissingInformation])
                })
            }
        }
    }
}
