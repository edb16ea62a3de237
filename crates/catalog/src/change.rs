//! Catalog mutation taxonomy.
//!
//! Every mutation that can change the outcome of a check has a variant here.
//! The dispatch table in the inspection crate matches on this enum without a
//! wildcard arm, so adding a variant without mapping it fails to compile.

use serde::{Deserialize, Serialize};

use readiness_core::{ProductTypeId, PropertyId};

use crate::product::{ProductId, RelationKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum CatalogChange {
    ProductCreated {
        product_id: ProductId,
    },
    ProductKindChanged {
        product_id: ProductId,
    },
    /// Relations are gone by the time this is observed, so the parents the
    /// product used to have travel with the change.
    ProductDeleted {
        product_id: ProductId,
        former_parents: Vec<(RelationKind, ProductId)>,
    },
    ProductActivationChanged {
        product_id: ProductId,
    },
    EanChanged {
        product_id: ProductId,
    },
    ImageAttached {
        product_id: ProductId,
    },
    ImageDetached {
        product_id: ProductId,
    },
    PriceCreated {
        product_id: ProductId,
    },
    PriceDeleted {
        product_id: ProductId,
    },
    StockChanged {
        product_id: ProductId,
    },
    SupplierProductLinked {
        product_id: ProductId,
    },
    SupplierProductUnlinked {
        product_id: ProductId,
    },
    RelationAdded {
        relation: RelationKind,
        parent_id: ProductId,
        child_id: ProductId,
    },
    RelationRemoved {
        relation: RelationKind,
        parent_id: ProductId,
        child_id: ProductId,
    },
    PropertyValueChanged {
        product_id: ProductId,
        property_id: PropertyId,
        /// The property is the product-type discriminator.
        is_product_type: bool,
    },
    ProductTypeRulesChanged {
        product_type: ProductTypeId,
    },
    /// A product's `has_missing_required` flipped. Emitted by the engine's own
    /// event stream so composite ancestors can follow.
    ReadinessChanged {
        product_id: ProductId,
    },
}

impl CatalogChange {
    pub fn name(&self) -> &'static str {
        match self {
            CatalogChange::ProductCreated { .. } => "product_created",
            CatalogChange::ProductKindChanged { .. } => "product_kind_changed",
            CatalogChange::ProductDeleted { .. } => "product_deleted",
            CatalogChange::ProductActivationChanged { .. } => "product_activation_changed",
            CatalogChange::EanChanged { .. } => "ean_changed",
            CatalogChange::ImageAttached { .. } => "image_attached",
            CatalogChange::ImageDetached { .. } => "image_detached",
            CatalogChange::PriceCreated { .. } => "price_created",
            CatalogChange::PriceDeleted { .. } => "price_deleted",
            CatalogChange::StockChanged { .. } => "stock_changed",
            CatalogChange::SupplierProductLinked { .. } => "supplier_product_linked",
            CatalogChange::SupplierProductUnlinked { .. } => "supplier_product_unlinked",
            CatalogChange::RelationAdded { .. } => "relation_added",
            CatalogChange::RelationRemoved { .. } => "relation_removed",
            CatalogChange::PropertyValueChanged { .. } => "property_value_changed",
            CatalogChange::ProductTypeRulesChanged { .. } => "product_type_rules_changed",
            CatalogChange::ReadinessChanged { .. } => "readiness_changed",
        }
    }

    /// The product the change is about, if it is about a single product.
    ///
    /// Relation changes report the parent: that is the product whose checks move.
    pub fn subject(&self) -> Option<ProductId> {
        match self {
            CatalogChange::ProductCreated { product_id }
            | CatalogChange::ProductKindChanged { product_id }
            | CatalogChange::ProductDeleted { product_id, .. }
            | CatalogChange::ProductActivationChanged { product_id }
            | CatalogChange::EanChanged { product_id }
            | CatalogChange::ImageAttached { product_id }
            | CatalogChange::ImageDetached { product_id }
            | CatalogChange::PriceCreated { product_id }
            | CatalogChange::PriceDeleted { product_id }
            | CatalogChange::StockChanged { product_id }
            | CatalogChange::SupplierProductLinked { product_id }
            | CatalogChange::SupplierProductUnlinked { product_id }
            | CatalogChange::PropertyValueChanged { product_id, .. }
            | CatalogChange::ReadinessChanged { product_id } => Some(*product_id),
            CatalogChange::RelationAdded { parent_id, .. }
            | CatalogChange::RelationRemoved { parent_id, .. } => Some(*parent_id),
            CatalogChange::ProductTypeRulesChanged { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_change_tag() {
        let change = CatalogChange::ImageAttached {
            product_id: ProductId::new(),
        };
        let json = serde_json::to_value(&change).unwrap();
        assert_eq!(json["change"], "image_attached");
        let back: CatalogChange = serde_json::from_value(json).unwrap();
        assert_eq!(back, change);
    }

    #[test]
    fn relation_changes_are_about_the_parent() {
        let parent_id = ProductId::new();
        let change = CatalogChange::RelationRemoved {
            relation: RelationKind::Variation,
            parent_id,
            child_id: ProductId::new(),
        };
        assert_eq!(change.subject(), Some(parent_id));
        assert_eq!(change.name(), "relation_removed");
    }
}
