//! Check predicates.
//!
//! Own-data checks look only at the product itself; structural checks look at
//! the product's components.

mod own;
mod structure;

#[cfg(test)]
mod tests;

use crate::registry::{CheckDefinition, CheckError, CheckResult};
use crate::rules::CheckKind;

macro_rules! check {
    ($kind:ident, $name:literal, $predicate:path) => {
        CheckDefinition {
            kind: CheckKind::$kind,
            predicate: $predicate,
            on_pass_event: concat!("inspection.", $name, ".passed"),
            on_fail_event: concat!("inspection.", $name, ".failed"),
        }
    };
}

pub(crate) fn standard_definitions() -> Vec<CheckDefinition> {
    vec![
        check!(HasImages, "has_images", own::has_images),
        check!(HasPrice, "has_price", own::has_price),
        check!(MissingProductType, "missing_product_type", own::missing_product_type),
        check!(
            MissingRequiredProperties,
            "missing_required_properties",
            own::missing_required_properties
        ),
        check!(
            MissingOptionalProperties,
            "missing_optional_properties",
            own::missing_optional_properties
        ),
        check!(MissingEanCode, "missing_ean_code", own::missing_ean_code),
        check!(MissingStock, "missing_stock", own::missing_stock),
        check!(MissingVariations, "missing_variations", structure::missing_variations),
        check!(DuplicateVariations, "duplicate_variations", structure::duplicate_variations),
        check!(
            ConfiguratorIncomplete,
            "configurator_incomplete",
            structure::configurator_incomplete
        ),
        check!(
            VariationsMismatchProductType,
            "variations_mismatch_product_type",
            structure::variations_mismatch_product_type
        ),
        check!(MissingBundleItems, "missing_bundle_items", structure::missing_bundle_items),
        check!(
            ItemsMismatchProductType,
            "items_mismatch_product_type",
            structure::items_mismatch_product_type
        ),
        check!(
            MissingBillOfMaterials,
            "missing_bill_of_materials",
            structure::missing_bill_of_materials
        ),
        check!(InactiveComponents, "inactive_components", structure::inactive_components),
        check!(
            ComponentsMissingInformation,
            "components_missing_information",
            structure::components_missing_information
        ),
        check!(
            MissingSupplierProducts,
            "missing_supplier_products",
            own::missing_supplier_products
        ),
    ]
}

fn ensure(condition: bool, reason: impl FnOnce() -> String) -> CheckResult {
    if condition {
        Ok(())
    } else {
        Err(CheckError::failed(reason()))
    }
}

fn is_filled(value: Option<&String>) -> bool {
    value.is_some_and(|v| !v.trim().is_empty())
}

fn join_ids<T: core::fmt::Display>(ids: &[T]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
