use std::collections::HashMap;

use readiness_catalog::{ProductId, PropertyRequirement, RelationKind};
use readiness_core::PropertyId;

use super::{ensure, is_filled, join_ids};
use crate::registry::{CheckContext, CheckError, CheckResult};

fn related(ctx: &CheckContext<'_>, relation: RelationKind) -> Result<Vec<ProductId>, CheckError> {
    Ok(ctx.catalog.children(ctx.tenant_id, ctx.product_id, relation)?)
}

/// Configurator properties of the product's own type; `None` when it has no type.
fn configurator_properties(ctx: &CheckContext<'_>) -> Result<Option<Vec<PropertyId>>, CheckError> {
    let Some(product_type) = ctx.catalog.product_type(ctx.tenant_id, ctx.product_id)? else {
        return Ok(None);
    };
    let mut properties: Vec<_> = ctx
        .catalog
        .product_type_rules(ctx.tenant_id, product_type)?
        .into_iter()
        .filter(|rule| rule.requirement == PropertyRequirement::Configurator)
        .map(|rule| rule.property_id)
        .collect();
    properties.sort();
    Ok(Some(properties))
}

pub(super) fn missing_variations(ctx: &CheckContext<'_>) -> CheckResult {
    let variations = related(ctx, RelationKind::Variation)?;
    if variations.is_empty() {
        return Err(CheckError::failed("configurable product has no variations"));
    }
    for variation in &variations {
        if ctx.catalog.is_active(ctx.tenant_id, *variation)? {
            return Ok(());
        }
    }
    Err(CheckError::failed("configurable product has no active variations"))
}

pub(super) fn duplicate_variations(ctx: &CheckContext<'_>) -> CheckResult {
    let Some(configurator) = configurator_properties(ctx)? else {
        return Ok(());
    };
    if configurator.is_empty() {
        return Ok(());
    }

    let mut seen: HashMap<Vec<String>, ProductId> = HashMap::new();
    for variation in related(ctx, RelationKind::Variation)? {
        let values = ctx.catalog.property_values(ctx.tenant_id, variation)?;
        // Incomplete combinations are configurator_incomplete's concern.
        let combination: Option<Vec<String>> = configurator
            .iter()
            .map(|p| values.get(p).filter(|v| !v.trim().is_empty()).cloned())
            .collect();
        let Some(combination) = combination else {
            continue;
        };
        if let Some(first) = seen.insert(combination, variation) {
            return Err(CheckError::failed(format!(
                "variations {first} and {variation} have the same configurator values"
            )));
        }
    }
    Ok(())
}

pub(super) fn configurator_incomplete(ctx: &CheckContext<'_>) -> CheckResult {
    let Some(configurator) = configurator_properties(ctx)? else {
        return Err(CheckError::failed(
            "configurable product has no product type to take configurator properties from",
        ));
    };
    if configurator.is_empty() {
        return Err(CheckError::failed(
            "product type defines no configurator properties",
        ));
    }

    let mut incomplete = Vec::new();
    for variation in related(ctx, RelationKind::Variation)? {
        let values = ctx.catalog.property_values(ctx.tenant_id, variation)?;
        if configurator.iter().any(|p| !is_filled(values.get(p))) {
            incomplete.push(variation);
        }
    }
    ensure(incomplete.is_empty(), || {
        format!(
            "variations without a full configurator combination: {}",
            join_ids(&incomplete)
        )
    })
}

fn mismatched_product_type(
    ctx: &CheckContext<'_>,
    relation: RelationKind,
    label: &str,
) -> CheckResult {
    let Some(expected) = ctx.catalog.product_type(ctx.tenant_id, ctx.product_id)? else {
        return Ok(());
    };
    let mut mismatched = Vec::new();
    for child in related(ctx, relation)? {
        if ctx.catalog.product_type(ctx.tenant_id, child)? != Some(expected) {
            mismatched.push(child);
        }
    }
    ensure(mismatched.is_empty(), || {
        format!("{label} with a different product type: {}", join_ids(&mismatched))
    })
}

pub(super) fn variations_mismatch_product_type(ctx: &CheckContext<'_>) -> CheckResult {
    mismatched_product_type(ctx, RelationKind::Variation, "variations")
}

pub(super) fn items_mismatch_product_type(ctx: &CheckContext<'_>) -> CheckResult {
    mismatched_product_type(ctx, RelationKind::BundleItem, "bundle items")
}

pub(super) fn missing_bundle_items(ctx: &CheckContext<'_>) -> CheckResult {
    let items = related(ctx, RelationKind::BundleItem)?;
    ensure(!items.is_empty(), || "bundle has no items".to_string())
}

pub(super) fn missing_bill_of_materials(ctx: &CheckContext<'_>) -> CheckResult {
    let components = related(ctx, RelationKind::BomComponent)?;
    ensure(!components.is_empty(), || {
        "manufacturable product has no bill of materials".to_string()
    })
}

pub(super) fn inactive_components(ctx: &CheckContext<'_>) -> CheckResult {
    let mut inactive = Vec::new();
    for component in ctx.catalog.components(ctx.tenant_id, ctx.product_id, ctx.kind)? {
        if !ctx.catalog.is_active(ctx.tenant_id, component)? {
            inactive.push(component);
        }
    }
    ensure(inactive.is_empty(), || {
        format!("inactive components: {}", join_ids(&inactive))
    })
}

/// Reads the components' own readiness; components without an inspection
/// are not counted against the parent.
pub(super) fn components_missing_information(ctx: &CheckContext<'_>) -> CheckResult {
    let mut lacking = Vec::new();
    for component in ctx.catalog.components(ctx.tenant_id, ctx.product_id, ctx.kind)? {
        if ctx.readiness.has_missing_required(ctx.tenant_id, component)? == Some(true) {
            lacking.push(component);
        }
    }
    ensure(lacking.is_empty(), || {
        format!("components missing required information: {}", join_ids(&lacking))
    })
}
