use readiness_catalog::{ProductKind, ProductTypeRule, PropertyRequirement};

use super::{ensure, is_filled, join_ids};
use crate::registry::{CheckContext, CheckResult};

pub(super) fn has_images(ctx: &CheckContext<'_>) -> CheckResult {
    let images = ctx.catalog.image_count(ctx.tenant_id, ctx.product_id)?;
    ensure(images > 0, || "product has no images".to_string())
}

pub(super) fn has_price(ctx: &CheckContext<'_>) -> CheckResult {
    let priced = ctx.catalog.has_price(ctx.tenant_id, ctx.product_id)?;
    ensure(priced, || "product has no price".to_string())
}

pub(super) fn missing_product_type(ctx: &CheckContext<'_>) -> CheckResult {
    let product_type = ctx.catalog.product_type(ctx.tenant_id, ctx.product_id)?;
    ensure(product_type.is_some(), || "product type is not set".to_string())
}

/// Required properties, plus configurator properties on anything that is not
/// the configurable parent itself (variations carry those values).
pub(super) fn missing_required_properties(ctx: &CheckContext<'_>) -> CheckResult {
    let kind = ctx.kind;
    missing_properties(ctx, "required", |rule| match rule.requirement {
        PropertyRequirement::Required => true,
        PropertyRequirement::Configurator => kind != ProductKind::Configurable,
        PropertyRequirement::Optional => false,
    })
}

pub(super) fn missing_optional_properties(ctx: &CheckContext<'_>) -> CheckResult {
    missing_properties(ctx, "optional", |rule| {
        rule.requirement == PropertyRequirement::Optional
    })
}

fn missing_properties(
    ctx: &CheckContext<'_>,
    label: &str,
    demanded: impl Fn(&ProductTypeRule) -> bool,
) -> CheckResult {
    // Without a product type there is nothing to demand; missing_product_type reports it.
    let Some(product_type) = ctx.catalog.product_type(ctx.tenant_id, ctx.product_id)? else {
        return Ok(());
    };
    let rules = ctx.catalog.product_type_rules(ctx.tenant_id, product_type)?;
    let values = ctx.catalog.property_values(ctx.tenant_id, ctx.product_id)?;

    let mut missing: Vec<_> = rules
        .iter()
        .filter(|rule| demanded(rule))
        .filter(|rule| !is_filled(values.get(&rule.property_id)))
        .map(|rule| rule.property_id)
        .collect();
    missing.sort();

    ensure(missing.is_empty(), || {
        format!("missing {label} properties: {}", join_ids(&missing))
    })
}

pub(super) fn missing_ean_code(ctx: &CheckContext<'_>) -> CheckResult {
    let ean = ctx.catalog.ean(ctx.tenant_id, ctx.product_id)?;
    ensure(is_filled(ean.as_ref()), || "product has no EAN code".to_string())
}

pub(super) fn missing_stock(ctx: &CheckContext<'_>) -> CheckResult {
    let stock = ctx.catalog.stock(ctx.tenant_id, ctx.product_id)?;
    ensure(stock.is_sellable(), || {
        "product is out of stock and does not allow backorders".to_string()
    })
}

pub(super) fn missing_supplier_products(ctx: &CheckContext<'_>) -> CheckResult {
    let linked = ctx
        .catalog
        .supplier_product_count(ctx.tenant_id, ctx.product_id)?;
    ensure(linked > 0, || "dropship product has no supplier products".to_string())
}
