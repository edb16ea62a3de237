use std::collections::HashMap;

use readiness_catalog::{
    InMemoryCatalog, ProductId, ProductKind, ProductTypeRule, PropertyRequirement, RelationKind,
    StockLevel,
};
use readiness_core::{ProductTypeId, PropertyId, TenantId};

use crate::registry::{CheckContext, CheckError, CheckRegistry};
use crate::rules::CheckKind;
use crate::store::{InspectionStoreError, ReadinessReader};

#[derive(Default)]
struct FixedReadiness(HashMap<ProductId, bool>);

impl ReadinessReader for FixedReadiness {
    fn has_missing_required(
        &self,
        _tenant_id: TenantId,
        product_id: ProductId,
    ) -> Result<Option<bool>, InspectionStoreError> {
        Ok(self.0.get(&product_id).copied())
    }
}

struct Fixture {
    tenant: TenantId,
    catalog: InMemoryCatalog,
    readiness: FixedReadiness,
    registry: CheckRegistry,
}

impl Fixture {
    fn new() -> Self {
        Self {
            tenant: TenantId::new(),
            catalog: InMemoryCatalog::new(),
            readiness: FixedReadiness::default(),
            registry: CheckRegistry::standard(),
        }
    }

    fn product(&self, kind: ProductKind) -> ProductId {
        self.catalog.create_product(self.tenant, kind).unwrap().0
    }

    fn run(&self, check: CheckKind, product_id: ProductId) -> Result<(), String> {
        let kind = self.catalog.get(self.tenant, product_id).unwrap().kind;
        let ctx = CheckContext {
            tenant_id: self.tenant,
            product_id,
            kind,
            catalog: &self.catalog,
            readiness: &self.readiness,
        };
        match self.registry.get(check).unwrap().evaluate(&ctx) {
            Ok(()) => Ok(()),
            Err(CheckError::Failed(f)) => Err(f.reason),
            Err(other) => panic!("unexpected adapter failure: {other}"),
        }
    }

    fn typed(&self, product_id: ProductId, product_type: ProductTypeId) {
        self.catalog
            .set_product_type(self.tenant, product_id, Some(product_type))
            .unwrap();
    }
}

#[test]
fn own_data_checks_follow_catalog_state() {
    let fx = Fixture::new();
    let p = fx.product(ProductKind::Simple);

    assert!(fx.run(CheckKind::HasImages, p).is_err());
    assert!(fx.run(CheckKind::HasPrice, p).is_err());
    assert!(fx.run(CheckKind::MissingEanCode, p).is_err());
    assert!(fx.run(CheckKind::MissingStock, p).is_err());

    fx.catalog.attach_image(fx.tenant, p).unwrap();
    fx.catalog.set_price(fx.tenant, p, true).unwrap();
    fx.catalog.set_ean(fx.tenant, p, Some("4006381333931".into())).unwrap();
    fx.catalog
        .set_stock(fx.tenant, p, StockLevel { on_hand: 0, allow_backorder: true })
        .unwrap();

    assert_eq!(fx.run(CheckKind::HasImages, p), Ok(()));
    assert_eq!(fx.run(CheckKind::HasPrice, p), Ok(()));
    assert_eq!(fx.run(CheckKind::MissingEanCode, p), Ok(()));
    assert_eq!(fx.run(CheckKind::MissingStock, p), Ok(()));
}

#[test]
fn blank_ean_does_not_count() {
    let fx = Fixture::new();
    let p = fx.product(ProductKind::Simple);
    fx.catalog.set_ean(fx.tenant, p, Some("  ".into())).unwrap();
    assert!(fx.run(CheckKind::MissingEanCode, p).is_err());
}

#[test]
fn property_checks_pass_without_product_type() {
    let fx = Fixture::new();
    let p = fx.product(ProductKind::Simple);
    assert!(fx.run(CheckKind::MissingProductType, p).is_err());
    assert_eq!(fx.run(CheckKind::MissingRequiredProperties, p), Ok(()));
    assert_eq!(fx.run(CheckKind::MissingOptionalProperties, p), Ok(()));
}

#[test]
fn configurator_properties_are_required_on_variations_only() {
    let fx = Fixture::new();
    let colour = PropertyId::new();
    let material = PropertyId::new();
    let shirt = ProductTypeId::new();
    fx.catalog
        .define_product_type(
            fx.tenant,
            shirt,
            vec![
                ProductTypeRule::new(colour, PropertyRequirement::Configurator),
                ProductTypeRule::new(material, PropertyRequirement::Required),
            ],
        )
        .unwrap();

    let parent = fx.product(ProductKind::Configurable);
    let variation = fx.product(ProductKind::Simple);
    fx.typed(parent, shirt);
    fx.typed(variation, shirt);
    fx.catalog
        .set_property(fx.tenant, parent, material, Some("cotton".into()))
        .unwrap();
    fx.catalog
        .set_property(fx.tenant, variation, material, Some("cotton".into()))
        .unwrap();

    assert_eq!(fx.run(CheckKind::MissingRequiredProperties, parent), Ok(()));
    let reason = fx.run(CheckKind::MissingRequiredProperties, variation).unwrap_err();
    assert!(reason.contains(&colour.to_string()));

    fx.catalog
        .set_property(fx.tenant, variation, colour, Some("red".into()))
        .unwrap();
    assert_eq!(fx.run(CheckKind::MissingRequiredProperties, variation), Ok(()));
}

#[test]
fn variations_must_include_an_active_one() {
    let fx = Fixture::new();
    let parent = fx.product(ProductKind::Configurable);
    assert!(fx.run(CheckKind::MissingVariations, parent).is_err());

    let v = fx.product(ProductKind::Simple);
    fx.catalog.relate(fx.tenant, RelationKind::Variation, parent, v).unwrap();
    fx.catalog.set_active(fx.tenant, v, false).unwrap();
    let reason = fx.run(CheckKind::MissingVariations, parent).unwrap_err();
    assert!(reason.contains("active"));

    fx.catalog.set_active(fx.tenant, v, true).unwrap();
    assert_eq!(fx.run(CheckKind::MissingVariations, parent), Ok(()));
}

#[test]
fn configurator_combinations_must_be_complete_and_distinct() {
    let fx = Fixture::new();
    let size = PropertyId::new();
    let shoe = ProductTypeId::new();
    fx.catalog
        .define_product_type(
            fx.tenant,
            shoe,
            vec![ProductTypeRule::new(size, PropertyRequirement::Configurator)],
        )
        .unwrap();

    let parent = fx.product(ProductKind::Configurable);
    fx.typed(parent, shoe);
    let a = fx.product(ProductKind::Simple);
    let b = fx.product(ProductKind::Simple);
    for v in [a, b] {
        fx.catalog.relate(fx.tenant, RelationKind::Variation, parent, v).unwrap();
    }

    fx.catalog.set_property(fx.tenant, a, size, Some("42".into())).unwrap();
    assert!(fx.run(CheckKind::ConfiguratorIncomplete, parent).is_err());
    assert_eq!(fx.run(CheckKind::DuplicateVariations, parent), Ok(()));

    fx.catalog.set_property(fx.tenant, b, size, Some("42".into())).unwrap();
    assert_eq!(fx.run(CheckKind::ConfiguratorIncomplete, parent), Ok(()));
    assert!(fx.run(CheckKind::DuplicateVariations, parent).is_err());

    fx.catalog.set_property(fx.tenant, b, size, Some("43".into())).unwrap();
    assert_eq!(fx.run(CheckKind::DuplicateVariations, parent), Ok(()));
}

#[test]
fn configurator_needs_a_typed_parent_with_configurator_properties() {
    let fx = Fixture::new();
    let parent = fx.product(ProductKind::Configurable);
    assert!(fx.run(CheckKind::ConfiguratorIncomplete, parent).is_err());

    let plain = ProductTypeId::new();
    fx.catalog.define_product_type(fx.tenant, plain, vec![]).unwrap();
    fx.typed(parent, plain);
    assert!(fx.run(CheckKind::ConfiguratorIncomplete, parent).is_err());
}

#[test]
fn children_must_share_the_parent_type() {
    let fx = Fixture::new();
    let bundle = fx.product(ProductKind::Bundle);
    let item = fx.product(ProductKind::Simple);
    fx.catalog.relate(fx.tenant, RelationKind::BundleItem, bundle, item).unwrap();

    assert_eq!(fx.run(CheckKind::ItemsMismatchProductType, bundle), Ok(()));

    let kit = ProductTypeId::new();
    fx.typed(bundle, kit);
    assert!(fx.run(CheckKind::ItemsMismatchProductType, bundle).is_err());

    fx.typed(item, kit);
    assert_eq!(fx.run(CheckKind::ItemsMismatchProductType, bundle), Ok(()));
}

#[test]
fn composites_need_components() {
    let fx = Fixture::new();
    let bundle = fx.product(ProductKind::Bundle);
    let manufactured = fx.product(ProductKind::Manufacturable);
    let dropship = fx.product(ProductKind::Dropship);

    assert!(fx.run(CheckKind::MissingBundleItems, bundle).is_err());
    assert!(fx.run(CheckKind::MissingBillOfMaterials, manufactured).is_err());
    assert!(fx.run(CheckKind::MissingSupplierProducts, dropship).is_err());

    let part = fx.product(ProductKind::Simple);
    fx.catalog.relate(fx.tenant, RelationKind::BundleItem, bundle, part).unwrap();
    fx.catalog
        .relate(fx.tenant, RelationKind::BomComponent, manufactured, part)
        .unwrap();
    fx.catalog.link_supplier_product(fx.tenant, dropship).unwrap();

    assert_eq!(fx.run(CheckKind::MissingBundleItems, bundle), Ok(()));
    assert_eq!(fx.run(CheckKind::MissingBillOfMaterials, manufactured), Ok(()));
    assert_eq!(fx.run(CheckKind::MissingSupplierProducts, dropship), Ok(()));
}

#[test]
fn inactive_components_are_reported() {
    let fx = Fixture::new();
    let bundle = fx.product(ProductKind::Bundle);
    let item = fx.product(ProductKind::Simple);
    fx.catalog.relate(fx.tenant, RelationKind::BundleItem, bundle, item).unwrap();
    assert_eq!(fx.run(CheckKind::InactiveComponents, bundle), Ok(()));

    fx.catalog.set_active(fx.tenant, item, false).unwrap();
    let reason = fx.run(CheckKind::InactiveComponents, bundle).unwrap_err();
    assert!(reason.contains(&item.to_string()));
}

#[test]
fn component_readiness_is_read_from_child_inspections() {
    let mut fx = Fixture::new();
    let bundle = fx.product(ProductKind::Bundle);
    let ready = fx.product(ProductKind::Simple);
    let lacking = fx.product(ProductKind::Simple);
    let uninspected = fx.product(ProductKind::Simple);
    for item in [ready, lacking, uninspected] {
        fx.catalog.relate(fx.tenant, RelationKind::BundleItem, bundle, item).unwrap();
    }
    fx.readiness.0.insert(ready, false);
    assert_eq!(fx.run(CheckKind::ComponentsMissingInformation, bundle), Ok(()));

    fx.readiness.0.insert(lacking, true);
    let reason = fx
        .run(CheckKind::ComponentsMissingInformation, bundle)
        .unwrap_err();
    assert!(reason.contains(&lacking.to_string()));
    assert!(!reason.contains(&ready.to_string()));
}
