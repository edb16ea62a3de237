//! In-memory catalog for tests/dev and the replay worker.
//!
//! Mutators apply the change and return the [`CatalogChange`] a real catalog
//! service would publish for it, so callers can feed it straight into the engine.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::debug;

use readiness_core::{ProductTypeId, PropertyId, TenantId};

use crate::change::CatalogChange;
use crate::product::{ProductId, ProductKind, Relation, RelationKind};
use crate::property::{ProductTypeRule, PropertyValues};
use crate::reader::{
    CatalogError, CatalogResult, MediaReader, PriceReader, ProductReader, PropertyReader,
    RelationReader, StockLevel, StockReader, SupplierReader,
};

/// Everything the catalog knows about one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: ProductId,
    pub kind: ProductKind,
    #[serde(default = "active_by_default")]
    pub active: bool,
    #[serde(default)]
    pub ean: Option<String>,
    #[serde(default)]
    pub product_type: Option<ProductTypeId>,
    #[serde(default)]
    pub images: usize,
    #[serde(default)]
    pub has_price: bool,
    #[serde(default)]
    pub stock: StockLevel,
    #[serde(default)]
    pub supplier_products: usize,
    #[serde(default)]
    pub properties: PropertyValues,
}

fn active_by_default() -> bool {
    true
}

impl ProductRecord {
    pub fn new(id: ProductId, kind: ProductKind) -> Self {
        Self {
            id,
            kind,
            active: true,
            ean: None,
            product_type: None,
            images: 0,
            has_price: false,
            stock: StockLevel::default(),
            supplier_products: 0,
            properties: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductTypeDefinition {
    pub id: ProductTypeId,
    pub rules: Vec<ProductTypeRule>,
}

/// Serializable catalog content for one tenant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantSnapshot {
    pub tenant_id: TenantId,
    #[serde(default)]
    pub products: Vec<ProductRecord>,
    #[serde(default)]
    pub relations: Vec<Relation>,
    #[serde(default)]
    pub product_types: Vec<ProductTypeDefinition>,
}

/// Serializable catalog content, as loaded by the replay worker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    pub product_type_property: Option<PropertyId>,
    #[serde(default)]
    pub tenants: Vec<TenantSnapshot>,
}

#[derive(Debug, Default)]
struct TenantCatalog {
    products: HashMap<ProductId, ProductRecord>,
    relations: Vec<Relation>,
    product_types: HashMap<ProductTypeId, Vec<ProductTypeRule>>,
}

impl TenantCatalog {
    fn product(&self, product_id: ProductId) -> CatalogResult<&ProductRecord> {
        self.products
            .get(&product_id)
            .ok_or(CatalogError::ProductNotFound(product_id))
    }

    fn product_mut(&mut self, product_id: ProductId) -> CatalogResult<&mut ProductRecord> {
        self.products
            .get_mut(&product_id)
            .ok_or(CatalogError::ProductNotFound(product_id))
    }
}

/// Tenant-isolated in-memory catalog.
#[derive(Debug)]
pub struct InMemoryCatalog {
    product_type_property: PropertyId,
    tenants: RwLock<HashMap<TenantId, TenantCatalog>>,
}

impl Default for InMemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self {
            product_type_property: PropertyId::new(),
            tenants: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_snapshot(snapshot: CatalogSnapshot) -> CatalogResult<Self> {
        let catalog = Self {
            product_type_property: snapshot.product_type_property.unwrap_or_default(),
            tenants: RwLock::new(HashMap::new()),
        };
        {
            let mut tenants = catalog.write()?;
            for tenant in snapshot.tenants {
                let entry = tenants.entry(tenant.tenant_id).or_default();
                for product in tenant.products {
                    entry.products.insert(product.id, product);
                }
                for def in tenant.product_types {
                    entry.product_types.insert(def.id, def.rules);
                }
                for relation in tenant.relations {
                    entry.product(relation.parent)?;
                    entry.product(relation.child)?;
                    entry.relations.push(relation);
                }
            }
        }
        Ok(catalog)
    }

    pub fn from_json(json: &str) -> CatalogResult<Self> {
        let snapshot: CatalogSnapshot =
            serde_json::from_str(json).map_err(|e| CatalogError::Storage(e.to_string()))?;
        Self::from_snapshot(snapshot)
    }

    /// The property that carries each product's type.
    pub fn product_type_property(&self) -> PropertyId {
        self.product_type_property
    }

    fn read<T>(
        &self,
        tenant_id: TenantId,
        f: impl FnOnce(&TenantCatalog) -> CatalogResult<T>,
    ) -> CatalogResult<T> {
        let tenants = self
            .tenants
            .read()
            .map_err(|_| CatalogError::Storage("catalog lock poisoned".to_string()))?;
        match tenants.get(&tenant_id) {
            Some(catalog) => f(catalog),
            None => f(&TenantCatalog::default()),
        }
    }

    fn write(
        &self,
    ) -> CatalogResult<std::sync::RwLockWriteGuard<'_, HashMap<TenantId, TenantCatalog>>> {
        self.tenants
            .write()
            .map_err(|_| CatalogError::Storage("catalog lock poisoned".to_string()))
    }

    fn mutate<T>(
        &self,
        tenant_id: TenantId,
        f: impl FnOnce(&mut TenantCatalog) -> CatalogResult<T>,
    ) -> CatalogResult<T> {
        let mut tenants = self.write()?;
        f(tenants.entry(tenant_id).or_default())
    }

    pub fn get(&self, tenant_id: TenantId, product_id: ProductId) -> CatalogResult<ProductRecord> {
        self.read(tenant_id, |c| c.product(product_id).cloned())
    }

    /// Every product of every tenant, ordered by tenant then product.
    pub fn products(&self) -> CatalogResult<Vec<(TenantId, ProductId)>> {
        let tenants = self
            .tenants
            .read()
            .map_err(|_| CatalogError::Storage("catalog lock poisoned".to_string()))?;
        let mut products: Vec<_> = tenants
            .iter()
            .flat_map(|(tenant_id, c)| c.products.keys().map(|p| (*tenant_id, *p)))
            .collect();
        products.sort();
        Ok(products)
    }

    pub fn insert_product(
        &self,
        tenant_id: TenantId,
        record: ProductRecord,
    ) -> CatalogResult<CatalogChange> {
        let product_id = record.id;
        self.mutate(tenant_id, |c| {
            if c.products.contains_key(&product_id) {
                return Err(CatalogError::Rejected(format!("product {product_id} already exists")));
            }
            c.products.insert(product_id, record);
            Ok(())
        })?;
        debug!(tenant_id = %tenant_id, product_id = %product_id, "catalog product inserted");
        Ok(CatalogChange::ProductCreated { product_id })
    }

    /// Insert a fresh active product with no data attached.
    pub fn create_product(
        &self,
        tenant_id: TenantId,
        kind: ProductKind,
    ) -> CatalogResult<(ProductId, CatalogChange)> {
        let product_id = ProductId::new();
        let change = self.insert_product(tenant_id, ProductRecord::new(product_id, kind))?;
        Ok((product_id, change))
    }

    pub fn set_kind(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        kind: ProductKind,
    ) -> CatalogResult<CatalogChange> {
        self.mutate(tenant_id, |c| {
            c.product_mut(product_id)?.kind = kind;
            Ok(CatalogChange::ProductKindChanged { product_id })
        })
    }

    pub fn set_active(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        active: bool,
    ) -> CatalogResult<CatalogChange> {
        self.mutate(tenant_id, |c| {
            c.product_mut(product_id)?.active = active;
            Ok(CatalogChange::ProductActivationChanged { product_id })
        })
    }

    pub fn set_ean(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        ean: Option<String>,
    ) -> CatalogResult<CatalogChange> {
        self.mutate(tenant_id, |c| {
            c.product_mut(product_id)?.ean = ean;
            Ok(CatalogChange::EanChanged { product_id })
        })
    }

    pub fn attach_image(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> CatalogResult<CatalogChange> {
        self.mutate(tenant_id, |c| {
            c.product_mut(product_id)?.images += 1;
            Ok(CatalogChange::ImageAttached { product_id })
        })
    }

    pub fn detach_image(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> CatalogResult<CatalogChange> {
        self.mutate(tenant_id, |c| {
            let product = c.product_mut(product_id)?;
            if product.images == 0 {
                return Err(CatalogError::Rejected("product has no image to detach".to_string()));
            }
            product.images -= 1;
            Ok(CatalogChange::ImageDetached { product_id })
        })
    }

    pub fn set_price(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        has_price: bool,
    ) -> CatalogResult<CatalogChange> {
        self.mutate(tenant_id, |c| {
            c.product_mut(product_id)?.has_price = has_price;
            Ok(if has_price {
                CatalogChange::PriceCreated { product_id }
            } else {
                CatalogChange::PriceDeleted { product_id }
            })
        })
    }

    pub fn set_stock(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        stock: StockLevel,
    ) -> CatalogResult<CatalogChange> {
        self.mutate(tenant_id, |c| {
            c.product_mut(product_id)?.stock = stock;
            Ok(CatalogChange::StockChanged { product_id })
        })
    }

    pub fn link_supplier_product(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> CatalogResult<CatalogChange> {
        self.mutate(tenant_id, |c| {
            c.product_mut(product_id)?.supplier_products += 1;
            Ok(CatalogChange::SupplierProductLinked { product_id })
        })
    }

    pub fn unlink_supplier_product(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> CatalogResult<CatalogChange> {
        self.mutate(tenant_id, |c| {
            let product = c.product_mut(product_id)?;
            product.supplier_products = product.supplier_products.saturating_sub(1);
            Ok(CatalogChange::SupplierProductUnlinked { product_id })
        })
    }

    /// Set (or clear, with `None`) a plain property value.
    pub fn set_property(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        property_id: PropertyId,
        value: Option<String>,
    ) -> CatalogResult<CatalogChange> {
        if property_id == self.product_type_property {
            return Err(CatalogError::Rejected(
                "use set_product_type for the product-type property".to_string(),
            ));
        }
        self.mutate(tenant_id, |c| {
            let product = c.product_mut(product_id)?;
            match value {
                Some(v) => product.properties.insert(property_id, v),
                None => product.properties.remove(&property_id),
            };
            Ok(CatalogChange::PropertyValueChanged {
                product_id,
                property_id,
                is_product_type: false,
            })
        })
    }

    pub fn set_product_type(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        product_type: Option<ProductTypeId>,
    ) -> CatalogResult<CatalogChange> {
        let property_id = self.product_type_property;
        self.mutate(tenant_id, |c| {
            c.product_mut(product_id)?.product_type = product_type;
            Ok(CatalogChange::PropertyValueChanged {
                product_id,
                property_id,
                is_product_type: true,
            })
        })
    }

    pub fn define_product_type(
        &self,
        tenant_id: TenantId,
        product_type: ProductTypeId,
        rules: Vec<ProductTypeRule>,
    ) -> CatalogResult<CatalogChange> {
        self.mutate(tenant_id, |c| {
            c.product_types.insert(product_type, rules);
            Ok(CatalogChange::ProductTypeRulesChanged { product_type })
        })
    }

    /// Add `child` as a `relation` of `parent`.
    ///
    /// Rejects self-relations and duplicates. Longer cycles are not detected here;
    /// the engine tolerates them.
    pub fn relate(
        &self,
        tenant_id: TenantId,
        relation: RelationKind,
        parent_id: ProductId,
        child_id: ProductId,
    ) -> CatalogResult<CatalogChange> {
        if parent_id == child_id {
            return Err(CatalogError::Rejected("a product cannot contain itself".to_string()));
        }
        let edge = Relation {
            relation,
            parent: parent_id,
            child: child_id,
        };
        self.mutate(tenant_id, |c| {
            c.product(parent_id)?;
            c.product(child_id)?;
            if c.relations.contains(&edge) {
                return Err(CatalogError::Rejected(format!(
                    "{child_id} is already a {relation} of {parent_id}"
                )));
            }
            c.relations.push(edge);
            Ok(CatalogChange::RelationAdded {
                relation,
                parent_id,
                child_id,
            })
        })
    }

    pub fn unrelate(
        &self,
        tenant_id: TenantId,
        relation: RelationKind,
        parent_id: ProductId,
        child_id: ProductId,
    ) -> CatalogResult<CatalogChange> {
        let edge = Relation {
            relation,
            parent: parent_id,
            child: child_id,
        };
        self.mutate(tenant_id, |c| {
            let before = c.relations.len();
            c.relations.retain(|r| *r != edge);
            if c.relations.len() == before {
                return Err(CatalogError::Rejected(format!(
                    "{child_id} is not a {relation} of {parent_id}"
                )));
            }
            Ok(CatalogChange::RelationRemoved {
                relation,
                parent_id,
                child_id,
            })
        })
    }

    /// Remove a product and every relation it takes part in.
    pub fn delete_product(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> CatalogResult<CatalogChange> {
        self.mutate(tenant_id, |c| {
            c.products
                .remove(&product_id)
                .ok_or(CatalogError::ProductNotFound(product_id))?;
            let former_parents = c
                .relations
                .iter()
                .filter(|r| r.child == product_id)
                .map(|r| (r.relation, r.parent))
                .collect();
            c.relations
                .retain(|r| r.child != product_id && r.parent != product_id);
            Ok(CatalogChange::ProductDeleted {
                product_id,
                former_parents,
            })
        })
    }
}

impl ProductReader for InMemoryCatalog {
    fn kind(&self, tenant_id: TenantId, product_id: ProductId) -> CatalogResult<Option<ProductKind>> {
        self.read(tenant_id, |c| Ok(c.products.get(&product_id).map(|p| p.kind)))
    }

    fn is_active(&self, tenant_id: TenantId, product_id: ProductId) -> CatalogResult<bool> {
        self.read(tenant_id, |c| Ok(c.product(product_id)?.active))
    }

    fn ean(&self, tenant_id: TenantId, product_id: ProductId) -> CatalogResult<Option<String>> {
        self.read(tenant_id, |c| Ok(c.product(product_id)?.ean.clone()))
    }
}

impl RelationReader for InMemoryCatalog {
    fn parents(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        relation: RelationKind,
    ) -> CatalogResult<Vec<ProductId>> {
        self.read(tenant_id, |c| {
            Ok(c.relations
                .iter()
                .filter(|r| r.relation == relation && r.child == product_id)
                .map(|r| r.parent)
                .collect())
        })
    }

    fn children(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        relation: RelationKind,
    ) -> CatalogResult<Vec<ProductId>> {
        self.read(tenant_id, |c| {
            Ok(c.relations
                .iter()
                .filter(|r| r.relation == relation && r.parent == product_id)
                .map(|r| r.child)
                .collect())
        })
    }
}

impl MediaReader for InMemoryCatalog {
    fn image_count(&self, tenant_id: TenantId, product_id: ProductId) -> CatalogResult<usize> {
        self.read(tenant_id, |c| Ok(c.product(product_id)?.images))
    }
}

impl PriceReader for InMemoryCatalog {
    fn has_price(&self, tenant_id: TenantId, product_id: ProductId) -> CatalogResult<bool> {
        self.read(tenant_id, |c| Ok(c.product(product_id)?.has_price))
    }
}

impl StockReader for InMemoryCatalog {
    fn stock(&self, tenant_id: TenantId, product_id: ProductId) -> CatalogResult<StockLevel> {
        self.read(tenant_id, |c| Ok(c.product(product_id)?.stock))
    }
}

impl PropertyReader for InMemoryCatalog {
    fn product_type(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> CatalogResult<Option<ProductTypeId>> {
        self.read(tenant_id, |c| Ok(c.product(product_id)?.product_type))
    }

    fn property_values(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> CatalogResult<PropertyValues> {
        self.read(tenant_id, |c| Ok(c.product(product_id)?.properties.clone()))
    }

    fn product_type_rules(
        &self,
        tenant_id: TenantId,
        product_type: ProductTypeId,
    ) -> CatalogResult<Vec<ProductTypeRule>> {
        self.read(tenant_id, |c| {
            Ok(c.product_types.get(&product_type).cloned().unwrap_or_default())
        })
    }

    fn products_with_type(
        &self,
        tenant_id: TenantId,
        product_type: ProductTypeId,
    ) -> CatalogResult<Vec<ProductId>> {
        self.read(tenant_id, |c| {
            let mut ids: Vec<_> = c
                .products
                .values()
                .filter(|p| p.product_type == Some(product_type))
                .map(|p| p.id)
                .collect();
            ids.sort();
            Ok(ids)
        })
    }
}

impl SupplierReader for InMemoryCatalog {
    fn supplier_product_count(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> CatalogResult<usize> {
        self.read(tenant_id, |c| Ok(c.product(product_id)?.supplier_products))
    }
}
