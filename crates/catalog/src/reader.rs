//! Read contracts the engine needs from the catalog service.
//!
//! Each check predicate depends on one or two of these narrow traits. Adapters
//! implement all of them; [`CatalogReader`] is the blanket union.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use readiness_core::{ProductTypeId, TenantId};

use crate::product::{ProductId, ProductKind, RelationKind};
use crate::property::{ProductTypeRule, PropertyValues};

pub type CatalogResult<T> = Result<T, CatalogError>;

/// Catalog adapter failure.
///
/// Always unexpected from the engine's point of view: it aborts the atomic unit
/// it happened in.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("product not found: {0}")]
    ProductNotFound(ProductId),

    #[error("catalog rejected mutation: {0}")]
    Rejected(String),

    #[error("catalog storage error: {0}")]
    Storage(String),
}

/// Stock position relevant to sellability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevel {
    pub on_hand: u64,
    pub allow_backorder: bool,
}

impl StockLevel {
    pub fn is_sellable(&self) -> bool {
        self.on_hand > 0 || self.allow_backorder
    }
}

pub trait ProductReader: Send + Sync {
    /// `None` when the product does not exist for this tenant.
    fn kind(&self, tenant_id: TenantId, product_id: ProductId) -> CatalogResult<Option<ProductKind>>;

    fn is_active(&self, tenant_id: TenantId, product_id: ProductId) -> CatalogResult<bool>;

    fn ean(&self, tenant_id: TenantId, product_id: ProductId) -> CatalogResult<Option<String>>;
}

pub trait RelationReader: Send + Sync {
    /// Products that have `product_id` as a child through `relation`.
    fn parents(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        relation: RelationKind,
    ) -> CatalogResult<Vec<ProductId>>;

    /// Children of `product_id` through `relation`.
    fn children(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        relation: RelationKind,
    ) -> CatalogResult<Vec<ProductId>>;

    /// Children that make up a product of the given kind (variations, bundle items
    /// or BOM components). Empty for kinds that are not composed of others.
    fn components(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        kind: ProductKind,
    ) -> CatalogResult<Vec<ProductId>> {
        match kind.component_relation() {
            Some(relation) => self.children(tenant_id, product_id, relation),
            None => Ok(Vec::new()),
        }
    }
}

pub trait MediaReader: Send + Sync {
    fn image_count(&self, tenant_id: TenantId, product_id: ProductId) -> CatalogResult<usize>;
}

pub trait PriceReader: Send + Sync {
    fn has_price(&self, tenant_id: TenantId, product_id: ProductId) -> CatalogResult<bool>;
}

pub trait StockReader: Send + Sync {
    fn stock(&self, tenant_id: TenantId, product_id: ProductId) -> CatalogResult<StockLevel>;
}

pub trait PropertyReader: Send + Sync {
    /// Value of the product-type discriminator property.
    fn product_type(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> CatalogResult<Option<ProductTypeId>>;

    fn property_values(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> CatalogResult<PropertyValues>;

    fn product_type_rules(
        &self,
        tenant_id: TenantId,
        product_type: ProductTypeId,
    ) -> CatalogResult<Vec<ProductTypeRule>>;

    fn products_with_type(
        &self,
        tenant_id: TenantId,
        product_type: ProductTypeId,
    ) -> CatalogResult<Vec<ProductId>>;
}

pub trait SupplierReader: Send + Sync {
    fn supplier_product_count(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> CatalogResult<usize>;
}

/// Everything the engine reads from the catalog.
pub trait CatalogReader:
    ProductReader + RelationReader + MediaReader + PriceReader + StockReader + PropertyReader + SupplierReader
{
}

impl<T> CatalogReader for T where
    T: ProductReader
        + RelationReader
        + MediaReader
        + PriceReader
        + StockReader
        + PropertyReader
        + SupplierReader
        + ?Sized
{
}
