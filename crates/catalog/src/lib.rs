//! Catalog adapter contract.
//!
//! The catalog service owns products, their relations and their property data.
//! The readiness engine only reads it, through the narrow reader traits in
//! [`reader`], and learns about mutations through [`CatalogChange`].
//!
//! [`InMemoryCatalog`] is a complete implementation for tests, dev and the
//! replay worker.

pub mod change;
pub mod in_memory;
pub mod product;
pub mod property;
pub mod reader;

pub use change::CatalogChange;
pub use in_memory::{CatalogSnapshot, InMemoryCatalog, ProductRecord};
pub use product::{ProductId, ProductKind, Relation, RelationKind};
pub use property::{ProductTypeRule, PropertyRequirement, PropertyValues};
pub use reader::{
    CatalogError, CatalogReader, CatalogResult, MediaReader, PriceReader, ProductReader,
    PropertyReader, RelationReader, StockLevel, StockReader, SupplierReader,
};
