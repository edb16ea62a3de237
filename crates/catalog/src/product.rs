use serde::{Deserialize, Serialize};

use readiness_core::AggregateId;

/// Product identifier (tenant-scoped: every lookup also carries a `TenantId`).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub AggregateId);

impl ProductId {
    pub fn new() -> Self {
        Self(AggregateId::new())
    }

    pub fn from_aggregate(id: AggregateId) -> Self {
        Self(id)
    }

    pub fn as_aggregate(&self) -> AggregateId {
        self.0
    }
}

impl Default for ProductId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for ProductId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// The kind of a catalog item. Determines which checks apply to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductKind {
    Simple,
    Configurable,
    Bundle,
    Manufacturable,
    Dropship,
    Supplier,
}

impl ProductKind {
    pub const ALL: [ProductKind; 6] = [
        ProductKind::Simple,
        ProductKind::Configurable,
        ProductKind::Bundle,
        ProductKind::Manufacturable,
        ProductKind::Dropship,
        ProductKind::Supplier,
    ];

    /// Stable column index into per-kind tables.
    pub const fn index(self) -> usize {
        match self {
            ProductKind::Simple => 0,
            ProductKind::Configurable => 1,
            ProductKind::Bundle => 2,
            ProductKind::Manufacturable => 3,
            ProductKind::Dropship => 4,
            ProductKind::Supplier => 5,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            ProductKind::Simple => "simple",
            ProductKind::Configurable => "configurable",
            ProductKind::Bundle => "bundle",
            ProductKind::Manufacturable => "manufacturable",
            ProductKind::Dropship => "dropship",
            ProductKind::Supplier => "supplier",
        }
    }

    /// The relation whose children make up this product, if it is composed of others.
    pub const fn component_relation(self) -> Option<RelationKind> {
        match self {
            ProductKind::Configurable => Some(RelationKind::Variation),
            ProductKind::Bundle => Some(RelationKind::BundleItem),
            ProductKind::Manufacturable => Some(RelationKind::BomComponent),
            ProductKind::Simple | ProductKind::Dropship | ProductKind::Supplier => None,
        }
    }
}

impl core::fmt::Display for ProductKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Directed product relation, read as "child is a `<kind>` of parent".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// Child is consumed when manufacturing the parent.
    BomComponent,
    /// Child is sold as part of the parent bundle.
    BundleItem,
    /// Child is a variation of the configurable parent.
    Variation,
}

impl RelationKind {
    pub const ALL: [RelationKind; 3] = [
        RelationKind::BomComponent,
        RelationKind::BundleItem,
        RelationKind::Variation,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            RelationKind::BomComponent => "bom_component",
            RelationKind::BundleItem => "bundle_item",
            RelationKind::Variation => "variation",
        }
    }
}

impl core::fmt::Display for RelationKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One edge of the product graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Relation {
    pub relation: RelationKind,
    pub parent: ProductId,
    pub child: ProductId,
}
