use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use readiness_core::PropertyId;

/// Property values of one product, keyed by property.
pub type PropertyValues = BTreeMap<PropertyId, String>;

/// How a product type treats one of its properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyRequirement {
    Required,
    Optional,
    /// Distinguishes variations of a configurable product (e.g. size, colour).
    /// Required on the variations, not on the configurable parent itself.
    Configurator,
}

/// A property rule attached to a product type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductTypeRule {
    pub property_id: PropertyId,
    pub requirement: PropertyRequirement,
}

impl ProductTypeRule {
    pub fn new(property_id: PropertyId, requirement: PropertyRequirement) -> Self {
        Self {
            property_id,
            requirement,
        }
    }
}
