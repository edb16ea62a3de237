//! Check registry: one predicate per check kind, plus the signal names it
//! raises when its outcome flips.

use std::collections::HashMap;

use thiserror::Error;

use readiness_catalog::{CatalogError, CatalogReader, ProductId, ProductKind};
use readiness_core::TenantId;

use crate::checks;
use crate::error::InspectionError;
use crate::rules::CheckKind;
use crate::store::{InspectionStoreError, ReadinessReader};

/// What a predicate may look at while judging one product.
pub struct CheckContext<'a> {
    pub tenant_id: TenantId,
    pub product_id: ProductId,
    pub kind: ProductKind,
    pub catalog: &'a dyn CatalogReader,
    pub readiness: &'a dyn ReadinessReader,
}

/// Business failure of a check. Recorded, never propagated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct CheckFailed {
    pub reason: String,
}

/// Outcome of a predicate that did not pass.
///
/// Only [`CheckError::Failed`] is a business outcome. The other variants are
/// adapter failures and abort the enclosing unit.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error(transparent)]
    Failed(#[from] CheckFailed),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Store(#[from] InspectionStoreError),
}

impl CheckError {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(CheckFailed {
            reason: reason.into(),
        })
    }
}

pub type CheckResult = Result<(), CheckError>;

pub type Predicate = fn(&CheckContext<'_>) -> CheckResult;

#[derive(Clone, Copy)]
pub struct CheckDefinition {
    pub kind: CheckKind,
    pub predicate: Predicate,
    pub on_pass_event: &'static str,
    pub on_fail_event: &'static str,
}

impl core::fmt::Debug for CheckDefinition {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CheckDefinition")
            .field("kind", &self.kind)
            .field("on_pass_event", &self.on_pass_event)
            .field("on_fail_event", &self.on_fail_event)
            .finish_non_exhaustive()
    }
}

impl CheckDefinition {
    pub fn evaluate(&self, ctx: &CheckContext<'_>) -> CheckResult {
        (self.predicate)(ctx)
    }

    /// Signal for a transition into `passed`.
    pub fn signal(&self, passed: bool) -> &'static str {
        if passed {
            self.on_pass_event
        } else {
            self.on_fail_event
        }
    }
}

/// Static mapping from check kind to its definition.
#[derive(Debug, Clone, Default)]
pub struct CheckRegistry {
    definitions: HashMap<CheckKind, CheckDefinition>,
}

impl CheckRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with a predicate for every [`CheckKind`].
    pub fn standard() -> Self {
        checks::standard_definitions()
            .into_iter()
            .fold(Self::empty(), Self::register)
    }

    /// Add or replace the definition for `definition.kind`.
    pub fn register(mut self, definition: CheckDefinition) -> Self {
        self.definitions.insert(definition.kind, definition);
        self
    }

    pub fn without(mut self, kind: CheckKind) -> Self {
        self.definitions.remove(&kind);
        self
    }

    pub fn get(&self, kind: CheckKind) -> Result<&CheckDefinition, InspectionError> {
        self.definitions
            .get(&kind)
            .ok_or(InspectionError::UnknownCheckKind(kind))
    }

    pub fn contains(&self, kind: CheckKind) -> bool {
        self.definitions.contains_key(&kind)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
