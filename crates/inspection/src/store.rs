//! Inspection persistence.
//!
//! An inspection and all of its sub-records are written together: a commit
//! replaces the whole aggregate. Concurrent commits for the same product are
//! last-write-wins; each unit recomputes from current catalog state, so the
//! loser's work is redone by the next reconciliation of that product.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use thiserror::Error;

use readiness_catalog::ProductId;
use readiness_core::TenantId;

use crate::record::Inspection;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InspectionStoreError {
    #[error("inspection store lock poisoned")]
    Poisoned,

    #[error("inspection storage error: {0}")]
    Storage(String),
}

pub trait InspectionStore: Send + Sync {
    fn load(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> Result<Option<Inspection>, InspectionStoreError>;

    /// Write the inspection and its sub-records in one step.
    fn save(&self, inspection: &Inspection) -> Result<(), InspectionStoreError>;

    /// Remove an inspection with its sub-records. `false` if there was none.
    fn delete(&self, tenant_id: TenantId, product_id: ProductId) -> Result<bool, InspectionStoreError>;

    /// All inspections of a tenant, ordered by product id.
    fn list(&self, tenant_id: TenantId) -> Result<Vec<Inspection>, InspectionStoreError>;
}

impl<S> InspectionStore for Arc<S>
where
    S: InspectionStore + ?Sized,
{
    fn load(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> Result<Option<Inspection>, InspectionStoreError> {
        (**self).load(tenant_id, product_id)
    }

    fn save(&self, inspection: &Inspection) -> Result<(), InspectionStoreError> {
        (**self).save(inspection)
    }

    fn delete(&self, tenant_id: TenantId, product_id: ProductId) -> Result<bool, InspectionStoreError> {
        (**self).delete(tenant_id, product_id)
    }

    fn list(&self, tenant_id: TenantId) -> Result<Vec<Inspection>, InspectionStoreError> {
        (**self).list(tenant_id)
    }
}

/// Read access to other products' readiness, for checks that judge a parent
/// by its components.
pub trait ReadinessReader: Send + Sync {
    /// `None` when the product has no inspection.
    fn has_missing_required(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> Result<Option<bool>, InspectionStoreError>;
}

impl<S> ReadinessReader for S
where
    S: InspectionStore + ?Sized,
{
    fn has_missing_required(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> Result<Option<bool>, InspectionStoreError> {
        Ok(self
            .load(tenant_id, product_id)?
            .map(|i| i.record().has_missing_required))
    }
}

/// Tenant-isolated in-memory inspection store.
#[derive(Debug, Default)]
pub struct InMemoryInspectionStore {
    inner: RwLock<HashMap<(TenantId, ProductId), Inspection>>,
}

impl InMemoryInspectionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl InspectionStore for InMemoryInspectionStore {
    fn load(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
    ) -> Result<Option<Inspection>, InspectionStoreError> {
        let map = self.inner.read().map_err(|_| InspectionStoreError::Poisoned)?;
        Ok(map.get(&(tenant_id, product_id)).cloned())
    }

    fn save(&self, inspection: &Inspection) -> Result<(), InspectionStoreError> {
        let mut map = self.inner.write().map_err(|_| InspectionStoreError::Poisoned)?;
        map.insert(
            (inspection.tenant_id(), inspection.product_id()),
            inspection.clone(),
        );
        Ok(())
    }

    fn delete(&self, tenant_id: TenantId, product_id: ProductId) -> Result<bool, InspectionStoreError> {
        let mut map = self.inner.write().map_err(|_| InspectionStoreError::Poisoned)?;
        Ok(map.remove(&(tenant_id, product_id)).is_some())
    }

    fn list(&self, tenant_id: TenantId) -> Result<Vec<Inspection>, InspectionStoreError> {
        let map = self.inner.read().map_err(|_| InspectionStoreError::Poisoned)?;
        let mut inspections: Vec<_> = map
            .iter()
            .filter_map(|((t, _), i)| (*t == tenant_id).then(|| i.clone()))
            .collect();
        inspections.sort_by_key(|i| i.product_id());
        Ok(inspections)
    }
}
