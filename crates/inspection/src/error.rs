//! Engine error model.

use thiserror::Error;

use readiness_catalog::{CatalogError, ProductId};

use crate::rules::CheckKind;
use crate::store::InspectionStoreError;
use crate::tasks::TaskQueueError;

/// Unexpected failure of a reconciliation.
///
/// A failing check is not an error: it is recorded on the sub-record. Anything
/// in here aborts the atomic unit it happened in, and nothing of that unit is
/// committed.
#[derive(Debug, Error)]
pub enum InspectionError {
    #[error("no check registered for {0}")]
    UnknownCheckKind(CheckKind),

    #[error("product not found: {0}")]
    ProductNotFound(ProductId),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Store(#[from] InspectionStoreError),

    #[error(transparent)]
    TaskQueue(#[from] TaskQueueError),

    /// The unit was committed but its events could not be handed to the bus.
    #[error("inspection committed but events were not published: {0}")]
    Publish(String),
}
