//! `readiness-core`: identifiers and error primitives shared by every crate.
//!
//! Nothing in here knows about checks, catalogs or storage.

pub mod aggregate;
pub mod error;
pub mod id;

pub use aggregate::AggregateRoot;
pub use error::{DomainError, DomainResult};
pub use id::{AggregateId, InspectionId, ProductTypeId, PropertyId, TenantId};
