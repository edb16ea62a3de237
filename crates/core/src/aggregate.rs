//! Aggregate root trait for state owned by exactly one atomic unit.

/// Aggregate root marker + minimal interface.
///
/// An aggregate is the unit a store writes as a whole. Its `version` grows by one
/// per committed write, which lets downstream consumers order what they observe.
pub trait AggregateRoot {
    /// Strongly-typed aggregate identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the aggregate identifier.
    fn id(&self) -> &Self::Id;

    /// Number of committed writes applied to this aggregate.
    fn version(&self) -> u64;
}
