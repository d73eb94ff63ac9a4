//! Entity trait: identity + continuity across state changes.

use std::collections::BTreeSet;

/// Entity marker + minimal interface.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Copy + Ord + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> Self::Id;
}

/// Collect the identifiers of a slice of entities into an ordered set.
pub fn id_set<E: Entity>(entities: &[E]) -> BTreeSet<E::Id> {
    entities.iter().map(Entity::id).collect()
}
