//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Every record collection is a list of entities; optimistic edits locate
/// records through this trait.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}

/// Find an entity by identifier.
pub fn find_by_id<'a, E: Entity>(items: &'a [E], id: &E::Id) -> Option<&'a E> {
    items.iter().find(|e| e.id() == id)
}

/// Replace the entity sharing `item`'s identifier. Returns `false` when absent.
pub fn replace_by_id<E: Entity>(items: &mut [E], item: E) -> bool {
    match items.iter_mut().find(|e| e.id() == item.id()) {
        Some(slot) => {
            *slot = item;
            true
        }
        None => false,
    }
}

/// Remove the entity with the given identifier. Returns `false` when absent.
pub fn remove_by_id<E: Entity>(items: &mut Vec<E>, id: &E::Id) -> bool {
    let before = items.len();
    items.retain(|e| e.id() != id);
    items.len() != before
}
