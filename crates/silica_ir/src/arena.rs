//! Slotted arena for ID-indexed storage of IR entities.
//!
//! The [`Arena`] provides O(1) insertion and lookup by opaque [`ArenaId`] keys.
//! Unlike an append-only arena, slots can be removed: a removed slot becomes a
//! tombstone, its ID is never reused, and iteration skips dead slots. Graph
//! surgery (component removal, exit rewiring) relies on this so that stale IDs
//! held by a buggy caller fail fast instead of aliasing a new entity.

use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::ops::{Index, IndexMut};

/// Trait for opaque ID types used as arena keys.
///
/// Implementors must provide a bijection between `u32` indices and the ID type.
pub trait ArenaId: Copy {
    /// Creates an ID from a raw `u32` index.
    fn from_raw(index: u32) -> Self;

    /// Returns the raw `u32` index.
    fn as_raw(self) -> u32;
}

/// An ID-indexed container with tombstoned removal.
///
/// IDs are stable for the lifetime of the arena: removal leaves a dead slot
/// behind and never shifts or reuses indices. Supports serialization via
/// `serde` (dead slots round-trip as `None`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Arena<I: ArenaId, T> {
    slots: Vec<Option<T>>,
    live: usize,
    #[serde(skip)]
    _marker: PhantomData<I>,
}

impl<I: ArenaId, T> Default for Arena<I, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: ArenaId, T> Arena<I, T> {
    /// Creates a new, empty arena.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            live: 0,
            _marker: PhantomData,
        }
    }

    /// Returns the ID the next call to [`alloc`](Self::alloc) will assign.
    ///
    /// Used for two-phase construction where an entity's parts need its ID
    /// before the entity itself is stored.
    pub fn next_id(&self) -> I {
        I::from_raw(self.slots.len() as u32)
    }

    /// Allocates a new item in the arena and returns its ID.
    pub fn alloc(&mut self, item: T) -> I {
        let id = I::from_raw(self.slots.len() as u32);
        self.slots.push(Some(item));
        self.live += 1;
        id
    }

    /// Returns a reference to the item with the given ID.
    ///
    /// # Panics
    ///
    /// Panics if the ID is out of bounds or refers to a removed slot.
    pub fn get(&self, id: I) -> &T {
        self.slots[id.as_raw() as usize]
            .as_ref()
            .expect("arena slot has been removed")
    }

    /// Returns a mutable reference to the item with the given ID.
    ///
    /// # Panics
    ///
    /// Panics if the ID is out of bounds or refers to a removed slot.
    pub fn get_mut(&mut self, id: I) -> &mut T {
        self.slots[id.as_raw() as usize]
            .as_mut()
            .expect("arena slot has been removed")
    }

    /// Returns a reference to the item, or `None` if the ID is out of bounds
    /// or the slot has been removed.
    pub fn try_get(&self, id: I) -> Option<&T> {
        self.slots.get(id.as_raw() as usize)?.as_ref()
    }

    /// Removes the item with the given ID, leaving a tombstone behind.
    ///
    /// Returns the removed item, or `None` if the slot was already dead.
    /// The ID is never reused by later allocations.
    pub fn remove(&mut self, id: I) -> Option<T> {
        let slot = self.slots.get_mut(id.as_raw() as usize)?;
        let item = slot.take();
        if item.is_some() {
            self.live -= 1;
        }
        item
    }

    /// Returns `true` if the ID refers to a live slot.
    pub fn contains(&self, id: I) -> bool {
        self.try_get(id).is_some()
    }

    /// Returns the number of live items in the arena.
    pub fn len(&self) -> usize {
        self.live
    }

    /// Returns `true` if the arena contains no live items.
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Iterates over `(ID, &T)` pairs of live slots in allocation order.
    pub fn iter(&self) -> impl Iterator<Item = (I, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|item| (I::from_raw(i as u32), item)))
    }

    /// Iterates over the IDs of live slots in allocation order.
    pub fn ids(&self) -> impl Iterator<Item = I> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|_| I::from_raw(i as u32)))
    }

    /// Iterates over references to live items in allocation order.
    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.slots.iter().filter_map(|slot| slot.as_ref())
    }
}

impl<I: ArenaId, T> Index<I> for Arena<I, T> {
    type Output = T;

    fn index(&self, id: I) -> &T {
        self.get(id)
    }
}

impl<I: ArenaId, T> IndexMut<I> for Arena<I, T> {
    fn index_mut(&mut self, id: I) -> &mut T {
        self.get_mut(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::ComponentId;

    #[test]
    fn alloc_and_get() {
        let mut arena: Arena<ComponentId, String> = Arena::new();
        let id = arena.alloc("hello".to_string());
        assert_eq!(arena[id], "hello");
    }

    #[test]
    fn multiple_allocs() {
        let mut arena: Arena<ComponentId, u32> = Arena::new();
        let a = arena.alloc(10);
        let b = arena.alloc(20);
        let c = arena.alloc(30);
        assert_eq!(arena[a], 10);
        assert_eq!(arena[b], 20);
        assert_eq!(arena[c], 30);
        assert_eq!(arena.len(), 3);
    }

    #[test]
    fn remove_tombstones() {
        let mut arena: Arena<ComponentId, u32> = Arena::new();
        let a = arena.alloc(10);
        let b = arena.alloc(20);
        assert_eq!(arena.remove(a), Some(10));
        assert_eq!(arena.len(), 1);
        assert!(!arena.contains(a));
        assert!(arena.contains(b));
        // double remove is a no-op
        assert_eq!(arena.remove(a), None);
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn ids_never_reused() {
        let mut arena: Arena<ComponentId, u32> = Arena::new();
        let a = arena.alloc(10);
        arena.remove(a);
        let b = arena.alloc(20);
        assert_ne!(a, b);
        assert_eq!(arena[b], 20);
    }

    #[test]
    #[should_panic(expected = "arena slot has been removed")]
    fn get_removed_panics() {
        let mut arena: Arena<ComponentId, u32> = Arena::new();
        let a = arena.alloc(10);
        arena.remove(a);
        let _ = arena[a];
    }

    #[test]
    fn iter_skips_dead_slots() {
        let mut arena: Arena<ComponentId, &str> = Arena::new();
        arena.alloc("a");
        let b = arena.alloc("b");
        arena.alloc("c");
        arena.remove(b);
        let collected: Vec<_> = arena.iter().map(|(_, v)| *v).collect();
        assert_eq!(collected, vec!["a", "c"]);
    }

    #[test]
    fn get_mut_modifies() {
        let mut arena: Arena<ComponentId, String> = Arena::new();
        let id = arena.alloc("original".to_string());
        *arena.get_mut(id) = "modified".to_string();
        assert_eq!(arena[id], "modified");
    }

    #[test]
    fn serde_roundtrip_preserves_tombstones() {
        let mut arena: Arena<ComponentId, String> = Arena::new();
        let a = arena.alloc("first".to_string());
        let b = arena.alloc("second".to_string());
        arena.remove(a);
        let json = serde_json::to_string(&arena).unwrap();
        let restored: Arena<ComponentId, String> = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.len(), 1);
        assert!(!restored.contains(a));
        assert_eq!(restored[b], "second");
    }

    #[test]
    fn default_is_empty() {
        let arena: Arena<ComponentId, u32> = Arena::default();
        assert!(arena.is_empty());
    }
}
