use std::marker::PhantomData;

use crate::types::{ArenaKey, CegarError, Result};

struct ArenaSlot<T> {
    generation: u32,
    value: Option<T>,
}

/// Generational arena owning every node or arnode of a network.
///
/// Destroying an entity tombstones its slot and bumps the generation, so any
/// handle still pointing at it fails with [`CegarError::UseAfterDestroy`]
/// instead of observing a recycled entity.
pub struct Arena<K, T> {
    slots: Vec<ArenaSlot<T>>,
    free: Vec<u32>,
    live: usize,
    _key: PhantomData<K>,
}

impl<K: ArenaKey, T> Arena<K, T> {
    /// Creates an empty arena.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
            _key: PhantomData,
        }
    }

    /// Number of live entities.
    pub fn len(&self) -> usize {
        self.live
    }

    /// Whether the arena holds no live entity.
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Inserts a value built from its own handle.
    pub fn try_insert_with<F>(&mut self, build: F) -> Result<K>
    where
        F: FnOnce(K) -> Result<T>,
    {
        let (index, generation) = match self.free.last() {
            Some(&index) => (index, self.slots[index as usize].generation),
            None => {
                let index = u32::try_from(self.slots.len()).map_err(|_| CegarError::Exhausted {
                    limit: u64::from(u32::MAX),
                })?;
                (index, 0)
            }
        };
        let key = K::from_parts(index, generation);
        let value = build(key)?;
        if index as usize == self.slots.len() {
            self.slots.push(ArenaSlot {
                generation,
                value: Some(value),
            });
        } else {
            self.free.pop();
            self.slots[index as usize].value = Some(value);
        }
        self.live += 1;
        Ok(key)
    }

    /// Whether `key` still refers to a live entity.
    pub fn contains(&self, key: K) -> bool {
        self.slots
            .get(key.index() as usize)
            .is_some_and(|slot| slot.generation == key.generation() && slot.value.is_some())
    }

    /// Borrows a live entity.
    pub fn get(&self, key: K) -> Result<&T> {
        self.slots
            .get(key.index() as usize)
            .filter(|slot| slot.generation == key.generation())
            .and_then(|slot| slot.value.as_ref())
            .ok_or_else(|| stale::<K>(key))
    }

    /// Mutably borrows a live entity.
    pub fn get_mut(&mut self, key: K) -> Result<&mut T> {
        self.slots
            .get_mut(key.index() as usize)
            .filter(|slot| slot.generation == key.generation())
            .and_then(|slot| slot.value.as_mut())
            .ok_or_else(|| stale::<K>(key))
    }

    /// Moves the entity out and tombstones its slot.
    pub fn remove(&mut self, key: K) -> Result<T> {
        let slot = self
            .slots
            .get_mut(key.index() as usize)
            .filter(|slot| slot.generation == key.generation())
            .ok_or_else(|| stale::<K>(key))?;
        let value = slot.value.take().ok_or_else(|| stale::<K>(key))?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(key.index());
        self.live -= 1;
        Ok(value)
    }

    /// Iterates live entities in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (K, &T)> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value
                .as_ref()
                .map(|value| (K::from_parts(index as u32, slot.generation), value))
        })
    }
}

impl<K: ArenaKey, T> Default for Arena<K, T> {
    fn default() -> Self {
        Self::new()
    }
}

fn stale<K: ArenaKey>(key: K) -> CegarError {
    CegarError::UseAfterDestroy {
        kind: K::KIND,
        index: key.index(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NodeId;

    #[test]
    fn stale_handle_fails_after_slot_reuse() {
        let mut arena: Arena<NodeId, &'static str> = Arena::new();
        let first = arena.try_insert_with(|_| Ok("first")).unwrap();
        assert_eq!(arena.remove(first).unwrap(), "first");
        let second = arena.try_insert_with(|_| Ok("second")).unwrap();

        assert_eq!(first.index(), second.index());
        assert!(matches!(
            arena.get(first),
            Err(CegarError::UseAfterDestroy { kind: "node", .. })
        ));
        assert_eq!(*arena.get(second).unwrap(), "second");
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn failed_build_does_not_consume_a_slot() {
        let mut arena: Arena<NodeId, u32> = Arena::new();
        let err = arena.try_insert_with(|_| Err(CegarError::NoMergeCandidate));
        assert!(err.is_err());
        assert!(arena.is_empty());
        let key = arena.try_insert_with(|key| Ok(key.index())).unwrap();
        assert_eq!(*arena.get(key).unwrap(), 0);
    }

    #[test]
    fn double_remove_is_use_after_destroy() {
        let mut arena: Arena<NodeId, u8> = Arena::new();
        let key = arena.try_insert_with(|_| Ok(7)).unwrap();
        arena.remove(key).unwrap();
        assert!(arena.remove(key).is_err());
        assert!(!arena.contains(key));
    }
}
