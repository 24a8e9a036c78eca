use std::marker::PhantomData;

use crate::core::{BodyHandle, ConstraintHandle};

/// Handle types usable as keys into a [`Storage`]
pub trait StorageHandle: Copy + Eq {
    /// Builds a handle from a slot index and its generation
    fn from_parts(index: u32, generation: u32) -> Self;

    /// Slot index
    fn index(&self) -> u32;

    /// Generation of the slot when the handle was issued
    fn generation(&self) -> u32;
}

#[derive(Debug)]
struct Entry<T> {
    generation: u32,
    value: Option<T>,
}

/// Generational arena.
///
/// Removing an item bumps its slot's generation, so stale handles never
/// resolve to a newer item that reuses the slot. Iteration is in slot order,
/// independent of insertion history.
#[derive(Debug)]
pub struct Storage<T, H> {
    entries: Vec<Entry<T>>,
    free: Vec<u32>,
    len: usize,
    _marker: PhantomData<H>,
}

/// Storage for rigid bodies
pub type BodyStorage<T> = Storage<T, BodyHandle>;

/// Storage for constraints
pub type ConstraintStorage<T> = Storage<T, ConstraintHandle>;

impl<T, H: StorageHandle> Default for Storage<T, H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, H: StorageHandle> Storage<T, H> {
    /// Creates an empty storage
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            free: Vec::new(),
            len: 0,
            _marker: PhantomData,
        }
    }

    /// Adds an item and returns its handle
    pub fn add(&mut self, item: T) -> H {
        self.len += 1;
        match self.free.pop() {
            Some(index) => {
                let entry = &mut self.entries[index as usize];
                entry.value = Some(item);
                H::from_parts(index, entry.generation)
            }
            None => {
                self.entries.push(Entry {
                    generation: 0,
                    value: Some(item),
                });
                H::from_parts((self.entries.len() - 1) as u32, 0)
            }
        }
    }

    /// Gets an item by handle
    pub fn get(&self, handle: H) -> Option<&T> {
        self.entries
            .get(handle.index() as usize)
            .filter(|e| e.generation == handle.generation())
            .and_then(|e| e.value.as_ref())
    }

    /// Gets a mutable item by handle
    pub fn get_mut(&mut self, handle: H) -> Option<&mut T> {
        self.entries
            .get_mut(handle.index() as usize)
            .filter(|e| e.generation == handle.generation())
            .and_then(|e| e.value.as_mut())
    }

    /// Mutable access to two distinct items at once
    pub fn get_pair_mut(&mut self, a: H, b: H) -> Option<(&mut T, &mut T)> {
        let (ia, ib) = (a.index() as usize, b.index() as usize);
        if ia == ib || !self.contains(a) || !self.contains(b) {
            return None;
        }

        let (first, second) = if ia < ib {
            let (left, right) = self.entries.split_at_mut(ib);
            (&mut left[ia], &mut right[0])
        } else {
            let (left, right) = self.entries.split_at_mut(ia);
            (&mut right[0], &mut left[ib])
        };
        Some((first.value.as_mut()?, second.value.as_mut()?))
    }

    /// Returns true if the handle refers to a live item
    pub fn contains(&self, handle: H) -> bool {
        self.get(handle).is_some()
    }

    /// Removes an item, invalidating its handle
    pub fn remove(&mut self, handle: H) -> Option<T> {
        let entry = self.entries.get_mut(handle.index() as usize)?;
        if entry.generation != handle.generation() {
            return None;
        }
        let value = entry.value.take()?;
        entry.generation = entry.generation.wrapping_add(1);
        self.free.push(handle.index());
        self.len -= 1;
        Some(value)
    }

    /// Number of live items
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if there are no live items
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Removes every item, invalidating all handles
    pub fn clear(&mut self) {
        for (index, entry) in self.entries.iter_mut().enumerate() {
            if entry.value.take().is_some() {
                entry.generation = entry.generation.wrapping_add(1);
                self.free.push(index as u32);
            }
        }
        self.len = 0;
    }

    /// Handles of all live items, in slot order
    pub fn handles(&self) -> Vec<H> {
        self.iter().map(|(h, _)| h).collect()
    }

    /// Live items in slot order
    pub fn iter(&self) -> impl Iterator<Item = (H, &T)> + '_ {
        self.entries.iter().enumerate().filter_map(|(i, e)| {
            e.value.as_ref().map(|v| (H::from_parts(i as u32, e.generation), v))
        })
    }

    /// Mutable live items in slot order
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (H, &mut T)> + '_ {
        self.entries.iter_mut().enumerate().filter_map(|(i, e)| {
            let generation = e.generation;
            e.value.as_mut().map(|v| (H::from_parts(i as u32, generation), v))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_handles_do_not_resolve() {
        let mut storage: BodyStorage<&str> = Storage::new();
        let a = storage.add("a");
        assert_eq!(storage.remove(a), Some("a"));

        let b = storage.add("b");
        assert_eq!(a.index(), b.index());
        assert_ne!(a, b);
        assert!(storage.get(a).is_none());
        assert_eq!(storage.get(b), Some(&"b"));
        assert_eq!(storage.remove(a), None);
    }

    #[test]
    fn iterates_in_slot_order() {
        let mut storage: ConstraintStorage<u32> = Storage::new();
        let handles: Vec<_> = (0..4).map(|i| storage.add(i)).collect();
        storage.remove(handles[1]);
        let values: Vec<_> = storage.iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec![0, 2, 3]);
        assert_eq!(storage.len(), 3);
    }

    #[test]
    fn pair_access() {
        let mut storage: BodyStorage<i32> = Storage::new();
        let a = storage.add(1);
        let b = storage.add(2);
        {
            let (x, y) = storage.get_pair_mut(b, a).unwrap();
            std::mem::swap(x, y);
        }
        assert_eq!(storage.get(a), Some(&2));
        assert!(storage.get_pair_mut(a, a).is_none());
    }
}
