// Copyright (C) Microsoft Corporation. All rights reserved.

use std::collections::HashMap;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use parking_lot::RwLock;

/// Opaque handle given out to hosts in place of a key object.
pub type Handle = usize;

/// Objects handed to a host, indexed by an opaque handle.
///
/// Handles are never reused while the table lives, so a stale handle from a
/// previous session cannot alias an object loaded later.
pub struct HandleTable<T: Clone> {
    table: RwLock<HashMap<Handle, T>>,
    next_handle: AtomicUsize,
}

impl<T: Clone> Default for HandleTable<T> {
    fn default() -> Self {
        Self {
            table: RwLock::new(HashMap::new()),
            next_handle: AtomicUsize::new(1),
        }
    }
}

impl<T: Clone> HandleTable<T> {
    /// Inserts an object and returns its handle.
    ///
    /// # Arguments
    ///
    /// * `object` - The object to insert.
    ///
    /// # Returns
    ///
    /// A non-zero handle to the object.
    pub fn insert(&self, object: T) -> Handle {
        // Step by 2 starting from 1 so that 0 is never handed out.
        let handle = self.next_handle.fetch_add(2, Ordering::Relaxed);

        self.table.write().insert(handle, object);

        handle
    }

    /// Removes an object from the table and returns it.
    pub fn remove(&self, handle: Handle) -> Option<T> {
        self.table.write().remove(&handle)
    }

    /// Returns a copy of the object associated with the handle.
    pub fn get(&self, handle: Handle) -> Option<T> {
        self.table.read().get(&handle).cloned()
    }

    /// Number of live handles.
    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    /// Whether the table holds no objects.
    pub fn is_empty(&self) -> bool {
        self.table.read().is_empty()
    }

    /// Removes every object, returning how many were dropped.
    pub fn clear(&self) -> usize {
        let mut table = self.table.write();
        let count = table.len();
        table.clear();
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_get_remove() {
        let table = HandleTable::<u16>::default();
        let handle = table.insert(0xE0FC);
        assert_ne!(handle, 0);
        assert_eq!(table.get(handle), Some(0xE0FC));
        assert_eq!(table.remove(handle), Some(0xE0FC));
        assert_eq!(table.get(handle), None);
    }

    #[test]
    fn test_handles_not_reused() {
        let table = HandleTable::<u16>::default();
        let first = table.insert(1);
        table.remove(first);
        let second = table.insert(2);
        assert_ne!(first, second);
    }

    #[test]
    fn test_clear() {
        let table = HandleTable::<u16>::default();
        table.insert(1);
        table.insert(2);
        assert_eq!(table.len(), 2);
        assert_eq!(table.clear(), 2);
        assert!(table.is_empty());
    }
}
