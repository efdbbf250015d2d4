//! Small bounded cache.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard};

pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// A map that forgets everything once it reaches its capacity.
///
/// Only for values that are cheap to recompute.
#[derive(Debug)]
pub struct BoundedCache<K, V> {
    capacity: usize,
    entries: Mutex<HashMap<K, V>>,
}

impl<K, V> BoundedCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached value for `key`, computing and storing it if absent.
    pub fn get_or_insert_with(&self, key: K, compute: impl FnOnce(&K) -> V) -> V {
        let mut entries = lock_unpoisoned(&self.entries);
        if let Some(value) = entries.get(&key) {
            return value.clone();
        }
        let value = compute(&key);
        if entries.len() >= self.capacity {
            entries.clear();
        }
        entries.insert(key, value.clone());
        value
    }

    pub fn len(&self) -> usize {
        lock_unpoisoned(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
