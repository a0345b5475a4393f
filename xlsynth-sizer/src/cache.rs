// SPDX-License-Identifier: Apache-2.0

//! Epoch-stamped lazy caches.
//!
//! Every derived value records the `Epoch` it was computed at. Owners bump
//! their epoch on any change that can affect derived data (library edits,
//! `dont_use` changes, explicit resets, netlist edits and rollbacks), and a
//! lookup at a newer epoch discards the stale contents wholesale.

use std::cell::RefCell;
use std::collections::HashMap;
use std::hash::Hash;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Epoch(u64);

impl Epoch {
    pub fn bump(&mut self) {
        self.0 += 1;
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

/// A single lazily computed value.
pub struct EpochCache<T> {
    slot: RefCell<Option<(Epoch, T)>>,
}

impl<T> Default for EpochCache<T> {
    fn default() -> Self {
        EpochCache {
            slot: RefCell::new(None),
        }
    }
}

impl<T: Clone> EpochCache<T> {
    /// Returns the cached value if it was computed at `epoch`, otherwise
    /// computes it with `f`. No borrow is held while `f` runs, so `f` may
    /// consult other caches on the same owner.
    pub fn get_or_compute(&self, epoch: Epoch, f: impl FnOnce() -> T) -> T {
        if let Some((stamp, value)) = self.slot.borrow().as_ref() {
            if *stamp == epoch {
                return value.clone();
            }
        }
        let value = f();
        *self.slot.borrow_mut() = Some((epoch, value.clone()));
        value
    }
}

/// A lazily populated map; the whole map is dropped when the epoch moves.
pub struct EpochMap<K, V> {
    inner: RefCell<(Epoch, HashMap<K, V>)>,
}

impl<K, V> Default for EpochMap<K, V> {
    fn default() -> Self {
        EpochMap {
            inner: RefCell::new((Epoch::default(), HashMap::new())),
        }
    }
}

impl<K: Hash + Eq, V: Clone> EpochMap<K, V> {
    pub fn get(&self, epoch: Epoch, key: &K) -> Option<V> {
        let inner = self.inner.borrow();
        if inner.0 != epoch {
            return None;
        }
        inner.1.get(key).cloned()
    }

    pub fn insert(&self, epoch: Epoch, key: K, value: V) {
        let mut inner = self.inner.borrow_mut();
        if inner.0 != epoch {
            inner.0 = epoch;
            inner.1.clear();
        }
        inner.1.insert(key, value);
    }

    pub fn get_or_insert_with(&self, epoch: Epoch, key: K, f: impl FnOnce() -> V) -> V {
        if let Some(v) = self.get(epoch, &key) {
            return v;
        }
        let value = f();
        self.insert(epoch, key, value.clone());
        value
    }
}
