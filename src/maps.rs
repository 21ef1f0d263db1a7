//=============================================
// src/maps.rs
//=============================================
// Author: EmberWorks Contributors
// License: MIT (see LICENSE)
// Goal: EmberScript map containers
// Objective: String-keyed maps with insertion-ordered and key-sorted
//            disciplines and copying conversions between the two
//=============================================

use std::collections::BTreeMap;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::value::Value;

/// Map backing. Insertion discipline keeps entry order; sorted discipline
/// iterates in lexicographic key order.
#[derive(Debug)]
pub enum MapStorage {
    Insertion(IndexMap<String, Value>),
    Sorted(BTreeMap<String, Value>),
}

/// Shared handle onto one map; clones alias the same storage.
#[derive(Debug, Clone)]
pub struct MapHandle {
    storage: Arc<Mutex<MapStorage>>,
}

impl MapHandle {
    pub fn new(sorted: bool) -> Self {
        let storage = if sorted {
            MapStorage::Sorted(BTreeMap::new())
        } else {
            MapStorage::Insertion(IndexMap::new())
        };
        Self {
            storage: Arc::new(Mutex::new(storage)),
        }
    }

    pub fn from_entries(entries: Vec<(String, Value)>, sorted: bool) -> Self {
        let handle = MapHandle::new(sorted);
        for (key, value) in entries {
            handle.set(key, value);
        }
        handle
    }

    pub fn is_sorted(&self) -> bool {
        matches!(*self.storage.lock(), MapStorage::Sorted(_))
    }

    pub fn len(&self) -> usize {
        match &*self.storage.lock() {
            MapStorage::Insertion(m) => m.len(),
            MapStorage::Sorted(m) => m.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        match &*self.storage.lock() {
            MapStorage::Insertion(m) => m.get(key).cloned(),
            MapStorage::Sorted(m) => m.get(key).cloned(),
        }
    }

    pub fn set(&self, key: String, value: Value) {
        match &mut *self.storage.lock() {
            MapStorage::Insertion(m) => {
                m.insert(key, value);
            }
            MapStorage::Sorted(m) => {
                m.insert(key, value);
            }
        }
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        match &mut *self.storage.lock() {
            // shift_remove keeps the insertion order of the remaining keys
            MapStorage::Insertion(m) => m.shift_remove(key),
            MapStorage::Sorted(m) => m.remove(key),
        }
    }

    pub fn has(&self, key: &str) -> bool {
        match &*self.storage.lock() {
            MapStorage::Insertion(m) => m.contains_key(key),
            MapStorage::Sorted(m) => m.contains_key(key),
        }
    }

    /// Entries in iteration order for this discipline.
    pub fn entries(&self) -> Vec<(String, Value)> {
        match &*self.storage.lock() {
            MapStorage::Insertion(m) => m.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            MapStorage::Sorted(m) => m.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        }
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries().into_iter().map(|(k, _)| k).collect()
    }

    pub fn values(&self) -> Vec<Value> {
        self.entries().into_iter().map(|(_, v)| v).collect()
    }

    /// Copy into a key-sorted map. The source is left untouched and the
    /// result never aliases its storage.
    pub fn to_sorted(&self) -> MapHandle {
        MapHandle::from_entries(self.entries(), true)
    }

    /// Copy into an insertion-ordered map; see [`MapHandle::to_sorted`].
    pub fn to_unsorted(&self) -> MapHandle {
        MapHandle::from_entries(self.entries(), false)
    }

    pub fn ptr_eq(&self, other: &MapHandle) -> bool {
        Arc::ptr_eq(&self.storage, &other.storage)
    }

    /// Content equality regardless of discipline or entry order.
    pub fn deep_eq(&self, other: &MapHandle) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        if self.len() != other.len() {
            return false;
        }
        let theirs = other.entries();
        self.entries().iter().all(|(key, value)| {
            theirs
                .iter()
                .any(|(k, v)| k == key && v == value)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MapHandle {
        MapHandle::from_entries(
            vec![
                ("zulu".into(), Value::Int(1)),
                ("alpha".into(), Value::Int(2)),
                ("mike".into(), Value::Int(3)),
            ],
            false,
        )
    }

    #[test]
    fn insertion_discipline_keeps_entry_order() {
        assert_eq!(sample().keys(), vec!["zulu", "alpha", "mike"]);
    }

    #[test]
    fn sorted_discipline_orders_keys() {
        let sorted = sample().to_sorted();
        assert_eq!(sorted.keys(), vec!["alpha", "mike", "zulu"]);
    }

    #[test]
    fn conversions_copy_instead_of_aliasing() {
        let source = sample();
        let sorted = source.to_sorted();
        sorted.set("extra".into(), Value::Int(9));
        assert!(!source.has("extra"));
        assert_eq!(source.len(), 3);
    }

    #[test]
    fn sorted_roundtrip_preserves_content() {
        let source = sample();
        let roundtrip = source.to_sorted().to_unsorted();
        assert!(roundtrip.deep_eq(&source));
        assert!(!roundtrip.ptr_eq(&source));
    }

    #[test]
    fn remove_keeps_remaining_order() {
        let map = sample();
        map.remove("alpha");
        assert_eq!(map.keys(), vec!["zulu", "mike"]);
    }

    #[test]
    fn aliased_handles_share_storage() {
        let a = sample();
        let b = a.clone();
        b.set("delta".into(), Value::Int(4));
        assert!(a.has("delta"));
    }
}
