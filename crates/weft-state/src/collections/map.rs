#![forbid(unsafe_code)]

//! Dictionary-like store over `HashMap<K, V>`.

use std::collections::HashMap;
use std::hash::Hash;

use super::{Collection, CollectionStore, Entry, OpCategory, OperationTable, op};

const MAP_ENTRIES: &[Entry] = &[
    op("len", OpCategory::Read),
    op("is_empty", OpCategory::Read),
    op("get", OpCategory::Read),
    op("contains_key", OpCategory::Read),
    op("keys", OpCategory::Read),
    op("values", OpCategory::Read),
    op("insert", OpCategory::CopyMutate),
    op("remove", OpCategory::CopyMutate),
    op("clear", OpCategory::CopyMutate),
    op("extend", OpCategory::CopyMutate),
    op("retain", OpCategory::CopyMutate),
    op("map_values", OpCategory::ReduceMutate),
    op("filter", OpCategory::ReduceMutate),
    op("merge", OpCategory::ReduceMutate),
];

static MAP_OPERATIONS: OperationTable = OperationTable::from_static("map", MAP_ENTRIES);

impl<K, V> Collection for HashMap<K, V>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + PartialEq + 'static,
{
    fn operations() -> &'static OperationTable {
        &MAP_OPERATIONS
    }
}

/// Reactive dictionary.
pub type MapStore<K, V> = CollectionStore<HashMap<K, V>>;

impl<K, V> CollectionStore<HashMap<K, V>>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + PartialEq + 'static,
{
    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read("len", HashMap::len)
    }

    /// True when the map has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read("is_empty", HashMap::is_empty)
    }

    /// A copy of the value under `key`.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<V> {
        self.read("get", |m| m.get(key).cloned())
    }

    /// Whether `key` is present.
    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        self.read("contains_key", |m| m.contains_key(key))
    }

    /// Copies of every key, in unspecified order.
    #[must_use]
    pub fn keys(&self) -> Vec<K> {
        self.read("keys", |m| m.keys().cloned().collect())
    }

    /// Copies of every value, in unspecified order.
    #[must_use]
    pub fn values(&self) -> Vec<V> {
        self.read("values", |m| m.values().cloned().collect())
    }

    /// Insert `value` under `key`, returning the previous value.
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        self.copy_mutate("insert", |m| m.insert(key, value))
    }

    /// Remove `key`, returning its value. A missing key leaves the store
    /// untouched.
    pub fn remove(&self, key: &K) -> Option<V> {
        if !self.contains_key(key) {
            return None;
        }
        self.copy_mutate("remove", |m| m.remove(key))
    }

    /// Remove every entry.
    pub fn clear(&self) {
        self.copy_mutate("clear", HashMap::clear);
    }

    /// Insert every pair of `entries`.
    pub fn extend(&self, entries: impl IntoIterator<Item = (K, V)>) {
        self.copy_mutate("extend", |m| m.extend(entries));
    }

    /// Keep entries for which `keep` returns true.
    pub fn retain(&self, mut keep: impl FnMut(&K, &V) -> bool) {
        self.copy_mutate("retain", |m| m.retain(|k, v| keep(k, &*v)));
    }

    /// Replace each value with `f(key, value)`.
    pub fn map_values(&self, f: impl Fn(&K, &V) -> V) {
        self.reduce_mutate("map_values", |m| {
            m.iter().map(|(k, v)| (k.clone(), f(k, v))).collect()
        });
    }

    /// Keep copies of the entries matching `keep`.
    pub fn filter(&self, keep: impl Fn(&K, &V) -> bool) {
        self.reduce_mutate("filter", |m| {
            m.iter()
                .filter(|&(k, v)| keep(k, v))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        });
    }

    /// Overlay `other` on the current entries; `other` wins on conflicts.
    pub fn merge(&self, other: &HashMap<K, V>) {
        self.reduce_mutate("merge", |m| {
            let mut next = m.clone();
            next.extend(other.iter().map(|(k, v)| (k.clone(), v.clone())));
            next
        });
    }
}
