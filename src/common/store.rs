//! Local key/value store with an is-origin flag per entry.

use std::collections::HashMap;

use bytes::Bytes;

#[derive(Debug, Clone)]
struct StoredValue {
    value: Bytes,
    is_origin: bool,
}

/// Everything known about one stored key; the shape of a table dump row.
#[derive(Debug, Clone, PartialEq)]
pub struct KvEntry {
    pub key: String,
    pub value: Bytes,
    /// Whether this node is the original publisher of the value, as opposed
    /// to a replica holder.
    pub is_origin: bool,
}

/// Mapping from textual keys to opaque byte values.
///
/// Stable: entries are only replaced by an explicit overwriting `put`,
/// never evicted.
#[derive(Debug, Default)]
pub struct KvStore {
    entries: HashMap<String, StoredValue>,
}

impl KvStore {
    pub fn new() -> Self {
        Self::default()
    }

    // === Public Methods ===

    pub fn get(&self, key: &str) -> Option<Bytes> {
        self.entries.get(key).map(|stored| stored.value.clone())
    }

    /// Overwrites any prior value (and origin flag) for `key`.
    pub fn put(&mut self, key: String, value: Bytes, is_origin: bool) {
        self.entries.insert(key, StoredValue { value, is_origin });
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Snapshot of every entry, for the control surface's table dump.
    pub fn entries(&self) -> Vec<KvEntry> {
        self.entries
            .iter()
            .map(|(key, stored)| KvEntry {
                key: key.clone(),
                value: stored.value.clone(),
                is_origin: stored.is_origin,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn put_overwrites() {
        let mut store = KvStore::new();

        store.put("a1b2".to_string(), Bytes::from_static(&[1, 2, 3]), true);
        store.put("a1b2".to_string(), Bytes::from_static(&[4]), false);

        assert_eq!(store.get("a1b2"), Some(Bytes::from_static(&[4])));
        assert_eq!(store.len(), 1);

        let entry = &store.entries()[0];
        assert!(!entry.is_origin);
    }

    #[test]
    fn get_missing_is_none() {
        let store = KvStore::new();
        assert_eq!(store.get("missing"), None);
    }

    #[test]
    fn entries_reports_origin_flags() {
        let mut store = KvStore::new();
        store.put("ours".to_string(), Bytes::from_static(b"v"), true);
        store.put("theirs".to_string(), Bytes::from_static(b"w"), false);

        let mut entries = store.entries();
        entries.sort_by(|a, b| a.key.cmp(&b.key));

        assert_eq!(entries.len(), 2);
        assert!(entries[0].is_origin);
        assert_eq!(entries[0].key, "ours");
        assert!(!entries[1].is_origin);
    }
}
