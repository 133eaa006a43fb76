//! Identifier to pathname cache
//!
//! Populated from path records as they are dispatched and read by handlers
//! that want a human readable name for an inode. Entries are never evicted
//! and the first name seen for an identifier wins. Operations lock only the
//! map shard holding their key.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use provrelay_core::Identifier;

#[derive(Debug, Default)]
pub struct NameCache {
    names: DashMap<Identifier, String>,
}

impl NameCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exists(&self, id: &Identifier) -> bool {
        self.names.contains_key(id)
    }

    /// Insert `name` unless `id` already has one. Returns whether this call
    /// inserted.
    pub fn insert(&self, id: Identifier, name: impl Into<String>) -> bool {
        // The shard lock is held across the check and the insert
        match self.names.entry(id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(name.into());
                true
            }
        }
    }

    pub fn lookup(&self, id: &Identifier) -> Option<String> {
        self.names.get(id).map(|name| name.value().clone())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use provrelay_core::builder::RecordBuilder;
    use provrelay_core::tags::ENT_INODE_FILE;
    use std::sync::{Arc, Barrier};
    use std::thread;

    #[test]
    fn test_first_writer_wins() {
        let cache = NameCache::new();
        let id = RecordBuilder::identifier(ENT_INODE_FILE, 1);

        assert!(!cache.exists(&id));
        assert!(cache.insert(id, "/a"));
        assert!(cache.exists(&id));
        assert!(!cache.insert(id, "/b"));
        assert_eq!(cache.lookup(&id).as_deref(), Some("/a"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_unknown_identifier() {
        let cache = NameCache::new();
        cache.insert(RecordBuilder::identifier(ENT_INODE_FILE, 1), "/a");

        let other = RecordBuilder::identifier(ENT_INODE_FILE, 2);
        assert!(!cache.exists(&other));
        assert_eq!(cache.lookup(&other), None);
    }

    #[test]
    fn test_concurrent_inserts_keep_one_entry() {
        let cache = Arc::new(NameCache::new());
        let id = RecordBuilder::identifier(ENT_INODE_FILE, 7);
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = Arc::clone(&cache);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    cache.insert(id, format!("/name/{i}"))
                })
            })
            .collect();

        let inserted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&won| won)
            .count();

        assert_eq!(inserted, 1);
        assert_eq!(cache.len(), 1);
        let name = cache.lookup(&id).unwrap();
        assert!(name.starts_with("/name/"));
    }
}
