//! Shared in-memory map behind every store request.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::info;

use crate::snapshot::{self, SnapshotError, StringMap};

/// Thread-safe key-value map used by the store server and by in-process
/// deployments of the Func service.
///
/// Every operation takes the one mutex for a single map access, so each
/// `put`, `get` or `remove` is linearizable on its own. Sequences of calls are
/// not atomic as a whole: callers doing read-modify-write across several keys
/// may interleave with other callers.
///
/// When constructed with a persistence path, the snapshot at that path is
/// loaded before the store is returned and [`ConcurrentStore::persist`] writes
/// it back.
#[derive(Default)]
pub struct ConcurrentStore {
    data: Mutex<StringMap>,
    persistence: Option<PathBuf>,
}

impl ConcurrentStore {
    /// Creates an empty, memory-only store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store backed by the snapshot file at `path`.
    ///
    /// A missing file starts the store empty.
    pub fn with_persistence(path: impl Into<PathBuf>) -> Result<Self, SnapshotError> {
        let path = path.into();
        let data = snapshot::deserialize(&path)?;
        info!(path = %path.display(), entries = data.len(), "loaded snapshot");
        Ok(Self {
            data: Mutex::new(data),
            persistence: Some(path),
        })
    }

    /// Stores a key-value pair, overwriting any existing value.
    pub fn put(&self, key: impl Into<String>, value: impl Into<String>) {
        self.entries().insert(key.into(), value.into());
    }

    /// Returns the current value for a key, if any.
    pub fn get(&self, key: &str) -> Option<String> {
        self.entries().get(key).cloned()
    }

    /// Looks up several keys under one lock acquisition.
    ///
    /// Produces exactly one result per key, in the order the keys were given.
    pub fn get_many<K: AsRef<str>>(&self, keys: &[K]) -> Vec<Option<String>> {
        let entries = self.entries();
        keys.iter()
            .map(|key| entries.get(key.as_ref()).cloned())
            .collect()
    }

    /// Deletes a key. Returns whether it was present.
    pub fn remove(&self, key: &str) -> bool {
        self.entries().remove(key).is_some()
    }

    /// Writes the current contents to the persistence path.
    ///
    /// Does nothing for memory-only stores. The lock is held while encoding so
    /// the snapshot reflects a single instant.
    pub fn persist(&self) -> Result<(), SnapshotError> {
        let Some(path) = &self.persistence else {
            return Ok(());
        };
        let entries = self.entries();
        snapshot::serialize(&entries, path)
    }

    pub fn persistence_path(&self) -> Option<&Path> {
        self.persistence.as_deref()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Returns a copy of every key-value pair.
    pub fn snapshot(&self) -> StringMap {
        self.entries().clone()
    }

    // Each critical section is a single map call, so a panicking holder can
    // never leave the map half-updated.
    fn entries(&self) -> MutexGuard<'_, StringMap> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn starts_empty() {
        let store = ConcurrentStore::new();
        assert!(store.is_empty());
        assert_eq!(store.get("100"), None);
    }

    #[test]
    fn put_overwrites() {
        let store = ConcurrentStore::new();
        store.put("k", "v1");
        store.put("k", "v2");
        assert_eq!(store.get("k").as_deref(), Some("v2"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn remove_then_get_is_absent() {
        let store = ConcurrentStore::new();
        store.put("100", "I am a key, value is 100");
        assert!(store.remove("100"));
        assert_eq!(store.get("100"), None);
        assert!(!store.remove("100"));
    }

    #[test]
    fn get_many_preserves_order_and_gaps() {
        let store = ConcurrentStore::new();
        store.put("a", "1");
        store.put("c", "3");

        let values = store.get_many(&["c", "b", "a", "c"]);
        assert_eq!(
            values,
            vec![Some("3".into()), None, Some("1".into()), Some("3".into())]
        );
    }

    #[test]
    fn concurrent_puts_are_not_lost() {
        let store = Arc::new(ConcurrentStore::new());
        let workers: Vec<_> = (0..64)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || store.put(i.to_string(), i.to_string()))
            })
            .collect();
        for worker in workers {
            worker.join().expect("worker panicked");
        }

        for i in 0..64 {
            assert_eq!(store.get(&i.to_string()), Some(i.to_string()));
        }
    }

    #[test]
    fn concurrent_put_and_remove_leave_whole_values() {
        let store = Arc::new(ConcurrentStore::new());
        let mut workers = Vec::new();
        for i in 0..10 {
            let putter = Arc::clone(&store);
            workers.push(thread::spawn(move || putter.put(i.to_string(), i.to_string())));
            let remover = Arc::clone(&store);
            workers.push(thread::spawn(move || {
                remover.remove(&i.to_string());
            }));
        }
        for worker in workers {
            worker.join().expect("worker panicked");
        }

        for i in 0..10 {
            let key = i.to_string();
            let value = store.get(&key);
            assert!(value.is_none() || value.as_deref() == Some(key.as_str()));
        }
    }

    #[test]
    fn persist_without_path_is_noop() {
        let store = ConcurrentStore::new();
        store.put("k", "v");
        store.persist().expect("noop persist");
        assert!(store.persistence_path().is_none());
    }

    #[test]
    fn persisted_contents_reload() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("store.snap");

        let store = ConcurrentStore::with_persistence(&path).expect("fresh store");
        assert!(store.is_empty());
        store.put("user_warbles_user_alice", "");
        store.put("warble_7", "{\"text\":\"hi # there\"}");
        store.persist().expect("persist");

        let reloaded = ConcurrentStore::with_persistence(&path).expect("reload");
        assert_eq!(reloaded.snapshot(), store.snapshot());
    }
}
