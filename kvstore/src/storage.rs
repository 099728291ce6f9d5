//! Storage capability handed to application handlers.

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::store::ConcurrentStore;

/// Failure to reach or talk to the storage backend.
///
/// Kept apart from "key absent": a missing value is `Ok(None)`.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage transport failed: {0}")]
    Transport(#[from] io::Error),
    #[error("storage protocol violation: {0}")]
    Protocol(String),
}

/// Key-value operations an application may perform.
///
/// Callers do not know whether the map lives in this process or behind a
/// [`StoreClient`](crate::StoreClient).
#[async_trait]
pub trait Storage: Send + Sync {
    async fn put(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Fetches several keys at once, one result per key in input order.
    async fn get(&self, keys: &[String]) -> Result<Vec<Option<String>>, StorageError>;

    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}

#[async_trait]
impl Storage for ConcurrentStore {
    async fn put(&self, key: &str, value: &str) -> Result<(), StorageError> {
        ConcurrentStore::put(self, key, value);
        Ok(())
    }

    async fn get(&self, keys: &[String]) -> Result<Vec<Option<String>>, StorageError> {
        Ok(self.get_many(keys))
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        ConcurrentStore::remove(self, key);
        Ok(())
    }
}

#[async_trait]
impl<T: Storage + ?Sized> Storage for Arc<T> {
    async fn put(&self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).put(key, value).await
    }

    async fn get(&self, keys: &[String]) -> Result<Vec<Option<String>>, StorageError> {
        (**self).get(keys).await
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        (**self).remove(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_process_store_behind_trait_object() {
        let store: Arc<dyn Storage> = Arc::new(ConcurrentStore::new());

        store.put("k1", "v1").await.expect("put");
        store.put("k2", "v2").await.expect("put");
        store.remove("k2").await.expect("remove");

        let values = store
            .get(&["k2".to_string(), "k1".to_string(), "k3".to_string()])
            .await
            .expect("get");
        assert_eq!(values, vec![None, Some("v1".to_string()), None]);
    }
}
