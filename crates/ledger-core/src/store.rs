//! The narrow key-value interface the chain persists through.

use crate::error::StoreError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// Ordered, durable mapping from block height to a serialized block.
///
/// Each call is atomic on its own; the chain never needs multi-key
/// transactions.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Number of stored entries, 0 when empty. Heights are written densely
    /// from 0, so this is also the next free height.
    async fn count(&self) -> Result<u64, StoreError>;

    /// Stored value at `height`, or [`StoreError::NotFound`].
    async fn get(&self, height: u64) -> Result<Vec<u8>, StoreError>;

    /// Store or overwrite the value at `height`.
    async fn put(&self, height: u64, value: Vec<u8>) -> Result<(), StoreError>;

    /// Make previous writes durable.
    async fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Volatile store, used by tests and throwaway chains.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<u64, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn count(&self) -> Result<u64, StoreError> {
        Ok(self.entries.read().await.len() as u64)
    }

    async fn get(&self, height: u64) -> Result<Vec<u8>, StoreError> {
        self.entries
            .read()
            .await
            .get(&height)
            .cloned()
            .ok_or(StoreError::NotFound(height))
    }

    async fn put(&self, height: u64, value: Vec<u8>) -> Result<(), StoreError> {
        self.entries.write().await.insert(height, value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_store_counts_zero() {
        let store = MemoryStore::new();
        assert_eq!(store.count().await.unwrap(), 0);
        assert_eq!(store.get(0).await, Err(StoreError::NotFound(0)));
    }

    #[tokio::test]
    async fn put_overwrites_existing_entry() {
        let store = MemoryStore::new();
        store.put(0, b"first".to_vec()).await.unwrap();
        store.put(0, b"second".to_vec()).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.get(0).await.unwrap(), b"second".to_vec());
        store.flush().await.unwrap();
    }
}
