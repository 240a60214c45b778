//! Persistence adapter interface for document snapshots.
//!
//! Concrete storage backends live outside this crate; the contract here is
//! only that a document snapshot round-trips through the interface. The
//! in-memory store backs tests and single-process use.

use std::collections::HashMap;
use std::hash::Hash;

use async_trait::async_trait;
use parking_lot::RwLock;

use json_crdt_core::Document;

use crate::error::SyncError;

/// Pluggable key type for document storage.
pub trait DocumentKey: Clone + Eq + Hash + Send + Sync + 'static {}

impl<T: Clone + Eq + Hash + Send + Sync + 'static> DocumentKey for T {}

#[async_trait]
pub trait DocumentStore<K: DocumentKey>: Send + Sync {
    async fn save_document(&self, key: K, doc: &Document) -> Result<(), SyncError>;

    async fn load_document(&self, key: &K) -> Result<Option<Document>, SyncError>;

    async fn delete_document(&self, key: &K) -> Result<(), SyncError>;

    /// Keys of stored documents matching the predicate.
    async fn query_documents(
        &self,
        predicate: &(dyn for<'a> Fn(&'a K) -> bool + Send + Sync),
    ) -> Result<Vec<K>, SyncError>;
}

/// Snapshot store over a process-local map; values are the document's
/// binary snapshot so the round-trip path matches a real backend.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore<K: DocumentKey> {
    inner: RwLock<HashMap<K, Vec<u8>>>,
}

impl<K: DocumentKey> MemoryDocumentStore<K> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

#[async_trait]
impl<K: DocumentKey> DocumentStore<K> for MemoryDocumentStore<K> {
    async fn save_document(&self, key: K, doc: &Document) -> Result<(), SyncError> {
        let bytes = doc
            .to_binary()
            .map_err(|e| SyncError::Store(e.to_string()))?;
        self.inner.write().insert(key, bytes);
        Ok(())
    }

    async fn load_document(&self, key: &K) -> Result<Option<Document>, SyncError> {
        let bytes = match self.inner.read().get(key) {
            Some(bytes) => bytes.clone(),
            None => return Ok(None),
        };
        let doc = Document::from_binary(&bytes).map_err(|e| SyncError::Store(e.to_string()))?;
        Ok(Some(doc))
    }

    async fn delete_document(&self, key: &K) -> Result<(), SyncError> {
        self.inner.write().remove(key);
        Ok(())
    }

    async fn query_documents(
        &self,
        predicate: &(dyn for<'a> Fn(&'a K) -> bool + Send + Sync),
    ) -> Result<Vec<K>, SyncError> {
        // Snapshot the keys so the guard is not held while filtering.
        let keys: Vec<K> = self.inner.read().keys().cloned().collect();
        Ok(keys.into_iter().filter(|k| predicate(k)).collect())
    }
}
