use crate::{error::TrieError, node_hash::NodeHash};
use ethereum_types::H256;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

/// Backend a trie reads and writes nodes through, keyed by node hash.
pub trait TrieDB: Send + Sync {
    fn get(&self, key: NodeHash) -> Result<Option<Vec<u8>>, TrieError>;
    fn put(&self, key: NodeHash, value: Vec<u8>) -> Result<(), TrieError>;
    fn put_batch(&self, key_values: Vec<(NodeHash, Vec<u8>)>) -> Result<(), TrieError>;
}

/// The pluggable persistence boundary: anything that can receive node blobs
/// keyed by their 32-byte hash. Implementations must be idempotent under
/// duplicate hashes.
pub trait NodeWriter: Send + Sync {
    fn put(&self, hash: H256, data: &[u8]) -> Result<(), TrieError>;
}

impl<T: TrieDB + ?Sized> NodeWriter for T {
    fn put(&self, hash: H256, data: &[u8]) -> Result<(), TrieError> {
        TrieDB::put(self, hash.into(), data.to_vec())
    }
}

/// InMemory implementation for the TrieDB trait, with get and put operations.
#[derive(Default)]
pub struct InMemoryTrieDB {
    inner: Arc<Mutex<HashMap<NodeHash, Vec<u8>>>>,
}

impl InMemoryTrieDB {
    pub fn new(map: Arc<Mutex<HashMap<NodeHash, Vec<u8>>>>) -> Self {
        Self { inner: map }
    }
}

impl TrieDB for InMemoryTrieDB {
    fn get(&self, key: NodeHash) -> Result<Option<Vec<u8>>, TrieError> {
        Ok(self
            .inner
            .lock()
            .map_err(|_| TrieError::LockError)?
            .get(&key)
            .cloned())
    }

    fn put(&self, key: NodeHash, value: Vec<u8>) -> Result<(), TrieError> {
        self.inner
            .lock()
            .map_err(|_| TrieError::LockError)?
            .insert(key, value);
        Ok(())
    }

    fn put_batch(&self, key_values: Vec<(NodeHash, Vec<u8>)>) -> Result<(), TrieError> {
        let mut db = self.inner.lock().map_err(|_| TrieError::LockError)?;
        for (key, value) in key_values {
            db.insert(key, value);
        }
        Ok(())
    }
}
