use std::sync::{Arc, RwLock};

use rustc_hash::FxHashMap;

use crate::{
    db::{NodeWriter, TrieDB},
    error::TrieError,
    node_hash::NodeHash,
};

#[derive(Default)]
struct Pools {
    /// Uncommitted blobs produced by the committer.
    dirty: FxHashMap<NodeHash, Vec<u8>>,
    /// Blobs that have been flushed to the backing writer.
    clean: FxHashMap<NodeHash, Vec<u8>>,
}

/// Content-addressed node store: a map from node hash to the RLP blob whose
/// keccak is that hash.
///
/// Writes land in the dirty pool; [`NodeStore::commit`] flushes them through
/// a [`NodeWriter`] and promotes them to the clean pool. Lookups consult
/// dirty first, then clean, then the optional backing database.
///
/// The handle is cheap to clone and internally synchronised, so tries can be
/// opened directly over it (it implements [`TrieDB`]).
#[derive(Clone, Default)]
pub struct NodeStore {
    pools: Arc<RwLock<Pools>>,
    backing: Option<Arc<dyn TrieDB>>,
}

impl NodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that falls back to `backing` for blobs it does not hold.
    pub fn with_backing(backing: Arc<dyn TrieDB>) -> Self {
        Self {
            pools: Default::default(),
            backing: Some(backing),
        }
    }

    /// Buffers a blob in the dirty pool.
    pub fn insert(&self, hash: NodeHash, data: Vec<u8>) -> Result<(), TrieError> {
        let mut pools = self.pools.write().map_err(|_| TrieError::LockError)?;
        // an already-clean blob does not need to be rewritten
        if !pools.clean.contains_key(&hash) {
            pools.dirty.insert(hash, data);
        }
        Ok(())
    }

    pub fn get(&self, hash: &NodeHash) -> Result<Option<Vec<u8>>, TrieError> {
        {
            let pools = self.pools.read().map_err(|_| TrieError::LockError)?;
            if let Some(data) = pools.dirty.get(hash).or_else(|| pools.clean.get(hash)) {
                return Ok(Some(data.clone()));
            }
        }
        match &self.backing {
            Some(backing) => backing.get(*hash),
            None => Ok(None),
        }
    }

    pub fn contains(&self, hash: &NodeHash) -> Result<bool, TrieError> {
        Ok(self.get(hash)?.is_some())
    }

    /// Drops a blob from both pools, returning its size if it was held.
    /// Blobs already flushed to the backing database are not reachable from
    /// here and stay untouched.
    pub fn remove(&self, hash: &NodeHash) -> Result<Option<usize>, TrieError> {
        let mut pools = self.pools.write().map_err(|_| TrieError::LockError)?;
        let removed = pools
            .dirty
            .remove(hash)
            .or_else(|| pools.clean.remove(hash));
        Ok(removed.map(|data| data.len()))
    }

    /// Flushes every dirty blob through `writer`, then promotes them to the
    /// clean pool. The writer runs outside the store's lock. On failure the
    /// unflushed remainder is put back in the dirty pool for retry.
    pub fn commit(&self, writer: &dyn NodeWriter) -> Result<usize, TrieError> {
        let drained: Vec<(NodeHash, Vec<u8>)> = {
            let mut pools = self.pools.write().map_err(|_| TrieError::LockError)?;
            pools.dirty.drain().collect()
        };

        let mut flushed = Vec::with_capacity(drained.len());
        let mut pending = drained.into_iter();
        for (hash, data) in pending.by_ref() {
            match writer.put(hash.finalize(), &data) {
                Ok(()) => flushed.push((hash, data)),
                Err(err) => {
                    let mut pools = self.pools.write().map_err(|_| TrieError::LockError)?;
                    pools.dirty.insert(hash, data);
                    pools.dirty.extend(pending);
                    pools.clean.extend(flushed);
                    return Err(err);
                }
            }
        }

        let count = flushed.len();
        let mut pools = self.pools.write().map_err(|_| TrieError::LockError)?;
        pools.clean.extend(flushed);
        tracing::trace!(flushed = count, "node store flushed dirty pool");
        Ok(count)
    }

    pub fn dirty_len(&self) -> Result<usize, TrieError> {
        Ok(self
            .pools
            .read()
            .map_err(|_| TrieError::LockError)?
            .dirty
            .len())
    }

    pub fn clean_len(&self) -> Result<usize, TrieError> {
        Ok(self
            .pools
            .read()
            .map_err(|_| TrieError::LockError)?
            .clean
            .len())
    }
}

impl TrieDB for NodeStore {
    fn get(&self, key: NodeHash) -> Result<Option<Vec<u8>>, TrieError> {
        NodeStore::get(self, &key)
    }

    fn put(&self, key: NodeHash, value: Vec<u8>) -> Result<(), TrieError> {
        self.insert(key, value)
    }

    fn put_batch(&self, key_values: Vec<(NodeHash, Vec<u8>)>) -> Result<(), TrieError> {
        for (key, value) in key_values {
            self.insert(key, value)?;
        }
        Ok(())
    }
}
