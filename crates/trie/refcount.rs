use std::sync::{Arc, RwLock};

use ethereum_types::H256;
use rustc_hash::FxHashMap;

use crate::{error::TrieError, node_hash::NodeHash, store::NodeStore};

#[derive(Default)]
struct RefCountState {
    refs: FxHashMap<H256, u64>,
    sizes: FxHashMap<H256, usize>,
    total_bytes: usize,
    closed: bool,
}

/// Reference-counting layer over a [`NodeStore`].
///
/// Tracks, for every stored hash, how many live roots reference it and the
/// size of its blob. Entries whose count drops to zero stay in the store
/// until [`RefCountDB::collect_garbage`] sweeps them; when and how to
/// deep-dereference a retired root is the caller's policy.
///
/// Reads (`ref_count`, `node`, `node_count`, `total_size`) share a read
/// lock; once closed, every mutating operation fails with
/// [`TrieError::DatabaseClosed`].
#[derive(Clone)]
pub struct RefCountDB {
    store: NodeStore,
    state: Arc<RwLock<RefCountState>>,
}

impl RefCountDB {
    pub fn new(store: NodeStore) -> Self {
        Self {
            store,
            state: Default::default(),
        }
    }

    pub fn store(&self) -> &NodeStore {
        &self.store
    }

    /// Stores a blob under its hash with an initial reference count of zero.
    /// Re-inserting an existing hash only refreshes the size statistics.
    pub fn insert(&self, hash: H256, data: Vec<u8>) -> Result<(), TrieError> {
        let mut state = self.write()?;
        if state.closed {
            return Err(TrieError::DatabaseClosed);
        }
        let size = data.len();
        if let Some(old) = state.sizes.insert(hash, size) {
            state.total_bytes -= old;
        }
        state.total_bytes += size;
        state.refs.entry(hash).or_insert(0);
        self.store.insert(NodeHash::Hashed(hash), data)
    }

    /// Increments the reference count, returning the new count.
    pub fn reference(&self, hash: H256) -> Result<u64, TrieError> {
        let mut state = self.write()?;
        if state.closed {
            return Err(TrieError::DatabaseClosed);
        }
        let count = state.refs.entry(hash).or_insert(0);
        *count += 1;
        Ok(*count)
    }

    /// Decrements the reference count, reporting whether it reached zero.
    /// Unknown hashes are a no-op; decrementing an entry already at zero is
    /// a hard error.
    pub fn dereference(&self, hash: H256) -> Result<bool, TrieError> {
        let mut state = self.write()?;
        if state.closed {
            return Err(TrieError::DatabaseClosed);
        }
        match state.refs.get_mut(&hash) {
            None => Ok(false),
            Some(0) => Err(TrieError::RefCountNegative(hash)),
            Some(count) => {
                *count -= 1;
                Ok(*count == 0)
            }
        }
    }

    pub fn reference_batch(
        &self,
        hashes: impl IntoIterator<Item = H256>,
    ) -> Result<(), TrieError> {
        for hash in hashes {
            self.reference(hash)?;
        }
        Ok(())
    }

    /// Batch dereference, returning the hashes that reached zero.
    pub fn dereference_batch(
        &self,
        hashes: impl IntoIterator<Item = H256>,
    ) -> Result<Vec<H256>, TrieError> {
        let mut reached_zero = Vec::new();
        for hash in hashes {
            if self.dereference(hash)? {
                reached_zero.push(hash);
            }
        }
        Ok(reached_zero)
    }

    pub fn ref_count(&self, hash: H256) -> Result<u64, TrieError> {
        Ok(self.read()?.refs.get(&hash).copied().unwrap_or(0))
    }

    /// Fetches a blob through the underlying store.
    pub fn node(&self, hash: H256) -> Result<Option<Vec<u8>>, TrieError> {
        self.store.get(&NodeHash::Hashed(hash))
    }

    pub fn node_count(&self) -> Result<usize, TrieError> {
        Ok(self.read()?.sizes.len())
    }

    pub fn total_size(&self) -> Result<usize, TrieError> {
        Ok(self.read()?.total_bytes)
    }

    /// Every tracked hash whose reference count is zero.
    pub fn unreferenced(&self) -> Result<Vec<H256>, TrieError> {
        Ok(self
            .read()?
            .refs
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(hash, _)| *hash)
            .collect())
    }

    /// Removes every zero-reference entry from the store.
    /// Returns the number of removed entries and the bytes freed.
    pub fn collect_garbage(&self) -> Result<(usize, usize), TrieError> {
        let mut state = self.write()?;
        if state.closed {
            return Err(TrieError::DatabaseClosed);
        }
        let garbage: Vec<H256> = state
            .refs
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(hash, _)| *hash)
            .collect();

        let mut bytes_freed = 0;
        for hash in &garbage {
            state.refs.remove(hash);
            if let Some(size) = state.sizes.remove(hash) {
                state.total_bytes -= size;
                bytes_freed += size;
            }
            self.store.remove(&NodeHash::Hashed(*hash))?;
        }

        if !garbage.is_empty() {
            tracing::debug!(
                removed = garbage.len(),
                bytes_freed,
                "collected unreferenced trie nodes"
            );
        }
        Ok((garbage.len(), bytes_freed))
    }

    /// Rejects all further mutating operations.
    pub fn close(&self) -> Result<(), TrieError> {
        self.write()?.closed = true;
        Ok(())
    }

    pub fn is_closed(&self) -> Result<bool, TrieError> {
        Ok(self.read()?.closed)
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, RefCountState>, TrieError> {
        self.state.read().map_err(|_| TrieError::LockError)
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, RefCountState>, TrieError> {
        self.state.write().map_err(|_| TrieError::LockError)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn db_with(entries: &[&[u8]]) -> (RefCountDB, Vec<H256>) {
        let db = RefCountDB::new(NodeStore::new());
        let mut hashes = Vec::new();
        for entry in entries {
            let mut data = entry.to_vec();
            data.resize(40, 0xaa);
            let hash = NodeHash::from_encoded_raw(&data).finalize();
            db.insert(hash, data).unwrap();
            hashes.push(hash);
        }
        (db, hashes)
    }

    #[test]
    fn reference_and_dereference_round_trip() {
        let (db, hashes) = db_with(&[b"node"]);
        let hash = hashes[0];

        assert_eq!(db.ref_count(hash).unwrap(), 0);
        db.reference(hash).unwrap();
        db.reference(hash).unwrap();
        assert_eq!(db.ref_count(hash).unwrap(), 2);

        assert!(!db.dereference(hash).unwrap());
        assert!(db.dereference(hash).unwrap());
        assert_eq!(db.ref_count(hash).unwrap(), 0);
    }

    #[test]
    fn dereference_below_zero_is_a_hard_error() {
        let (db, hashes) = db_with(&[b"node"]);
        assert!(matches!(
            db.dereference(hashes[0]),
            Err(TrieError::RefCountNegative(hash)) if hash == hashes[0]
        ));
    }

    #[test]
    fn dereference_unknown_hash_is_a_noop() {
        let (db, _) = db_with(&[]);
        assert!(!db.dereference(H256::repeat_byte(0x01)).unwrap());
    }

    #[test]
    fn collect_garbage_sweeps_zero_ref_entries() {
        let (db, hashes) = db_with(&[b"keep", b"drop a", b"drop b"]);
        db.reference(hashes[0]).unwrap();

        let mut unreferenced = db.unreferenced().unwrap();
        unreferenced.sort();
        let mut expected = vec![hashes[1], hashes[2]];
        expected.sort();
        assert_eq!(unreferenced, expected);

        let (removed, bytes_freed) = db.collect_garbage().unwrap();
        assert_eq!(removed, 2);
        assert_eq!(bytes_freed, 80);
        assert_eq!(db.node_count().unwrap(), 1);
        assert!(db.node(hashes[0]).unwrap().is_some());
        assert!(db.node(hashes[1]).unwrap().is_none());
        assert_eq!(db.total_size().unwrap(), 40);
    }

    #[test]
    fn closed_database_rejects_mutations() {
        let (db, hashes) = db_with(&[b"node"]);
        db.reference(hashes[0]).unwrap();
        db.close().unwrap();

        assert!(matches!(
            db.reference(hashes[0]),
            Err(TrieError::DatabaseClosed)
        ));
        assert!(matches!(
            db.dereference(hashes[0]),
            Err(TrieError::DatabaseClosed)
        ));
        assert!(matches!(
            db.insert(H256::zero(), vec![]),
            Err(TrieError::DatabaseClosed)
        ));
        assert!(matches!(db.collect_garbage(), Err(TrieError::DatabaseClosed)));
        // reads still work
        assert_eq!(db.ref_count(hashes[0]).unwrap(), 1);
        assert!(db.is_closed().unwrap());
    }

    #[test]
    fn batch_dereference_reports_zeroed_hashes() {
        let (db, hashes) = db_with(&[b"a", b"b"]);
        db.reference_batch(hashes.clone()).unwrap();
        db.reference(hashes[0]).unwrap();

        let zeroed = db.dereference_batch(hashes.clone()).unwrap();
        assert_eq!(zeroed, vec![hashes[1]]);
    }
}
