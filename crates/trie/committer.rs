use std::{
    sync::{
        Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::Instant,
};

use ethereum_types::H256;
use rustc_hash::FxHashMap;

use crate::{
    EMPTY_TRIE_HASH, Trie,
    db::NodeWriter,
    error::TrieError,
    node_hash::NodeHash,
    refcount::RefCountDB,
};

static TOTAL_NODES: AtomicU64 = AtomicU64::new(0);
static TOTAL_BYTES: AtomicU64 = AtomicU64::new(0);
static TOTAL_COMMITS: AtomicU64 = AtomicU64::new(0);

/// Process-wide commit totals as `(nodes, bytes, commits)`.
/// Metrics only, never a correctness source.
pub fn commit_totals() -> (u64, u64, u64) {
    (
        TOTAL_NODES.load(Ordering::Relaxed),
        TOTAL_BYTES.load(Ordering::Relaxed),
        TOTAL_COMMITS.load(Ordering::Relaxed),
    )
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitMetrics {
    pub nodes_written: usize,
    pub bytes_flushed: usize,
    pub dirty_before: usize,
    pub dirty_after: usize,
    pub hash_time_ns: u128,
    pub commit_time_ns: u128,
}

/// Drives atomic commit cycles of tries into a reference-counted store.
///
/// A commit hashes the trie, collects every node stored by hash in commit
/// order, inserts the blobs and bumps their reference counts, all under one
/// exclusive lock. A trie committed twice without mutation writes zero nodes
/// the second time.
pub struct TrieCommitter {
    db: RefCountDB,
    commit_lock: Mutex<()>,
}

impl TrieCommitter {
    pub fn new(db: RefCountDB) -> Self {
        Self {
            db,
            commit_lock: Mutex::new(()),
        }
    }

    pub fn db(&self) -> &RefCountDB {
        &self.db
    }

    /// Runs one commit cycle over `trie`, returning the finalized root hash
    /// and the cycle's metrics.
    ///
    /// Within the cycle every node insert happens before the reference-count
    /// increment for the same node. A root whose encoding is smaller than 32
    /// bytes is stored under its forced hash so the returned root is always
    /// resolvable from the store.
    pub fn commit(&self, trie: &mut Trie) -> Result<(H256, CommitMetrics), TrieError> {
        let _guard = self.commit_lock.lock().map_err(|_| TrieError::LockError)?;

        let mut metrics = CommitMetrics {
            dirty_before: self.db.store().dirty_len()?,
            ..Default::default()
        };

        let hash_start = Instant::now();
        let root = if trie.root_ref().is_valid() {
            Some(trie.root_ref().compute_hash())
        } else {
            None
        };
        metrics.hash_time_ns = hash_start.elapsed().as_nanos();

        let commit_start = Instant::now();
        let root_hash = match root {
            None => *EMPTY_TRIE_HASH,
            Some(root) => {
                for (hash, data) in trie.commit_without_storing() {
                    let hash = hash.finalize();
                    metrics.nodes_written += 1;
                    metrics.bytes_flushed += data.len();
                    self.db.insert(hash, data)?;
                    self.db.reference(hash)?;
                }
                match root {
                    NodeHash::Hashed(hash) => hash,
                    inline @ NodeHash::Inline(_) => {
                        let hash = inline.finalize();
                        // skip on re-commit, the blob is already stored
                        if !self.db.store().contains(&NodeHash::Hashed(hash))? {
                            let data = inline.as_ref().to_vec();
                            metrics.nodes_written += 1;
                            metrics.bytes_flushed += data.len();
                            self.db.insert(hash, data)?;
                            self.db.reference(hash)?;
                        }
                        hash
                    }
                }
            }
        };
        metrics.commit_time_ns = commit_start.elapsed().as_nanos();
        metrics.dirty_after = self.db.store().dirty_len()?;

        TOTAL_NODES.fetch_add(metrics.nodes_written as u64, Ordering::Relaxed);
        TOTAL_BYTES.fetch_add(metrics.bytes_flushed as u64, Ordering::Relaxed);
        TOTAL_COMMITS.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            root = %root_hash,
            nodes_written = metrics.nodes_written,
            bytes_flushed = metrics.bytes_flushed,
            dirty_before = metrics.dirty_before,
            dirty_after = metrics.dirty_after,
            hash_time_ns = metrics.hash_time_ns,
            commit_time_ns = metrics.commit_time_ns,
            "trie commit"
        );

        Ok((root_hash, metrics))
    }

    /// Shallow dereference of a retired root: decrements the root's count
    /// and returns the hashes that reached zero. Walking the root's subtree
    /// is left to the caller's collection policy.
    pub fn dereference(&self, root: H256) -> Result<Vec<H256>, TrieError> {
        let _guard = self.commit_lock.lock().map_err(|_| TrieError::LockError)?;
        Ok(if self.db.dereference(root)? {
            vec![root]
        } else {
            Vec::new()
        })
    }

    /// Flushes the store's dirty pool through `writer`.
    /// Runs outside the commit lock; the store serialises itself.
    pub fn flush(&self, writer: &dyn NodeWriter) -> Result<usize, TrieError> {
        self.db.store().commit(writer)
    }
}

/// Dedup buffer in front of a [`NodeWriter`], bounded by a flush threshold.
pub struct BatchWriter {
    threshold: usize,
    buf: Mutex<FxHashMap<NodeHash, Vec<u8>>>,
}

impl BatchWriter {
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold,
            buf: Mutex::new(FxHashMap::default()),
        }
    }

    /// Buffers a blob; duplicate hashes collapse into one entry.
    pub fn insert(&self, hash: NodeHash, data: Vec<u8>) -> Result<(), TrieError> {
        self.buf
            .lock()
            .map_err(|_| TrieError::LockError)?
            .insert(hash, data);
        Ok(())
    }

    pub fn len(&self) -> Result<usize, TrieError> {
        Ok(self.buf.lock().map_err(|_| TrieError::LockError)?.len())
    }

    pub fn is_empty(&self) -> Result<bool, TrieError> {
        Ok(self.len()? == 0)
    }

    /// True once the buffer exceeds the configured threshold.
    pub fn need_flush(&self) -> Result<bool, TrieError> {
        Ok(self.len()? > self.threshold)
    }

    /// Writes every buffered blob to `target` and resets the buffer.
    /// Returns the number of entries written.
    pub fn flush_to(&self, target: &dyn NodeWriter) -> Result<usize, TrieError> {
        let drained: Vec<(NodeHash, Vec<u8>)> = {
            let mut buf = self.buf.lock().map_err(|_| TrieError::LockError)?;
            buf.drain().collect()
        };
        let count = drained.len();
        for (hash, data) in drained {
            target.put(hash.finalize(), &data)?;
        }
        tracing::trace!(flushed = count, "batch writer flushed");
        Ok(count)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{InMemoryTrieDB, NodeStore, Trie, db::TrieDB};

    fn committer() -> TrieCommitter {
        TrieCommitter::new(RefCountDB::new(NodeStore::new()))
    }

    fn sample_trie(db: NodeStore) -> Trie {
        let mut trie = Trie::new(Box::new(db));
        trie.insert(b"doe".to_vec(), b"reindeer".to_vec()).unwrap();
        trie.insert(b"dog".to_vec(), b"puppy".to_vec()).unwrap();
        trie.insert(b"dogglesworth".to_vec(), b"cat".to_vec())
            .unwrap();
        trie
    }

    #[test]
    fn commit_then_recommit_writes_zero_nodes() {
        let committer = committer();
        let mut trie = sample_trie(committer.db().store().clone());

        let (root, metrics) = committer.commit(&mut trie).unwrap();
        assert!(metrics.nodes_written > 0);
        assert_eq!(root, trie.hash_no_commit());

        let (root_again, metrics) = committer.commit(&mut trie).unwrap();
        assert_eq!(root, root_again);
        assert_eq!(metrics.nodes_written, 0);
        assert_eq!(metrics.bytes_flushed, 0);
    }

    #[test]
    fn committed_root_is_resolvable_from_the_store() {
        let committer = committer();
        let store = committer.db().store().clone();
        let mut trie = sample_trie(store.clone());
        let (root, _) = committer.commit(&mut trie).unwrap();

        let reopened = Trie::open(Box::new(store), root);
        assert_eq!(
            reopened.get(&b"dog".to_vec()).unwrap(),
            Some(b"puppy".to_vec())
        );
    }

    #[test]
    fn small_root_is_forced_and_stored() {
        let committer = committer();
        let store = committer.db().store().clone();
        let mut trie = Trie::new(Box::new(store.clone()));
        // a single tiny leaf encodes under 32 bytes
        trie.insert(vec![0x01], vec![0x02]).unwrap();

        let (root, metrics) = committer.commit(&mut trie).unwrap();
        assert_eq!(root.as_bytes().len(), 32);
        assert_eq!(metrics.nodes_written, 1);
        // the store holds exactly the forced root entry
        assert_eq!(store.dirty_len().unwrap() + store.clean_len().unwrap(), 1);

        let reopened = Trie::open(Box::new(store), root);
        assert_eq!(reopened.get(&vec![0x01]).unwrap(), Some(vec![0x02]));
    }

    #[test]
    fn empty_trie_commits_to_empty_root() {
        let committer = committer();
        let mut trie = Trie::new(Box::new(committer.db().store().clone()));
        let (root, metrics) = committer.commit(&mut trie).unwrap();
        assert_eq!(root, *EMPTY_TRIE_HASH);
        assert_eq!(metrics.nodes_written, 0);
    }

    #[test]
    fn dereferencing_a_committed_root_reaches_zero_once() {
        let committer = committer();
        let mut trie = sample_trie(committer.db().store().clone());
        let (root, _) = committer.commit(&mut trie).unwrap();

        assert_eq!(committer.db().ref_count(root).unwrap(), 1);
        assert_eq!(committer.dereference(root).unwrap(), vec![root]);
        assert_eq!(committer.db().ref_count(root).unwrap(), 0);
        assert!(matches!(
            committer.dereference(root),
            Err(TrieError::RefCountNegative(_))
        ));
    }

    #[test]
    fn commit_references_every_collected_node_once() {
        let committer = committer();
        let mut trie = sample_trie(committer.db().store().clone());
        committer.commit(&mut trie).unwrap();

        for hash in committer.db().unreferenced().unwrap() {
            panic!("committed node {hash:#x} was left unreferenced");
        }
    }

    #[test]
    fn flush_moves_blobs_to_the_backing_writer() {
        let committer = committer();
        let mut trie = sample_trie(committer.db().store().clone());
        let (root, metrics) = committer.commit(&mut trie).unwrap();
        assert_eq!(metrics.dirty_after, metrics.nodes_written);

        let target = InMemoryTrieDB::default();
        let flushed = committer.flush(&target).unwrap();
        assert_eq!(flushed, metrics.nodes_written);
        assert_eq!(committer.db().store().dirty_len().unwrap(), 0);
        assert!(
            TrieDB::get(&target, crate::NodeHash::Hashed(root))
                .unwrap()
                .is_some()
        );
    }

    #[test]
    fn totals_are_monotonic() {
        let committer = committer();
        let before = commit_totals();
        let mut trie = sample_trie(committer.db().store().clone());
        let (_, metrics) = committer.commit(&mut trie).unwrap();
        let after = commit_totals();
        assert!(after.0 >= before.0 + metrics.nodes_written as u64);
        assert!(after.1 >= before.1 + metrics.bytes_flushed as u64);
        assert!(after.2 >= before.2 + 1);
    }

    #[test]
    fn batch_writer_dedups_and_flushes_on_threshold() {
        let writer = BatchWriter::new(2);
        let mut blob = b"batch entry".to_vec();
        blob.resize(40, 0x11);
        let hash = crate::NodeHash::from_encoded_raw(&blob);

        writer.insert(hash, blob.clone()).unwrap();
        writer.insert(hash, blob.clone()).unwrap();
        assert_eq!(writer.len().unwrap(), 1);
        assert!(!writer.need_flush().unwrap());

        let mut other = b"another entry".to_vec();
        other.resize(40, 0x22);
        writer
            .insert(crate::NodeHash::from_encoded_raw(&other), other.clone())
            .unwrap();
        let mut third = b"third entry".to_vec();
        third.resize(40, 0x33);
        writer
            .insert(crate::NodeHash::from_encoded_raw(&third), third.clone())
            .unwrap();
        assert!(writer.need_flush().unwrap());

        let target = InMemoryTrieDB::default();
        assert_eq!(writer.flush_to(&target).unwrap(), 3);
        assert!(writer.is_empty().unwrap());
    }
}
