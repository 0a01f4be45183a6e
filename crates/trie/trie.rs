mod committer;
pub mod db;
pub mod error;
mod nibbles;
mod node;
mod node_hash;
mod proof;
mod refcount;
mod stacktrie;
mod store;
mod trie_iter;

use ethereum_types::H256;
use hexary_rlp::constants::RLP_NULL;
use sha3::{Digest, Keccak256};

pub use self::committer::{BatchWriter, CommitMetrics, TrieCommitter, commit_totals};
pub use self::db::{InMemoryTrieDB, NodeWriter, TrieDB};
pub use self::error::TrieError;
pub use self::nibbles::Nibbles;
pub use self::node::{BranchNode, ExtensionNode, LeafNode, Node, NodeRef};
pub use self::node_hash::NodeHash;
pub use self::proof::verify_proof;
pub use self::refcount::RefCountDB;
pub use self::stacktrie::StackTrie;
pub use self::store::NodeStore;
pub use self::trie_iter::{DiffIterator, TrieContentIterator, TrieIterator};

use lazy_static::lazy_static;

lazy_static! {
    /// Hash of an empty trie: keccak of the RLP empty string.
    pub static ref EMPTY_TRIE_HASH: H256 = H256::from_slice(
        Keccak256::new()
            .chain_update([RLP_NULL])
            .finalize()
            .as_slice(),
    );
}

/// RLP-encoded trie path
pub type PathRLP = Vec<u8>;
/// RLP-encoded trie value
pub type ValueRLP = Vec<u8>;
/// RLP-encoded trie node
pub type NodeRLP = Vec<u8>;

/// An Ethereum-compatible Merkle Patricia Trie over a pluggable node store.
///
/// The in-memory node graph is a strict tree owned by this instance; sharing
/// between roots only ever happens through hashed references in the backing
/// store. One writer per trie; concurrent reads are only safe on a fully
/// hashed trie.
pub struct Trie {
    /// Reference to the current root node.
    root: NodeRef,
    /// Backing store nodes are resolved from.
    pub(crate) db: Box<dyn TrieDB>,
}

impl Trie {
    /// Creates a new Trie from a clean DB
    pub fn new(db: Box<dyn TrieDB>) -> Self {
        Self {
            root: NodeRef::default(),
            db,
        }
    }

    /// Creates a trie from an already-initialized DB, with `root` as the
    /// trie's root node.
    pub fn open(db: Box<dyn TrieDB>, root: H256) -> Self {
        let root = if root == *EMPTY_TRIE_HASH {
            NodeRef::default()
        } else {
            NodeHash::from(root).into()
        };
        Self { root, db }
    }

    /// Retrieve a value from the trie given its path.
    pub fn get(&self, path: &PathRLP) -> Result<Option<ValueRLP>, TrieError> {
        if !self.root.is_valid() {
            return Ok(None);
        }
        let root_node = self.root.resolve(self.db.as_ref())?;
        root_node.get(self.db.as_ref(), Nibbles::from_bytes(path))
    }

    /// Insert a value into the trie.
    /// Inserting an empty value is equivalent to removing the path.
    pub fn insert(&mut self, path: PathRLP, value: ValueRLP) -> Result<(), TrieError> {
        if value.is_empty() {
            self.remove(path)?;
            return Ok(());
        }
        if self.root.is_valid() {
            let root_node = self.root.resolve(self.db.as_ref())?;
            let root_node =
                root_node.insert(self.db.as_ref(), Nibbles::from_bytes(&path), value)?;
            self.root = root_node.into();
        } else {
            // If the trie is empty, just add a leaf.
            self.root = Node::from(LeafNode::new(Nibbles::from_bytes(&path), value)).into();
        }
        Ok(())
    }

    /// Remove a value from the trie given its path.
    /// Returns the value if it was succesfully removed or None if it wasn't part of the trie
    pub fn remove(&mut self, path: PathRLP) -> Result<Option<ValueRLP>, TrieError> {
        if !self.root.is_valid() {
            return Ok(None);
        }
        let root_node = self.root.resolve(self.db.as_ref())?;
        let (root_node, old_value) =
            root_node.remove(self.db.as_ref(), Nibbles::from_bytes(&path))?;
        self.root = match root_node {
            Some(root_node) => root_node.into(),
            None => NodeRef::default(),
        };
        Ok(old_value)
    }

    /// Return the hash of the trie's root node, committing dirty nodes to
    /// the DB on the way. Returns keccak(RLP_NULL) if the trie is empty.
    /// The root is always finalized to a 32-byte hash, even when its
    /// encoding is small.
    pub fn hash(&mut self) -> Result<H256, TrieError> {
        self.commit()?;
        Ok(self.hash_no_commit())
    }

    /// Return the hash of the trie's root node without committing.
    /// Returns keccak(RLP_NULL) if the trie is empty
    pub fn hash_no_commit(&self) -> H256 {
        if self.root.is_valid() {
            self.root.compute_hash().finalize()
        } else {
            *EMPTY_TRIE_HASH
        }
    }

    /// Commits every dirty node under the root to the DB.
    /// A root whose encoding is smaller than 32 bytes is stored under its
    /// forced hash so the hash returned by [`Trie::hash`] stays resolvable.
    pub fn commit(&mut self) -> Result<(), TrieError> {
        if !self.root.is_valid() {
            return Ok(());
        }
        let root_hash = self.root.compute_hash();
        let mut collected = self.commit_without_storing();
        if let NodeHash::Inline(_) = root_hash {
            collected.push((
                NodeHash::Hashed(root_hash.finalize()),
                root_hash.as_ref().to_vec(),
            ));
        }
        if !collected.is_empty() {
            self.db.put_batch(collected)?;
        }
        Ok(())
    }

    /// Collapses and hashes every dirty node under the root, returning the
    /// hash-addressed blobs in child-before-parent order without writing
    /// them anywhere. Nodes that were already clean are skipped, so calling
    /// this twice in a row yields an empty batch the second time.
    pub fn commit_without_storing(&mut self) -> Vec<(NodeHash, Vec<u8>)> {
        let mut acc = Vec::new();
        if self.root.is_valid() {
            self.root.commit(&mut acc);
        }
        acc
    }

    /// Obtain a merkle proof for the given path.
    /// The proof will contain the encoding of every hash-stored node
    /// traversed from the root to the node where the path is stored (or to
    /// the node that disproves its presence), the root's encoding always
    /// included. The proof is still constructed when the path is absent,
    /// proving the absence.
    pub fn get_proof(&self, path: &PathRLP) -> Result<Vec<NodeRLP>, TrieError> {
        let mut node_path = Vec::new();
        if !self.root.is_valid() {
            return Ok(node_path);
        }
        let root_node = self.root.resolve(self.db.as_ref())?;
        // An inline root would be skipped by the walk below, but the
        // verifier always needs the root's encoding.
        let encoded_root = root_node.encode_raw();
        if encoded_root.len() < 32 {
            node_path.push(encoded_root);
        }
        root_node.get_path(self.db.as_ref(), Nibbles::from_bytes(path), &mut node_path)?;
        Ok(node_path)
    }

    /// Current root reference; invalid when the trie is empty.
    pub(crate) fn root_ref(&self) -> &NodeRef {
        &self.root
    }

    /// Creates a new stateless trie: nothing survives hashing, so it is only
    /// useful for computing root hashes or verifying reconstructed nodes.
    pub fn stateless() -> Trie {
        // We only use the in-memory node graph so a working DB is not needed.
        struct NullTrieDB;

        impl TrieDB for NullTrieDB {
            fn get(&self, _key: NodeHash) -> Result<Option<Vec<u8>>, TrieError> {
                Ok(None)
            }

            fn put(&self, _key: NodeHash, _value: Vec<u8>) -> Result<(), TrieError> {
                Ok(())
            }

            fn put_batch(&self, _key_values: Vec<(NodeHash, Vec<u8>)>) -> Result<(), TrieError> {
                Ok(())
            }
        }

        Trie::new(Box::new(NullTrieDB))
    }

    /// Builds an in-memory trie from the given elements and returns its hash
    pub fn compute_hash_from_unsorted_iter(
        iter: impl Iterator<Item = (PathRLP, ValueRLP)>,
    ) -> Result<H256, TrieError> {
        let mut trie = Trie::stateless();
        for (path, value) in iter {
            trie.insert(path, value)?;
        }
        Ok(trie.hash_no_commit())
    }

    #[cfg(test)]
    /// Creates a new Trie based on a temporary InMemory DB
    pub(crate) fn new_temp() -> Self {
        Trie::new(Box::new(InMemoryTrieDB::default()))
    }
}

impl IntoIterator for Trie {
    type Item = Result<(Nibbles, Node), TrieError>;

    type IntoIter = TrieIterator;

    fn into_iter(self) -> Self::IntoIter {
        TrieIterator::new(self)
    }
}
