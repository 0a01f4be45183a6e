mod branch;
mod extension;
mod leaf;

use std::sync::{Arc, OnceLock};

pub use branch::BranchNode;
pub use extension::ExtensionNode;
pub use leaf::LeafNode;

use hexary_rlp::{decode::decode_bytes, error::RLPDecodeError, structs::Decoder};

use crate::{
    ValueRLP, db::TrieDB, error::TrieError, nibbles::Nibbles, node_hash::NodeHash,
};

/// A reference to a node, the parent-side half of the cache flag.
///
/// An embedded node with an unset hash cell is dirty: its encoding has not
/// been hashed since it was built. Once committed the reference is demoted
/// to its hash and the node is clean. Structural mutation always produces a
/// fresh embedded reference with an empty cell.
#[derive(Clone, Debug)]
pub enum NodeRef {
    /// The node is embedded within the reference.
    Node(Arc<Node>, OnceLock<NodeHash>),
    /// The node lives in the database, referenced by its hash.
    Hash(NodeHash),
}

impl NodeRef {
    pub fn get_node(&self, db: &dyn TrieDB) -> Result<Option<Node>, TrieError> {
        match *self {
            NodeRef::Node(ref node, _) => Ok(Some(node.as_ref().clone())),
            NodeRef::Hash(NodeHash::Inline((_, 0))) => Ok(None),
            NodeRef::Hash(NodeHash::Inline((data, len))) => {
                Ok(Some(Node::decode_raw(&data[..len as usize])?))
            }
            NodeRef::Hash(hash @ NodeHash::Hashed(_)) => db
                .get(hash)?
                .map(|rlp| Node::decode_raw(&rlp).map_err(TrieError::RLPDecode))
                .transpose(),
        }
    }

    /// Materializes the referenced node, failing when the store cannot
    /// produce the blob for a hashed reference.
    pub fn resolve(&self, db: &dyn TrieDB) -> Result<Node, TrieError> {
        self.get_node(db)?.ok_or_else(|| match self {
            NodeRef::Hash(hash @ NodeHash::Hashed(_)) => TrieError::NotFound(hash.finalize()),
            _ => TrieError::InconsistentTree,
        })
    }

    pub fn is_valid(&self) -> bool {
        match self {
            NodeRef::Node(_, _) => true,
            NodeRef::Hash(hash) => hash.is_valid(),
        }
    }

    /// Collapses the subtree under this reference: children first, then the
    /// node itself. Every node whose encoding crossed the 32-byte boundary
    /// is pushed into `acc` together with its hash, and the reference is
    /// demoted to `NodeRef::Hash` (clean). Already-clean subtrees are
    /// skipped, which is what makes re-committing an unchanged trie a no-op.
    pub fn commit(&mut self, acc: &mut Vec<(NodeHash, Vec<u8>)>) -> NodeHash {
        match *self {
            NodeRef::Node(ref mut node, ref mut hash) => {
                match Arc::make_mut(node) {
                    Node::Branch(node) => {
                        for child in node.choices.iter_mut() {
                            child.commit(acc);
                        }
                    }
                    Node::Extension(node) => {
                        node.child.commit(acc);
                    }
                    Node::Leaf(_) => {}
                }

                let encoded = node.encode_raw();
                let hash = *hash.get_or_init(|| NodeHash::from_encoded_raw(&encoded));
                if matches!(hash, NodeHash::Hashed(_)) {
                    acc.push((hash, encoded));
                }

                *self = hash.into();
                hash
            }
            NodeRef::Hash(hash) => hash,
        }
    }

    /// Returns the hash of the node, computing and caching it if necessary.
    pub fn compute_hash(&self) -> NodeHash {
        match self {
            NodeRef::Node(node, hash) => *hash.get_or_init(|| node.compute_hash()),
            NodeRef::Hash(hash) => *hash,
        }
    }
}

impl Default for NodeRef {
    fn default() -> Self {
        Self::Hash(NodeHash::default())
    }
}

impl From<Node> for NodeRef {
    fn from(value: Node) -> Self {
        Self::Node(Arc::new(value), OnceLock::new())
    }
}

impl From<NodeHash> for NodeRef {
    fn from(value: NodeHash) -> Self {
        Self::Hash(value)
    }
}

impl PartialEq for NodeRef {
    fn eq(&self, other: &Self) -> bool {
        self.compute_hash() == other.compute_hash()
    }
}

/// A node in an Ethereum-compatible Merkle Patricia Trie.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Branch(Box<BranchNode>),
    Extension(ExtensionNode),
    Leaf(LeafNode),
}

impl From<Box<BranchNode>> for Node {
    fn from(val: Box<BranchNode>) -> Self {
        Node::Branch(val)
    }
}

impl From<BranchNode> for Node {
    fn from(val: BranchNode) -> Self {
        Node::Branch(Box::new(val))
    }
}

impl From<ExtensionNode> for Node {
    fn from(val: ExtensionNode) -> Self {
        Node::Extension(val)
    }
}

impl From<LeafNode> for Node {
    fn from(val: LeafNode) -> Self {
        Node::Leaf(val)
    }
}

impl Node {
    /// Retrieves a value from the subtrie originating from this node given its path
    pub fn get(&self, db: &dyn TrieDB, path: Nibbles) -> Result<Option<ValueRLP>, TrieError> {
        match self {
            Node::Branch(n) => n.get(db, path),
            Node::Extension(n) => n.get(db, path),
            Node::Leaf(n) => n.get(path),
        }
    }

    /// Inserts a value into the subtrie originating from this node and
    /// returns the new root of the subtrie
    pub fn insert(
        self,
        db: &dyn TrieDB,
        path: Nibbles,
        value: ValueRLP,
    ) -> Result<Node, TrieError> {
        match self {
            Node::Branch(n) => n.insert(db, path, value),
            Node::Extension(n) => n.insert(db, path, value),
            Node::Leaf(n) => n.insert(path, value),
        }
    }

    /// Removes a value from the subtrie originating from this node given its path
    /// Returns the new root of the subtrie (if any) and the removed value if
    /// it existed in the subtrie
    pub fn remove(
        self,
        db: &dyn TrieDB,
        path: Nibbles,
    ) -> Result<(Option<Node>, Option<ValueRLP>), TrieError> {
        match self {
            Node::Branch(n) => n.remove(db, path),
            Node::Extension(n) => n.remove(db, path),
            Node::Leaf(n) => n.remove(path),
        }
    }

    /// Traverses own subtrie until reaching the node containing `path`,
    /// appending the encoding of every node whose encoded length is at least
    /// 32 bytes to `node_path` (including self).
    pub fn get_path(
        &self,
        db: &dyn TrieDB,
        path: Nibbles,
        node_path: &mut Vec<Vec<u8>>,
    ) -> Result<(), TrieError> {
        match self {
            Node::Branch(n) => n.get_path(db, path, node_path),
            Node::Extension(n) => n.get_path(db, path, node_path),
            Node::Leaf(n) => n.get_path(node_path),
        }
    }

    /// Encodes the node
    pub fn encode_raw(&self) -> Vec<u8> {
        match self {
            Node::Branch(n) => n.encode_raw(),
            Node::Extension(n) => n.encode_raw(),
            Node::Leaf(n) => n.encode_raw(),
        }
    }

    /// Decodes a node from its canonical RLP encoding: a 2-item list is a
    /// leaf or extension depending on the hex-prefix flags, a 17-item list
    /// is a branch.
    pub fn decode_raw(rlp: &[u8]) -> Result<Self, RLPDecodeError> {
        let mut rlp_items = vec![];
        let mut decoder = Decoder::new(rlp)?;
        let mut item;
        loop {
            (item, decoder) = decoder.get_encoded_item()?;
            rlp_items.push(item);
            // Check if we reached the end or decoded more items than a
            // branch could hold
            if decoder.is_done() || rlp_items.len() > 17 {
                break;
            }
        }
        Ok(match rlp_items.len() {
            2 => {
                let (path, _) = decode_bytes(&rlp_items[0])?;
                let path = Nibbles::decode_compact(path);
                if path.is_leaf() {
                    let (value, _) = decode_bytes(&rlp_items[1])?;
                    LeafNode {
                        partial: path,
                        value: value.to_vec(),
                    }
                    .into()
                } else {
                    ExtensionNode {
                        prefix: path,
                        child: decode_child(&rlp_items[1])?.into(),
                    }
                    .into()
                }
            }
            17 => {
                let mut choices = BranchNode::EMPTY_CHOICES;
                for (choice, item) in choices.iter_mut().zip(rlp_items.iter()) {
                    *choice = decode_child(item)?.into();
                }
                let (value, _) = decode_bytes(&rlp_items[16])?;
                BranchNode {
                    choices,
                    value: value.to_vec(),
                }
                .into()
            }
            n => {
                return Err(RLPDecodeError::Custom(format!(
                    "Invalid arg count for Node, expected 2 or 17, got {n}"
                )));
            }
        })
    }

    /// Computes the node's hash
    pub fn compute_hash(&self) -> NodeHash {
        match self {
            Node::Branch(n) => n.compute_hash(),
            Node::Extension(n) => n.compute_hash(),
            Node::Leaf(n) => n.compute_hash(),
        }
    }
}

/// Decodes a child reference: a 32-byte string is a hashed child, the empty
/// string is a nil child, a nested list shorter than 32 bytes is an inline
/// child. Any other shape is malformed.
fn decode_child(rlp: &[u8]) -> Result<NodeHash, RLPDecodeError> {
    match decode_bytes(rlp) {
        Ok((hash, &[])) if hash.len() == 32 => Ok(NodeHash::from_slice(hash)),
        Ok((&[], &[])) => Ok(NodeHash::default()),
        _ if rlp.len() < 32 => Ok(NodeHash::from_slice(rlp)),
        _ => Err(RLPDecodeError::Custom(format!(
            "Invalid child reference of length {}",
            rlp.len()
        ))),
    }
}
