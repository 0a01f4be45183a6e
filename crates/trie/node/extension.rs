use hexary_rlp::structs::Encoder;

use crate::{ValueRLP, db::TrieDB, error::TrieError, nibbles::Nibbles, node_hash::NodeHash};

use super::{BranchNode, Node, NodeRef};

/// A node sharing a run of nibbles between all keys below it.
/// The prefix never carries the terminator and, in canonical form, the child
/// is always a branch (adjacent extensions and extension-over-leaf chains
/// are merged on every mutation).
#[derive(Debug, Clone, PartialEq)]
pub struct ExtensionNode {
    pub prefix: Nibbles,
    pub child: NodeRef,
}

impl ExtensionNode {
    pub fn new(prefix: Nibbles, child: NodeRef) -> Self {
        debug_assert!(!prefix.is_leaf(), "extension prefix must not terminate");
        Self { prefix, child }
    }

    /// Retrieves a value from the subtrie originating from this node given its path
    pub fn get(&self, db: &dyn TrieDB, mut path: Nibbles) -> Result<Option<ValueRLP>, TrieError> {
        if path.skip_prefix(&self.prefix) {
            self.child.resolve(db)?.get(db, path)
        } else {
            Ok(None)
        }
    }

    /// Inserts a value into the subtrie originating from this node and
    /// returns the new root of the subtrie
    pub fn insert(
        mut self,
        db: &dyn TrieDB,
        path: Nibbles,
        value: ValueRLP,
    ) -> Result<Node, TrieError> {
        let match_index = path.count_prefix(&self.prefix);
        if match_index == self.prefix.len() {
            // the path continues below this extension
            let child = self.child.resolve(db)?;
            let new_child = child.insert(db, path.offset(match_index), value)?;
            self.child = new_child.into();
            Ok(self.into())
        } else if match_index == 0 {
            // no overlap, this level becomes a branch; the old subtree hangs
            // off the slot selected by the first prefix nibble
            let displaced: NodeRef = if self.prefix.len() == 1 {
                self.child
            } else {
                Node::from(ExtensionNode::new(self.prefix.offset(1), self.child)).into()
            };
            let mut choices = BranchNode::EMPTY_CHOICES;
            choices[self.prefix.at(0)] = displaced;
            BranchNode::new(choices).insert(db, path, value)
        } else {
            // partial overlap, split the prefix at the divergence point
            let inner = Node::from(ExtensionNode::new(
                self.prefix.offset(match_index),
                self.child,
            ));
            let new_child = inner.insert(db, path.offset(match_index), value)?;
            Ok(ExtensionNode::new(path.slice(0, match_index), new_child.into()).into())
        }
    }

    /// Removes a value from the subtrie originating from this node given its path
    /// Returns the new root of the subtrie (if any) and the removed value if
    /// it existed in the subtrie
    pub fn remove(
        mut self,
        db: &dyn TrieDB,
        mut path: Nibbles,
    ) -> Result<(Option<Node>, Option<ValueRLP>), TrieError> {
        if !path.skip_prefix(&self.prefix) {
            return Ok((Some(self.into()), None));
        }
        let child = self.child.resolve(db)?;
        let (new_child, old_value) = child.remove(db, path)?;
        let node = match new_child {
            // absorb collapsed children so no two short nodes stay adjacent
            Some(Node::Extension(extension)) => {
                self.prefix.extend(&extension.prefix);
                Some(ExtensionNode::new(self.prefix, extension.child).into())
            }
            Some(Node::Leaf(mut leaf)) => {
                leaf.partial = self.prefix.concat(&leaf.partial);
                Some(leaf.into())
            }
            Some(branch @ Node::Branch(_)) => {
                self.child = branch.into();
                Some(self.into())
            }
            None => None,
        };
        Ok((node, old_value))
    }

    /// Traverses own subtrie until reaching the node containing `path`,
    /// recording the encoding of every node that is stored by hash.
    pub fn get_path(
        &self,
        db: &dyn TrieDB,
        mut path: Nibbles,
        node_path: &mut Vec<Vec<u8>>,
    ) -> Result<(), TrieError> {
        let encoded = self.encode_raw();
        if encoded.len() >= 32 {
            node_path.push(encoded);
        }
        if path.skip_prefix(&self.prefix) {
            self.child.resolve(db)?.get_path(db, path, node_path)?;
        }
        Ok(())
    }

    /// Encodes the node as a 2-item list: the hex-prefix compact prefix and
    /// the child reference.
    pub fn encode_raw(&self) -> Vec<u8> {
        let mut buf = vec![];
        Encoder::new(&mut buf)
            .encode_bytes(&self.prefix.encode_compact())
            .encode_field(&self.child.compute_hash())
            .finish();
        buf
    }

    /// Computes the node's hash
    pub fn compute_hash(&self) -> NodeHash {
        NodeHash::from_encoded_raw(&self.encode_raw())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::node::LeafNode;

    fn null_db() -> impl TrieDB {
        crate::db::InMemoryTrieDB::default()
    }

    fn two_leaf_branch() -> NodeRef {
        let mut choices = BranchNode::EMPTY_CHOICES;
        choices[0] = Node::from(LeafNode::new(Nibbles::from_hex(vec![16]), b"zero".to_vec())).into();
        choices[1] = Node::from(LeafNode::new(Nibbles::from_hex(vec![16]), b"one".to_vec())).into();
        Node::from(BranchNode::new(choices)).into()
    }

    #[test]
    fn get_follows_prefix() {
        let ext = ExtensionNode::new(Nibbles::from_hex(vec![0xA, 0xB]), two_leaf_branch());
        let db = null_db();
        assert_eq!(
            ext.get(&db, Nibbles::from_hex(vec![0xA, 0xB, 0, 16])).unwrap(),
            Some(b"zero".to_vec())
        );
        assert_eq!(
            ext.get(&db, Nibbles::from_hex(vec![0xA, 0xC, 0, 16])).unwrap(),
            None
        );
    }

    #[test]
    fn insert_splits_prefix_on_divergence() {
        let ext = ExtensionNode::new(Nibbles::from_hex(vec![0xA, 0xB]), two_leaf_branch());
        let db = null_db();
        let node = ext
            .insert(&db, Nibbles::from_hex(vec![0xA, 0xC, 16]), b"new".to_vec())
            .unwrap();
        // the shared nibble survives as the outer extension
        match node {
            Node::Extension(outer) => assert_eq!(outer.prefix.as_ref(), &[0xA]),
            other => panic!("expected extension, got {other:?}"),
        }
    }

    #[test]
    fn insert_with_no_overlap_opens_branch() {
        let ext = ExtensionNode::new(Nibbles::from_hex(vec![0xA]), two_leaf_branch());
        let db = null_db();
        let node = ext
            .insert(&db, Nibbles::from_hex(vec![0x3, 16]), b"new".to_vec())
            .unwrap();
        match node {
            Node::Branch(branch) => {
                assert!(branch.choices[0xA].is_valid());
                assert!(branch.choices[0x3].is_valid());
            }
            other => panic!("expected branch, got {other:?}"),
        }
    }

    #[test]
    fn remove_merges_adjacent_extensions() {
        // removing "one" collapses the inner branch into an extension-free
        // leaf, which the outer extension absorbs
        let ext = ExtensionNode::new(Nibbles::from_hex(vec![0xA]), two_leaf_branch());
        let db = null_db();
        let (node, removed) = ext
            .remove(&db, Nibbles::from_hex(vec![0xA, 1, 16]))
            .unwrap();
        assert_eq!(removed, Some(b"one".to_vec()));
        match node {
            Some(Node::Leaf(leaf)) => {
                assert_eq!(leaf.partial.as_ref(), &[0xA, 0, 16]);
                assert_eq!(leaf.value, b"zero".to_vec());
            }
            other => panic!("expected merged leaf, got {other:?}"),
        }
    }
}
