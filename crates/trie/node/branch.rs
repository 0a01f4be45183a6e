use std::mem;

use hexary_rlp::structs::Encoder;

use crate::{ValueRLP, db::TrieDB, error::TrieError, nibbles::Nibbles, node_hash::NodeHash};

use super::{ExtensionNode, LeafNode, Node, NodeRef};

/// A node with 16 child slots selected by the next nibble of the path plus a
/// value slot for the path that terminates here.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BranchNode {
    pub choices: [NodeRef; 16],
    pub value: ValueRLP,
}

impl BranchNode {
    /// An array of 16 nil children.
    pub const EMPTY_CHOICES: [NodeRef; 16] =
        [const { NodeRef::Hash(NodeHash::const_default()) }; 16];

    pub const fn new(choices: [NodeRef; 16]) -> Self {
        Self {
            choices,
            value: Vec::new(),
        }
    }

    pub const fn new_with_value(choices: [NodeRef; 16], value: ValueRLP) -> Self {
        Self { choices, value }
    }

    /// Retrieves a value from the subtrie originating from this node given its path
    pub fn get(&self, db: &dyn TrieDB, mut path: Nibbles) -> Result<Option<ValueRLP>, TrieError> {
        match path.next_choice() {
            Some(choice) if self.choices[choice].is_valid() => {
                self.choices[choice].resolve(db)?.get(db, path)
            }
            Some(_) => Ok(None),
            None => Ok((!self.value.is_empty()).then(|| self.value.clone())),
        }
    }

    /// Inserts a value into the subtrie originating from this node and
    /// returns the new root of the subtrie
    pub fn insert(
        mut self,
        db: &dyn TrieDB,
        mut path: Nibbles,
        value: ValueRLP,
    ) -> Result<Node, TrieError> {
        match path.next_choice() {
            Some(choice) => {
                if self.choices[choice].is_valid() {
                    let child = self.choices[choice].resolve(db)?;
                    self.choices[choice] = child.insert(db, path, value)?.into();
                } else {
                    self.choices[choice] = Node::from(LeafNode::new(path, value)).into();
                }
            }
            None => {
                // path terminates at this branch point
                self.value = value;
            }
        }
        Ok(self.into())
    }

    /// Removes a value from the subtrie originating from this node given its path
    /// Returns the new root of the subtrie (if any) and the removed value if
    /// it existed in the subtrie
    pub fn remove(
        mut self,
        db: &dyn TrieDB,
        mut path: Nibbles,
    ) -> Result<(Option<Node>, Option<ValueRLP>), TrieError> {
        let value = match path.next_choice() {
            Some(choice) if self.choices[choice].is_valid() => {
                let child = self.choices[choice].resolve(db)?;
                let (new_child, old_value) = child.remove(db, path)?;
                self.choices[choice] = match new_child {
                    Some(node) => node.into(),
                    None => NodeRef::default(),
                };
                old_value
            }
            Some(_) => None,
            None => (!self.value.is_empty()).then(|| mem::take(&mut self.value)),
        };

        // Restore canonical form: a branch needs at least two live slots
        // (the value slot included), otherwise it is absorbed upwards.
        let mut live = self
            .choices
            .iter()
            .enumerate()
            .filter(|(_, child)| child.is_valid())
            .map(|(choice, _)| choice);
        let first_choice = live.next();
        let second_choice = live.next();

        let new_node = match (first_choice, second_choice) {
            (None, _) if self.value.is_empty() => None,
            // only the value slot is left, demote to a leaf keyed by the
            // terminator alone
            (None, _) => Some(LeafNode::new(Nibbles::from_hex(vec![16]), self.value).into()),
            // a single child is left, collapse into `[choice] ++ child key`
            (Some(choice), None) if self.value.is_empty() => {
                let child_ref = mem::take(&mut self.choices[choice]);
                Some(match child_ref.resolve(db)? {
                    // an extension cannot point at another extension or a
                    // leaf, so absorb the child into the prefix
                    Node::Extension(mut extension) => {
                        extension.prefix.prepend(choice as u8);
                        extension.into()
                    }
                    Node::Leaf(mut leaf) => {
                        leaf.partial.prepend(choice as u8);
                        leaf.into()
                    }
                    Node::Branch(_) => {
                        ExtensionNode::new(Nibbles::from_hex(vec![choice as u8]), child_ref).into()
                    }
                })
            }
            _ => Some(self.into()),
        };

        Ok((new_node, value))
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
        if let Some(choice) = path.next_choice()
            && self.choices[choice].is_valid()
        {
            self.choices[choice].resolve(db)?.get_path(db, path, node_path)?;
        }
        Ok(())
    }

    /// Encodes the node as a 17-item list: one reference per child slot and
    /// the value string last.
    pub fn encode_raw(&self) -> Vec<u8> {
        let mut buf = vec![];
        let mut encoder = Encoder::new(&mut buf);
        for child in self.choices.iter() {
            encoder = encoder.encode_field(&child.compute_hash());
        }
        encoder.encode_bytes(&self.value).finish();
        buf
    }

    /// Computes the node's hash
    pub fn compute_hash(&self) -> NodeHash {
        NodeHash::from_encoded_raw(&self.encode_raw())
    }
}
