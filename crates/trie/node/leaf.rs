use hexary_rlp::structs::Encoder;

use crate::{ValueRLP, error::TrieError, nibbles::Nibbles, node_hash::NodeHash};

use super::{BranchNode, ExtensionNode, Node};

/// A node storing a value under the remaining key nibbles.
/// The partial path always carries the terminator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LeafNode {
    pub partial: Nibbles,
    pub value: ValueRLP,
}

impl LeafNode {
    pub const fn new(partial: Nibbles, value: ValueRLP) -> Self {
        Self { partial, value }
    }

    /// Retrieves the stored value if the path matches this leaf's partial path
    pub fn get(&self, path: Nibbles) -> Result<Option<ValueRLP>, TrieError> {
        Ok((path == self.partial).then(|| self.value.clone()))
    }

    /// Inserts a value into the subtrie originating from this node and
    /// returns the new root of the subtrie
    pub fn insert(mut self, path: Nibbles, value: ValueRLP) -> Result<Node, TrieError> {
        /* Possible flow paths:
            leaf { path => value }   -> leaf { path => new_value }
            leaf { path => value }   -> branch { leaf, leaf }
            leaf { path => value }   -> extension { branch { leaf, leaf } }
            leaf { path => value }   -> branch { leaf } with value
            leaf { path => value }   -> extension { branch { leaf } with value }
        */
        if self.partial == path {
            self.value = value;
            return Ok(self.into());
        }

        let match_index = path.count_prefix(&self.partial);
        let self_choice = self.partial.at(match_index);
        let new_choice = path.at(match_index);

        let branch = if self_choice == 16 {
            // this leaf's key ends at the branch point, its value moves to
            // the branch's value slot
            let mut choices = BranchNode::EMPTY_CHOICES;
            choices[new_choice] =
                Node::from(LeafNode::new(path.offset(match_index + 1), value)).into();
            BranchNode::new_with_value(choices, self.value)
        } else if new_choice == 16 {
            let mut choices = BranchNode::EMPTY_CHOICES;
            choices[self_choice] =
                Node::from(LeafNode::new(self.partial.offset(match_index + 1), self.value)).into();
            BranchNode::new_with_value(choices, value)
        } else {
            let mut choices = BranchNode::EMPTY_CHOICES;
            choices[self_choice] =
                Node::from(LeafNode::new(self.partial.offset(match_index + 1), self.value)).into();
            choices[new_choice] =
                Node::from(LeafNode::new(path.offset(match_index + 1), value)).into();
            BranchNode::new(choices)
        };

        if match_index == 0 {
            Ok(branch.into())
        } else {
            Ok(ExtensionNode::new(path.slice(0, match_index), Node::from(branch).into()).into())
        }
    }

    /// Removes the value if the path matches, emptying the leaf.
    /// The parent is responsible for collapsing the hole this leaves behind.
    pub fn remove(self, path: Nibbles) -> Result<(Option<Node>, Option<ValueRLP>), TrieError> {
        Ok(if self.partial == path {
            (None, Some(self.value))
        } else {
            (Some(self.into()), None)
        })
    }

    /// Records the leaf's encoding if it is stored by hash.
    pub fn get_path(&self, node_path: &mut Vec<Vec<u8>>) -> Result<(), TrieError> {
        let encoded = self.encode_raw();
        if encoded.len() >= 32 {
            node_path.push(encoded);
        }
        Ok(())
    }

    /// Encodes the node as a 2-item list: the hex-prefix compact partial
    /// path (terminator flagged) and the value string.
    pub fn encode_raw(&self) -> Vec<u8> {
        let mut buf = vec![];
        Encoder::new(&mut buf)
            .encode_bytes(&self.partial.encode_compact())
            .encode_bytes(&self.value)
            .finish();
        buf
    }

    /// Computes the node's hash
    pub fn compute_hash(&self) -> NodeHash {
        NodeHash::from_encoded_raw(&self.encode_raw())
    }
}
