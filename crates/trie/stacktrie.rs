use std::{mem, sync::Mutex};

use ethereum_types::H256;

use crate::{
    EMPTY_TRIE_HASH, PathRLP, ValueRLP,
    committer::BatchWriter,
    error::TrieError,
    nibbles::Nibbles,
    node::{BranchNode, ExtensionNode, LeafNode, Node},
    node_hash::NodeHash,
    store::NodeStore,
};

/// Buffered nodes per flush when a store is attached.
const FLUSH_THRESHOLD: usize = 1024;

/// An open branch on the rightmost spine, identified by the path leading to
/// it. Children strictly left of the current insertion point are already
/// hashed into its slots.
#[derive(Debug, Default)]
struct StackElement {
    path: Nibbles,
    node: BranchNode,
}

/// The node most recently completed and not yet placed under its final
/// parent: the last inserted value, or a branch popped off the spine.
enum PendingNode {
    Leaf { path: Nibbles, value: ValueRLP },
    Branch { path: Nibbles, node: BranchNode },
}

impl PendingNode {
    fn path(&self) -> &Nibbles {
        match self {
            PendingNode::Leaf { path, .. } => path,
            PendingNode::Branch { path, .. } => path,
        }
    }
}

/// Checks if the path at `this` lies in the subtree of the stack element
fn is_child(this: &Nibbles, parent: &StackElement) -> bool {
    this.count_prefix(&parent.path) == parent.path.len()
}

struct StackTrieInner {
    /// Ancestors of `parent`, outermost first.
    stack: Vec<StackElement>,
    /// The deepest open branch on the rightmost spine.
    parent: StackElement,
    /// Last completed node, waiting for the next key to fix its position.
    pending: Option<PendingNode>,
    /// Children hanging directly off the root level, kept un-retired so the
    /// final single-child collapse can rewrite them.
    root_children: Vec<(u8, Node)>,
    last_key: Option<PathRLP>,
    root: Option<H256>,
    store: Option<(NodeStore, BatchWriter)>,
}

/// Streaming trie builder for strictly sorted input.
///
/// Holds a single path of open branches: once a key arrives, every subtree
/// strictly to its left can never change again and is encoded and hashed
/// immediately, keeping live state proportional to the trie depth. The root
/// it produces is identical to building a [`crate::Trie`] from the same
/// entries.
///
/// Internally synchronised; safe to share across threads.
pub struct StackTrie {
    inner: Mutex<StackTrieInner>,
}

impl Default for StackTrie {
    fn default() -> Self {
        Self::new()
    }
}

impl StackTrie {
    pub fn new() -> Self {
        Self::with_optional_store(None)
    }

    /// A builder that retires hashed nodes into `store` so the finished trie
    /// can be reopened from it after [`StackTrie::commit`].
    pub fn with_store(store: NodeStore) -> Self {
        Self::with_optional_store(Some(store))
    }

    fn with_optional_store(store: Option<NodeStore>) -> Self {
        Self {
            inner: Mutex::new(StackTrieInner {
                stack: Vec::with_capacity(64),
                parent: StackElement::default(),
                pending: None,
                root_children: Vec::new(),
                last_key: None,
                root: None,
                store: store.map(|store| (store, BatchWriter::new(FLUSH_THRESHOLD))),
            }),
        }
    }

    /// Feeds the next entry. Keys must arrive in strictly increasing order
    /// and values must be non-empty; once finalized the builder rejects
    /// further updates.
    pub fn update(&self, key: PathRLP, value: ValueRLP) -> Result<(), TrieError> {
        self.inner
            .lock()
            .map_err(|_| TrieError::LockError)?
            .update(key, value)
    }

    /// Finalizes the builder and returns the root hash.
    pub fn hash(&self) -> Result<H256, TrieError> {
        self.inner
            .lock()
            .map_err(|_| TrieError::LockError)?
            .finalize()
    }

    /// Finalizes the builder, flushes every retired node into the attached
    /// store and returns the root hash.
    pub fn commit(&self) -> Result<H256, TrieError> {
        let mut inner = self.inner.lock().map_err(|_| TrieError::LockError)?;
        let root = inner.finalize()?;
        if let Some((store, writer)) = &inner.store {
            writer.flush_to(store)?;
        }
        Ok(root)
    }
}

impl StackTrieInner {
    fn update(&mut self, key: PathRLP, value: ValueRLP) -> Result<(), TrieError> {
        if self.root.is_some() {
            return Err(TrieError::Finalized);
        }
        if value.is_empty() {
            // streaming construction has no delete rewrite to apply
            return Err(TrieError::InvalidInput);
        }
        if let Some(last_key) = &self.last_key
            && key <= *last_key
        {
            return Err(TrieError::OutOfOrder);
        }

        let path = Nibbles::from_bytes(&key);
        if let Some(pending) = self.pending.take() {
            self.place(pending, &path)?;
        }
        self.pending = Some(PendingNode::Leaf { path, value });
        self.last_key = Some(key);
        Ok(())
    }

    /// Sinks the pending node towards its final parent. Every branch whose
    /// subtree lies strictly left of `next_path` is finished and becomes the
    /// pending node of the level above.
    fn place(&mut self, mut pending: PendingNode, next_path: &Nibbles) -> Result<(), TrieError> {
        while !is_child(next_path, &self.parent) {
            self.attach(pending)?;
            let finished = mem::replace(
                &mut self.parent,
                self.stack.pop().ok_or(TrieError::InconsistentTree)?,
            );
            pending = PendingNode::Branch {
                path: finished.path,
                node: finished.node,
            };
        }

        let shared_with_parent = pending.path().count_prefix(&self.parent.path);
        let shared_with_next = pending.path().count_prefix(next_path);
        if shared_with_parent == shared_with_next {
            self.attach(pending)?;
        } else {
            // the pending node and the next key share a deeper prefix:
            // open a fresh branch between them and the current parent
            let fresh = StackElement {
                path: pending.path().slice(0, shared_with_next),
                node: BranchNode::default(),
            };
            let displaced = mem::replace(&mut self.parent, fresh);
            self.stack.push(displaced);
            self.attach(pending)?;
        }
        Ok(())
    }

    /// Fixes the pending node into the current parent: the slot index is the
    /// nibble after the parent's path, the remainder becomes a leaf partial
    /// or an extension prefix. A terminator index lands in the parent's
    /// value slot.
    fn attach(&mut self, pending: PendingNode) -> Result<(), TrieError> {
        match pending {
            PendingNode::Leaf { path, value } => {
                let mut remaining = path;
                if !remaining.skip_prefix(&self.parent.path) {
                    return Err(TrieError::InconsistentTree);
                }
                let index = remaining.next().ok_or(TrieError::InconsistentTree)?;
                if index == 16 {
                    self.parent.node.value = value;
                    return Ok(());
                }
                self.attach_node(index, LeafNode::new(remaining, value).into())
            }
            PendingNode::Branch { path, node } => {
                let mut remaining = path;
                if !remaining.skip_prefix(&self.parent.path) {
                    return Err(TrieError::InconsistentTree);
                }
                let index = remaining.next().ok_or(TrieError::InconsistentTree)?;
                if remaining.is_empty() {
                    self.attach_node(index, node.into())
                } else {
                    // the gap between parent and branch becomes an extension
                    let branch = Node::from(node);
                    let hash = self.retire(&branch)?;
                    self.attach_node(index, ExtensionNode::new(remaining, hash.into()).into())
                }
            }
        }
    }

    fn attach_node(&mut self, index: u8, node: Node) -> Result<(), TrieError> {
        if self.parent.path.is_empty() {
            self.root_children.push((index, node));
        } else {
            let hash = self.retire(&node)?;
            self.parent.node.choices[index as usize] = hash.into();
        }
        Ok(())
    }

    /// Hashes a finished node, buffering its blob for the attached store.
    fn retire(&mut self, node: &Node) -> Result<NodeHash, TrieError> {
        let encoded = node.encode_raw();
        let hash = NodeHash::from_encoded_raw(&encoded);
        if let Some((store, writer)) = &self.store
            && matches!(hash, NodeHash::Hashed(_))
        {
            writer.insert(hash, encoded)?;
            if writer.need_flush()? {
                writer.flush_to(store)?;
            }
        }
        Ok(hash)
    }

    fn finalize(&mut self) -> Result<H256, TrieError> {
        if let Some(root) = self.root {
            return Ok(root);
        }

        // drain the spine: everything is now left of an imaginary +inf key
        if let Some(mut pending) = self.pending.take() {
            loop {
                self.attach(pending)?;
                if self.parent.path.is_empty() {
                    break;
                }
                let finished = mem::replace(
                    &mut self.parent,
                    self.stack.pop().ok_or(TrieError::InconsistentTree)?,
                );
                pending = PendingNode::Branch {
                    path: finished.path,
                    node: finished.node,
                };
            }
        }

        let root_value = mem::take(&mut self.parent.node.value);
        let children = mem::take(&mut self.root_children);

        let root_node = match (children.len(), root_value.is_empty()) {
            (0, true) => None,
            // only the empty key was fed
            (0, false) => Some(LeafNode::new(Nibbles::from_hex(vec![16]), root_value).into()),
            // canonical form forbids a single-slot branch at the root:
            // absorb the child into `[index] ++ child_key`
            (1, true) => {
                let (index, node) = children
                    .into_iter()
                    .next()
                    .ok_or(TrieError::InconsistentTree)?;
                Some(match node {
                    Node::Leaf(mut leaf) => {
                        leaf.partial.prepend(index);
                        leaf.into()
                    }
                    Node::Extension(mut extension) => {
                        extension.prefix.prepend(index);
                        extension.into()
                    }
                    branch @ Node::Branch(_) => {
                        let hash = self.retire(&branch)?;
                        ExtensionNode::new(Nibbles::from_hex(vec![index]), hash.into()).into()
                    }
                })
            }
            _ => {
                let mut root_branch =
                    BranchNode::new_with_value(BranchNode::EMPTY_CHOICES, root_value);
                for (index, node) in children {
                    let hash = self.retire(&node)?;
                    root_branch.choices[index as usize] = hash.into();
                }
                Some(Node::from(root_branch))
            }
        };

        let root = match root_node {
            None => *EMPTY_TRIE_HASH,
            Some(node) => {
                let encoded = node.encode_raw();
                let root = NodeHash::from_encoded_raw(&encoded).finalize();
                // the root blob is always stored, small roots included, so
                // the returned hash resolves from the store
                if let Some((_, writer)) = &self.store {
                    writer.insert(NodeHash::Hashed(root), encoded)?;
                }
                root
            }
        };

        tracing::trace!(root = %root, "stack trie finalized");
        self.root = Some(root);
        Ok(root)
    }
}
