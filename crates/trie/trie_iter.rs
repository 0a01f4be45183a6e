use std::{cmp::Ordering, iter::Peekable};

use crate::{
    PathRLP, Trie, TrieDB, TrieError, ValueRLP,
    nibbles::Nibbles,
    node::{Node, NodeRef},
};

/// Depth-first preorder walk over a trie's nodes.
///
/// Consumes the trie, so the node graph cannot be mutated while the walk is
/// live. Nodes are yielded parents-first; branch children are stacked in
/// reverse slot order so leaves come out in lexicographic key order.
/// An unresolvable reference ends the walk with an error item.
pub struct TrieIterator {
    db: Box<dyn TrieDB>,
    // The stack contains the traversed path and the next node to be visited.
    // Elements are pushed in the reverse order they will be popped.
    stack: Vec<(Nibbles, NodeRef)>,
}

impl TrieIterator {
    pub(crate) fn new(trie: Trie) -> Self {
        let mut stack = Vec::new();
        if trie.root.is_valid() {
            stack.push((Nibbles::default(), trie.root));
        }
        Self { db: trie.db, stack }
    }

    /// Restricts the walk to the leaf entries, in key order.
    pub fn content(self) -> TrieContentIterator {
        TrieContentIterator { inner: self }
    }
}

impl Iterator for TrieIterator {
    type Item = Result<(Nibbles, Node), TrieError>;

    fn next(&mut self) -> Option<Self::Item> {
        let (mut path, next_node_ref) = self.stack.pop()?;
        let next_node = match next_node_ref.resolve(self.db.as_ref()) {
            Ok(node) => node,
            Err(err) => {
                self.stack.clear();
                return Some(Err(err));
            }
        };
        match &next_node {
            Node::Branch(branch_node) => {
                // Add all children to the stack (in reverse order so we
                // process the first child first)
                for (choice, child) in branch_node.choices.iter().enumerate().rev() {
                    if child.is_valid() {
                        let mut child_path = path.clone();
                        child_path.append(choice as u8);
                        self.stack.push((child_path, child.clone()))
                    }
                }
            }
            Node::Extension(extension_node) => {
                // Update path
                path.extend(&extension_node.prefix);
                // Add child to the stack
                self.stack
                    .push((path.clone(), extension_node.child.clone()));
            }
            Node::Leaf(leaf) => {
                path.extend(&leaf.partial);
            }
        }
        Some(Ok((path, next_node)))
    }
}

/// The leaf entries of a trie in strictly increasing key order.
/// Values stored at a branch point (shorter keys) come out before the keys
/// that extend them.
pub struct TrieContentIterator {
    inner: TrieIterator,
}

impl Iterator for TrieContentIterator {
    type Item = Result<(PathRLP, ValueRLP), TrieError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.inner.next()? {
                Ok((path, node)) => match node {
                    Node::Branch(branch_node) => {
                        if !branch_node.value.is_empty() {
                            return Some(entry(path, branch_node.value));
                        }
                    }
                    Node::Extension(_) => {}
                    Node::Leaf(leaf_node) => {
                        return Some(entry(path, leaf_node.value));
                    }
                },
                Err(err) => return Some(Err(err)),
            }
        }
    }
}

fn entry(path: Nibbles, value: ValueRLP) -> Result<(PathRLP, ValueRLP), TrieError> {
    match path.to_bytes() {
        Some(key) => Ok((key, value)),
        None => Err(TrieError::InvalidInput),
    }
}

/// Lockstep merge of two tries' content streams, yielding exactly the
/// entries of `b` that are missing from `a` or differ in value.
/// The caller advances past the current difference with [`Iterator::next`].
pub struct DiffIterator {
    a: Peekable<TrieContentIterator>,
    b: Peekable<TrieContentIterator>,
}

impl DiffIterator {
    pub fn new(a: Trie, b: Trie) -> Self {
        Self {
            a: a.into_iter().content().peekable(),
            b: b.into_iter().content().peekable(),
        }
    }
}

impl Iterator for DiffIterator {
    type Item = Result<(PathRLP, ValueRLP), TrieError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            // surface stream errors before comparing keys
            if matches!(self.a.peek(), Some(Err(_))) {
                return self.a.next();
            }
            if matches!(self.b.peek(), Some(Err(_))) {
                return self.b.next();
            }

            let ord = match (self.a.peek(), self.b.peek()) {
                (_, None) => return None,
                (None, Some(_)) => Ordering::Greater,
                (Some(Ok((key_a, _))), Some(Ok((key_b, _)))) => key_a.cmp(key_b),
                // errors were drained above
                (Some(Err(_)), _) | (_, Some(Err(_))) => return None,
            };

            match ord {
                // `a`-only entry (deleted in `b`), skip it
                Ordering::Less => {
                    self.a.next();
                }
                // `b`-only entry, always a difference
                Ordering::Greater => return self.b.next(),
                Ordering::Equal => {
                    let entry_a = self.a.next();
                    let entry_b = self.b.next();
                    if let (Some(Ok((_, value_a))), Some(Ok(entry_b))) = (entry_a, entry_b)
                        && value_a != entry_b.1
                    {
                        return Some(Ok(entry_b));
                    }
                }
            }
        }
    }
}
