use ethereum_types::H256;
use rustc_hash::FxHashMap;
use sha3::{Digest, Keccak256};

use crate::{
    EMPTY_TRIE_HASH, NodeRLP, ValueRLP,
    error::TrieError,
    nibbles::Nibbles,
    node::Node,
    node_hash::NodeHash,
};

/// Keccak-keyed view over the blobs of a proof.
/// Hashed references are looked up by hash; inline references decode
/// straight out of the parent's encoding.
struct ProofStore<'a> {
    nodes: FxHashMap<H256, &'a [u8]>,
}

impl<'a> ProofStore<'a> {
    fn new(proof: &'a [NodeRLP]) -> Self {
        let nodes = proof
            .iter()
            .map(|blob| {
                let hash = H256::from_slice(Keccak256::digest(blob).as_slice());
                (hash, blob.as_slice())
            })
            .collect();
        ProofStore { nodes }
    }

    fn get_node(&self, hash: &NodeHash) -> Result<Option<Node>, TrieError> {
        let encoded = match hash {
            NodeHash::Hashed(hash) => self.nodes.get(hash).copied(),
            NodeHash::Inline(_) => Some(hash.as_ref()),
        };
        encoded
            .map(|rlp| Node::decode_raw(rlp).map_err(|_| TrieError::InvalidProof))
            .transpose()
    }
}

/// Verifies an inclusion or absence proof for `key` against `root`.
///
/// Walks the proof from the root hash down: every hashed step must supply a
/// blob whose keccak equals the expected reference, and the key's nibbles
/// are advanced through each decoded node. Returns the proven value, or
/// `None` when the proof shows the key is absent (empty branch slot or
/// diverging prefix). A missing or corrupted blob anywhere on the path
/// fails with [`TrieError::InvalidProof`].
///
/// An empty proof is only valid for the empty trie root.
pub fn verify_proof(
    root: H256,
    key: &[u8],
    proof: &[NodeRLP],
) -> Result<Option<ValueRLP>, TrieError> {
    if proof.is_empty() {
        return if root == *EMPTY_TRIE_HASH {
            Ok(None)
        } else {
            Err(TrieError::InvalidProof)
        };
    }

    let store = ProofStore::new(proof);
    let mut expected = NodeHash::from(root);
    let mut path = Nibbles::from_bytes(key);

    loop {
        let Some(node) = store.get_node(&expected)? else {
            return Err(TrieError::InvalidProof);
        };
        match node {
            Node::Branch(branch) => match path.next_choice() {
                Some(choice) => {
                    if !branch.choices[choice].is_valid() {
                        return Ok(None);
                    }
                    expected = branch.choices[choice].compute_hash();
                }
                None => {
                    return Ok((!branch.value.is_empty()).then_some(branch.value));
                }
            },
            Node::Extension(extension) => {
                if !path.skip_prefix(&extension.prefix) {
                    return Ok(None);
                }
                expected = extension.child.compute_hash();
            }
            Node::Leaf(leaf) => {
                return Ok((path == leaf.partial).then_some(leaf.value));
            }
        }
    }
}
