use ethereum_types::H256;
use hexary_rlp::{constants::RLP_NULL, encode::RLPEncode};
use sha3::{Digest, Keccak256};

/// A reference to a node as embedded in its parent: either the Keccak-256
/// hash of the node's RLP encoding, or the encoding itself when it is
/// shorter than 32 bytes (an inline node).
///
/// `Inline(([0; 31], 0))` doubles as the nil child.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NodeHash {
    Hashed(H256),
    Inline(([u8; 31], u8)),
}

impl NodeHash {
    /// Returns the reference for a node given its RLP encoding: the raw
    /// encoding when it fits under the 32-byte boundary, its keccak
    /// otherwise.
    pub fn from_encoded_raw(encoded: &[u8]) -> NodeHash {
        if encoded.len() >= 32 {
            NodeHash::Hashed(H256::from_slice(Keccak256::digest(encoded).as_slice()))
        } else {
            let mut data = [0u8; 31];
            data[..encoded.len()].copy_from_slice(encoded);
            NodeHash::Inline((data, encoded.len() as u8))
        }
    }

    /// Builds a reference from raw bytes: 32 bytes are taken as a hash,
    /// anything shorter as an inline encoding.
    pub fn from_slice(data: &[u8]) -> NodeHash {
        match data.len() {
            32 => NodeHash::Hashed(H256::from_slice(data)),
            len => {
                debug_assert!(len < 32);
                let mut inline = [0u8; 31];
                inline[..len].copy_from_slice(data);
                NodeHash::Inline((inline, len as u8))
            }
        }
    }

    /// Forces a 32-byte hash: inline references are hashed on the spot.
    /// The root of a trie is always finalized so its identity is a `H256`
    /// even when its encoding is small.
    pub fn finalize(&self) -> H256 {
        match self {
            NodeHash::Hashed(hash) => *hash,
            NodeHash::Inline(_) => {
                H256::from_slice(Keccak256::digest(self.as_ref()).as_slice())
            }
        }
    }

    /// A nil reference (empty branch slot) is not valid.
    pub const fn is_valid(&self) -> bool {
        !matches!(self, NodeHash::Inline((_, 0)))
    }

    pub const fn const_default() -> NodeHash {
        NodeHash::Inline(([0; 31], 0))
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.as_ref().to_vec()
    }
}

impl AsRef<[u8]> for NodeHash {
    fn as_ref(&self) -> &[u8] {
        match self {
            NodeHash::Hashed(hash) => hash.as_bytes(),
            NodeHash::Inline((data, len)) => &data[..*len as usize],
        }
    }
}

impl Default for NodeHash {
    fn default() -> Self {
        Self::const_default()
    }
}

impl From<H256> for NodeHash {
    fn from(value: H256) -> Self {
        NodeHash::Hashed(value)
    }
}

impl RLPEncode for NodeHash {
    /// Child-reference encoding: a hashed child is an RLP string holding the
    /// 32-byte hash, an inline child is its raw encoding spliced in without
    /// extra wrapping, and a nil child is the empty string.
    fn encode(&self, buf: &mut dyn bytes::BufMut) {
        match self {
            NodeHash::Hashed(hash) => hash.as_bytes().encode(buf),
            NodeHash::Inline((_, 0)) => buf.put_u8(RLP_NULL),
            NodeHash::Inline(_) => buf.put_slice(self.as_ref()),
        }
    }
}

impl std::fmt::Debug for NodeHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeHash::Hashed(hash) => write!(f, "Hashed({hash:#x})"),
            NodeHash::Inline(_) => {
                write!(f, "Inline(0x")?;
                for byte in self.as_ref() {
                    write!(f, "{byte:02x}")?;
                }
                write!(f, ")")
            }
        }
    }
}
