use ethereum_types::H256;
use hexary_rlp::error::RLPDecodeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrieError {
    #[error(transparent)]
    RLPDecode(#[from] RLPDecodeError),
    #[error("Node with hash {0:#x} not found in the store")]
    NotFound(H256),
    #[error("Inconsistent internal tree structure")]
    InconsistentTree,
    #[error("Invalid node: {0}")]
    InvalidNode(String),
    #[error("Proof does not match the given root")]
    InvalidProof,
    #[error("Keys must be fed in strictly increasing order")]
    OutOfOrder,
    #[error("Builder was already finalized")]
    Finalized,
    #[error("Reference count for {0:#x} would drop below zero")]
    RefCountNegative(H256),
    #[error("Database is closed")]
    DatabaseClosed,
    #[error("Lock Error: Panicked when trying to acquire a lock")]
    LockError,
    #[error("Database error: {0}")]
    DbError(anyhow::Error),
    #[error("Invalid trie input")]
    InvalidInput,
}
