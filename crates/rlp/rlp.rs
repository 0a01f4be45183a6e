//! # hexary-rlp
//!
//! Recursive Length Prefix (RLP) encoding and decoding for the hexary trie
//! engine. RLP is the serialization format trie nodes are stored and hashed
//! in, so this crate implements exactly the subset the engine needs: byte
//! strings, unsigned integers, hashes and lists thereof.
//!
//! ## Core Traits
//!
//! - [`encode::RLPEncode`]: types that can be RLP-encoded
//! - [`decode::RLPDecode`]: types that can be RLP-decoded
//!
//! For structured types, the [`structs::Encoder`] / [`structs::Decoder`]
//! builder pair encodes and decodes field by field:
//!
//! ```rust
//! use hexary_rlp::{
//!     encode::RLPEncode,
//!     decode::RLPDecode,
//!     structs::{Encoder, Decoder},
//!     error::RLPDecodeError,
//! };
//! use bytes::BufMut;
//!
//! struct Pair {
//!     key: Vec<u8>,
//!     value: Vec<u8>,
//! }
//!
//! impl RLPEncode for Pair {
//!     fn encode(&self, buf: &mut dyn BufMut) {
//!         Encoder::new(buf)
//!             .encode_field(&self.key)
//!             .encode_field(&self.value)
//!             .finish();
//!     }
//! }
//!
//! impl RLPDecode for Pair {
//!     fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
//!         let decoder = Decoder::new(rlp)?;
//!         let (key, decoder) = decoder.decode_field("key")?;
//!         let (value, decoder) = decoder.decode_field("value")?;
//!         let remaining = decoder.finish()?;
//!         Ok((Self { key, value }, remaining))
//!     }
//! }
//! ```
//!
//! Decoding is strict: truncated input, non-minimal prefixes and trailing
//! bytes are rejected with [`error::RLPDecodeError`].

pub mod constants;
pub mod decode;
pub mod encode;
pub mod error;
pub mod structs;
