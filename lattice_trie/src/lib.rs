//! Content-addressed Merkle primitives for partially revealed state.
//!
//! Every value handled by this library is referenced by a [`Digest`]. An
//! [`Address`][address::Address] pairs that digest with an optional
//! materialized artifact, so a verifier can hold a structure where only the
//! portion it cares about is present and everything else is replaced by a
//! stub carrying the hash of what it replaces.
//!
//! The core of this library is the
//! [`Dictionary256`][dictionary::Dictionary256], a sharded binary Merkle trie
//! whose shape is a pure function of its contents. From a full dictionary you
//! can produce [`TransitionProof`][transition_proof::TransitionProof]s that
//! cover a single key, merge them, flatten them into raw witness chunks, and
//! later [`capture`][capture::capture] a partial dictionary back out of those
//! chunks against a trusted root digest.

#![deny(rustdoc::broken_intra_doc_links)]
#![deny(missing_debug_implementations)]
#![deny(missing_docs)]

pub mod address;
pub mod array;
pub mod cache;
pub mod capture;
pub mod dictionary;
pub mod digest;
pub mod error;
pub mod hashing;
mod node_encoding;
pub mod scalar;
pub mod transition_proof;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing_utils;

pub use digest::{Digest, DigestExt};
pub use error::{MerkleError, MerkleResult};
pub use hashing::{Hasher, Keccak};
pub use node_encoding::{append_optional_digest, exact_rlp};
