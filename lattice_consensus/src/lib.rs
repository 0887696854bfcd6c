//! Consensus rules for a lattice of content-addressed chains.
//!
//! Artifacts are produced top-down: signing a transaction yields a
//! [`TransactionArtifact`][transaction_artifact::TransactionArtifact], which a
//! [`BlockArtifact`][block_artifact::BlockArtifact] references by digest.
//! Verification runs bottom-up: artifacts are resolved into
//! [`Transaction`][transaction::Transaction]s and [`Block`][block::Block]s
//! whose predicates check signatures, conservation of balances, cross-chain
//! settlement, monetary issuance and difficulty.
//!
//! All state is held in [`lattice_trie`] structures, so a verifier only ever
//! needs the witness for the keys a transaction touches.

#![deny(rustdoc::broken_intra_doc_links)]
#![deny(missing_debug_implementations)]
#![deny(missing_docs)]

pub mod action;
pub mod block;
pub mod block_artifact;
pub mod config;
pub mod crypto;
pub mod definition;
pub mod error;
pub mod filter;
pub mod transaction;
pub mod transaction_artifact;
pub mod transport;
pub mod typed_actions;

#[cfg(test)]
pub(crate) mod testing_utils;

use lattice_trie::{array::Array256, dictionary::Dictionary256, scalar::Scalar};

pub use crate::crypto::{CryptoProvider, Ed25519Keccak, Keypair};
pub use crate::error::{ConsensusError, ConsensusResult, ErrorKind};

/// An array of opaque byte strings: public keys, signatures, witness chunks.
pub type BinaryArray<C> = Array256<Scalar<Vec<u8>>, C>;

/// World state: action keys mapped to their current raw values.
pub type StateDictionary<C> = Dictionary256<Scalar<Vec<u8>>, C>;
