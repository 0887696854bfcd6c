//! Errors produced by Merkle operations.

use thiserror::Error;

use crate::digest::Digest;

/// Stores the result of Merkle operations. Returns a [`MerkleError`] upon
/// failure.
pub type MerkleResult<T> = Result<T, MerkleError>;

/// An error type for Merkle operations.
#[derive(Clone, Debug, Eq, Error, Hash, PartialEq)]
pub enum MerkleError {
    /// Witness chunks failed to prove a key path under the expected root.
    #[error("Witness chunks do not prove the key path under root {root:x} (unproven node: {unproven:x})")]
    ProofMismatch {
        /// The trusted root digest.
        root: Digest,
        /// The digest of the first node the witness failed to reveal.
        unproven: Digest,
    },

    /// An artifact that was required is only known by digest.
    #[error("Artifact {0:x} is not materialized")]
    IncompleteArtifact(Digest),

    /// An artifact was presented under a digest it doesn't hash to.
    #[error("Artifact hashes to {found:x} but was addressed as {expected:x}")]
    DigestMismatch {
        /// The digest the artifact was addressed by.
        expected: Digest,
        /// The digest the artifact actually hashes to.
        found: Digest,
    },

    /// A traversal needed to look inside a stubbed subtree.
    #[error("Found a stub during a traversal that needs its contents! (hash: {0:x})")]
    TraversedStub(Digest),

    /// Two partial dictionaries over different roots can't be merged.
    #[error("Attempted to merge proofs over different roots (left: {left:x}, right: {right:x})")]
    RootMismatch {
        /// Root of the left operand.
        left: Digest,
        /// Root of the right operand.
        right: Digest,
    },

    /// A raw node or serialized tree didn't decode to a well-formed node.
    #[error("Raw node {0:x} is malformed")]
    MalformedNode(Digest),

    /// Two distinct keys hash to the same full path.
    #[error("Keys {0:?} and {1:?} share a full hash path")]
    PathCollision(String, String),
}
