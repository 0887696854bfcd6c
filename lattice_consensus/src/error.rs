//! The consensus error taxonomy.

use lattice_trie::{Digest, MerkleError};
use thiserror::Error;

use crate::typed_actions::ActionDecodeError;

/// Result of constructing or resolving consensus objects.
pub type ConsensusResult<T> = Result<T, ConsensusError>;

/// Coarse classification of a [`ConsensusError`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ErrorKind {
    /// Witness data doesn't hash to what it claims. The artifact is rejected.
    ProofMismatch,
    /// Bytes don't decode to the shape their namespace demands.
    DecodeFailure,
    /// A consensus rule failed. The whole object is rejected.
    VerificationFailure,
    /// More data has to be fetched before resolution can proceed. This is the
    /// only recoverable kind.
    IncompleteArtifact,
}

/// Errors raised while building or resolving transactions and blocks.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum ConsensusError {
    /// Failure in the underlying Merkle structures.
    #[error(transparent)]
    Merkle(#[from] MerkleError),

    /// An action didn't decode into its typed view.
    #[error(transparent)]
    Decode(#[from] ActionDecodeError),

    /// Every public key needs exactly one signature.
    #[error("Transaction carries {public_keys} public keys but {signatures} signatures")]
    SignatureCount {
        /// Number of public keys.
        public_keys: usize,
        /// Number of signatures.
        signatures: usize,
    },

    /// A private key couldn't be used for signing.
    #[error("Private key for public key {0} can't sign")]
    Signing(String),

    /// Replaying a block's actions over its homestead didn't give its
    /// frontier.
    #[error("Replayed frontier {computed:x} does not match the recorded frontier {recorded:x}")]
    FrontierMismatch {
        /// Frontier stored in the block.
        recorded: Digest,
        /// Frontier obtained by replay.
        computed: Digest,
    },

    /// An action's `old` value isn't what the state holds for its key.
    #[error("Action on {key:?} doesn't start from the value held in state")]
    StaleAction {
        /// Key of the action.
        key: String,
    },

    /// A genesis action's payload isn't a complete genesis block artifact.
    #[error("Genesis action for {directory:?} doesn't embed a valid block artifact: {reason}")]
    GenesisBinary {
        /// Directory the genesis block would be spawned under.
        directory: String,
        /// What went wrong.
        reason: String,
    },

    /// Chain parameters are out of range.
    #[error("Invalid chain definition: {0}")]
    InvalidDefinition(&'static str),

    /// A non-genesis block is missing its previous block.
    #[error("Block at index {0} has no previous block")]
    MissingPrevious(Digest),

    /// A genesis block links to a previous block.
    #[error("Genesis block at index {0} links to a previous block")]
    UnexpectedPrevious(Digest),

    /// A backwards chain walk visited the same block twice.
    #[error("Chain walk revisited block {0:x}")]
    ChainCycle(Digest),
}

impl ConsensusError {
    /// The coarse kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConsensusError::Merkle(e) => match e {
                MerkleError::IncompleteArtifact(_) | MerkleError::TraversedStub(_) => {
                    ErrorKind::IncompleteArtifact
                }
                MerkleError::ProofMismatch { .. }
                | MerkleError::DigestMismatch { .. }
                | MerkleError::RootMismatch { .. }
                | MerkleError::MalformedNode(_)
                | MerkleError::PathCollision(..) => ErrorKind::ProofMismatch,
            },
            ConsensusError::Decode(_)
            | ConsensusError::SignatureCount { .. }
            | ConsensusError::GenesisBinary { .. }
            | ConsensusError::InvalidDefinition(_) => ErrorKind::DecodeFailure,
            ConsensusError::Signing(_)
            | ConsensusError::FrontierMismatch { .. }
            | ConsensusError::StaleAction { .. }
            | ConsensusError::MissingPrevious(_)
            | ConsensusError::UnexpectedPrevious(_)
            | ConsensusError::ChainCycle(_) => ErrorKind::VerificationFailure,
        }
    }

    /// Whether fetching more data and retrying could succeed.
    pub fn is_recoverable(&self) -> bool {
        self.kind() == ErrorKind::IncompleteArtifact
    }
}
