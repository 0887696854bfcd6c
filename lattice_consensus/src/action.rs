//! The generic `(key, old, new)` state mutation record.

use std::fmt::{self, Display};

pub use lattice_trie::transition_proof::ProofType;
use lattice_trie::{exact_rlp, scalar::ScalarPayload};
use rlp::RlpStream;
use serde::{Deserialize, Serialize};

/// A single state mutation: `key` goes from `old` to `new`.
///
/// An empty byte string means "no value", so an action with empty `old`
/// creates its key and one with empty `new` deletes it.
#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Action {
    /// The state key, a UTF-8 string in practice.
    pub key: Vec<u8>,
    /// Value before the action, empty if the key didn't exist.
    pub old: Vec<u8>,
    /// Value after the action, empty if the key is removed.
    pub new: Vec<u8>,
}

impl Action {
    /// An action moving `key` from `old` to `new`.
    pub fn new(key: impl Into<Vec<u8>>, old: impl Into<Vec<u8>>, new: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            old: old.into(),
            new: new.into(),
        }
    }

    /// The kind of transition proof this action needs.
    pub fn proof_type(&self) -> ProofType {
        match (self.old.is_empty(), self.new.is_empty()) {
            (_, true) => ProofType::Deletion,
            (true, false) => ProofType::Creation,
            (false, false) => ProofType::Mutation,
        }
    }

    /// Whether this action is well formed: a non-empty key and at least one
    /// of `old` and `new`.
    pub fn verify(&self) -> bool {
        !self.key.is_empty() && !(self.old.is_empty() && self.new.is_empty())
    }

    /// The change in stored bytes caused by applying this action.
    pub fn state_delta(&self) -> i64 {
        let len = |bytes: &[u8]| bytes.len() as i64;

        match self.proof_type() {
            ProofType::Creation => len(&self.key) + len(&self.new),
            ProofType::Deletion => -(len(&self.key) + len(&self.old)),
            ProofType::Mutation => len(&self.new) - len(&self.old),
        }
    }

    /// The key as a state dictionary key, if it is valid UTF-8.
    pub fn key_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.key).ok()
    }

    /// The namespace the key falls into.
    pub fn namespace(&self) -> ActionNamespace {
        self.key_str()
            .map(ActionNamespace::of)
            .unwrap_or(ActionNamespace::Unreserved)
    }
}

impl ScalarPayload for Action {
    fn to_payload_bytes(&self) -> Vec<u8> {
        let mut stream = RlpStream::new_list(3);

        stream.append(&self.key);
        stream.append(&self.old);
        stream.append(&self.new);

        stream.out().to_vec()
    }

    fn from_payload_bytes(bytes: &[u8]) -> Option<Self> {
        let rlp = exact_rlp(bytes)?;

        if rlp.item_count().ok()? != 3 {
            return None;
        }

        Some(Self {
            key: rlp.val_at(0).ok()?,
            old: rlp.val_at(1).ok()?,
            new: rlp.val_at(2).ok()?,
        })
    }
}

/// Reserved key prefixes and the typed view each one selects.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum ActionNamespace {
    /// Account balances.
    Account,
    /// Cross-chain claims against a parent receipt.
    Deposit,
    /// Attestations that a demand was paid.
    Receipt,
    /// Spawning a nested chain.
    Genesis,
    /// Bootstrap endpoints for a nested chain.
    Seed,
    /// Advertised endpoints of a signer.
    Peer,
    /// Anything without a reserved prefix.
    Unreserved,
}

impl ActionNamespace {
    /// Every reserved namespace with its prefix.
    pub const PREFIXES: [(ActionNamespace, &'static str); 6] = [
        (ActionNamespace::Account, "account/"),
        (ActionNamespace::Deposit, "deposit/"),
        (ActionNamespace::Receipt, "receipt/"),
        (ActionNamespace::Genesis, "genesis/"),
        (ActionNamespace::Seed, "seed/"),
        (ActionNamespace::Peer, "peer/"),
    ];

    /// The key prefix, or `None` for [`ActionNamespace::Unreserved`].
    pub fn prefix(self) -> Option<&'static str> {
        Self::PREFIXES
            .iter()
            .find(|(ns, _)| *ns == self)
            .map(|(_, prefix)| *prefix)
    }

    /// The namespace `key` belongs to.
    pub fn of(key: &str) -> Self {
        Self::PREFIXES
            .iter()
            .find(|(_, prefix)| key.starts_with(prefix))
            .map(|(ns, _)| *ns)
            .unwrap_or(ActionNamespace::Unreserved)
    }

    /// `key` with this namespace's prefix removed.
    pub fn strip<'a>(self, key: &'a str) -> Option<&'a str> {
        key.strip_prefix(self.prefix()?)
    }

    /// `suffix` under this namespace's prefix.
    pub fn key(self, suffix: &str) -> String {
        format!("{}{suffix}", self.prefix().unwrap_or_default())
    }
}

impl Display for ActionNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActionNamespace::Account => "Account",
            ActionNamespace::Deposit => "Deposit",
            ActionNamespace::Receipt => "Receipt",
            ActionNamespace::Genesis => "Genesis",
            ActionNamespace::Seed => "Seed",
            ActionNamespace::Peer => "Peer",
            ActionNamespace::Unreserved => "Unreserved",
        };

        write!(f, "{}", s)
    }
}
