//! Typed views over [`Action`]s in the reserved namespaces.
//!
//! Each view is a pure, lossless reinterpretation of an action whose key
//! carries the view's prefix: `V::from_action(&v.to_action()) == Ok(v)` for
//! every valid `v`. Decoding is strict. A key or value that has more than one
//! spelling is rejected, so two distinct actions never decode to the same
//! view.

use lattice_trie::{
    digest::{Digest, DigestExt, DIGEST_BYTES},
    Hasher,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    action::{Action, ActionNamespace},
    transport::{Endpoint, Transport},
};

/// Why an action didn't decode into its typed view.
#[derive(Clone, Debug, Eq, Error, Hash, PartialEq)]
pub enum ActionDecodeError {
    /// The action is empty or a no-op.
    #[error("Action on key {0:?} is not a valid action")]
    InvalidAction(String),

    /// The key isn't UTF-8.
    #[error("Action key {} is not UTF-8", hex::encode(.0))]
    NonUtf8Key(Vec<u8>),

    /// The key carries a different prefix.
    #[error("Key {key:?} is not in the {namespace} namespace")]
    WrongNamespace {
        /// Offending key.
        key: String,
        /// Namespace the view expected.
        namespace: ActionNamespace,
    },

    /// The part of the key after the prefix doesn't parse.
    #[error("Key {0:?} is malformed")]
    MalformedKey(String),

    /// A value doesn't have the shape its namespace demands.
    #[error("Value {field} of key {key:?} is malformed")]
    MalformedValue {
        /// Key of the action.
        key: String,
        /// Which value was malformed.
        field: &'static str,
    },
}

/// A typed reinterpretation of an [`Action`].
pub trait TypedAction: Sized {
    /// The namespace this view lives in.
    const NAMESPACE: ActionNamespace;

    /// The underlying action.
    fn to_action(&self) -> Action;

    /// Reinterprets `action`, failing unless it is exactly the encoding of
    /// some value of this view.
    fn from_action(action: &Action) -> Result<Self, ActionDecodeError>;
}

fn key_of(action: &Action) -> Result<&str, ActionDecodeError> {
    action
        .key_str()
        .ok_or_else(|| ActionDecodeError::NonUtf8Key(action.key.clone()))
}

/// The key suffix after `namespace`'s prefix.
fn suffix(action: &Action, namespace: ActionNamespace) -> Result<&str, ActionDecodeError> {
    let key = key_of(action)?;
    if !action.verify() {
        return Err(ActionDecodeError::InvalidAction(key.to_string()));
    }

    namespace
        .strip(key)
        .ok_or_else(|| ActionDecodeError::WrongNamespace {
            key: key.to_string(),
            namespace,
        })
}

fn malformed_key(action: &Action) -> ActionDecodeError {
    ActionDecodeError::MalformedKey(String::from_utf8_lossy(&action.key).into_owned())
}

fn malformed_value(action: &Action, field: &'static str) -> ActionDecodeError {
    ActionDecodeError::MalformedValue {
        key: String::from_utf8_lossy(&action.key).into_owned(),
        field,
    }
}

fn parse_digest(action: &Action, s: &str) -> Result<Digest, ActionDecodeError> {
    Digest::from_hex_key(s).ok_or_else(|| malformed_key(action))
}

/// A nonzero balance is its 32-byte big-endian form and zero is empty.
pub fn encode_balance(balance: Digest) -> Vec<u8> {
    match balance.is_zero() {
        true => Vec::new(),
        false => balance.to_digest_bytes().to_vec(),
    }
}

/// Inverse of [`encode_balance`]. A 32-byte zero is not canonical.
pub fn decode_balance(bytes: &[u8]) -> Option<Digest> {
    match bytes.len() {
        0 => Some(Digest::zero()),
        DIGEST_BYTES => Digest::from_digest_slice(bytes).filter(|b| !b.is_zero()),
        _ => None,
    }
}

/// A directory names one nested chain: a single non-empty path segment.
pub fn is_valid_directory(directory: &str) -> bool {
    !directory.is_empty() && !directory.contains('/')
}

fn directory_of(action: &Action, namespace: ActionNamespace) -> Result<String, ActionDecodeError> {
    let directory = suffix(action, namespace)?;
    match is_valid_directory(directory) {
        true => Ok(directory.to_string()),
        false => Err(malformed_key(action)),
    }
}

/// The balance of one account.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Account {
    /// Hash of the owner's public key.
    pub address: Digest,
    /// Balance before the action.
    pub old_balance: Digest,
    /// Balance after the action.
    pub new_balance: Digest,
}

impl Account {
    /// The state key holding `address`'s balance.
    pub fn key(address: Digest) -> String {
        ActionNamespace::Account.key(&address.to_hex_key())
    }

    /// The account owned by `public_key` under hasher `H`.
    pub fn for_public_key<H: Hasher>(
        public_key: &[u8],
        old_balance: Digest,
        new_balance: Digest,
    ) -> Self {
        Self {
            address: H::hash(public_key),
            old_balance,
            new_balance,
        }
    }
}

impl TypedAction for Account {
    const NAMESPACE: ActionNamespace = ActionNamespace::Account;

    fn to_action(&self) -> Action {
        Action::new(
            Self::key(self.address),
            encode_balance(self.old_balance),
            encode_balance(self.new_balance),
        )
    }

    fn from_action(action: &Action) -> Result<Self, ActionDecodeError> {
        let address = parse_digest(action, suffix(action, Self::NAMESPACE)?)?;

        Ok(Self {
            address,
            old_balance: decode_balance(&action.old)
                .ok_or_else(|| malformed_value(action, "old balance"))?,
            new_balance: decode_balance(&action.new)
                .ok_or_else(|| malformed_value(action, "new balance"))?,
        })
    }
}

/// A request for `amount` to be paid to `recipient` on another chain.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Demand {
    /// Makes otherwise identical demands distinct.
    pub nonce: Digest,
    /// Account address that must be credited.
    pub recipient: Digest,
    /// Amount to be credited.
    pub amount: Digest,
}

impl Demand {
    /// The `nonce:recipient:amount` key suffix naming this demand.
    pub fn to_key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.nonce.to_hex_key(),
            self.recipient.to_hex_key(),
            self.amount.to_hex_key()
        )
    }

    /// Inverse of [`Demand::to_key`].
    pub fn from_key(s: &str) -> Option<Self> {
        let mut parts = s.split(':');
        let demand = Self {
            nonce: Digest::from_hex_key(parts.next()?)?,
            recipient: Digest::from_hex_key(parts.next()?)?,
            amount: Digest::from_hex_key(parts.next()?)?,
        };

        parts.next().is_none().then_some(demand)
    }
}

/// A balance claimed against a demand that was paid on the parent chain.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Deposit {
    /// The demand being claimed.
    pub demand: Demand,
    /// Deposit balance before the action.
    pub old_balance: Digest,
    /// Deposit balance after the action.
    pub new_balance: Digest,
}

impl TypedAction for Deposit {
    const NAMESPACE: ActionNamespace = ActionNamespace::Deposit;

    fn to_action(&self) -> Action {
        Action::new(
            Self::NAMESPACE.key(&self.demand.to_key()),
            encode_balance(self.old_balance),
            encode_balance(self.new_balance),
        )
    }

    fn from_action(action: &Action) -> Result<Self, ActionDecodeError> {
        let demand =
            Demand::from_key(suffix(action, Self::NAMESPACE)?).ok_or_else(|| malformed_key(action))?;

        Ok(Self {
            demand,
            old_balance: decode_balance(&action.old)
                .ok_or_else(|| malformed_value(action, "old balance"))?,
            new_balance: decode_balance(&action.new)
                .ok_or_else(|| malformed_value(action, "new balance"))?,
        })
    }
}

/// An attestation that `sender` paid `demand`.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Receipt {
    /// Address of the paying account.
    pub sender: Digest,
    /// The demand that was paid.
    pub demand: Demand,
}

impl Receipt {
    /// The state key holding the receipt for `demand`.
    pub fn key(demand: &Demand) -> String {
        ActionNamespace::Receipt.key(&demand.to_key())
    }
}

impl TypedAction for Receipt {
    const NAMESPACE: ActionNamespace = ActionNamespace::Receipt;

    fn to_action(&self) -> Action {
        Action::new(
            Self::key(&self.demand),
            Vec::new(),
            self.sender.to_digest_bytes().to_vec(),
        )
    }

    fn from_action(action: &Action) -> Result<Self, ActionDecodeError> {
        let demand =
            Demand::from_key(suffix(action, Self::NAMESPACE)?).ok_or_else(|| malformed_key(action))?;
        if !action.old.is_empty() {
            return Err(malformed_value(action, "old receipt"));
        }
        if action.new.len() != DIGEST_BYTES {
            return Err(malformed_value(action, "sender"));
        }

        Ok(Self {
            sender: Digest::from_big_endian(&action.new),
            demand,
        })
    }
}

/// The creation of a nested chain under `directory`.
///
/// `genesis_binary` is the serialized genesis block artifact of the new
/// chain. It is only decoded when the block carrying it is resolved.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Genesis {
    /// Directory of the new chain.
    pub directory: String,
    /// Serialized, complete genesis block artifact.
    pub genesis_binary: Vec<u8>,
}

impl TypedAction for Genesis {
    const NAMESPACE: ActionNamespace = ActionNamespace::Genesis;

    fn to_action(&self) -> Action {
        Action::new(
            Self::NAMESPACE.key(&self.directory),
            Vec::new(),
            self.genesis_binary.clone(),
        )
    }

    fn from_action(action: &Action) -> Result<Self, ActionDecodeError> {
        let directory = directory_of(action, Self::NAMESPACE)?;
        if !action.old.is_empty() || action.new.is_empty() {
            return Err(malformed_value(action, "genesis binary"));
        }

        Ok(Self {
            directory,
            genesis_binary: action.new.clone(),
        })
    }
}

/// Bootstrap endpoints for the nested chain under `directory`.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Seed {
    /// Directory of the chain.
    pub directory: String,
    /// Previously published seeds, if any.
    pub old_seeds: Option<Vec<Endpoint>>,
    /// Seeds published by this action.
    pub new_seeds: Vec<Endpoint>,
}

impl Seed {
    /// Hands `payload` to every new seed.
    pub fn broadcast<T: Transport>(&self, transport: &T, payload: &[u8]) {
        for seed in &self.new_seeds {
            transport.send(seed, payload);
        }
    }
}

impl TypedAction for Seed {
    const NAMESPACE: ActionNamespace = ActionNamespace::Seed;

    fn to_action(&self) -> Action {
        Action::new(
            Self::NAMESPACE.key(&self.directory),
            self.old_seeds
                .as_deref()
                .map(Endpoint::list_to_bytes)
                .unwrap_or_default(),
            Endpoint::list_to_bytes(&self.new_seeds),
        )
    }

    fn from_action(action: &Action) -> Result<Self, ActionDecodeError> {
        let directory = directory_of(action, Self::NAMESPACE)?;
        let old_seeds = match action.old.is_empty() {
            true => None,
            false => Some(
                Endpoint::list_from_bytes(&action.old)
                    .ok_or_else(|| malformed_value(action, "old seeds"))?,
            ),
        };
        let new_seeds = Endpoint::list_from_bytes(&action.new)
            .ok_or_else(|| malformed_value(action, "new seeds"))?;

        Ok(Self {
            directory,
            old_seeds,
            new_seeds,
        })
    }
}

/// The endpoint a signer is reachable at.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct Peer {
    /// Address of the signer.
    pub address: Digest,
    /// Previously announced endpoint, if any.
    pub old: Option<Endpoint>,
    /// Newly announced endpoint.
    pub new: Endpoint,
}

impl Peer {
    /// Hands `payload` to the announced endpoint.
    pub fn announce<T: Transport>(&self, transport: &T, payload: &[u8]) {
        transport.send(&self.new, payload);
    }
}

impl TypedAction for Peer {
    const NAMESPACE: ActionNamespace = ActionNamespace::Peer;

    fn to_action(&self) -> Action {
        Action::new(
            Self::NAMESPACE.key(&self.address.to_hex_key()),
            self.old.as_ref().map(Endpoint::to_bytes).unwrap_or_default(),
            self.new.to_bytes(),
        )
    }

    fn from_action(action: &Action) -> Result<Self, ActionDecodeError> {
        let address = parse_digest(action, suffix(action, Self::NAMESPACE)?)?;
        let old = match action.old.is_empty() {
            true => None,
            false => Some(
                Endpoint::from_bytes(&action.old).ok_or_else(|| malformed_value(action, "old peer"))?,
            ),
        };
        let new =
            Endpoint::from_bytes(&action.new).ok_or_else(|| malformed_value(action, "new peer"))?;

        Ok(Self { address, old, new })
    }
}
