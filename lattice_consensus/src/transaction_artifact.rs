//! The addressed form of a transaction.
//!
//! A [`TransactionArtifact`] only carries roots. Its actions, keys and
//! signatures live in arrays, and the homestead it applies to is replaced by a
//! witness: the raw chunks of a partial state dictionary proving the old
//! value of every key the transaction touches. The transaction hash commits
//! to the roots (never to resolved contents), so it doesn't depend on how much
//! of the artifact a verifier has materialized.

use std::collections::BTreeMap;

use lattice_trie::{
    address::{Address, Artifact},
    append_optional_digest,
    array::Array256,
    capture::capture,
    scalar::Scalar,
    Digest, DigestExt,
};
use log::trace;
use rlp::RlpStream;
use serde::{Deserialize, Serialize};

use crate::{
    action::{Action, ActionNamespace, ProofType},
    crypto::{CryptoProvider, Keypair},
    error::{ConsensusError, ConsensusResult},
    transaction::Transaction,
    typed_actions::{ActionDecodeError, Receipt, TypedAction},
    BinaryArray, StateDictionary,
};

/// An array of actions.
pub type ActionArray<C> = Array256<Scalar<Action>, C>;

/// Everything a transaction needs before it can be signed: what it does and
/// the state it does it to.
#[derive(Clone, Debug)]
pub struct TransactionTemplate<C: CryptoProvider> {
    actions: Vec<Action>,
    fee: Digest,
    previous_hash: Option<Digest>,
    homestead: StateDictionary<C>,
    parent: Option<(StateDictionary<C>, Vec<Receipt>)>,
}

impl<C: CryptoProvider> TransactionTemplate<C> {
    /// A transaction applying `actions` to `homestead`.
    ///
    /// `homestead` must materialize the path to every action key, and the
    /// old value of every key that is mutated or deleted.
    pub fn new(
        actions: Vec<Action>,
        fee: Digest,
        previous_hash: Option<Digest>,
        homestead: StateDictionary<C>,
    ) -> Self {
        Self {
            actions,
            fee,
            previous_hash,
            homestead,
            parent: None,
        }
    }

    /// Settles against `parent_homestead`, proving `receipts` from it.
    pub fn with_parent(
        mut self,
        parent_homestead: StateDictionary<C>,
        receipts: Vec<Receipt>,
    ) -> Self {
        self.parent = Some((parent_homestead, receipts));
        self
    }

    fn homestead_witness(&self) -> ConsensusResult<BinaryArray<C>> {
        let transitions = self
            .actions
            .iter()
            .map(|action| {
                let key = action
                    .key_str()
                    .ok_or_else(|| ActionDecodeError::NonUtf8Key(action.key.clone()))?;
                Ok((action.proof_type(), key))
            })
            .collect::<ConsensusResult<Vec<_>>>()?;

        let witness = self.homestead.transition_witness(transitions)?;
        Ok(BinaryArray::from_values(witness.contents().into_values()))
    }

    fn parent_witness(&self) -> ConsensusResult<(Option<Digest>, BinaryArray<C>)> {
        let Some((parent, receipts)) = &self.parent else {
            return Ok((None, BinaryArray::default()));
        };

        let keys: Vec<String> = receipts.iter().map(|r| Receipt::key(&r.demand)).collect();
        let witness = parent
            .transition_witness(keys.iter().map(|k| (ProofType::Mutation, k.as_str())))?;

        Ok((
            Some(parent.digest()),
            BinaryArray::from_values(witness.contents().into_values()),
        ))
    }
}

/// The addressed form of a [`Transaction`].
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(bound = "C: CryptoProvider")]
pub struct TransactionArtifact<C: CryptoProvider> {
    actions_root: Address<ActionArray<C>, C>,
    fee: Digest,
    previous_hash: Option<Digest>,
    public_keys_root: Address<BinaryArray<C>, C>,
    signatures_root: Address<BinaryArray<C>, C>,
    homestead_root: Digest,
    homestead_data_root: Address<BinaryArray<C>, C>,
    parent_homestead_root: Option<Digest>,
    parent_receipt_root: Address<BinaryArray<C>, C>,
}

impl<C: CryptoProvider> TransactionArtifact<C> {
    /// The artifact for `template` signed by `public_keys`, without any
    /// signatures yet. Attach them with
    /// [`TransactionArtifact::with_signatures`].
    pub fn unsigned(
        template: &TransactionTemplate<C>,
        public_keys: Vec<Vec<u8>>,
    ) -> ConsensusResult<Self> {
        let (parent_homestead_root, parent_receipts) = template.parent_witness()?;

        Ok(Self {
            actions_root: Address::new(ActionArray::from_values(template.actions.clone())),
            fee: template.fee,
            previous_hash: template.previous_hash,
            public_keys_root: Address::new(BinaryArray::from_values(public_keys)),
            signatures_root: Address::new(BinaryArray::default()),
            homestead_root: template.homestead.digest(),
            homestead_data_root: Address::new(template.homestead_witness()?),
            parent_homestead_root,
            parent_receipt_root: Address::new(parent_receipts),
        })
    }

    /// The same artifact carrying `signatures`, one per public key and in
    /// the same order.
    pub fn with_signatures(self, signatures: Vec<Vec<u8>>) -> Self {
        Self {
            signatures_root: Address::new(BinaryArray::from_values(signatures)),
            ..self
        }
    }

    /// The artifact for `template`, signed by every key in `keypairs`.
    pub fn signed(template: &TransactionTemplate<C>, keypairs: &[Keypair]) -> ConsensusResult<Self> {
        let public_keys = keypairs.iter().map(|k| k.public_key.clone()).collect();
        let unsigned = Self::unsigned(template, public_keys)?;
        let message = unsigned.transaction_hash().to_digest_bytes();

        let signatures = keypairs
            .iter()
            .map(|k| {
                C::sign(&message, &k.private_key)
                    .ok_or_else(|| ConsensusError::Signing(hex::encode(&k.public_key)))
            })
            .collect::<ConsensusResult<Vec<_>>>()?;

        Ok(unsigned.with_signatures(signatures))
    }

    /// Root of the action array.
    pub fn actions_root(&self) -> &Address<ActionArray<C>, C> {
        &self.actions_root
    }

    /// Fee offered to the block producer.
    pub fn fee(&self) -> Digest {
        self.fee
    }

    /// Digest of the block this transaction was built against.
    pub fn previous_hash(&self) -> Option<Digest> {
        self.previous_hash
    }

    /// Root of the public key array.
    pub fn public_keys_root(&self) -> &Address<BinaryArray<C>, C> {
        &self.public_keys_root
    }

    /// Root of the signature array.
    pub fn signatures_root(&self) -> &Address<BinaryArray<C>, C> {
        &self.signatures_root
    }

    /// Digest of the state the actions apply to.
    pub fn homestead_root(&self) -> Digest {
        self.homestead_root
    }

    /// Root of the homestead witness chunks.
    pub fn homestead_data_root(&self) -> &Address<BinaryArray<C>, C> {
        &self.homestead_data_root
    }

    /// The parent chain state this transaction settles against.
    pub fn parent_homestead_root(&self) -> Option<Digest> {
        self.parent_homestead_root
    }

    /// Root of the parent receipt witness chunks.
    pub fn parent_receipt_root(&self) -> &Address<BinaryArray<C>, C> {
        &self.parent_receipt_root
    }

    /// The message every signer signs.
    ///
    /// It commits to every root except the signatures.
    pub fn transaction_hash(&self) -> Digest {
        let mut stream = RlpStream::new_list(8);

        stream.append(&self.actions_root.digest());
        stream.append(&self.fee);
        append_optional_digest(&mut stream, self.previous_hash.as_ref());
        stream.append(&self.public_keys_root.digest());
        stream.append(&self.homestead_root);
        stream.append(&self.homestead_data_root.digest());
        append_optional_digest(&mut stream, self.parent_homestead_root.as_ref());
        stream.append(&self.parent_receipt_root.digest());

        C::hash(&stream.out())
    }

    /// Resolves the full transaction.
    ///
    /// Fails if any required array isn't materialized, if the number of
    /// public keys and signatures differ, or if any action doesn't decode
    /// into the typed view its key prefix selects.
    pub fn convert_to_transaction(&self) -> ConsensusResult<Transaction> {
        let public_keys = self.public_keys_root.require()?.values()?;
        let signatures = self.signatures_root.require()?.values()?;
        if public_keys.len() != signatures.len() {
            return Err(ConsensusError::SignatureCount {
                public_keys: public_keys.len(),
                signatures: signatures.len(),
            });
        }

        let actions = self.actions_root.require()?.values()?;
        if let Some(invalid) = actions.iter().find(|a| !a.verify()) {
            let key = String::from_utf8_lossy(&invalid.key).into_owned();
            return Err(ActionDecodeError::InvalidAction(key).into());
        }

        let mut transaction = Transaction {
            signers: public_keys.iter().map(|k| C::hash(k)).collect(),
            signatures: public_keys.into_iter().zip(signatures).collect::<BTreeMap<_, _>>(),
            fee: self.fee,
            previous_hash: self.previous_hash,
            parent_homestead_root: self.parent_homestead_root,
            transaction_hash: self.transaction_hash(),
            state_delta: actions
                .iter()
                .fold(0i64, |acc, a| acc.saturating_add(a.state_delta())),
            state_data: self.homestead_data_root.require()?.values()?,
            ..Default::default()
        };

        for action in actions {
            transaction.push_action(action)?;
        }

        if let Some(parent_root) = self.parent_homestead_root {
            transaction.parent_receipts = self.extract_parent_receipts(parent_root)?;
        }

        trace!(
            "resolved transaction {:x} with {} signers",
            transaction.transaction_hash,
            transaction.signers.len()
        );

        Ok(transaction)
    }

    /// Every receipt revealed by the parent receipt witness under
    /// `parent_root`.
    fn extract_parent_receipts(&self, parent_root: Digest) -> ConsensusResult<Vec<Receipt>> {
        let chunks = self.parent_receipt_root.require()?.values()?;
        let parent: StateDictionary<C> = capture(parent_root, std::iter::empty::<&str>(), &chunks)?;

        parent
            .entries()
            .into_iter()
            .filter(|(key, _)| ActionNamespace::of(key) == ActionNamespace::Receipt)
            .map(|(key, value)| {
                let sender = value.require()?.value().clone();
                Ok(Receipt::from_action(&Action::new(key, Vec::new(), sender))?)
            })
            .collect()
    }
}

impl<C: CryptoProvider> Artifact<C> for TransactionArtifact<C> {
    fn canonical_bytes(&self) -> Vec<u8> {
        let mut stream = RlpStream::new_list(9);

        stream.append(&self.actions_root.digest());
        stream.append(&self.fee);
        append_optional_digest(&mut stream, self.previous_hash.as_ref());
        stream.append(&self.public_keys_root.digest());
        stream.append(&self.signatures_root.digest());
        stream.append(&self.homestead_root);
        stream.append(&self.homestead_data_root.digest());
        append_optional_digest(&mut stream, self.parent_homestead_root.as_ref());
        stream.append(&self.parent_receipt_root.digest());

        stream.out().to_vec()
    }

    fn is_complete(&self) -> bool {
        self.actions_root.is_complete()
            && self.public_keys_root.is_complete()
            && self.signatures_root.is_complete()
            && self.homestead_data_root.is_complete()
            && self.parent_receipt_root.is_complete()
    }
}
