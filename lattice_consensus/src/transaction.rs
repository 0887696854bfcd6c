//! Resolved transactions and the predicates that decide whether they are
//! valid.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use lattice_trie::{Digest, DigestExt};
use log::{debug, warn};
use serde::{Serialize, Serializer};

use crate::{
    action::{Action, ActionNamespace},
    crypto::CryptoProvider,
    filter::FilterEngine,
    typed_actions::{
        Account, ActionDecodeError, Deposit, Genesis, Peer, Receipt, Seed, TypedAction,
    },
};

/// A fully resolved transaction.
///
/// Transactions are produced by
/// [`TransactionArtifact::convert_to_transaction`](crate::transaction_artifact::TransactionArtifact::convert_to_transaction)
/// and never change afterwards. [`Transaction::changing`] derives a modified
/// copy for what-if checks.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct Transaction {
    pub(crate) unreserved_actions: Vec<Action>,
    pub(crate) account_actions: Vec<Account>,
    pub(crate) receipt_actions: Vec<Receipt>,
    pub(crate) deposit_actions: Vec<Deposit>,
    pub(crate) genesis_actions: Vec<Genesis>,
    pub(crate) seed_actions: Vec<Seed>,
    pub(crate) peer_actions: Vec<Peer>,
    pub(crate) parent_receipts: Vec<Receipt>,
    pub(crate) signers: BTreeSet<Digest>,
    #[serde(serialize_with = "serialize_signatures")]
    pub(crate) signatures: BTreeMap<Vec<u8>, Vec<u8>>,
    pub(crate) fee: Digest,
    pub(crate) previous_hash: Option<Digest>,
    pub(crate) parent_homestead_root: Option<Digest>,
    pub(crate) transaction_hash: Digest,
    pub(crate) state_delta: i64,
    pub(crate) state_data: Vec<Vec<u8>>,
}

fn serialize_signatures<S: Serializer>(
    signatures: &BTreeMap<Vec<u8>, Vec<u8>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_map(
        signatures
            .iter()
            .map(|(key, sig)| (hex::encode(key), hex::encode(sig))),
    )
}

/// Replacement contents for [`Transaction::changing`]. `None` keeps the
/// current value.
#[derive(Clone, Debug, Default)]
pub struct TransactionChanges {
    /// Actions outside every reserved namespace.
    pub unreserved_actions: Option<Vec<Action>>,
    /// Account actions.
    pub account_actions: Option<Vec<Account>>,
    /// Receipt actions.
    pub receipt_actions: Option<Vec<Receipt>>,
    /// Deposit actions.
    pub deposit_actions: Option<Vec<Deposit>>,
    /// Genesis actions.
    pub genesis_actions: Option<Vec<Genesis>>,
    /// Seed actions.
    pub seed_actions: Option<Vec<Seed>>,
    /// Peer actions.
    pub peer_actions: Option<Vec<Peer>>,
    /// Receipts proven against the parent chain.
    pub parent_receipts: Option<Vec<Receipt>>,
    /// Homestead witness chunks.
    pub state_data: Option<Vec<Vec<u8>>>,
}

impl Transaction {
    /// Actions outside every reserved namespace.
    pub fn unreserved_actions(&self) -> &[Action] {
        &self.unreserved_actions
    }

    /// Account actions.
    pub fn account_actions(&self) -> &[Account] {
        &self.account_actions
    }

    /// Receipt actions.
    pub fn receipt_actions(&self) -> &[Receipt] {
        &self.receipt_actions
    }

    /// Deposit actions.
    pub fn deposit_actions(&self) -> &[Deposit] {
        &self.deposit_actions
    }

    /// Genesis actions.
    pub fn genesis_actions(&self) -> &[Genesis] {
        &self.genesis_actions
    }

    /// Seed actions.
    pub fn seed_actions(&self) -> &[Seed] {
        &self.seed_actions
    }

    /// Peer actions.
    pub fn peer_actions(&self) -> &[Peer] {
        &self.peer_actions
    }

    /// Receipts proven against the parent chain's homestead.
    pub fn parent_receipts(&self) -> &[Receipt] {
        &self.parent_receipts
    }

    /// Hashes of the public keys that signed.
    pub fn signers(&self) -> &BTreeSet<Digest> {
        &self.signers
    }

    /// Public key to signature.
    pub fn signatures(&self) -> &BTreeMap<Vec<u8>, Vec<u8>> {
        &self.signatures
    }

    /// Fee offered to the block producer.
    pub fn fee(&self) -> Digest {
        self.fee
    }

    /// Digest of the block this transaction was built against.
    pub fn previous_hash(&self) -> Option<Digest> {
        self.previous_hash
    }

    /// The parent chain state this transaction settles against.
    pub fn parent_homestead_root(&self) -> Option<Digest> {
        self.parent_homestead_root
    }

    /// The signed message.
    pub fn transaction_hash(&self) -> Digest {
        self.transaction_hash
    }

    /// Bytes added to the world state.
    pub fn state_delta(&self) -> i64 {
        self.state_delta
    }

    /// Homestead witness chunks.
    pub fn state_data(&self) -> &[Vec<u8>] {
        &self.state_data
    }

    /// Every action, reserved namespaces included, in bucket order.
    pub fn all_actions(&self) -> Vec<Action> {
        let typed = self
            .account_actions
            .iter()
            .map(Account::to_action)
            .chain(self.receipt_actions.iter().map(Receipt::to_action))
            .chain(self.deposit_actions.iter().map(Deposit::to_action))
            .chain(self.genesis_actions.iter().map(Genesis::to_action))
            .chain(self.seed_actions.iter().map(Seed::to_action))
            .chain(self.peer_actions.iter().map(Peer::to_action));

        self.unreserved_actions.iter().cloned().chain(typed).collect()
    }

    /// A copy with some contents replaced. Signatures and the transaction
    /// hash are carried over unchanged.
    pub fn changing(&self, changes: TransactionChanges) -> Self {
        Self {
            unreserved_actions: changes
                .unreserved_actions
                .unwrap_or_else(|| self.unreserved_actions.clone()),
            account_actions: changes
                .account_actions
                .unwrap_or_else(|| self.account_actions.clone()),
            receipt_actions: changes
                .receipt_actions
                .unwrap_or_else(|| self.receipt_actions.clone()),
            deposit_actions: changes
                .deposit_actions
                .unwrap_or_else(|| self.deposit_actions.clone()),
            genesis_actions: changes
                .genesis_actions
                .unwrap_or_else(|| self.genesis_actions.clone()),
            seed_actions: changes
                .seed_actions
                .unwrap_or_else(|| self.seed_actions.clone()),
            peer_actions: changes
                .peer_actions
                .unwrap_or_else(|| self.peer_actions.clone()),
            parent_receipts: changes
                .parent_receipts
                .unwrap_or_else(|| self.parent_receipts.clone()),
            state_data: changes
                .state_data
                .unwrap_or_else(|| self.state_data.clone()),
            ..self.clone()
        }
    }

    /// Files `action` under the bucket of its namespace.
    pub(crate) fn push_action(&mut self, action: Action) -> Result<(), ActionDecodeError> {
        match action.namespace() {
            ActionNamespace::Account => self.account_actions.push(Account::from_action(&action)?),
            ActionNamespace::Deposit => self.deposit_actions.push(Deposit::from_action(&action)?),
            ActionNamespace::Receipt => self.receipt_actions.push(Receipt::from_action(&action)?),
            ActionNamespace::Genesis => self.genesis_actions.push(Genesis::from_action(&action)?),
            ActionNamespace::Seed => self.seed_actions.push(Seed::from_action(&action)?),
            ActionNamespace::Peer => self.peer_actions.push(Peer::from_action(&action)?),
            ActionNamespace::Unreserved => self.unreserved_actions.push(action),
        }

        Ok(())
    }

    fn balances(&self, pick: impl Fn(Digest, Digest) -> Digest) -> Option<Digest> {
        self.account_actions
            .iter()
            .map(|a| pick(a.old_balance, a.new_balance))
            .chain(
                self.deposit_actions
                    .iter()
                    .map(|d| pick(d.old_balance, d.new_balance)),
            )
            .try_fold(Digest::zero(), |acc, b| acc.checked_add(b))
    }

    /// Sum of account and deposit balances before this transaction, `None`
    /// on overflow.
    pub fn old_balances(&self) -> Option<Digest> {
        self.balances(|old, _| old)
    }

    /// Sum of account and deposit balances after this transaction, `None` on
    /// overflow.
    pub fn new_balances(&self) -> Option<Digest> {
        self.balances(|_, new| new)
    }

    /// Every signature is valid for the transaction hash under its public key.
    pub fn verify_signatures<C: CryptoProvider>(&self) -> bool {
        let message = self.transaction_hash.to_digest_bytes();

        self.signatures
            .iter()
            .all(|(public_key, signature)| C::verify(&message, public_key, signature))
    }

    /// Every account whose balance doesn't grow is owned by a signer.
    pub fn verify_accounts(&self) -> bool {
        self.account_actions
            .iter()
            .filter(|a| a.new_balance <= a.old_balance)
            .all(|a| self.signers.contains(&a.address))
    }

    /// Every receipt's demand is paid into its recipient's account within
    /// this transaction.
    pub fn verify_receipts(&self) -> bool {
        let accounts: HashMap<Digest, &Account> = self
            .account_actions
            .iter()
            .map(|a| (a.address, a))
            .collect();

        self.receipt_actions.iter().all(|receipt| {
            let Some(account) = accounts.get(&receipt.demand.recipient) else {
                return false;
            };

            account
                .old_balance
                .checked_add(receipt.demand.amount)
                .is_some_and(|owed| account.new_balance >= owed)
        })
    }

    /// Every deposit that is drawn down is backed by a parent receipt for the
    /// same demand.
    pub fn verify_deposits(&self) -> bool {
        let paid: HashSet<_> = self.parent_receipts.iter().map(|r| &r.demand).collect();

        self.deposit_actions
            .iter()
            .filter(|d| d.old_balance > d.new_balance)
            .all(|d| paid.contains(&d.demand))
    }

    /// Every parent receipt was sent by a signer.
    pub fn verify_parent_receipts(&self) -> bool {
        self.parent_receipts
            .iter()
            .all(|r| self.signers.contains(&r.sender))
    }

    /// Every announced peer is a signer.
    pub fn verify_peers(&self) -> bool {
        self.peer_actions
            .iter()
            .all(|p| self.signers.contains(&p.address))
    }

    /// The fee is covered by balances released in this transaction, or is
    /// zero.
    pub fn verify_fee(&self) -> bool {
        self.fee.is_zero() || self.verify_outside_transaction_fee()
    }

    /// The fee is covered by balances released in this transaction. Block
    /// producers use this to accept fees from transactions they didn't write.
    pub fn verify_outside_transaction_fee(&self) -> bool {
        let (Some(old), Some(new)) = (self.old_balances(), self.new_balances()) else {
            return false;
        };

        self.fee.checked_add(new).is_some_and(|spent| spent <= old)
    }

    /// Every filter accepts this transaction.
    pub fn verify_filters<E: FilterEngine + ?Sized>(&self, filters: &[String], engine: &E) -> bool {
        if filters.is_empty() {
            return true;
        }

        let canonical = match serde_json::to_vec(self) {
            Ok(canonical) => canonical,
            Err(e) => {
                warn!(
                    "transaction {:x} has no canonical form for filters: {e}",
                    self.transaction_hash
                );
                return false;
            }
        };

        filters
            .iter()
            .all(|filter| engine.accepts(filter, &canonical))
    }

    /// Every transaction predicate, in order, stopping at the first failure.
    pub fn verify_all<C: CryptoProvider, E: FilterEngine + ?Sized>(
        &self,
        filters: &[String],
        engine: &E,
    ) -> bool {
        let check = |name: &str, passed: bool| {
            if !passed {
                debug!("transaction {:x} failed {name}", self.transaction_hash);
            }
            passed
        };

        check("signatures", self.verify_signatures::<C>())
            && check("accounts", self.verify_accounts())
            && check("receipts", self.verify_receipts())
            && check("deposits", self.verify_deposits())
            && check("parent receipts", self.verify_parent_receipts())
            && check("peers", self.verify_peers())
            && check("fee", self.verify_fee())
            && check("filters", self.verify_filters(filters, engine))
    }
}
