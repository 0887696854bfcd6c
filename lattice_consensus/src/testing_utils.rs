use lattice_trie::{address::Address, scalar::Scalar, Digest};

use crate::{
    action::Action,
    block::BlockHeader,
    block_artifact::{BlockArtifact, BlockDictionary, BlockTemplate},
    crypto::{Ed25519Keccak, Keypair},
    definition::{Definition, DefinitionArtifact},
    transaction_artifact::{TransactionArtifact, TransactionTemplate},
    typed_actions::{encode_balance, Account, TypedAction},
    StateDictionary,
};

pub(crate) type TestCrypto = Ed25519Keccak;

pub(crate) fn common_setup() {
    // Try init since multiple tests calling `init` will cause an error.
    let _ = pretty_env_logger::try_init();
}

pub(crate) fn alice() -> Keypair {
    Keypair::from_seed([1; 32])
}

pub(crate) fn bob() -> Keypair {
    Keypair::from_seed([2; 32])
}

pub(crate) fn pay(address: Digest, old: u64, new: u64) -> Account {
    Account {
        address,
        old_balance: old.into(),
        new_balance: new.into(),
    }
}

pub(crate) fn state_with_balances(balances: &[(Digest, u64)]) -> StateDictionary<TestCrypto> {
    StateDictionary::from_entries(balances.iter().map(|(address, balance)| {
        (
            Account::key(*address),
            Scalar::new(encode_balance(Digest::from(*balance))),
        )
    }))
    .expect("balances build a state")
}

/// Reward 1024 per block, premine of 1000 blocks, 10 second period.
pub(crate) fn definition_artifact() -> DefinitionArtifact<TestCrypto> {
    DefinitionArtifact::new(Digest::from(1_000_000), Digest::from(1000), 10.0, 10, vec![])
}

pub(crate) fn definition() -> Definition {
    definition_artifact()
        .to_definition()
        .expect("test definition is valid")
}

pub(crate) fn header(index: u64, timestamp: f64) -> BlockHeader {
    BlockHeader {
        index: index.into(),
        timestamp,
        homestead: Digest::zero(),
        frontier: Digest::zero(),
        parent_index: None,
        parent_homestead: None,
        nonce: Digest::zero(),
        next_difficulty: Digest::MAX,
        hash: index.into(),
        proof_of_work: None,
    }
}

/// `actions` over `homestead`, signed by alice.
pub(crate) fn signed(
    actions: Vec<Action>,
    fee: u64,
    homestead: &StateDictionary<TestCrypto>,
) -> TransactionArtifact<TestCrypto> {
    let template = TransactionTemplate::new(actions, fee.into(), None, homestead.clone());
    TransactionArtifact::signed(&template, &[alice()]).expect("alice can sign")
}

/// A genesis block crediting alice with `balance` from an empty state.
pub(crate) fn genesis(balance: u64) -> BlockArtifact<TestCrypto> {
    let credit = pay(alice().signer::<TestCrypto>(), 0, balance);
    let transaction = signed(vec![credit.to_action()], 0, &StateDictionary::new());

    BlockArtifact::assemble(BlockTemplate {
        transactions: vec![transaction],
        definition: definition_artifact(),
        next_difficulty: Digest::MAX,
        index: Digest::zero(),
        timestamp: 1000.0,
        previous: None,
        homestead: Digest::zero(),
        parent_index: None,
        parent_homestead: None,
        nonce: Digest::zero(),
        children: BlockDictionary::new(),
    })
    .expect("genesis assembles")
}

/// The block after `previous`, one second later, applying `transactions` to
/// the state under `homestead`.
pub(crate) fn next_block(
    previous: &BlockArtifact<TestCrypto>,
    transactions: Vec<TransactionArtifact<TestCrypto>>,
    homestead: Digest,
) -> BlockArtifact<TestCrypto> {
    BlockArtifact::assemble(BlockTemplate {
        transactions,
        definition: definition_artifact(),
        next_difficulty: Digest::from(10),
        index: previous.index() + 1,
        timestamp: previous.timestamp() + 1.0,
        previous: Some(Address::new(previous.clone())),
        homestead,
        parent_index: None,
        parent_homestead: None,
        nonce: Digest::one(),
        children: BlockDictionary::new(),
    })
    .expect("block assembles")
}
