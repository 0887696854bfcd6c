use lattice_consensus::{
    block_artifact::{BlockArtifact, BlockDictionary, BlockTemplate},
    crypto::{Ed25519Keccak, Keypair},
    definition::DefinitionArtifact,
    transaction_artifact::{TransactionArtifact, TransactionTemplate},
    typed_actions::{encode_balance, Account, TypedAction},
    ConsensusResult, StateDictionary,
};
use lattice_trie::{address::Address, scalar::Scalar, Digest};

pub type Crypto = Ed25519Keccak;
pub type State = StateDictionary<Crypto>;

pub fn init_logger() {
    let _ = pretty_env_logger::try_init();
}

pub fn alice() -> Keypair {
    Keypair::from_seed([0xa1; 32])
}

pub fn bob() -> Keypair {
    Keypair::from_seed([0xb0; 32])
}

pub fn account(owner: &Keypair, old: u64, new: u64) -> Account {
    Account {
        address: owner.signer::<Crypto>(),
        old_balance: old.into(),
        new_balance: new.into(),
    }
}

pub fn balances(entries: &[(&Keypair, u64)]) -> ConsensusResult<State> {
    Ok(State::from_entries(entries.iter().map(|(owner, balance)| {
        (
            Account::key(owner.signer::<Crypto>()),
            Scalar::new(encode_balance(Digest::from(*balance))),
        )
    }))?)
}

/// Reward 1024 per block, a premine of 1000 blocks, a 10 second period.
pub fn definition() -> DefinitionArtifact<Crypto> {
    DefinitionArtifact::new(Digest::from(1_000_000), Digest::from(1000), 10.0, 10, vec![])
}

pub fn transfer(
    accounts: &[Account],
    fee: u64,
    homestead: &State,
    signer: &Keypair,
) -> ConsensusResult<TransactionArtifact<Crypto>> {
    let template = TransactionTemplate::new(
        accounts.iter().map(TypedAction::to_action).collect(),
        fee.into(),
        None,
        homestead.clone(),
    );
    TransactionArtifact::signed(&template, std::slice::from_ref(signer))
}

pub fn genesis_block(
    transactions: Vec<TransactionArtifact<Crypto>>,
) -> ConsensusResult<BlockArtifact<Crypto>> {
    BlockArtifact::assemble(BlockTemplate {
        transactions,
        definition: definition(),
        next_difficulty: Digest::MAX,
        index: Digest::zero(),
        timestamp: 1000.0,
        previous: None,
        homestead: State::new().digest(),
        parent_index: None,
        parent_homestead: None,
        nonce: Digest::zero(),
        children: BlockDictionary::new(),
    })
}

pub fn child_block(
    previous: &BlockArtifact<Crypto>,
    transactions: Vec<TransactionArtifact<Crypto>>,
    homestead: &State,
) -> ConsensusResult<BlockArtifact<Crypto>> {
    BlockArtifact::assemble(BlockTemplate {
        transactions,
        definition: definition(),
        next_difficulty: Digest::from(10),
        index: previous.index() + 1,
        timestamp: previous.timestamp() + 1.0,
        previous: Some(Address::new(previous.clone())),
        homestead: homestead.digest(),
        parent_index: None,
        parent_homestead: None,
        nonce: Digest::one(),
        children: BlockDictionary::new(),
    })
}
