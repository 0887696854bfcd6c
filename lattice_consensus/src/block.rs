//! Resolved blocks and the block-level consensus rules.
//!
//! A [`Block`] is what a [`BlockArtifact`](crate::block_artifact::BlockArtifact)
//! resolves to. Blocks link backwards through `previous`, and a block whose
//! body couldn't be resolved (only its header is trusted) is a
//! [`BlockStage::HeaderOnly`] block. Header-only blocks are what ancestors
//! resolve to during a backwards walk, and they never pass verification
//! themselves.

use std::{
    collections::{BTreeMap, HashSet},
    sync::Arc,
};

use enum_as_inner::EnumAsInner;
use lattice_trie::Digest;
use log::debug;

use crate::{
    config::VerifierConfig, crypto::CryptoProvider, definition::Definition, filter::FilterEngine,
    transaction::Transaction,
};

/// Everything about a block that is trusted without its body.
#[derive(Clone, Debug, PartialEq)]
pub struct BlockHeader {
    /// Height on its chain. Genesis blocks are at 0.
    pub index: Digest,
    /// Seconds since the epoch.
    pub timestamp: f64,
    /// State digest before this block's actions.
    pub homestead: Digest,
    /// State digest after this block's actions.
    pub frontier: Digest,
    /// Index of the parent chain block this block settles against.
    pub parent_index: Option<Digest>,
    /// State digest of the parent chain block this block settles against.
    pub parent_homestead: Option<Digest>,
    /// Proof-of-work nonce.
    pub nonce: Digest,
    /// Difficulty the next block has to beat.
    pub next_difficulty: Digest,
    /// Digest of the artifact this block was resolved from.
    pub hash: Digest,
    /// Proof-of-work value of the artifact. Genesis blocks have none.
    pub proof_of_work: Option<Digest>,
}

/// Contents of a fully resolved block.
#[derive(Clone, Debug, PartialEq)]
pub struct BlockBody {
    /// Transactions in block order.
    pub transactions: Vec<Transaction>,
    /// Rules of this block's chain.
    pub definition: Definition,
    /// Chains spawned by this block, keyed by directory.
    pub genesis: BTreeMap<String, Block>,
    /// Existing nested chains advanced by this block, keyed by directory.
    pub children: BTreeMap<String, Block>,
}

/// How much of a block is resolved.
#[derive(Clone, Debug, EnumAsInner, PartialEq)]
pub enum BlockStage {
    /// Only the header is known.
    HeaderOnly,
    /// The body is resolved as well.
    Resolved(BlockBody),
}

/// A node of some chain in the lattice.
#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    header: BlockHeader,
    previous: Option<Arc<Block>>,
    stage: BlockStage,
}

impl Block {
    /// Assembles a block from its parts.
    pub fn new(header: BlockHeader, previous: Option<Arc<Block>>, stage: BlockStage) -> Self {
        Self {
            header,
            previous,
            stage,
        }
    }

    /// A block with only its header known.
    pub fn header_only(header: BlockHeader, previous: Option<Arc<Block>>) -> Self {
        Self::new(header, previous, BlockStage::HeaderOnly)
    }

    /// The trusted header.
    pub fn header(&self) -> &BlockHeader {
        &self.header
    }

    /// The previous block on this chain. Only genesis blocks have none.
    pub fn previous(&self) -> Option<&Block> {
        self.previous.as_deref()
    }

    /// How far this block is resolved.
    pub fn stage(&self) -> &BlockStage {
        &self.stage
    }

    /// The body, if this block is resolved.
    pub fn body(&self) -> Option<&BlockBody> {
        self.stage.as_resolved()
    }

    /// The same block with `header` in place of its own.
    pub fn with_header(self, header: BlockHeader) -> Self {
        Self { header, ..self }
    }

    /// The same block with `body`, resolved.
    pub fn with_body(self, body: BlockBody) -> Self {
        Self {
            stage: BlockStage::Resolved(body),
            ..self
        }
    }

    /// The same block linked to `previous`.
    pub fn with_previous(self, previous: Option<Arc<Block>>) -> Self {
        Self { previous, ..self }
    }

    /// All rules for a block spawning a new chain.
    pub fn verify_all_for_genesis<C, E>(&self, engine: &E) -> bool
    where
        C: CryptoProvider,
        E: FilterEngine + ?Sized,
    {
        let Some(body) = self.body() else {
            debug!("genesis block {:x} is not resolved", self.header.hash);
            return false;
        };

        let check = |name: &str, passed: bool| {
            if !passed {
                debug!("genesis block {:x} failed {name}", self.header.hash);
            }
            passed
        };

        check("children", body.children.is_empty())
            && check("nested genesis", body.genesis.is_empty())
            && check("index", self.header.index.is_zero())
            && check("premine", self.verify_genesis_balance_change())
            && check("transaction parents", self.verify_transaction_parents())
            && check("transactions", self.verify_transactions::<C, E>(engine))
            && check(
                "genesis actions",
                body.transactions
                    .iter()
                    .all(|tx| tx.genesis_actions().is_empty()),
            )
            && check("size", self.verify_size())
            && check("previous", self.previous.is_none())
    }

    /// All rules for a block extending an existing chain, including every
    /// genesis block it spawns and every nested chain it advances.
    pub fn verify_all<C, E>(&self, engine: &E, config: &VerifierConfig) -> bool
    where
        C: CryptoProvider,
        E: FilterEngine + ?Sized,
    {
        if self.body().is_none() {
            debug!("block {:x} is not resolved", self.header.hash);
            return false;
        }

        let check = |name: &str, passed: bool| {
            if !passed {
                debug!(
                    "block {:x} at index {} failed {name}",
                    self.header.hash, self.header.index
                );
            }
            passed
        };

        check("balance change", self.verify_balance_change())
            && check(
                "genesis/children conflicts",
                self.verify_genesis_children_conflicts(),
            )
            && check("genesis blocks", self.verify_genesis_blocks::<C, E>(engine))
            && check("transaction parents", self.verify_transaction_parents())
            && check("difficulty", self.verify_difficulty())
            && check("proof of work", self.verify_proof_of_work())
            && check("transactions", self.verify_transactions::<C, E>(engine))
            && check("size", self.verify_size())
            && check("index", self.verify_index())
            && check("timestamp", self.verify_timestamp())
            && check("children", self.verify_children::<C, E>(engine, config))
    }

    /// Rules tying a freshly spawned chain to the block spawning it. A
    /// nested chain may only tighten its parent's rules.
    pub fn verify_genesis_relationship(&self, child: &Block) -> bool {
        if child.header.timestamp != self.header.timestamp
            || child.header.parent_homestead != Some(self.header.homestead)
        {
            return false;
        }

        let (Some(child_body), Some(body)) = (child.body(), self.body()) else {
            return false;
        };

        let child_filters: HashSet<&String> =
            child_body.definition.transaction_filters().iter().collect();

        child_body.definition.period() <= body.definition.period()
            && body
                .definition
                .transaction_filters()
                .iter()
                .all(|f| child_filters.contains(f))
    }

    /// Rules tying the next block of a nested chain to this block.
    ///
    /// The child's previous block must have settled against a state that
    /// this block's own chain actually went through.
    pub fn verify_relationship(&self, child: &Block, config: &VerifierConfig) -> bool {
        let (Some(previous), Some(bottom_left)) = (self.previous(), child.previous()) else {
            return false;
        };

        if child.header.timestamp != self.header.timestamp
            || child.header.parent_homestead != Some(self.header.homestead)
            || bottom_left.header.next_difficulty > previous.header.next_difficulty
        {
            return false;
        }

        bottom_left
            .header
            .parent_homestead
            .is_some_and(|top_left| self.verify_cycle(top_left, config))
    }

    /// Whether `homestead` is the homestead of this block or of one of its
    /// ancestors within `config.max_chain_depth` blocks.
    pub fn verify_cycle(&self, homestead: Digest, config: &VerifierConfig) -> bool {
        let mut visited = HashSet::new();
        let mut current = Some(self);

        while let Some(block) = current {
            if block.header.homestead == homestead {
                return true;
            }
            if visited.len() > config.max_chain_depth || !visited.insert(block.header.hash) {
                debug!(
                    "gave up looking for homestead {:x} after {} blocks",
                    homestead,
                    visited.len()
                );
                return false;
            }
            current = block.previous();
        }

        false
    }

    /// A genesis block mints at most the premine.
    pub fn verify_genesis_balance_change(&self) -> bool {
        let Some(body) = self.body() else {
            return false;
        };

        match self.balance_totals() {
            Some((old, new)) => old
                .checked_add(body.definition.premine_amount())
                .map_or(true, |cap| new <= cap),
            None => false,
        }
    }

    /// Balances grow by at most the block reward.
    pub fn verify_balance_change(&self) -> bool {
        let Some(body) = self.body() else {
            return false;
        };

        match self.balance_totals() {
            Some((old, new)) => old
                .checked_add(body.definition.reward_at_block(self.header.index))
                .map_or(true, |cap| new <= cap),
            None => false,
        }
    }

    /// Summed old and new balances over every transaction, or `None` on
    /// overflow.
    fn balance_totals(&self) -> Option<(Digest, Digest)> {
        self.body()?.transactions.iter().try_fold(
            (Digest::zero(), Digest::zero()),
            |(old, new), tx| {
                Some((
                    old.checked_add(tx.old_balances()?)?,
                    new.checked_add(tx.new_balances()?)?,
                ))
            },
        )
    }

    /// No directory is both spawned and advanced.
    pub fn verify_genesis_children_conflicts(&self) -> bool {
        self.body().is_some_and(|body| {
            body.genesis
                .keys()
                .all(|directory| !body.children.contains_key(directory))
        })
    }

    /// Every spawned chain starts with a valid genesis block tied to this
    /// block.
    pub fn verify_genesis_blocks<C, E>(&self, engine: &E) -> bool
    where
        C: CryptoProvider,
        E: FilterEngine + ?Sized,
    {
        self.body().is_some_and(|body| {
            body.genesis.values().all(|genesis| {
                genesis.verify_all_for_genesis::<C, E>(engine)
                    && self.verify_genesis_relationship(genesis)
            })
        })
    }

    /// Every transaction settles against this block's parent state.
    pub fn verify_transaction_parents(&self) -> bool {
        self.body().is_some_and(|body| {
            body.transactions
                .iter()
                .all(|tx| tx.parent_homestead_root() == self.header.parent_homestead)
        })
    }

    /// The announced next difficulty keeps pace with the chain's period.
    pub fn verify_difficulty(&self) -> bool {
        if self.header.index.is_zero() {
            return true;
        }

        let (Some(previous), Some(body)) = (self.previous(), self.body()) else {
            return false;
        };

        body.definition.verify_new_difficulty(
            previous.header.next_difficulty,
            self.header.next_difficulty,
            self.header.timestamp - previous.header.timestamp,
        )
    }

    /// The proof-of-work value is below the difficulty set by the previous
    /// block.
    pub fn verify_proof_of_work(&self) -> bool {
        match (self.header.proof_of_work, self.previous()) {
            (Some(work), Some(previous)) => work < previous.header.next_difficulty,
            _ => false,
        }
    }

    /// Every transaction passes every transaction rule under this chain's
    /// filters.
    pub fn verify_transactions<C, E>(&self, engine: &E) -> bool
    where
        C: CryptoProvider,
        E: FilterEngine + ?Sized,
    {
        self.body().is_some_and(|body| {
            let filters = body.definition.transaction_filters();
            body.transactions
                .iter()
                .all(|tx| tx.verify_all::<C, E>(filters, engine))
        })
    }

    /// The summed state delta stays below the chain's size limit.
    pub fn verify_size(&self) -> bool {
        let Some(body) = self.body() else {
            return false;
        };

        let delta = body
            .transactions
            .iter()
            .fold(0i64, |acc, tx| acc.saturating_add(tx.state_delta()));

        match u64::try_from(delta) {
            Ok(grown) => Digest::from(grown) < body.definition.size(),
            Err(_) => true,
        }
    }

    /// The index is one past the previous block's, or zero without one.
    pub fn verify_index(&self) -> bool {
        match self.previous() {
            Some(previous) => previous
                .header
                .index
                .checked_add(Digest::one())
                .is_some_and(|expected| self.header.index == expected),
            None => self.header.index.is_zero(),
        }
    }

    /// Time moves forward.
    pub fn verify_timestamp(&self) -> bool {
        self.previous()
            .is_some_and(|previous| previous.header.timestamp < self.header.timestamp)
    }

    /// Every nested chain advanced by this block is valid and anchored to
    /// this chain.
    pub fn verify_children<C, E>(&self, engine: &E, config: &VerifierConfig) -> bool
    where
        C: CryptoProvider,
        E: FilterEngine + ?Sized,
    {
        self.body().is_some_and(|body| {
            body.children.values().all(|child| {
                child.verify_all::<C, E>(engine, config) && self.verify_relationship(child, config)
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing_utils::{definition, header};

    fn resolved(index: u64, timestamp: f64, previous: Option<Block>) -> Block {
        Block::new(
            header(index, timestamp),
            previous.map(Arc::new),
            BlockStage::Resolved(BlockBody {
                transactions: vec![],
                definition: definition(),
                genesis: BTreeMap::new(),
                children: BTreeMap::new(),
            }),
        )
    }

    fn chain(length: u64) -> Block {
        (1..length).fold(resolved(0, 1000.0, None), |previous, i| {
            let mut block = resolved(i, 1000.0 + i as f64, Some(previous));
            block.header.homestead = Digest::from(100 + i);
            block.header.hash = Digest::from(200 + i);
            block
        })
    }

    #[test]
    fn header_only_blocks_never_verify() {
        let block = Block::header_only(header(0, 1000.0), None);

        assert!(block.body().is_none());
        assert!(!block.verify_size());
        assert!(!block.verify_transaction_parents());
    }

    #[test]
    fn index_and_timestamp_follow_previous() {
        let genesis = resolved(0, 1000.0, None);
        let next = resolved(1, 1001.0, Some(genesis.clone()));
        let skipped = resolved(2, 1001.0, Some(genesis.clone()));
        let stale = resolved(1, 1000.0, Some(genesis.clone()));

        assert!(genesis.verify_index());
        assert!(!genesis.verify_timestamp());
        assert!(next.verify_index() && next.verify_timestamp());
        assert!(!skipped.verify_index());
        assert!(!stale.verify_timestamp());
    }

    #[test]
    fn proof_of_work_must_beat_previous_difficulty() {
        let mut genesis = resolved(0, 1000.0, None);
        genesis.header.next_difficulty = Digest::from(50);
        let mut next = resolved(1, 1001.0, Some(genesis));

        next.header.proof_of_work = Some(Digest::from(49));
        assert!(next.verify_proof_of_work());

        next.header.proof_of_work = Some(Digest::from(50));
        assert!(!next.verify_proof_of_work());

        next.header.proof_of_work = None;
        assert!(!next.verify_proof_of_work());
    }

    #[test]
    fn cycles_are_found_along_previous_blocks() {
        let tip = chain(6);
        let config = VerifierConfig::default();

        assert!(tip.verify_cycle(Digest::from(103), &config));
        assert!(tip.verify_cycle(tip.header.homestead, &config));
        assert!(!tip.verify_cycle(Digest::from(999), &config));
    }

    #[test]
    fn cycle_walks_are_bounded() {
        let tip = chain(10);
        let shallow = VerifierConfig {
            max_chain_depth: 2,
            ..Default::default()
        };

        assert!(tip.verify_cycle(Digest::from(108), &shallow));
        assert!(!tip.verify_cycle(Digest::from(102), &shallow));
    }

    #[test]
    fn genesis_and_children_may_not_share_directories() {
        let child = resolved(0, 1000.0, None);
        let mut block = resolved(1, 1001.0, Some(resolved(0, 1000.0, None)));
        let mut body = block.body().cloned().unwrap();

        body.genesis.insert("nested".into(), child.clone());
        block = block.with_body(body.clone());
        assert!(block.verify_genesis_children_conflicts());

        body.children.insert("nested".into(), child);
        block = block.with_body(body);
        assert!(!block.verify_genesis_children_conflicts());
    }

    #[test]
    fn nested_chains_may_only_tighten_rules() {
        let parent = resolved(1, 1001.0, Some(resolved(0, 1000.0, None)));
        let mut child = resolved(0, 1001.0, None);
        child.header.parent_homestead = Some(parent.header.homestead);

        assert!(parent.verify_genesis_relationship(&child));

        let looser = Definition::new(
            Digest::from(1_000_000),
            Digest::zero(),
            definition().period() * 2.0,
            10,
            vec![],
        )
        .unwrap();
        let mut body = child.body().cloned().unwrap();
        body.definition = looser;
        assert!(!parent.verify_genesis_relationship(&child.clone().with_body(body)));

        let mut late = child.clone();
        late.header.timestamp += 1.0;
        assert!(!parent.verify_genesis_relationship(&late));
    }
}
