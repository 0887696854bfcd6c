//! The addressed form of a block.

use std::{
    collections::{BTreeMap, HashSet},
    sync::Arc,
};

use lattice_trie::{
    address::{Address, Artifact},
    append_optional_digest,
    array::Array256,
    cache::DigestCache,
    capture::capture,
    dictionary::Dictionary256,
    scalar::Scalar,
    Digest,
};
use log::{debug, trace};
use rlp::RlpStream;
use serde::{Deserialize, Serialize};

use crate::{
    action::Action,
    block::{Block, BlockBody, BlockHeader, BlockStage},
    config::VerifierConfig,
    crypto::CryptoProvider,
    definition::DefinitionArtifact,
    error::{ConsensusError, ConsensusResult},
    transaction::Transaction,
    transaction_artifact::TransactionArtifact,
    typed_actions::ActionDecodeError,
    StateDictionary,
};

/// An array of transactions.
pub type TransactionArray<C> = Array256<TransactionArtifact<C>, C>;

/// Nested chains keyed by directory.
pub type BlockDictionary<C> = Dictionary256<BlockArtifact<C>, C>;

/// Everything needed to assemble a [`BlockArtifact`]. The frontier is
/// derived.
#[derive(Clone, Debug)]
pub struct BlockTemplate<C: CryptoProvider> {
    /// Transactions in block order.
    pub transactions: Vec<TransactionArtifact<C>>,
    /// Rules of the chain.
    pub definition: DefinitionArtifact<C>,
    /// Difficulty the next block has to beat.
    pub next_difficulty: Digest,
    /// Height on the chain.
    pub index: Digest,
    /// Seconds since the epoch.
    pub timestamp: f64,
    /// The previous block. `None` for genesis blocks.
    pub previous: Option<Address<BlockArtifact<C>, C>>,
    /// State digest before this block's actions.
    pub homestead: Digest,
    /// Index of the parent chain block this block settles against.
    pub parent_index: Option<Digest>,
    /// State digest of the parent chain block this block settles against.
    pub parent_homestead: Option<Digest>,
    /// Proof-of-work nonce.
    pub nonce: Digest,
    /// Nested chains advanced by this block.
    pub children: BlockDictionary<C>,
}

/// A block as it is hashed and exchanged.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(bound = "C: CryptoProvider")]
pub struct BlockArtifact<C: CryptoProvider> {
    transactions_root: Address<TransactionArray<C>, C>,
    definition_root: Address<DefinitionArtifact<C>, C>,
    next_difficulty: Digest,
    index: Digest,
    timestamp: f64,
    previous_root: Option<Address<BlockArtifact<C>, C>>,
    homestead: Digest,
    parent_index: Option<Digest>,
    parent_homestead: Option<Digest>,
    frontier: Digest,
    nonce: Digest,
    children: Address<BlockDictionary<C>, C>,
}

impl<C: CryptoProvider> BlockArtifact<C> {
    /// Assembles a block, replaying its transactions over the homestead to
    /// find the frontier.
    pub fn assemble(template: BlockTemplate<C>) -> ConsensusResult<Self> {
        let resolved = template
            .transactions
            .iter()
            .map(TransactionArtifact::convert_to_transaction)
            .collect::<ConsensusResult<Vec<_>>>()?;
        let frontier = replay::<C>(template.homestead, &resolved)?;

        Ok(Self {
            transactions_root: Address::new(TransactionArray::from_artifacts(template.transactions)),
            definition_root: Address::new(template.definition),
            next_difficulty: template.next_difficulty,
            index: template.index,
            timestamp: template.timestamp,
            previous_root: template.previous,
            homestead: template.homestead,
            parent_index: template.parent_index,
            parent_homestead: template.parent_homestead,
            frontier,
            nonce: template.nonce,
            children: Address::new(template.children),
        })
    }

    /// Root of the transaction array.
    pub fn transactions_root(&self) -> &Address<TransactionArray<C>, C> {
        &self.transactions_root
    }

    /// Root of the chain definition.
    pub fn definition_root(&self) -> &Address<DefinitionArtifact<C>, C> {
        &self.definition_root
    }

    /// Difficulty the next block has to beat.
    pub fn next_difficulty(&self) -> Digest {
        self.next_difficulty
    }

    /// Height on the chain.
    pub fn index(&self) -> Digest {
        self.index
    }

    /// Seconds since the epoch.
    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    /// The previous block, if any.
    pub fn previous_root(&self) -> Option<&Address<BlockArtifact<C>, C>> {
        self.previous_root.as_ref()
    }

    /// State digest before this block's actions.
    pub fn homestead(&self) -> Digest {
        self.homestead
    }

    /// Index of the parent chain block this block settles against.
    pub fn parent_index(&self) -> Option<Digest> {
        self.parent_index
    }

    /// State digest of the parent chain block this block settles against.
    pub fn parent_homestead(&self) -> Option<Digest> {
        self.parent_homestead
    }

    /// State digest after this block's actions.
    pub fn frontier(&self) -> Digest {
        self.frontier
    }

    /// Proof-of-work nonce.
    pub fn nonce(&self) -> Digest {
        self.nonce
    }

    /// Root of the nested chain dictionary.
    pub fn children(&self) -> &Address<BlockDictionary<C>, C> {
        &self.children
    }

    /// The digest of this block.
    pub fn hash(&self) -> Digest {
        self.compute_digest()
    }

    /// The proof-of-work value of this block, or `None` for genesis blocks.
    ///
    /// Genesis blocks at index 0 don't commit to a next difficulty here.
    pub fn proof_of_work(&self) -> Option<Digest> {
        let previous = self.previous_root.as_ref()?;
        let commits_difficulty = !self.index.is_zero();
        let mut stream = RlpStream::new_list(8 + commits_difficulty as usize);

        stream.append(&self.transactions_root.digest());
        stream.append(&self.definition_root.digest());
        stream.append(&self.timestamp.to_bits());
        stream.append(&previous.digest());
        stream.append(&self.homestead);
        append_optional_digest(&mut stream, self.parent_homestead.as_ref());
        stream.append(&self.frontier);
        stream.append(&self.nonce);
        if commits_difficulty {
            stream.append(&self.next_difficulty);
        }

        Some(C::hash(&stream.out()))
    }

    fn header(&self, hash: Digest) -> BlockHeader {
        BlockHeader {
            index: self.index,
            timestamp: self.timestamp,
            homestead: self.homestead,
            frontier: self.frontier,
            parent_index: self.parent_index,
            parent_homestead: self.parent_homestead,
            nonce: self.nonce,
            next_difficulty: self.next_difficulty,
            hash,
            proof_of_work: self.proof_of_work(),
        }
    }

    /// Header-only blocks for this block and every materialized ancestor.
    ///
    /// The walk stops at the first ancestor that is only a digest, or after
    /// `config.max_chain_depth` blocks.
    pub fn backwards_chain(&self, hash: Digest, config: &VerifierConfig) -> ConsensusResult<Arc<Block>> {
        let mut headers = Vec::new();
        let mut visited = HashSet::new();
        let mut current = Some((hash, self));

        while let Some((digest, artifact)) = current {
            if !visited.insert(digest) {
                return Err(ConsensusError::ChainCycle(digest));
            }
            if headers.len() >= config.max_chain_depth {
                debug!(
                    "truncated backwards chain from {:x} at {} blocks",
                    hash, config.max_chain_depth
                );
                break;
            }

            headers.push(artifact.header(digest));
            current = artifact
                .previous_root
                .as_ref()
                .and_then(|p| p.verified_artifact().map(|a| (p.digest(), a)));
        }

        let mut chain: Option<Arc<Block>> = None;
        for header in headers.into_iter().rev() {
            chain = Some(Arc::new(Block::header_only(header, chain)));
        }

        chain.ok_or(ConsensusError::MissingPrevious(self.index))
    }

    /// Resolves a block extending an existing chain.
    ///
    /// The previous block must be materialized. The body is resolved only
    /// if the transactions, the definition and the children are complete,
    /// otherwise the block is header-only.
    pub fn to_block(&self, config: &VerifierConfig) -> ConsensusResult<Block> {
        let previous_root = self
            .previous_root
            .as_ref()
            .ok_or(ConsensusError::MissingPrevious(self.index))?;
        let previous = previous_root
            .require()?
            .backwards_chain(previous_root.digest(), config)?;
        let header = self.header(self.hash());

        if !self.has_complete_body() {
            trace!("block {:x} resolves header-only", header.hash);
            return Ok(Block::header_only(header, Some(previous)));
        }

        let body = self.resolve_body(config)?;
        Ok(Block::new(header, Some(previous), BlockStage::Resolved(body)))
    }

    /// [`BlockArtifact::to_block`] through `cache`.
    pub fn to_block_cached(
        &self,
        config: &VerifierConfig,
        cache: &DigestCache<Block>,
    ) -> ConsensusResult<Arc<Block>> {
        cache.try_get_or_insert_with(self.hash(), || self.to_block(config))
    }

    /// Resolves the first block of a chain. The whole body must be present.
    pub fn to_genesis(&self, config: &VerifierConfig) -> ConsensusResult<Block> {
        if self.previous_root.is_some() {
            return Err(ConsensusError::UnexpectedPrevious(self.index));
        }

        self.transactions_root.require_complete()?;
        self.definition_root.require_complete()?;
        self.children.require_complete()?;

        let body = self.resolve_body(config)?;
        Ok(Block::new(
            self.header(self.hash()),
            None,
            BlockStage::Resolved(body),
        ))
    }

    fn has_complete_body(&self) -> bool {
        self.transactions_root.is_complete()
            && self.definition_root.is_complete()
            && self.children.is_complete()
    }

    fn resolve_body(&self, config: &VerifierConfig) -> ConsensusResult<BlockBody> {
        let definition = self.definition_root.require()?.to_definition()?;
        let transactions = self
            .transactions_root
            .require()?
            .artifacts()?
            .into_iter()
            .map(TransactionArtifact::convert_to_transaction)
            .collect::<ConsensusResult<Vec<_>>>()?;

        let computed = replay::<C>(self.homestead, &transactions)?;
        if computed != self.frontier {
            return Err(ConsensusError::FrontierMismatch {
                recorded: self.frontier,
                computed,
            });
        }

        let genesis = Self::extract_genesis(&transactions)?
            .into_iter()
            .map(|(directory, artifact)| Ok((directory, artifact.to_genesis(config)?)))
            .collect::<ConsensusResult<BTreeMap<_, _>>>()?;

        let children = self
            .children
            .require()?
            .entries()
            .into_iter()
            .map(|(directory, child)| Ok((directory.to_string(), child.require()?.to_block(config)?)))
            .collect::<ConsensusResult<BTreeMap<_, _>>>()?;

        Ok(BlockBody {
            transactions,
            definition,
            genesis,
            children,
        })
    }

    /// The genesis block artifacts embedded in the genesis actions of
    /// `transactions`, keyed by directory. Every one must decode to a
    /// complete artifact.
    pub fn extract_genesis(transactions: &[Transaction]) -> ConsensusResult<BTreeMap<String, Self>> {
        transactions
            .iter()
            .flat_map(Transaction::genesis_actions)
            .map(|genesis| {
                let invalid = |reason: String| ConsensusError::GenesisBinary {
                    directory: genesis.directory.clone(),
                    reason,
                };

                let artifact: Self = serde_json::from_slice(&genesis.genesis_binary)
                    .map_err(|e| invalid(e.to_string()))?;
                if !artifact.is_complete() {
                    return Err(invalid("artifact is incomplete".to_string()));
                }

                Ok((genesis.directory.clone(), artifact))
            })
            .collect()
    }

    /// The payload of a genesis action spawning this block's chain.
    pub fn to_genesis_binary(&self) -> ConsensusResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| ConsensusError::GenesisBinary {
            directory: String::new(),
            reason: e.to_string(),
        })
    }
}

/// Replays every action of `transactions` over the state under `homestead`
/// and returns the digest of the resulting state.
///
/// The homestead is captured from the transactions' witnesses, which must
/// prove every key touched. Creations and mutations are applied before
/// deletions. Each action must start from the value its key holds at the
/// point it is applied: absent for a creation, `old` otherwise.
pub fn replay<C: CryptoProvider>(homestead: Digest, transactions: &[Transaction]) -> ConsensusResult<Digest> {
    let actions: Vec<Action> = transactions.iter().flat_map(Transaction::all_actions).collect();
    let keyed = actions
        .iter()
        .map(|action| {
            let key = action
                .key_str()
                .ok_or_else(|| ActionDecodeError::NonUtf8Key(action.key.clone()))?;
            Ok((key, action))
        })
        .collect::<ConsensusResult<Vec<_>>>()?;

    let witness = transactions.iter().flat_map(Transaction::state_data);
    let state: StateDictionary<C> = capture(homestead, keyed.iter().map(|(key, _)| *key), witness)?;

    let (deletions, writes): (Vec<_>, Vec<_>) =
        keyed.into_iter().partition(|(_, action)| action.new.is_empty());

    let state = writes.into_iter().try_fold(state, |state, (key, action)| {
        check_old_value(&state, key, action)?;
        Ok::<_, ConsensusError>(state.setting(key, Scalar::new(action.new.clone()))?)
    })?;
    let state = deletions.into_iter().try_fold(state, |state, (key, action)| {
        check_old_value(&state, key, action)?;
        Ok::<_, ConsensusError>(state.deleting(key)?)
    })?;

    Ok(state.digest())
}

fn check_old_value<C: CryptoProvider>(
    state: &StateDictionary<C>,
    key: &str,
    action: &Action,
) -> ConsensusResult<()> {
    let held = state.get(key)?.map(Address::digest);
    let expected = (!action.old.is_empty())
        .then(|| Address::<_, C>::new(Scalar::new(action.old.clone())).digest());

    if held != expected {
        debug!("action on {key:?} expects {expected:?} but state holds {held:?}");
        return Err(ConsensusError::StaleAction {
            key: key.to_string(),
        });
    }

    Ok(())
}

impl<C: CryptoProvider> Artifact<C> for BlockArtifact<C> {
    fn canonical_bytes(&self) -> Vec<u8> {
        let mut stream = RlpStream::new_list(12);

        stream.append(&self.transactions_root.digest());
        stream.append(&self.definition_root.digest());
        stream.append(&self.next_difficulty);
        stream.append(&self.index);
        stream.append(&self.timestamp.to_bits());
        append_optional_digest(&mut stream, self.previous_root.as_ref().map(|p| p.digest()).as_ref());
        stream.append(&self.homestead);
        append_optional_digest(&mut stream, self.parent_index.as_ref());
        append_optional_digest(&mut stream, self.parent_homestead.as_ref());
        stream.append(&self.frontier);
        stream.append(&self.nonce);
        stream.append(&self.children.digest());

        stream.out().to_vec()
    }

    /// The previous block is a back reference and doesn't count.
    fn is_complete(&self) -> bool {
        self.has_complete_body()
    }
}
