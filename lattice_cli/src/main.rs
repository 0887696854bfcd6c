use std::{fs::File, io::BufReader, path::Path, time::Duration};

use anyhow::{bail, Context, Result};
use clap::Parser;
use cli::{Cli, Command};
use dotenvy::dotenv;
use lattice_consensus::{
    block::Block,
    block_artifact::BlockArtifact,
    config::VerifierConfig,
    crypto::{Ed25519Keccak, Keypair},
    definition::Definition,
    filter::{RejectingFilterEngine, TimeoutFilterEngine},
};
use lattice_trie::Digest;
use serde_json::json;
use tracing::{error, info};

mod cli;
mod init;

type Artifact = BlockArtifact<Ed25519Keccak>;

fn main() -> Result<()> {
    dotenv().ok();
    init::tracing();

    let args = Cli::parse();
    let config = load_config(&args)?;

    match args.command {
        Command::Verify { input, genesis } => verify(&input, genesis, &config),
        Command::Inspect { input, genesis } => inspect(&input, genesis, &config),
        Command::Reward {
            exponent,
            premine,
            index,
        } => reward(exponent, premine, index),
        Command::Keygen => keygen(),
    }
}

/// File settings first, then flag and environment overrides.
fn load_config(args: &Cli) -> Result<VerifierConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("Failed to open config {}", path.display()))?;
            let des = &mut serde_json::Deserializer::from_reader(BufReader::new(file));
            serde_path_to_error::deserialize(des)
                .with_context(|| format!("Failed to parse config {}", path.display()))?
        }
        None => VerifierConfig::default(),
    };

    if let Some(depth) = args.max_chain_depth {
        config.max_chain_depth = depth;
    }
    if let Some(ms) = args.filter_timeout_ms {
        config.filter_timeout = Duration::from_millis(ms);
    }

    Ok(config)
}

fn load_artifact(path: &Path) -> Result<Artifact> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let des = &mut serde_json::Deserializer::from_reader(BufReader::new(file));
    serde_path_to_error::deserialize(des)
        .with_context(|| format!("Failed to parse block artifact {}", path.display()))
}

fn resolve(path: &Path, genesis: bool, config: &VerifierConfig) -> Result<Block> {
    let artifact = load_artifact(path)?;
    let block = if genesis {
        artifact.to_genesis(config)
    } else {
        artifact.to_block(config)
    };

    block.with_context(|| format!("Failed to resolve block {:#x}", artifact.hash()))
}

fn verify(path: &Path, genesis: bool, config: &VerifierConfig) -> Result<()> {
    let block = resolve(path, genesis, config)?;
    let hash = block.header().hash;

    if block.body().is_none() {
        bail!("Block {hash:#x} is missing part of its body");
    }

    let engine = TimeoutFilterEngine::new(RejectingFilterEngine, config.filter_timeout);
    let passed = if genesis {
        block.verify_all_for_genesis::<Ed25519Keccak, _>(&engine)
    } else {
        block.verify_all::<Ed25519Keccak, _>(&engine, config)
    };

    if passed {
        info!("Block {hash:#x} at index {} is valid", block.header().index);
        Ok(())
    } else {
        error!("Block {hash:#x} failed verification");
        bail!("Block {hash:#x} failed verification")
    }
}

fn inspect(path: &Path, genesis: bool, config: &VerifierConfig) -> Result<()> {
    let block = resolve(path, genesis, config)?;
    let header = block.header();

    let transactions = block.body().map(|body| {
        body.transactions
            .iter()
            .map(|transaction| {
                json!({
                    "hash": transaction.transaction_hash(),
                    "fee": transaction.fee(),
                    "signers": transaction.signers(),
                    "actions": transaction.all_actions().len(),
                    "state_delta": transaction.state_delta(),
                })
            })
            .collect::<Vec<_>>()
    });

    let summary = json!({
        "hash": header.hash,
        "index": header.index,
        "timestamp": header.timestamp,
        "homestead": header.homestead,
        "frontier": header.frontier,
        "parent_index": header.parent_index,
        "parent_homestead": header.parent_homestead,
        "nonce": header.nonce,
        "next_difficulty": header.next_difficulty,
        "proof_of_work": header.proof_of_work,
        "resolved": block.body().is_some(),
        "transactions": transactions,
    });

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn reward(exponent: u32, premine: Digest, index: Digest) -> Result<()> {
    // Size and period do not enter the reward schedule.
    let definition = Definition::new(Digest::MAX, premine, 1.0, exponent, vec![])?;

    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "index": index,
            "reward": definition.reward_at_block(index),
            "premine_amount": definition.premine_amount(),
        }))?
    );
    Ok(())
}

fn keygen() -> Result<()> {
    let keypair = Keypair::generate(&mut rand::thread_rng());

    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "public_key": hex::encode(&keypair.public_key),
            "private_key": hex::encode(&keypair.private_key),
            "signer": keypair.signer::<Ed25519Keccak>(),
        }))?
    );
    Ok(())
}
