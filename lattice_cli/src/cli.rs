use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueHint};
use lattice_trie::Digest;

/// Resolve, inspect and verify lattice block artifacts.
#[derive(Parser)]
#[command(version, propagate_version = true)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Command,

    /// JSON file with verifier settings.
    #[arg(short, long, global = true, env = "LATTICE_CONFIG", value_hint = ValueHint::FilePath)]
    pub(crate) config: Option<PathBuf>,

    /// How many previous blocks may be resolved or walked from any block.
    #[arg(long, global = true, env = "LATTICE_MAX_CHAIN_DEPTH")]
    pub(crate) max_chain_depth: Option<usize>,

    /// Deadline for a single filter evaluation, in milliseconds.
    #[arg(long, global = true, env = "LATTICE_FILTER_TIMEOUT_MS")]
    pub(crate) filter_timeout_ms: Option<u64>,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Resolves a block artifact and runs every consensus rule on it.
    Verify {
        /// The JSON encoded block artifact.
        #[arg(short, long, value_hint = ValueHint::FilePath)]
        input: PathBuf,
        /// Verify the artifact as the first block of a chain.
        #[arg(long)]
        genesis: bool,
    },
    /// Prints the header and a summary of every transaction of a block.
    Inspect {
        /// The JSON encoded block artifact.
        #[arg(short, long, value_hint = ValueHint::FilePath)]
        input: PathBuf,
        /// Resolve the artifact as the first block of a chain.
        #[arg(long)]
        genesis: bool,
    },
    /// Prints the reward schedule of a chain at some block.
    Reward {
        /// Log2 of the reward of the first block.
        #[arg(short, long)]
        exponent: u32,
        /// Number of blocks allocated up front.
        #[arg(short, long, default_value = "0", value_parser = parse_digest)]
        premine: Digest,
        /// The block to compute the reward of.
        #[arg(short, long, default_value = "0", value_parser = parse_digest)]
        index: Digest,
    },
    /// Generates a fresh ed25519 key pair.
    Keygen,
}

/// Parses a decimal or `0x` prefixed hexadecimal digest.
fn parse_digest(s: &str) -> Result<Digest, String> {
    match s.strip_prefix("0x") {
        Some(hex) => Digest::from_str_radix(hex, 16).map_err(|e| e.to_string()),
        None => Digest::from_dec_str(s).map_err(|e| e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digests_parse_in_both_radixes() {
        assert_eq!(parse_digest("255"), Ok(Digest::from(255)));
        assert_eq!(parse_digest("0xff"), Ok(Digest::from(255)));
        assert!(parse_digest("0xzz").is_err());
        assert!(parse_digest("twelve").is_err());
    }

    #[test]
    fn reward_arguments_parse() {
        let cli = Cli::parse_from(["lattice", "reward", "--exponent", "10", "--index", "7"]);

        match cli.command {
            Command::Reward {
                exponent,
                premine,
                index,
            } => {
                assert_eq!(exponent, 10);
                assert_eq!(premine, Digest::zero());
                assert_eq!(index, Digest::from(7));
            }
            _ => panic!("expected the reward command"),
        }
    }
}
