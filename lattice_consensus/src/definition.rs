//! Chain economics: block size, premine, target period, the reward halving
//! curve and the difficulty adjustment rule.

use itertools::Itertools;
use lattice_trie::{
    address::{Address, Artifact},
    array::Array256,
    digest::DIGEST_BITS,
    scalar::Scalar,
    Digest, Hasher,
};
use rlp::RlpStream;
use serde::{Deserialize, Serialize};

use crate::error::{ConsensusError, ConsensusResult};

/// The economic policy of one chain.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Definition {
    size: Digest,
    premine: Digest,
    period: f64,
    initial_reward_exponent: u32,
    transaction_filters: Vec<String>,
}

impl Definition {
    /// A policy with the given parameters.
    ///
    /// `initial_reward_exponent` must be below the digest width and `period`
    /// must be a finite number of seconds, at least one.
    pub fn new(
        size: Digest,
        premine: Digest,
        period: f64,
        initial_reward_exponent: u32,
        transaction_filters: Vec<String>,
    ) -> ConsensusResult<Self> {
        if initial_reward_exponent as usize >= DIGEST_BITS {
            return Err(ConsensusError::InvalidDefinition(
                "initial reward exponent must be below 256",
            ));
        }
        if !(period.is_finite() && period >= 1.0) {
            return Err(ConsensusError::InvalidDefinition(
                "period must be at least one second",
            ));
        }

        Ok(Self {
            size,
            premine,
            period,
            initial_reward_exponent,
            transaction_filters,
        })
    }

    /// Upper bound (exclusive) on the summed state delta of a block.
    pub fn size(&self) -> Digest {
        self.size
    }

    /// Number of blocks whose rewards were allocated up front.
    pub fn premine(&self) -> Digest {
        self.premine
    }

    /// Target seconds between blocks.
    pub fn period(&self) -> f64 {
        self.period
    }

    /// Log2 of the reward of the very first block.
    pub fn initial_reward_exponent(&self) -> u32 {
        self.initial_reward_exponent
    }

    /// Scripts every transaction must pass.
    pub fn transaction_filters(&self) -> &[String] {
        &self.transaction_filters
    }

    /// Log2 of [`Definition::halving_interval`].
    pub fn halving_exponent(&self) -> u32 {
        DIGEST_BITS as u32 - self.initial_reward_exponent - 1
    }

    /// Blocks between two halvings of the reward.
    pub fn halving_interval(&self) -> Digest {
        Digest::one() << self.halving_exponent()
    }

    /// Log2 of the reward at `offset` blocks into the curve.
    fn reward_exponent_at_offset(&self, offset: Digest) -> u32 {
        let halvings = offset / self.halving_interval();

        match halvings >= Digest::from(self.initial_reward_exponent) {
            true => 0,
            false => self.initial_reward_exponent - halvings.low_u32(),
        }
    }

    /// Log2 of the reward of block `index`.
    pub fn reward_exponent_at_block(&self, index: Digest) -> u32 {
        self.reward_exponent_at_offset(index.saturating_add(self.premine))
    }

    /// The amount block `index` may mint. The curve is offset by the premine,
    /// halves every [`Definition::halving_interval`] blocks and never drops
    /// below one unit.
    pub fn reward_at_block(&self, index: Digest) -> Digest {
        Digest::one() << self.reward_exponent_at_block(index)
    }

    /// Sum of the rewards of the first `count` blocks of the curve.
    /// Saturates at the largest digest.
    pub fn total_rewards(&self, count: Digest) -> Digest {
        let interval = self.halving_interval();
        let mut exponent = self.initial_reward_exponent;
        let mut remaining = count;
        let mut total = Digest::zero();

        loop {
            let reward = Digest::one() << exponent;
            let era = match exponent {
                0 => remaining,
                _ => remaining.min(interval),
            };

            total = total.saturating_add(era.saturating_mul(reward));
            remaining -= era;

            if remaining.is_zero() {
                return total;
            }
            exponent -= 1;
        }
    }

    /// Everything allocated up front: the rewards of the first `premine`
    /// blocks.
    pub fn premine_amount(&self) -> Digest {
        self.total_rewards(self.premine)
    }

    /// Whether `new_difficulty`, announced after a block interval of
    /// `block_interval` seconds, is at least as demanding as
    /// `previous_difficulty` spread over the target period.
    ///
    /// Both difficulties are divided by whole seconds. The new one passes if
    /// its quotient is smaller, or if the quotients agree and its remainder
    /// is no larger.
    pub fn verify_new_difficulty(
        &self,
        previous_difficulty: Digest,
        new_difficulty: Digest,
        block_interval: f64,
    ) -> bool {
        let (Some(interval), Some(period)) = (whole_seconds(block_interval), whole_seconds(self.period))
        else {
            return false;
        };

        let (new_quotient, new_remainder) = new_difficulty.div_mod(interval);
        let (previous_quotient, previous_remainder) = previous_difficulty.div_mod(period);

        new_quotient < previous_quotient
            || (new_quotient == previous_quotient && new_remainder <= previous_remainder)
    }
}

/// Seconds rounded down, or `None` if that leaves nothing to divide by.
fn whole_seconds(seconds: f64) -> Option<Digest> {
    let floored = seconds.floor();
    match floored >= 1.0 {
        true => Some(Digest::from(floored.min(u64::MAX as f64) as u64)),
        false => None,
    }
}

/// The addressed form of a [`Definition`], with its filters in an array.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(bound = "H: Hasher")]
pub struct DefinitionArtifact<H: Hasher> {
    /// See [`Definition::size`].
    pub size: Digest,
    /// See [`Definition::premine`].
    pub premine: Digest,
    /// See [`Definition::period`].
    pub period: f64,
    /// See [`Definition::initial_reward_exponent`].
    pub initial_reward_exponent: u32,
    /// The filter scripts.
    pub filters: Address<Array256<Scalar<String>, H>, H>,
}

impl<H: Hasher> DefinitionArtifact<H> {
    /// Addresses the parameters of a chain.
    pub fn new(
        size: Digest,
        premine: Digest,
        period: f64,
        initial_reward_exponent: u32,
        filters: Vec<String>,
    ) -> Self {
        Self {
            size,
            premine,
            period,
            initial_reward_exponent,
            filters: Address::new(Array256::from_values(filters)),
        }
    }

    /// Resolves the policy. Duplicate filters are kept once, in first-seen
    /// order.
    pub fn to_definition(&self) -> ConsensusResult<Definition> {
        let filters = self.filters.require()?.values()?;

        Definition::new(
            self.size,
            self.premine,
            self.period,
            self.initial_reward_exponent,
            filters.into_iter().unique().collect(),
        )
    }
}

impl<H: Hasher> From<&Definition> for DefinitionArtifact<H> {
    fn from(definition: &Definition) -> Self {
        Self::new(
            definition.size,
            definition.premine,
            definition.period,
            definition.initial_reward_exponent,
            definition.transaction_filters.clone(),
        )
    }
}

impl<H: Hasher> Artifact<H> for DefinitionArtifact<H> {
    fn canonical_bytes(&self) -> Vec<u8> {
        let mut stream = RlpStream::new_list(5);

        stream.append(&self.size);
        stream.append(&self.premine);
        stream.append(&self.period.to_bits());
        stream.append(&self.initial_reward_exponent);
        stream.append(&self.filters.digest());

        stream.out().to_vec()
    }

    fn is_complete(&self) -> bool {
        self.filters.is_complete()
    }
}

#[cfg(test)]
mod tests {
    use lattice_trie::Keccak;

    use super::*;

    fn definition(exponent: u32, premine: u64) -> Definition {
        Definition::new(
            Digest::from(1_000_000),
            Digest::from(premine),
            10.0,
            exponent,
            vec![],
        )
        .unwrap()
    }

    #[test]
    fn rejects_out_of_range_parameters() {
        let bad_exponent = Definition::new(Digest::one(), Digest::zero(), 1.0, 256, vec![]);
        let bad_period = Definition::new(Digest::one(), Digest::zero(), 0.0, 1, vec![]);
        let sub_second = Definition::new(Digest::one(), Digest::zero(), 0.5, 1, vec![]);
        let unbounded = Definition::new(Digest::one(), Digest::zero(), f64::INFINITY, 1, vec![]);

        assert!(matches!(bad_exponent, Err(ConsensusError::InvalidDefinition(_))));
        assert!(matches!(bad_period, Err(ConsensusError::InvalidDefinition(_))));
        assert!(matches!(sub_second, Err(ConsensusError::InvalidDefinition(_))));
        assert!(matches!(unbounded, Err(ConsensusError::InvalidDefinition(_))));
        assert!(Definition::new(Digest::one(), Digest::zero(), 1.0, 1, vec![]).is_ok());
    }

    #[test]
    fn first_reward_is_two_to_the_initial_exponent() {
        let def = definition(10, 0);

        assert_eq!(def.reward_at_block(Digest::zero()), Digest::from(1024));
        assert_eq!(def.reward_at_block(Digest::one()), Digest::from(1024));
    }

    #[test]
    fn reward_halves_every_interval_and_floors_at_one() {
        // 2^(256 - 253 - 1) = 4 blocks per halving.
        let def = definition(253, 0);
        let interval = def.halving_interval();
        assert_eq!(interval, Digest::from(4));

        let at = |i: u64| def.reward_at_block(Digest::from(i));
        let initial = Digest::one() << 253;

        assert_eq!(at(0), initial);
        assert_eq!(at(3), initial);
        assert_eq!(at(4), initial >> 1);
        assert_eq!(at(8), initial >> 2);
        assert_eq!(def.reward_at_block(interval * Digest::from(253)), Digest::one());
        assert_eq!(def.reward_at_block(Digest::MAX), Digest::one());
    }

    #[test]
    fn premine_offsets_the_curve() {
        let def = definition(253, 4);

        assert_eq!(def.reward_at_block(Digest::zero()), Digest::one() << 252);
        assert_eq!(def.premine_amount(), (Digest::one() << 253) * Digest::from(4));
    }

    #[test]
    fn total_rewards_sums_the_curve() {
        let def = definition(254, 0);
        // Two blocks per era: 2^254, 2^254, 2^253, 2^253, ...
        let two = Digest::from(2);
        let sum = |n: u64| (0..n).fold(Digest::zero(), |acc, i| acc + def.reward_at_block(i.into()));

        assert_eq!(def.total_rewards(Digest::zero()), Digest::zero());
        assert_eq!(def.total_rewards(Digest::from(3)), sum(3));
        assert_eq!(def.total_rewards(Digest::from(6)), sum(6));
        assert_eq!(def.total_rewards(two), Digest::one() << 255);
        assert_eq!(def.total_rewards(Digest::MAX), Digest::MAX);
    }

    #[test]
    fn small_exponent_premine_amount() {
        let def = definition(10, 1_000);

        assert_eq!(def.premine_amount(), Digest::from(1_024_000));
    }

    #[test]
    fn difficulty_must_not_get_easier() {
        let def = definition(10, 0);
        let previous = Digest::from(1000);

        // 1000 / 10 == 100 r 0.
        assert!(def.verify_new_difficulty(previous, Digest::from(1000), 10.0));
        assert!(def.verify_new_difficulty(previous, Digest::from(999), 10.0));
        assert!(!def.verify_new_difficulty(previous, Digest::from(1001), 10.0));
        assert!(def.verify_new_difficulty(previous, Digest::from(500), 5.5));
        assert!(!def.verify_new_difficulty(previous, Digest::from(501), 5.0));
        assert!(!def.verify_new_difficulty(previous, Digest::from(1), 0.5));
        assert!(!def.verify_new_difficulty(previous, Digest::from(1), f64::NAN));
    }

    #[test]
    fn shorter_intervals_never_help() {
        let def = definition(10, 0);
        let previous = Digest::from(1_000_000);

        for new in [999_000u64, 1_000_000, 1_200_000, 2_000_000, 9_000_000] {
            let passes = |interval: u64| {
                def.verify_new_difficulty(previous, new.into(), interval as f64)
            };

            for longer in 1..=30 {
                if passes(longer) {
                    continue;
                }
                for shorter in 1..longer {
                    assert!(!passes(shorter), "{new} passed at {shorter}s but not {longer}s");
                }
            }
        }
    }

    #[test]
    fn artifact_resolves_and_dedups_filters() {
        let artifact = DefinitionArtifact::<Keccak>::new(
            Digest::from(100),
            Digest::zero(),
            10.0,
            5,
            vec!["b".into(), "a".into(), "b".into()],
        );
        let definition = artifact.to_definition().unwrap();

        assert_eq!(definition.transaction_filters(), ["b", "a"]);
        assert_eq!(DefinitionArtifact::<Keccak>::from(&definition).to_definition().unwrap().size(), Digest::from(100));
    }

    #[test]
    fn masked_filters_are_incomplete() {
        let artifact = DefinitionArtifact::<Keccak>::new(Digest::one(), Digest::zero(), 1.0, 1, vec!["f".into()]);
        let masked = DefinitionArtifact {
            filters: artifact.filters.masked(),
            ..artifact.clone()
        };

        assert_eq!(
            Address::<_, Keccak>::new(masked.clone()).digest(),
            Address::<_, Keccak>::new(artifact).digest()
        );
        let err = masked.to_definition().unwrap_err();
        assert!(err.is_recoverable());
    }
}
