//! The hashing capability every Merkle structure is parameterized over.

use std::fmt::Debug;

use ethereum_types::U256;
use keccak_hash::keccak;

use crate::digest::Digest;

/// A deterministic, collision-resistant hash from bytes to a [`Digest`].
///
/// Hashers are zero-sized markers. Any nondeterminism here invalidates every
/// digest comparison made by this library.
pub trait Hasher: Copy + Debug + Default + Eq + Send + Sync + 'static {
    /// Hashes `bytes`.
    fn hash(bytes: &[u8]) -> Digest;
}

/// Keccak-256, the default [`Hasher`].
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct Keccak;

impl Hasher for Keccak {
    fn hash(bytes: &[u8]) -> Digest {
        U256::from_big_endian(keccak(bytes).as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keccak_matches_known_empty_hash() {
        let expected = U256::from_big_endian(
            &hex::decode("c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470")
                .unwrap(),
        );

        assert_eq!(Keccak::hash(&[]), expected);
    }

    #[test]
    fn hashing_is_deterministic() {
        assert_eq!(Keccak::hash(b"lattice"), Keccak::hash(b"lattice"));
        assert_ne!(Keccak::hash(b"lattice"), Keccak::hash(b"lattic3"));
    }
}
