//! Signing capability and the default ed25519/keccak provider.

use ed25519_dalek::{
    Signature, Signer, SigningKey, Verifier, VerifyingKey, PUBLIC_KEY_LENGTH, SECRET_KEY_LENGTH,
};
use lattice_trie::{Digest, Hasher, Keccak};
use rand::{CryptoRng, RngCore};

/// Produces and checks signatures over byte messages.
pub trait SignatureScheme {
    /// Signs `message`, or `None` if `private_key` is malformed.
    fn sign(message: &[u8], private_key: &[u8]) -> Option<Vec<u8>>;

    /// Whether `signature` is valid for `message` under `public_key`.
    /// Malformed keys or signatures are simply invalid.
    fn verify(message: &[u8], public_key: &[u8], signature: &[u8]) -> bool;
}

/// Everything consensus needs from cryptography: hashing for digests and
/// signatures for authorization.
pub trait CryptoProvider: Hasher + SignatureScheme {}

impl<T: Hasher + SignatureScheme> CryptoProvider for T {}

/// Keccak-256 digests with ed25519 signatures.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct Ed25519Keccak;

impl Hasher for Ed25519Keccak {
    fn hash(bytes: &[u8]) -> Digest {
        Keccak::hash(bytes)
    }
}

impl SignatureScheme for Ed25519Keccak {
    fn sign(message: &[u8], private_key: &[u8]) -> Option<Vec<u8>> {
        let seed: [u8; SECRET_KEY_LENGTH] = private_key.try_into().ok()?;
        let signing_key = SigningKey::from_bytes(&seed);

        Some(signing_key.sign(message).to_bytes().to_vec())
    }

    fn verify(message: &[u8], public_key: &[u8], signature: &[u8]) -> bool {
        let Ok(key_bytes) = <[u8; PUBLIC_KEY_LENGTH]>::try_from(public_key) else {
            return false;
        };
        let Ok(verifying_key) = VerifyingKey::from_bytes(&key_bytes) else {
            return false;
        };
        let Ok(signature) = Signature::from_slice(signature) else {
            return false;
        };

        verifying_key.verify(message, &signature).is_ok()
    }
}

/// A public/private key pair in the byte form used by [`Ed25519Keccak`].
#[derive(Clone, Eq, PartialEq)]
pub struct Keypair {
    /// 32-byte ed25519 public key.
    pub public_key: Vec<u8>,
    /// 32-byte ed25519 seed.
    pub private_key: Vec<u8>,
}

impl Keypair {
    /// Derives the key pair for a fixed seed.
    pub fn from_seed(seed: [u8; SECRET_KEY_LENGTH]) -> Self {
        let signing_key = SigningKey::from_bytes(&seed);

        Self {
            public_key: signing_key.verifying_key().to_bytes().to_vec(),
            private_key: seed.to_vec(),
        }
    }

    /// A fresh random key pair.
    pub fn generate<R: CryptoRng + RngCore>(rng: &mut R) -> Self {
        let mut seed = [0; SECRET_KEY_LENGTH];
        rng.fill_bytes(&mut seed);
        Self::from_seed(seed)
    }

    /// The signer digest this key authorizes: the hash of the public key.
    pub fn signer<C: CryptoProvider>(&self) -> Digest {
        C::hash(&self.public_key)
    }
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keypair")
            .field("public_key", &hex::encode(&self.public_key))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signatures_verify_only_for_their_message_and_key() {
        let alice = Keypair::from_seed([1; 32]);
        let bob = Keypair::from_seed([2; 32]);
        let signature = Ed25519Keccak::sign(b"message", &alice.private_key).unwrap();

        assert!(Ed25519Keccak::verify(b"message", &alice.public_key, &signature));
        assert!(!Ed25519Keccak::verify(b"massage", &alice.public_key, &signature));
        assert!(!Ed25519Keccak::verify(b"message", &bob.public_key, &signature));
    }

    #[test]
    fn malformed_inputs_never_verify() {
        let alice = Keypair::from_seed([3; 32]);
        let mut signature = Ed25519Keccak::sign(b"m", &alice.private_key).unwrap();

        assert_eq!(Ed25519Keccak::sign(b"m", &[0; 7]), None);
        assert!(!Ed25519Keccak::verify(b"m", &[0; 5], &signature));

        signature.push(0);
        assert!(!Ed25519Keccak::verify(b"m", &alice.public_key, &signature));
    }

    #[test]
    fn signer_is_the_hash_of_the_public_key() {
        let alice = Keypair::from_seed([4; 32]);

        assert_eq!(
            alice.signer::<Ed25519Keccak>(),
            Keccak::hash(&alice.public_key)
        );
    }
}
