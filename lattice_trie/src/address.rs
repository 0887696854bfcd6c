//! [`Address`]: a digest plus an optional materialized artifact.

use std::{
    fmt::{self, Debug},
    marker::PhantomData,
    sync::Arc,
};

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::{
    digest::Digest,
    error::{MerkleError, MerkleResult},
    hashing::{Hasher, Keccak},
};

/// A content-addressed structural node.
///
/// The digest of an artifact is the hash of its canonical bytes, where the
/// canonical bytes of a composite artifact only mention the digests of its
/// children.
pub trait Artifact<H: Hasher>: Clone + Debug + Send + Sync + 'static {
    /// The canonical encoding used for hashing and exchange.
    fn canonical_bytes(&self) -> Vec<u8>;

    /// The digest this artifact is addressed by.
    fn compute_digest(&self) -> Digest {
        H::hash(&self.canonical_bytes())
    }

    /// Whether every child address reachable from this artifact is complete.
    fn is_complete(&self) -> bool;
}

/// Artifacts that can be rebuilt from their canonical bytes alone.
///
/// Only leaf-like artifacts (those whose canonical bytes are the whole
/// artifact) can implement this.
pub trait CanonicalDecode: Sized {
    /// Decodes canonical bytes produced by [`Artifact::canonical_bytes`].
    fn decode_canonical(bytes: &[u8]) -> Option<Self>;
}

/// A digest and, optionally, the artifact it refers to.
///
/// An address is in one of three states:
/// - a *stub*: only the digest is known.
/// - a *hint*: an artifact is attached but was never checked against the
///   digest, so only the digest is trusted.
/// - *verified*: the artifact hashes to the digest. If additionally every
///   address reachable from the artifact is complete, the address is
///   *complete*.
///
/// Addresses are immutable. They compare equal when their digests are equal.
pub struct Address<T, H: Hasher = Keccak> {
    digest: Digest,
    artifact: Option<Arc<T>>,
    verified: bool,
    complete: bool,
    _hasher: PhantomData<fn() -> H>,
}

impl<T, H: Hasher> Address<T, H> {
    /// An address that only knows its digest.
    pub fn stub(digest: Digest) -> Self {
        Self {
            digest,
            artifact: None,
            verified: false,
            complete: false,
            _hasher: PhantomData,
        }
    }

    /// The digest this address refers to.
    pub fn digest(&self) -> Digest {
        self.digest
    }

    /// The attached artifact, whether or not it was verified.
    pub fn artifact(&self) -> Option<&T> {
        self.artifact.as_deref()
    }

    /// The attached artifact, only if it hashes to the digest.
    pub fn verified_artifact(&self) -> Option<&T> {
        self.verified.then(|| self.artifact.as_deref()).flatten()
    }

    /// Whether the attached artifact has been checked against the digest.
    pub fn is_verified(&self) -> bool {
        self.verified
    }

    /// Whether the full subtree below this address is materialized and
    /// verified.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Whether this address carries no artifact at all.
    pub fn is_stub(&self) -> bool {
        self.artifact.is_none()
    }

    /// The same digest with the artifact dropped.
    pub fn masked(&self) -> Self {
        Self::stub(self.digest)
    }

    /// The verified artifact, or [`MerkleError::IncompleteArtifact`].
    pub fn require(&self) -> MerkleResult<&T> {
        self.verified_artifact()
            .ok_or(MerkleError::IncompleteArtifact(self.digest))
    }

    /// The artifact, but only if the whole subtree below it is present.
    pub fn require_complete(&self) -> MerkleResult<&T> {
        match self.complete {
            true => self.require(),
            false => Err(MerkleError::IncompleteArtifact(self.digest)),
        }
    }
}

impl<T: Artifact<H>, H: Hasher> Address<T, H> {
    /// Addresses `artifact` by its own digest.
    pub fn new(artifact: T) -> Self {
        let digest = artifact.compute_digest();
        let complete = artifact.is_complete();

        Self {
            digest,
            artifact: Some(Arc::new(artifact)),
            verified: true,
            complete,
            _hasher: PhantomData,
        }
    }

    /// Attaches `artifact` to `digest` without checking it.
    pub fn hint(digest: Digest, artifact: T) -> Self {
        Self {
            digest,
            artifact: Some(Arc::new(artifact)),
            verified: false,
            complete: false,
            _hasher: PhantomData,
        }
    }

    /// Attaches `artifact` to `digest`, failing unless it hashes to it.
    pub fn verified(digest: Digest, artifact: T) -> MerkleResult<Self> {
        let found = artifact.compute_digest();
        if found != digest {
            return Err(MerkleError::DigestMismatch {
                expected: digest,
                found,
            });
        }

        Ok(Self::new(artifact))
    }

    /// Turns a hint into a verified address.
    pub fn verify(&self) -> MerkleResult<Self> {
        match (&self.artifact, self.verified) {
            (_, true) => Ok(self.clone()),
            (Some(artifact), false) => Self::verified(self.digest, T::clone(artifact.as_ref())),
            (None, false) => Err(MerkleError::IncompleteArtifact(self.digest)),
        }
    }
}

impl<T, H: Hasher> Clone for Address<T, H> {
    fn clone(&self) -> Self {
        Self {
            digest: self.digest,
            artifact: self.artifact.clone(),
            verified: self.verified,
            complete: self.complete,
            _hasher: PhantomData,
        }
    }
}

impl<T, H: Hasher> Debug for Address<T, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Address")
            .field("digest", &format_args!("{:x}", self.digest))
            .field("materialized", &self.artifact.is_some())
            .field("verified", &self.verified)
            .field("complete", &self.complete)
            .finish()
    }
}

impl<T, H: Hasher> PartialEq for Address<T, H> {
    fn eq(&self, other: &Self) -> bool {
        self.digest == other.digest
    }
}

impl<T, H: Hasher> Eq for Address<T, H> {}

#[derive(Serialize)]
struct AddressRef<'a, T> {
    digest: Digest,
    #[serde(skip_serializing_if = "Option::is_none")]
    artifact: Option<&'a T>,
}

#[derive(Deserialize)]
struct AddressOwned<T> {
    digest: Digest,
    #[serde(default = "Option::default")]
    artifact: Option<T>,
}

impl<T: Serialize, H: Hasher> Serialize for Address<T, H> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        AddressRef {
            digest: self.digest,
            artifact: self.artifact.as_deref(),
        }
        .serialize(serializer)
    }
}

impl<'de, T, H> Deserialize<'de> for Address<T, H>
where
    T: Artifact<H> + Deserialize<'de>,
    H: Hasher,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let owned = AddressOwned::<T>::deserialize(deserializer)?;

        match owned.artifact {
            Some(artifact) => Self::verified(owned.digest, artifact).map_err(de::Error::custom),
            None => Ok(Self::stub(owned.digest)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scalar::Scalar;

    type TestAddress = Address<Scalar<Vec<u8>>>;

    #[test]
    fn new_addresses_are_complete() {
        let address = TestAddress::new(Scalar::new(vec![1, 2, 3]));

        assert!(address.is_verified());
        assert!(address.is_complete());
        assert_eq!(address.require().unwrap().value(), &vec![1, 2, 3]);
    }

    #[test]
    fn stubs_and_hints_are_not_trusted() {
        let digest = TestAddress::new(Scalar::new(vec![9])).digest();
        let stub = TestAddress::stub(digest);
        let hint = TestAddress::hint(digest, Scalar::new(vec![9]));

        assert!(stub.is_stub());
        assert_eq!(stub.require(), Err(MerkleError::IncompleteArtifact(digest)));
        assert!(hint.artifact().is_some());
        assert!(hint.verified_artifact().is_none());
        assert!(hint.verify().unwrap().is_complete());
        assert_eq!(stub, hint);
    }

    #[test]
    fn verified_rejects_wrong_digest() {
        let res = TestAddress::verified(Digest::from(5), Scalar::new(vec![1]));

        assert!(matches!(res, Err(MerkleError::DigestMismatch { .. })));
    }

    #[test]
    fn deserialization_rehashes_artifact() {
        let address = TestAddress::new(Scalar::new(b"abc".to_vec()));
        let json = serde_json::to_string(&address).unwrap();
        let decoded: TestAddress = serde_json::from_str(&json).unwrap();
        assert!(decoded.is_complete());
        assert_eq!(decoded, address);

        let forged = json.replace(&format!("{:x}", address.digest()), "1234");
        assert!(serde_json::from_str::<TestAddress>(&forged).is_err());

        let masked = serde_json::to_string(&address.masked()).unwrap();
        assert!(serde_json::from_str::<TestAddress>(&masked)
            .unwrap()
            .is_stub());
    }
}
