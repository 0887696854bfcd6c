//! [`Array256`]: an ordered, digest-addressed sequence.

use serde::{Deserialize, Serialize};

use crate::{
    address::{Address, Artifact},
    error::MerkleResult,
    hashing::{Hasher, Keccak},
    node_encoding::encode_array,
    scalar::{Scalar, ScalarPayload},
};

/// An ordered sequence of [`Address`]es whose digest commits to the ordered
/// child digests.
///
/// Arrays are built once from their elements; there is no removal.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(bound(
    serialize = "T: Serialize",
    deserialize = "T: Artifact<H> + Deserialize<'de>"
))]
pub struct Array256<T, H: Hasher = Keccak> {
    children: Vec<Address<T, H>>,
}

impl<T, H: Hasher> Default for Array256<T, H> {
    fn default() -> Self {
        Self {
            children: Vec::new(),
        }
    }
}

impl<T, H: Hasher> Array256<T, H> {
    /// Builds an array over already-addressed children.
    pub fn from_addresses(children: Vec<Address<T, H>>) -> Self {
        Self { children }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// Whether the array has no elements.
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// The address at `index`.
    pub fn get(&self, index: usize) -> Option<&Address<T, H>> {
        self.children.get(index)
    }

    /// All child addresses in order.
    pub fn addresses(&self) -> &[Address<T, H>] {
        &self.children
    }

    /// Every element, failing on the first one that isn't materialized.
    pub fn artifacts(&self) -> MerkleResult<Vec<&T>> {
        self.children.iter().map(Address::require).collect()
    }

    /// The same array with every element replaced by its stub.
    pub fn masked_children(&self) -> Self {
        Self::from_addresses(self.children.iter().map(Address::masked).collect())
    }
}

impl<T: Artifact<H>, H: Hasher> Array256<T, H> {
    /// Builds an array by addressing each element.
    pub fn from_artifacts<I: IntoIterator<Item = T>>(elements: I) -> Self {
        Self::from_addresses(elements.into_iter().map(Address::new).collect())
    }
}

impl<T: ScalarPayload, H: Hasher> Array256<Scalar<T>, H> {
    /// Builds an array of scalars.
    pub fn from_values<I: IntoIterator<Item = T>>(values: I) -> Self {
        Self::from_artifacts(values.into_iter().map(Scalar::new))
    }

    /// Every scalar value, failing on the first one that isn't materialized.
    pub fn values(&self) -> MerkleResult<Vec<T>> {
        self.children
            .iter()
            .map(|child| child.require().map(|s| s.value().clone()))
            .collect()
    }
}

impl<T: Artifact<H>, H: Hasher> Artifact<H> for Array256<T, H> {
    fn canonical_bytes(&self) -> Vec<u8> {
        let digests: Vec<_> = self.children.iter().map(Address::digest).collect();
        encode_array(digests.iter())
    }

    fn is_complete(&self) -> bool {
        self.children.iter().all(Address::is_complete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{digest::Digest, error::MerkleError};

    type Bytes = Array256<Scalar<Vec<u8>>>;

    fn digest(a: &Bytes) -> Digest {
        Address::new(a.clone()).digest()
    }

    #[test]
    fn digest_depends_on_order() {
        let ab = Bytes::from_values(vec![vec![1], vec![2]]);
        let ba = Bytes::from_values(vec![vec![2], vec![1]]);

        assert_ne!(digest(&ab), digest(&ba));
        assert_eq!(digest(&ab), digest(&Bytes::from_values(vec![vec![1], vec![2]])));
    }

    #[test]
    fn masking_children_keeps_digest_but_loses_completeness() {
        let array = Bytes::from_values(vec![vec![1], vec![2], vec![3]]);
        let masked = array.masked_children();

        assert_eq!(digest(&array), digest(&masked));
        assert!(Address::new(array.clone()).is_complete());
        assert!(!Address::new(masked.clone()).is_complete());
        assert_eq!(array.values().unwrap(), vec![vec![1], vec![2], vec![3]]);
        assert!(matches!(
            masked.values(),
            Err(MerkleError::IncompleteArtifact(_))
        ));
    }

    #[test]
    fn empty_array_is_complete() {
        let empty = Bytes::default();

        assert!(empty.is_empty());
        assert!(Address::new(empty).is_complete());
    }
}
