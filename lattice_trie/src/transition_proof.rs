//! Transition proofs: minimal sub-dictionaries that prove how a single key
//! is affected by an action, and the merging of several of them into one
//! witness.
//!
//! Everything not needed to replay the action is replaced with a
//! [`Node::Stub`] as far up the trie as possible:
//! - a [`ProofType::Creation`] proof reveals the path down to where the key
//!   would land, plus sibling digests. No old value is included.
//! - a [`ProofType::Mutation`] proof additionally includes the old leaf and
//!   its value.
//! - a [`ProofType::Deletion`] proof also reveals the top of the target
//!   leaf's sibling, since a lone sibling leaf has to be lifted once the
//!   target is gone.

use std::fmt;

use log::trace;
use serde::{Deserialize, Serialize};

use crate::{
    address::Artifact,
    dictionary::{Dictionary256, Node},
    digest::{Digest, DigestExt, DIGEST_BITS},
    error::{MerkleError, MerkleResult},
    hashing::{Hasher, Keccak},
    utils::NodeKind,
};

/// How an action affects the key it touches.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum ProofType {
    /// The key is absent before and present after.
    Creation,

    /// The key is present before and absent after.
    Deletion,

    /// The key is present before and after.
    Mutation,
}

/// A partial dictionary proving one key's transition against a base digest.
pub struct TransitionProof<V, H: Hasher = Keccak> {
    proof_type: ProofType,
    key: String,
    dictionary: Dictionary256<V, H>,
}

impl<V, H: Hasher> TransitionProof<V, H> {
    /// The kind of transition proven.
    pub fn proof_type(&self) -> ProofType {
        self.proof_type
    }

    /// The key the proof covers.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The digest of the dictionary the proof was taken from.
    pub fn base(&self) -> Digest {
        self.dictionary.digest()
    }

    /// The partial dictionary itself.
    pub fn dictionary(&self) -> &Dictionary256<V, H> {
        &self.dictionary
    }

    /// Unwraps the partial dictionary.
    pub fn into_dictionary(self) -> Dictionary256<V, H> {
        self.dictionary
    }

    /// Merges two proofs over the same base.
    pub fn merge(&self, other: &Self) -> MerkleResult<Dictionary256<V, H>> {
        merge(&self.dictionary, &other.dictionary)
    }
}

impl<V, H: Hasher> Clone for TransitionProof<V, H> {
    fn clone(&self) -> Self {
        Self {
            proof_type: self.proof_type,
            key: self.key.clone(),
            dictionary: self.dictionary.clone(),
        }
    }
}

impl<V, H: Hasher> fmt::Debug for TransitionProof<V, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransitionProof")
            .field("proof_type", &self.proof_type)
            .field("key", &self.key)
            .field("base", &format_args!("{:x}", self.base()))
            .finish()
    }
}

impl<V, H: Hasher> Dictionary256<V, H> {
    /// A proof of `proof_type` for `key`.
    ///
    /// The path to `key` must be materialized in `self`, and for deletions
    /// and mutations so must the old value.
    pub fn transition_proof(
        &self,
        proof_type: ProofType,
        key: &str,
    ) -> MerkleResult<TransitionProof<V, H>> {
        let path = H::hash(key.as_bytes());
        let root = reveal(self.root(), 0, key, path, proof_type)?;

        Ok(TransitionProof {
            proof_type,
            key: key.to_string(),
            dictionary: Dictionary256::from_root(root),
        })
    }

    /// The union of what `self` and `other` reveal. Both must share a root.
    pub fn merging(&self, other: &Self) -> MerkleResult<Self> {
        merge(self, other)
    }

    /// One merged witness proving every transition in `transitions`.
    pub fn transition_witness<'a, I>(&self, transitions: I) -> MerkleResult<Self>
    where
        I: IntoIterator<Item = (ProofType, &'a str)>,
    {
        transitions
            .into_iter()
            .try_fold(self.masking(), |witness, (proof_type, key)| {
                witness.merging(self.transition_proof(proof_type, key)?.dictionary())
            })
    }
}

/// Merges two partial dictionaries over the same root into one covering the
/// union of their materialized paths.
pub fn merge<V, H: Hasher>(
    left: &Dictionary256<V, H>,
    right: &Dictionary256<V, H>,
) -> MerkleResult<Dictionary256<V, H>> {
    merge_nodes(left.root(), right.root()).map(Dictionary256::from_root)
}

fn merge_nodes<V, H: Hasher>(a: &Node<V, H>, b: &Node<V, H>) -> MerkleResult<Node<V, H>> {
    if a.digest() != b.digest() {
        return Err(MerkleError::RootMismatch {
            left: a.digest(),
            right: b.digest(),
        });
    }

    match (a, b) {
        (Node::Stub(_), other) | (other, Node::Stub(_)) => Ok(other.clone()),
        (Node::Empty, Node::Empty) => Ok(Node::Empty),
        (Node::Leaf(x), Node::Leaf(y)) => {
            let keep_left = x.value().is_complete() || !y.value().is_verified();
            Ok(if keep_left { a.clone() } else { b.clone() })
        }
        (Node::Internal(x), Node::Internal(y)) => Ok(Node::internal(
            merge_nodes(x.left(), y.left())?,
            merge_nodes(x.right(), y.right())?,
        )),
        _ => Err(MerkleError::MalformedNode(a.digest())),
    }
}

fn reveal<V, H: Hasher>(
    node: &Node<V, H>,
    depth: usize,
    key: &str,
    path: Digest,
    proof_type: ProofType,
) -> MerkleResult<Node<V, H>> {
    trace!(
        "revealing {} node for {:?} (depth: {})",
        NodeKind::from(node),
        key,
        depth
    );

    match node {
        Node::Empty => Ok(Node::Empty),
        Node::Stub(d) => Err(MerkleError::TraversedStub(*d)),
        Node::Leaf(leaf) if leaf.key() == key && proof_type != ProofType::Creation => {
            leaf.value().require()?;
            Ok(node.clone())
        }
        Node::Leaf(leaf) => Ok(Node::leaf(leaf.key().to_string(), leaf.value().masked())),
        Node::Internal(branch) => {
            if depth >= DIGEST_BITS {
                return Err(MerkleError::MalformedNode(branch.digest()));
            }

            let bit = path.path_bit(depth);
            let on_path = branch.child(bit);
            let off_path = branch.child(!bit);

            let revealed = reveal(on_path, depth + 1, key, path, proof_type)?;
            let sibling = match (proof_type, on_path) {
                (ProofType::Deletion, Node::Leaf(leaf)) if leaf.key() == key => shallow(off_path)?,
                _ => off_path.stubbed(),
            };

            Ok(match bit {
                false => Node::internal(revealed, sibling),
                true => Node::internal(sibling, revealed),
            })
        }
    }
}

/// Reveals what kind of node `node` is without revealing anything below it.
fn shallow<V, H: Hasher>(node: &Node<V, H>) -> MerkleResult<Node<V, H>> {
    match node {
        Node::Empty => Ok(Node::Empty),
        Node::Stub(d) => Err(MerkleError::TraversedStub(*d)),
        Node::Leaf(leaf) => Ok(Node::leaf(leaf.key().to_string(), leaf.value().masked())),
        Node::Internal(branch) => Ok(Node::internal(
            branch.left().stubbed(),
            branch.right().stubbed(),
        )),
    }
}

impl<V: Artifact<H>, H: Hasher> TransitionProof<V, H> {
    /// The raw chunks of this proof, as consumed by
    /// [`capture`](crate::capture::capture).
    pub fn chunks(&self) -> Vec<Vec<u8>> {
        self.dictionary.contents().into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        capture::capture,
        testing_utils::{common_setup, random_keys, value, TestDictionary},
    };

    fn full_dictionary(n: usize, seed: u64) -> MerkleResult<(TestDictionary, Vec<String>)> {
        let keys = random_keys(n, seed);
        let dict =
            TestDictionary::from_entries(keys.iter().map(|k| (k.clone(), value(k.as_bytes()))))?;
        Ok((dict, keys))
    }

    #[test]
    fn proofs_keep_the_base_digest() -> MerkleResult<()> {
        common_setup();

        let (dict, keys) = full_dictionary(30, 1)?;

        for proof_type in [ProofType::Creation, ProofType::Deletion, ProofType::Mutation] {
            let proof = dict.transition_proof(proof_type, &keys[3])?;
            assert_eq!(proof.base(), dict.digest());
            assert!(!proof.dictionary().is_complete());
        }

        Ok(())
    }

    #[test]
    fn only_deletion_and_mutation_proofs_carry_the_old_value() -> MerkleResult<()> {
        let (dict, keys) = full_dictionary(30, 2)?;
        let key = &keys[0];

        let creation = dict.transition_proof(ProofType::Creation, key)?;
        let mutation = dict.transition_proof(ProofType::Mutation, key)?;
        let deletion = dict.transition_proof(ProofType::Deletion, key)?;

        assert!(creation.dictionary().get(key)?.unwrap().is_stub());
        assert!(mutation.dictionary().get(key)?.unwrap().is_verified());
        assert!(deletion.dictionary().get(key)?.unwrap().is_verified());

        Ok(())
    }

    #[test]
    fn merged_witness_replays_like_the_full_dictionary() -> MerkleResult<()> {
        common_setup();

        let (dict, keys) = full_dictionary(50, 3)?;
        let created = "receipt/fresh".to_string();

        let witness = dict.transition_witness([
            (ProofType::Mutation, keys[1].as_str()),
            (ProofType::Deletion, keys[2].as_str()),
            (ProofType::Creation, created.as_str()),
        ])?;
        let chunks: Vec<Vec<u8>> = witness.contents().into_values().collect();
        let partial: TestDictionary =
            capture(dict.digest(), [&keys[1], &keys[2], &created], chunks)?;

        let replay = |d: &TestDictionary| -> MerkleResult<Digest> {
            Ok(d.setting(keys[1].clone(), value(b"changed"))?
                .deleting(&keys[2])?
                .setting(created.clone(), value(b"new"))?
                .digest())
        };

        assert_eq!(replay(&partial)?, replay(&dict)?);

        Ok(())
    }

    #[test]
    fn every_key_can_be_deleted_from_its_own_proof() -> MerkleResult<()> {
        let (dict, keys) = full_dictionary(25, 4)?;

        for key in &keys {
            let proof = dict.transition_proof(ProofType::Deletion, key)?;
            let expected = dict.deleting(key)?.digest();

            assert_eq!(proof.dictionary().deleting(key)?.digest(), expected);
        }

        Ok(())
    }

    #[test]
    fn mutation_proof_is_not_enough_for_a_deletion() -> MerkleResult<()> {
        let (dict, keys) = full_dictionary(2, 5)?;
        let proof = dict.transition_proof(ProofType::Mutation, &keys[0])?;

        // With two keys the sibling is a lone leaf that must be lifted.
        assert!(matches!(
            proof.dictionary().deleting(&keys[0]),
            Err(MerkleError::TraversedStub(_))
        ));

        Ok(())
    }

    #[test]
    fn proofs_over_different_roots_do_not_merge() -> MerkleResult<()> {
        let (a, keys) = full_dictionary(10, 6)?;
        let b = a.setting(keys[0].clone(), value(b"other"))?;

        let pa = a.transition_proof(ProofType::Mutation, &keys[0])?;
        let pb = b.transition_proof(ProofType::Mutation, &keys[0])?;

        let res = pa.merge(&pb);
        assert!(matches!(
            res,
            Err(MerkleError::RootMismatch { left, right })
                if left == a.digest() && right == b.digest()
        ));

        Ok(())
    }

    #[test]
    fn proofs_need_a_materialized_path() -> MerkleResult<()> {
        let (dict, keys) = full_dictionary(10, 8)?;

        assert!(matches!(
            dict.masking().transition_proof(ProofType::Creation, &keys[0]),
            Err(MerkleError::TraversedStub(_))
        ));

        Ok(())
    }
}
