//! Reconstructing a partial [`Dictionary256`] from raw witness chunks.
//!
//! Chunks are indexed by their own hash and the trie is rebuilt top-down from
//! a trusted root digest. Any digest without a matching chunk becomes a
//! [`Node::Stub`], so a tampered chunk simply fails to be found. A capture
//! fails with [`MerkleError::ProofMismatch`] when one of its target keys can't
//! be resolved all the way to a leaf (or to a proof of absence) from the
//! chunks it was given.

use std::collections::{BTreeSet, HashMap};

use log::trace;

use crate::{
    address::{Address, Artifact, CanonicalDecode},
    dictionary::{check_route, Dictionary256, Node},
    digest::{Digest, DIGEST_BITS},
    error::{MerkleError, MerkleResult},
    hashing::Hasher,
    node_encoding::{decode_dictionary_node, RawNode},
    utils::display_path,
};

/// A root digest and the keys a capture against it must prove.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CaptureRequest {
    root: Digest,
    targets: BTreeSet<String>,
}

impl CaptureRequest {
    /// Targets `keys` under `root`.
    pub fn new<I, K>(root: Digest, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self {
            root,
            targets: keys.into_iter().map(Into::into).collect(),
        }
    }

    /// The trusted root.
    pub fn root(&self) -> Digest {
        self.root
    }

    /// The keys that must be proven.
    pub fn targets(&self) -> &BTreeSet<String> {
        &self.targets
    }

    /// Reconstructs the partial dictionary proven by `chunks`.
    pub fn capture<V, H, I, B>(&self, chunks: I) -> MerkleResult<Dictionary256<V, H>>
    where
        V: Artifact<H> + CanonicalDecode,
        H: Hasher,
        I: IntoIterator<Item = B>,
        B: AsRef<[u8]>,
    {
        let chunks: Vec<B> = chunks.into_iter().collect();
        let index: HashMap<Digest, &[u8]> = chunks
            .iter()
            .map(|chunk| (H::hash(chunk.as_ref()), chunk.as_ref()))
            .collect();

        let mut route = Vec::new();
        let root = rebuild::<V, H>(self.root, &index, &mut route)?;
        let dictionary = Dictionary256::from_root(root);

        for key in &self.targets {
            let unproven = match dictionary.get(key) {
                Ok(Some(value)) if !value.is_verified() => value.digest(),
                Ok(_) => continue,
                Err(MerkleError::TraversedStub(d)) => d,
                Err(e) => return Err(e),
            };

            trace!("capture under {:x} can't prove key {:?}", self.root, key);
            return Err(MerkleError::ProofMismatch {
                root: self.root,
                unproven,
            });
        }

        Ok(dictionary)
    }
}

impl<V, H: Hasher> Dictionary256<V, H> {
    /// A capture request for `keys` against this dictionary's root.
    pub fn targeting<I, K>(&self, keys: I) -> CaptureRequest
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        CaptureRequest::new(self.digest(), keys)
    }
}

/// Reconstructs a partial dictionary under `root` that proves every key in
/// `target_keys` from `raw_chunks`.
///
/// With no target keys this is a best-effort reconstruction of whatever the
/// chunks reveal; it only fails on chunks that hash correctly but are
/// malformed.
pub fn capture<V, H, I, B, K>(
    root: Digest,
    target_keys: impl IntoIterator<Item = K>,
    raw_chunks: I,
) -> MerkleResult<Dictionary256<V, H>>
where
    V: Artifact<H> + CanonicalDecode,
    H: Hasher,
    I: IntoIterator<Item = B>,
    B: AsRef<[u8]>,
    K: Into<String>,
{
    CaptureRequest::new(root, target_keys).capture(raw_chunks)
}

fn rebuild<V, H>(
    digest: Digest,
    index: &HashMap<Digest, &[u8]>,
    route: &mut Vec<bool>,
) -> MerkleResult<Node<V, H>>
where
    V: Artifact<H> + CanonicalDecode,
    H: Hasher,
{
    if digest.is_zero() {
        return Ok(Node::Empty);
    }

    let Some(bytes) = index.get(&digest) else {
        return Ok(Node::Stub(digest));
    };

    trace!("captured node {:x} at path {}", digest, display_path(route));

    let node = match decode_dictionary_node(bytes).ok_or(MerkleError::MalformedNode(digest))? {
        RawNode::Leaf { key, value } => {
            let value = match index.get(&value).and_then(|b| V::decode_canonical(b)) {
                Some(artifact) => Address::verified(value, artifact)?,
                None => Address::stub(value),
            };

            let leaf = Node::leaf(key, value);
            check_route(&leaf, route)?;
            leaf
        }
        RawNode::Internal { left, right } => {
            if route.len() >= DIGEST_BITS {
                return Err(MerkleError::MalformedNode(digest));
            }

            route.push(false);
            let left = rebuild(left, index, route)?;
            route.pop();

            route.push(true);
            let right = rebuild(right, index, route)?;
            route.pop();

            Node::canonical_internal(left, right).ok_or(MerkleError::MalformedNode(digest))?
        }
    };

    // A chunk that decodes but doesn't re-encode to itself isn't canonical.
    match node.digest() == digest {
        true => Ok(node),
        false => Err(MerkleError::MalformedNode(digest)),
    }
}
