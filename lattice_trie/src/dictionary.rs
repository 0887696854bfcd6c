//! [`Dictionary256`]: a sharded Merkle mapping from string keys to
//! [`Address`]es.
//!
//! Keys are placed along the most-significant-first bits of `H::hash(key)`.
//! A leaf sits at the shallowest depth that separates it from every other key
//! in the dictionary, so the shape of the trie (and therefore its digest) is a
//! function of the key/value set alone and never of insertion order. As a
//! consequence an internal node always has at least two leaves below it.
//!
//! Any subtree may be replaced by a [`Node::Stub`] carrying the digest of what
//! it replaces. Operations that need to look inside a stub fail with
//! [`MerkleError::TraversedStub`] instead of guessing.

use std::{collections::BTreeMap, fmt, sync::Arc};

use log::trace;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::{
    address::{Address, Artifact},
    digest::{Digest, DigestExt, DIGEST_BITS},
    error::{MerkleError, MerkleResult},
    hashing::{Hasher, Keccak},
    node_encoding::{encode_internal, encode_leaf},
    utils::{display_path, NodeKind},
};

/// A node of a [`Dictionary256`].
pub enum Node<V, H: Hasher> {
    /// An empty subtree. Its digest is zero.
    Empty,

    /// A subtree that is only known by its digest.
    Stub(Digest),

    /// A single key/value entry.
    Leaf(Arc<Leaf<V, H>>),

    /// A subtree with at least two leaves below it.
    Internal(Arc<Internal<V, H>>),
}

/// A key/value entry of a [`Dictionary256`].
pub struct Leaf<V, H: Hasher> {
    key: String,
    path: Digest,
    value: Address<V, H>,
    digest: Digest,
}

/// A branching node of a [`Dictionary256`].
pub struct Internal<V, H: Hasher> {
    left: Node<V, H>,
    right: Node<V, H>,
    digest: Digest,
}

impl<V, H: Hasher> Leaf<V, H> {
    pub(crate) fn new(key: String, value: Address<V, H>) -> Arc<Self> {
        let path = H::hash(key.as_bytes());
        let digest = H::hash(&encode_leaf(&key, &value.digest()));

        Arc::new(Self {
            key,
            path,
            value,
            digest,
        })
    }

    /// The entry's key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The entry's value.
    pub fn value(&self) -> &Address<V, H> {
        &self.value
    }

    /// The hash of the key, which determines the leaf's position.
    pub fn path(&self) -> Digest {
        self.path
    }

    /// The leaf's Merkle digest.
    pub fn digest(&self) -> Digest {
        self.digest
    }
}

impl<V, H: Hasher> Internal<V, H> {
    /// The child taken when the path bit is `0`.
    pub fn left(&self) -> &Node<V, H> {
        &self.left
    }

    /// The child taken when the path bit is `1`.
    pub fn right(&self) -> &Node<V, H> {
        &self.right
    }

    /// The branch's Merkle digest.
    pub fn digest(&self) -> Digest {
        self.digest
    }

    pub(crate) fn child(&self, bit: bool) -> &Node<V, H> {
        match bit {
            false => &self.left,
            true => &self.right,
        }
    }
}

impl<V, H: Hasher> Node<V, H> {
    /// The Merkle digest of this subtree.
    pub fn digest(&self) -> Digest {
        match self {
            Node::Empty => Digest::zero(),
            Node::Stub(d) => *d,
            Node::Leaf(leaf) => leaf.digest,
            Node::Internal(branch) => branch.digest,
        }
    }

    pub(crate) fn leaf(key: String, value: Address<V, H>) -> Self {
        Node::Leaf(Leaf::new(key, value))
    }

    /// A stub for `digest`, or an empty node for the zero digest.
    pub(crate) fn stub_or_empty(digest: Digest) -> Self {
        match digest.is_zero() {
            true => Node::Empty,
            false => Node::Stub(digest),
        }
    }

    pub(crate) fn internal(left: Self, right: Self) -> Self {
        let digest = H::hash(&encode_internal(&left.digest(), &right.digest()));

        Node::Internal(Arc::new(Internal {
            left,
            right,
            digest,
        }))
    }

    /// Like [`Node::internal`], but rejects branches that a canonical trie
    /// would have collapsed into their single leaf.
    pub(crate) fn canonical_internal(left: Self, right: Self) -> Option<Self> {
        match (&left, &right) {
            (Node::Empty, Node::Empty | Node::Leaf(_)) | (Node::Leaf(_), Node::Empty) => None,
            _ => Some(Self::internal(left, right)),
        }
    }

    /// The stub standing in for this subtree. Empty subtrees stay empty.
    pub(crate) fn stubbed(&self) -> Self {
        match self {
            Node::Empty => Node::Empty,
            other => Node::Stub(other.digest()),
        }
    }

    /// The canonical encoding of this node, if it has one.
    pub(crate) fn encode(&self) -> Option<Vec<u8>> {
        match self {
            Node::Empty | Node::Stub(_) => None,
            Node::Leaf(leaf) => Some(encode_leaf(&leaf.key, &leaf.value.digest())),
            Node::Internal(branch) => Some(encode_internal(
                &branch.left.digest(),
                &branch.right.digest(),
            )),
        }
    }

    fn is_complete(&self) -> bool {
        match self {
            Node::Empty => true,
            Node::Stub(_) => false,
            Node::Leaf(leaf) => leaf.value.is_complete(),
            Node::Internal(branch) => branch.left.is_complete() && branch.right.is_complete(),
        }
    }
}

impl<V, H: Hasher> Clone for Node<V, H> {
    fn clone(&self) -> Self {
        match self {
            Node::Empty => Node::Empty,
            Node::Stub(d) => Node::Stub(*d),
            Node::Leaf(leaf) => Node::Leaf(leaf.clone()),
            Node::Internal(branch) => Node::Internal(branch.clone()),
        }
    }
}

impl<V, H: Hasher> fmt::Debug for Node<V, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Empty => write!(f, "Empty"),
            Node::Stub(d) => write!(f, "Stub({d:x})"),
            Node::Leaf(leaf) => f.debug_struct("Leaf").field("key", &leaf.key).finish(),
            Node::Internal(branch) => f
                .debug_struct("Internal")
                .field("left", &branch.left)
                .field("right", &branch.right)
                .finish(),
        }
    }
}

impl<V, H: Hasher> fmt::Debug for Leaf<V, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Leaf")
            .field("key", &self.key)
            .field("value", &self.value)
            .finish()
    }
}

impl<V, H: Hasher> fmt::Debug for Internal<V, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Internal({:x})", self.digest)
    }
}

/// A Merkle mapping from string keys to [`Address`]es.
///
/// Dictionaries are immutable: every modification returns a new dictionary
/// that shares all untouched subtrees with the original.
pub struct Dictionary256<V, H: Hasher = Keccak> {
    root: Node<V, H>,
}

impl<V, H: Hasher> Default for Dictionary256<V, H> {
    fn default() -> Self {
        Self { root: Node::Empty }
    }
}

impl<V, H: Hasher> Clone for Dictionary256<V, H> {
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
        }
    }
}

impl<V, H: Hasher> fmt::Debug for Dictionary256<V, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dictionary256")
            .field("digest", &format_args!("{:x}", self.digest()))
            .field("root", &NodeKind::from(&self.root))
            .field("materialized_entries", &self.entries().len())
            .finish()
    }
}

impl<V, H: Hasher> Dictionary256<V, H> {
    /// An empty dictionary.
    pub fn new() -> Self {
        Self::default()
    }

    /// A dictionary known only by its root digest.
    pub fn stub(digest: Digest) -> Self {
        Self::from_root(Node::stub_or_empty(digest))
    }

    pub(crate) fn from_root(root: Node<V, H>) -> Self {
        Self { root }
    }

    /// The root node.
    pub fn root(&self) -> &Node<V, H> {
        &self.root
    }

    /// The root digest. Zero for the empty dictionary.
    pub fn digest(&self) -> Digest {
        self.root.digest()
    }

    /// Whether the dictionary is known to hold no entries.
    pub fn is_empty(&self) -> bool {
        matches!(self.root, Node::Empty)
    }

    /// Whether every node and every value is materialized.
    pub fn is_complete(&self) -> bool {
        self.root.is_complete()
    }

    /// Looks up `key`.
    ///
    /// Returns `Ok(None)` only when the dictionary proves the key is absent,
    /// and an error when the answer lies inside a stub.
    pub fn get(&self, key: &str) -> MerkleResult<Option<&Address<V, H>>> {
        let path = H::hash(key.as_bytes());
        let mut node = &self.root;
        let mut depth = 0;

        loop {
            match node {
                Node::Empty => return Ok(None),
                Node::Stub(d) => return Err(MerkleError::TraversedStub(*d)),
                Node::Leaf(leaf) => return Ok((leaf.key == key).then_some(&leaf.value)),
                Node::Internal(branch) => {
                    if depth >= DIGEST_BITS {
                        return Err(MerkleError::MalformedNode(branch.digest));
                    }

                    node = branch.child(path.path_bit(depth));
                    depth += 1;
                }
            }
        }
    }

    /// Whether `key` is present. Errors like [`Dictionary256::get`].
    pub fn contains_key(&self, key: &str) -> MerkleResult<bool> {
        self.get(key).map(|v| v.is_some())
    }

    /// Every materialized entry, in shard order.
    pub fn entries(&self) -> Vec<(&str, &Address<V, H>)> {
        self.leaves()
            .into_iter()
            .map(|leaf| (leaf.key.as_str(), &leaf.value))
            .collect()
    }

    /// Every materialized key, in shard order.
    pub fn keys(&self) -> Vec<&str> {
        self.leaves()
            .into_iter()
            .map(|leaf| leaf.key.as_str())
            .collect()
    }

    /// The number of entries. Fails if part of the dictionary is stubbed.
    pub fn len(&self) -> MerkleResult<usize> {
        let mut stack = vec![&self.root];
        let mut count = 0;

        while let Some(node) = stack.pop() {
            match node {
                Node::Empty => (),
                Node::Stub(d) => return Err(MerkleError::TraversedStub(*d)),
                Node::Leaf(_) => count += 1,
                Node::Internal(branch) => {
                    stack.push(&branch.right);
                    stack.push(&branch.left);
                }
            }
        }

        Ok(count)
    }

    /// The same dictionary with everything below the root replaced by a
    /// stub.
    pub fn masking(&self) -> Self {
        Self::from_root(self.root.stubbed())
    }

    /// Inserts or replaces `key` with an already-addressed value.
    pub fn setting_address(
        &self,
        key: impl Into<String>,
        value: Address<V, H>,
    ) -> MerkleResult<Self> {
        let incoming = Leaf::new(key.into(), value);
        let root = insert(&self.root, 0, &incoming)?;

        Ok(Self::from_root(root))
    }

    /// Removes `key`.
    ///
    /// Removing an absent key is a no-op, but only if the dictionary proves
    /// the absence; otherwise the stub hiding the answer is reported.
    pub fn deleting(&self, key: &str) -> MerkleResult<Self> {
        let path = H::hash(key.as_bytes());

        match delete(&self.root, 0, key, path)? {
            Some(root) => Ok(Self::from_root(root)),
            None => {
                trace!("delete of absent key {key:?} is a no-op");
                Ok(self.clone())
            }
        }
    }

    pub(crate) fn leaves(&self) -> Vec<&Leaf<V, H>> {
        let mut stack = vec![&self.root];
        let mut leaves = Vec::new();

        while let Some(node) = stack.pop() {
            match node {
                Node::Empty | Node::Stub(_) => (),
                Node::Leaf(leaf) => leaves.push(leaf.as_ref()),
                Node::Internal(branch) => {
                    stack.push(&branch.right);
                    stack.push(&branch.left);
                }
            }
        }

        leaves
    }
}

impl<V: Artifact<H>, H: Hasher> Dictionary256<V, H> {
    /// Inserts or replaces `key` with `value`.
    pub fn setting(&self, key: impl Into<String>, value: V) -> MerkleResult<Self> {
        self.setting_address(key, Address::new(value))
    }

    /// Builds a dictionary from key/value pairs. Later duplicates win.
    pub fn from_entries<I, K>(entries: I) -> MerkleResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
    {
        entries
            .into_iter()
            .try_fold(Self::new(), |dict, (k, v)| dict.setting(k, v))
    }

    /// Raw bytes of every materialized node and value, keyed by digest.
    ///
    /// This is the witness form of a partial dictionary: feeding these chunks
    /// to [`capture`](crate::capture::capture) against
    /// [`Dictionary256::digest`] reconstructs the same partial dictionary.
    pub fn contents(&self) -> BTreeMap<Digest, Vec<u8>> {
        let mut stack = vec![&self.root];
        let mut contents = BTreeMap::new();

        while let Some(node) = stack.pop() {
            if let Some(bytes) = node.encode() {
                contents.insert(node.digest(), bytes);
            }

            match node {
                Node::Empty | Node::Stub(_) => (),
                Node::Leaf(leaf) => {
                    if let Some(value) = leaf.value.verified_artifact() {
                        contents.insert(leaf.value.digest(), value.canonical_bytes());
                    }
                }
                Node::Internal(branch) => {
                    stack.push(&branch.right);
                    stack.push(&branch.left);
                }
            }
        }

        contents
    }

    /// Every key and value. Only valid on a complete dictionary.
    pub fn to_map(&self) -> MerkleResult<BTreeMap<String, V>> {
        if let Some(stub) = first_stub(&self.root) {
            return Err(MerkleError::IncompleteArtifact(stub));
        }

        self.leaves()
            .into_iter()
            .map(|leaf| Ok((leaf.key.clone(), leaf.value.require()?.clone())))
            .collect()
    }
}

impl<V: Artifact<H>, H: Hasher> Artifact<H> for Dictionary256<V, H> {
    fn canonical_bytes(&self) -> Vec<u8> {
        self.root.encode().unwrap_or_default()
    }

    fn compute_digest(&self) -> Digest {
        self.digest()
    }

    fn is_complete(&self) -> bool {
        self.root.is_complete()
    }
}

fn first_stub<V, H: Hasher>(root: &Node<V, H>) -> Option<Digest> {
    let mut stack = vec![root];

    while let Some(node) = stack.pop() {
        match node {
            Node::Empty => (),
            Node::Stub(d) => return Some(*d),
            Node::Leaf(leaf) if !leaf.value.is_verified() => return Some(leaf.value.digest()),
            Node::Leaf(_) => (),
            Node::Internal(branch) => {
                stack.push(&branch.right);
                stack.push(&branch.left);
            }
        }
    }

    None
}

fn insert<V, H: Hasher>(
    node: &Node<V, H>,
    depth: usize,
    incoming: &Arc<Leaf<V, H>>,
) -> MerkleResult<Node<V, H>> {
    trace!(
        "insert {:?} at {} node (depth: {})",
        incoming.key,
        NodeKind::from(node),
        depth
    );

    match node {
        Node::Empty => Ok(Node::Leaf(incoming.clone())),
        Node::Stub(d) => Err(MerkleError::TraversedStub(*d)),
        Node::Leaf(existing) if existing.key == incoming.key => Ok(Node::Leaf(incoming.clone())),
        Node::Leaf(existing) => split(existing.clone(), incoming.clone(), depth),
        Node::Internal(branch) => {
            if depth >= DIGEST_BITS {
                return Err(MerkleError::MalformedNode(branch.digest));
            }

            match incoming.path.path_bit(depth) {
                false => Ok(Node::internal(
                    insert(&branch.left, depth + 1, incoming)?,
                    branch.right.clone(),
                )),
                true => Ok(Node::internal(
                    branch.left.clone(),
                    insert(&branch.right, depth + 1, incoming)?,
                )),
            }
        }
    }
}

/// Pushes two leaves that collide at `depth` down until their paths diverge.
fn split<V, H: Hasher>(
    existing: Arc<Leaf<V, H>>,
    incoming: Arc<Leaf<V, H>>,
    depth: usize,
) -> MerkleResult<Node<V, H>> {
    if depth >= DIGEST_BITS {
        return Err(MerkleError::PathCollision(
            existing.key.clone(),
            incoming.key.clone(),
        ));
    }

    match (existing.path.path_bit(depth), incoming.path.path_bit(depth)) {
        (false, true) => Ok(Node::internal(Node::Leaf(existing), Node::Leaf(incoming))),
        (true, false) => Ok(Node::internal(Node::Leaf(incoming), Node::Leaf(existing))),
        (false, false) => Ok(Node::internal(split(existing, incoming, depth + 1)?, Node::Empty)),
        (true, true) => Ok(Node::internal(Node::Empty, split(existing, incoming, depth + 1)?)),
    }
}

/// Returns `None` when the key is proven absent.
fn delete<V, H: Hasher>(
    node: &Node<V, H>,
    depth: usize,
    key: &str,
    path: Digest,
) -> MerkleResult<Option<Node<V, H>>> {
    trace!(
        "delete {:?} at {} node (path: {})",
        key,
        NodeKind::from(node),
        display_path(&path.path_bits(depth.min(DIGEST_BITS)))
    );

    match node {
        Node::Empty => Ok(None),
        Node::Stub(d) => Err(MerkleError::TraversedStub(*d)),
        Node::Leaf(leaf) if leaf.key == key => Ok(Some(Node::Empty)),
        Node::Leaf(_) => Ok(None),
        Node::Internal(branch) => {
            if depth >= DIGEST_BITS {
                return Err(MerkleError::MalformedNode(branch.digest));
            }

            let bit = path.path_bit(depth);
            let Some(replaced) = delete(branch.child(bit), depth + 1, key, path)? else {
                return Ok(None);
            };

            collapse(replaced, branch.child(!bit).clone(), bit).map(Some)
        }
    }
}

/// Rebuilds a branch after one of its children changed, lifting a lone leaf
/// towards the root so the trie stays canonical.
fn collapse<V, H: Hasher>(
    replaced: Node<V, H>,
    sibling: Node<V, H>,
    replaced_is_right: bool,
) -> MerkleResult<Node<V, H>> {
    match (&replaced, &sibling) {
        (Node::Empty, Node::Empty) => Ok(Node::Empty),
        (Node::Empty, Node::Leaf(_)) => Ok(sibling),
        (Node::Leaf(_), Node::Empty) => Ok(replaced),
        // Can't tell whether the stub hides a single leaf that should now be
        // lifted.
        (Node::Empty, Node::Stub(d)) => Err(MerkleError::TraversedStub(*d)),
        _ => Ok(match replaced_is_right {
            false => Node::internal(replaced, sibling),
            true => Node::internal(sibling, replaced),
        }),
    }
}

/// Pre-order wire form of a dictionary node.
#[derive(Serialize)]
#[serde(bound(serialize = "V: Serialize"))]
enum WireNodeRef<'a, V, H: Hasher> {
    Empty,
    Stub(Digest),
    Leaf { key: &'a str, value: &'a Address<V, H> },
    Internal,
}

#[derive(Deserialize)]
#[serde(bound(deserialize = "V: Artifact<H> + Deserialize<'de>"))]
enum WireNode<V, H: Hasher> {
    Empty,
    Stub(Digest),
    Leaf { key: String, value: Address<V, H> },
    Internal,
}

impl<V: Serialize, H: Hasher> Serialize for Dictionary256<V, H> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut stack = vec![&self.root];
        let mut wire = Vec::new();

        while let Some(node) = stack.pop() {
            wire.push(match node {
                Node::Empty => WireNodeRef::Empty,
                Node::Stub(d) => WireNodeRef::Stub(*d),
                Node::Leaf(leaf) => WireNodeRef::Leaf {
                    key: &leaf.key,
                    value: &leaf.value,
                },
                Node::Internal(branch) => {
                    stack.push(&branch.right);
                    stack.push(&branch.left);
                    WireNodeRef::Internal
                }
            });
        }

        wire.serialize(serializer)
    }
}

impl<'de, V, H> Deserialize<'de> for Dictionary256<V, H>
where
    V: Artifact<H> + Deserialize<'de>,
    H: Hasher,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = Vec::<WireNode<V, H>>::deserialize(deserializer)?;
        let mut nodes = wire.into_iter();
        let mut route = Vec::new();

        let root = from_wire(&mut nodes, &mut route).map_err(de::Error::custom)?;
        if nodes.next().is_some() {
            return Err(de::Error::custom(MerkleError::MalformedNode(root.digest())));
        }

        Ok(Self::from_root(root))
    }
}

fn from_wire<V: Artifact<H>, H: Hasher>(
    nodes: &mut impl Iterator<Item = WireNode<V, H>>,
    route: &mut Vec<bool>,
) -> MerkleResult<Node<V, H>> {
    let malformed = MerkleError::MalformedNode(Digest::zero());

    match nodes.next().ok_or(malformed.clone())? {
        WireNode::Empty => Ok(Node::Empty),
        WireNode::Stub(d) => Ok(Node::stub_or_empty(d)),
        WireNode::Leaf { key, value } => {
            let leaf = Node::leaf(key, value);
            check_route(&leaf, route)?;
            Ok(leaf)
        }
        WireNode::Internal => {
            if route.len() >= DIGEST_BITS {
                return Err(malformed);
            }

            route.push(false);
            let left = from_wire(nodes, route)?;
            route.pop();

            route.push(true);
            let right = from_wire(nodes, route)?;
            route.pop();

            Node::canonical_internal(left, right).ok_or(malformed)
        }
    }
}

/// Checks that a leaf was found where its key hash says it lives.
pub(crate) fn check_route<V, H: Hasher>(leaf: &Node<V, H>, route: &[bool]) -> MerkleResult<()> {
    let Node::Leaf(inner) = leaf else {
        return Ok(());
    };

    match inner.path.path_bits(route.len()) == route {
        true => Ok(()),
        false => Err(MerkleError::MalformedNode(inner.digest)),
    }
}
