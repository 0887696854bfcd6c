//! Canonical RLP encodings for every node kind.
//!
//! Each encoding is a list whose first item is a one-byte tag, so that a leaf
//! can never be reinterpreted as an internal node (or vice versa) by someone
//! crafting a witness.

use rlp::{Rlp, RlpStream};

use crate::digest::Digest;

pub(crate) const SCALAR_TAG: u8 = 0;
pub(crate) const ARRAY_TAG: u8 = 1;
pub(crate) const LEAF_TAG: u8 = 2;
pub(crate) const INTERNAL_TAG: u8 = 3;

/// A raw dictionary node, decoded but not yet linked to its children.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum RawNode {
    Leaf { key: String, value: Digest },
    Internal { left: Digest, right: Digest },
}

pub(crate) fn encode_scalar(payload: &[u8]) -> Vec<u8> {
    let mut stream = RlpStream::new_list(2);

    stream.append(&SCALAR_TAG);
    stream.append(&payload);

    stream.out().to_vec()
}

/// `bytes` as a single RLP item, or `None` if anything follows that item.
pub fn exact_rlp(bytes: &[u8]) -> Option<Rlp<'_>> {
    let rlp = Rlp::new(bytes);

    (rlp.payload_info().ok()?.total() == bytes.len()).then_some(rlp)
}

pub(crate) fn decode_scalar(bytes: &[u8]) -> Option<Vec<u8>> {
    let rlp = exact_rlp(bytes)?;

    if rlp.item_count().ok()? != 2 || rlp.val_at::<u8>(0).ok()? != SCALAR_TAG {
        return None;
    }

    rlp.val_at(1).ok()
}

pub(crate) fn encode_array<'a>(children: impl ExactSizeIterator<Item = &'a Digest>) -> Vec<u8> {
    let mut stream = RlpStream::new_list(2);

    stream.append(&ARRAY_TAG);
    stream.begin_list(children.len());
    for child in children {
        stream.append(child);
    }

    stream.out().to_vec()
}

pub(crate) fn encode_leaf(key: &str, value: &Digest) -> Vec<u8> {
    let mut stream = RlpStream::new_list(3);

    stream.append(&LEAF_TAG);
    stream.append(&key.as_bytes());
    stream.append(value);

    stream.out().to_vec()
}

pub(crate) fn encode_internal(left: &Digest, right: &Digest) -> Vec<u8> {
    let mut stream = RlpStream::new_list(3);

    stream.append(&INTERNAL_TAG);
    stream.append(left);
    stream.append(right);

    stream.out().to_vec()
}

pub(crate) fn decode_dictionary_node(bytes: &[u8]) -> Option<RawNode> {
    let rlp = exact_rlp(bytes)?;

    if rlp.item_count().ok()? != 3 {
        return None;
    }

    match rlp.val_at::<u8>(0).ok()? {
        LEAF_TAG => {
            let key = String::from_utf8(rlp.val_at::<Vec<u8>>(1).ok()?).ok()?;
            let value = rlp.val_at(2).ok()?;
            Some(RawNode::Leaf { key, value })
        }
        INTERNAL_TAG => Some(RawNode::Internal {
            left: rlp.val_at(1).ok()?,
            right: rlp.val_at(2).ok()?,
        }),
        _ => None,
    }
}

/// Appends an optional digest as a zero- or one-item list, so that `None`
/// and `Some(0)` have distinct encodings.
pub fn append_optional_digest(stream: &mut RlpStream, digest: Option<&Digest>) {
    match digest {
        Some(d) => {
            stream.begin_list(1);
            stream.append(d);
        }
        None => {
            stream.begin_list(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dictionary_nodes_decode_back() {
        let leaf = encode_leaf("account/1", &Digest::from(42));
        let internal = encode_internal(&Digest::from(1), &Digest::from(2));

        assert_eq!(
            decode_dictionary_node(&leaf),
            Some(RawNode::Leaf {
                key: "account/1".to_string(),
                value: Digest::from(42)
            })
        );
        assert_eq!(
            decode_dictionary_node(&internal),
            Some(RawNode::Internal {
                left: Digest::from(1),
                right: Digest::from(2)
            })
        );
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut leaf = encode_leaf("account/1", &Digest::from(42));
        let mut scalar = encode_scalar(b"payload");
        leaf.push(0x80);
        scalar.extend_from_slice(&[0xde, 0xad]);

        assert_eq!(decode_dictionary_node(&leaf), None);
        assert_eq!(decode_scalar(&scalar), None);
        assert!(exact_rlp(&[]).is_none());
    }

    #[test]
    fn tags_keep_node_kinds_apart() {
        let scalar = encode_scalar(b"payload");

        assert_eq!(decode_dictionary_node(&scalar), None);
        assert_eq!(decode_scalar(&scalar), Some(b"payload".to_vec()));
        assert_eq!(decode_scalar(&encode_leaf("k", &Digest::one())), None);
    }

    #[test]
    fn optional_digests_do_not_collide() {
        let encode = |d: Option<&Digest>| {
            let mut stream = RlpStream::new();
            append_optional_digest(&mut stream, d);
            stream.out().to_vec()
        };

        assert_ne!(encode(None), encode(Some(&Digest::zero())));
    }
}
