//! [`Scalar`]: a leaf artifact wrapping a single opaque payload.

use std::fmt::Debug;

use serde::{Deserialize, Serialize};

use crate::{
    address::{Artifact, CanonicalDecode},
    hashing::Hasher,
    node_encoding::{decode_scalar, encode_scalar},
};

/// Payloads that can live inside a [`Scalar`].
pub trait ScalarPayload: Clone + Debug + Send + Sync + 'static {
    /// The payload's byte form.
    fn to_payload_bytes(&self) -> Vec<u8>;

    /// Inverse of [`ScalarPayload::to_payload_bytes`].
    fn from_payload_bytes(bytes: &[u8]) -> Option<Self>;
}

impl ScalarPayload for Vec<u8> {
    fn to_payload_bytes(&self) -> Vec<u8> {
        self.clone()
    }

    fn from_payload_bytes(bytes: &[u8]) -> Option<Self> {
        Some(bytes.to_vec())
    }
}

impl ScalarPayload for String {
    fn to_payload_bytes(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }

    fn from_payload_bytes(bytes: &[u8]) -> Option<Self> {
        String::from_utf8(bytes.to_vec()).ok()
    }
}

/// A leaf artifact. Its digest is the hash of its tagged payload bytes.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Scalar<T>(T);

impl<T> Scalar<T> {
    /// Wraps `value`.
    pub const fn new(value: T) -> Self {
        Self(value)
    }

    /// The wrapped value.
    pub const fn value(&self) -> &T {
        &self.0
    }

    /// Unwraps the value.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T: ScalarPayload, H: Hasher> Artifact<H> for Scalar<T> {
    fn canonical_bytes(&self) -> Vec<u8> {
        encode_scalar(&self.0.to_payload_bytes())
    }

    fn is_complete(&self) -> bool {
        true
    }
}

impl<T: ScalarPayload> CanonicalDecode for Scalar<T> {
    fn decode_canonical(bytes: &[u8]) -> Option<Self> {
        decode_scalar(bytes)
            .and_then(|payload| T::from_payload_bytes(&payload))
            .map(Self)
    }
}
