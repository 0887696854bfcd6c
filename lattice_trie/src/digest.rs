//! The fixed-width digest used to address every artifact, along with its
//! byte, bit and key-string codecs.

use ethereum_types::U256;

/// A 256-bit digest.
///
/// Digests double as plain unsigned integers (balances, difficulties and
/// indices are all digests), so the full [`U256`] arithmetic is available. The
/// zero value is reserved as the root of an empty dictionary.
pub type Digest = U256;

/// Width of a [`Digest`] in bits.
pub const DIGEST_BITS: usize = 256;

/// Width of a [`Digest`] in bytes.
pub const DIGEST_BYTES: usize = 32;

/// Codecs and helpers for [`Digest`] that `U256` doesn't provide directly.
pub trait DigestExt: Sized {
    /// Increments by `by`, returning `None` on overflow.
    fn advance(&self, by: Self) -> Option<Self>;

    /// Big-endian, zero-padded byte form.
    fn to_digest_bytes(&self) -> [u8; DIGEST_BYTES];

    /// Parses big-endian bytes. Rejects inputs wider than [`DIGEST_BYTES`].
    fn from_digest_slice(bytes: &[u8]) -> Option<Self>;

    /// The bit at `depth`, counting from the most significant bit.
    ///
    /// # Panics
    /// If `depth >= DIGEST_BITS`.
    fn path_bit(&self, depth: usize) -> bool;

    /// The first `count` path bits, most significant first.
    fn path_bits(&self, count: usize) -> Vec<bool> {
        (0..count).map(|depth| self.path_bit(depth)).collect()
    }

    /// Fixed-width (64 char) lowercase hex form used inside action keys.
    fn to_hex_key(&self) -> String;

    /// Inverse of [`DigestExt::to_hex_key`]. Only the exact fixed-width
    /// lowercase form is accepted so that key strings stay bijective.
    fn from_hex_key(s: &str) -> Option<Self>;
}

impl DigestExt for Digest {
    fn advance(&self, by: Self) -> Option<Self> {
        self.checked_add(by)
    }

    fn to_digest_bytes(&self) -> [u8; DIGEST_BYTES] {
        let mut buf = [0; DIGEST_BYTES];
        self.to_big_endian(&mut buf);
        buf
    }

    fn from_digest_slice(bytes: &[u8]) -> Option<Self> {
        (bytes.len() <= DIGEST_BYTES).then(|| U256::from_big_endian(bytes))
    }

    fn path_bit(&self, depth: usize) -> bool {
        assert!(depth < DIGEST_BITS, "path depth {depth} is out of range");
        self.bit(DIGEST_BITS - 1 - depth)
    }

    fn to_hex_key(&self) -> String {
        hex::encode(self.to_digest_bytes())
    }

    fn from_hex_key(s: &str) -> Option<Self> {
        if s.len() != DIGEST_BYTES * 2 || s.bytes().any(|b| b.is_ascii_uppercase()) {
            return None;
        }

        let bytes = hex::decode(s).ok()?;
        Self::from_digest_slice(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_codec_is_big_endian_and_padded() {
        let d = Digest::from(0x0102_u64);
        let bytes = d.to_digest_bytes();

        assert_eq!(bytes[30], 0x01);
        assert_eq!(bytes[31], 0x02);
        assert!(bytes[..30].iter().all(|b| *b == 0));
        assert_eq!(Digest::from_digest_slice(&bytes), Some(d));
        assert_eq!(Digest::from_digest_slice(&[1, 2]), Some(d));
        assert_eq!(Digest::from_digest_slice(&[0; 33]), None);
    }

    #[test]
    fn path_bits_start_at_most_significant_bit() {
        let top = Digest::one() << 255;

        assert!(top.path_bit(0));
        assert!(!top.path_bit(1));
        assert!(Digest::one().path_bit(255));
        assert_eq!(
            (Digest::from(0b101_u64) << 253).path_bits(3),
            vec![true, false, true]
        );
    }

    #[test]
    fn advance_stops_at_overflow() {
        assert_eq!(Digest::from(7).advance(Digest::one()), Some(Digest::from(8)));
        assert_eq!(Digest::MAX.advance(Digest::one()), None);
    }

    #[test]
    fn hex_keys_only_accept_the_canonical_form() {
        let d = Digest::from(0xabcdef_u64);
        let key = d.to_hex_key();

        assert_eq!(key.len(), 64);
        assert_eq!(Digest::from_hex_key(&key), Some(d));
        assert_eq!(Digest::from_hex_key("abcdef"), None);
        assert_eq!(Digest::from_hex_key(&key.to_uppercase()), None);
        assert_eq!(Digest::from_hex_key(&format!("{key}0")), None);
    }
}
