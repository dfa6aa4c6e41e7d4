//! Content digest over raw image bytes.
//!
//! Only the bytes are hashed. Filename and declared content type never reach
//! the digest, so identical pixels uploaded under different names share a key.

use sha2::{Digest, Sha256};
use std::fmt;

/// SHA-256 fingerprint of an image's bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentDigest([u8; 32]);

impl ContentDigest {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex rendering (64 characters)
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl From<[u8; 32]> for ContentDigest {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ContentHasher;

impl ContentHasher {
    pub fn hash(bytes: &[u8]) -> ContentDigest {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        ContentDigest(hasher.finalize().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_known_vector() {
        // sha256("abc")
        assert_eq!(
            ContentHasher::hash(b"abc").to_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_empty_input_is_hashable() {
        assert_eq!(
            ContentHasher::hash(&[]).to_string(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    proptest! {
        #[test]
        fn prop_hash_is_deterministic(bytes in proptest::collection::vec(any::<u8>(), 0..2048)) {
            let first = ContentHasher::hash(&bytes);
            let second = ContentHasher::hash(&bytes);
            prop_assert_eq!(first, second);
            prop_assert_eq!(first.to_hex().len(), 64);
        }

        #[test]
        fn prop_single_byte_change_changes_digest(
            bytes in proptest::collection::vec(any::<u8>(), 1..512),
            index in any::<prop::sample::Index>(),
        ) {
            let mut altered = bytes.clone();
            let i = index.index(altered.len());
            altered[i] = altered[i].wrapping_add(1);
            prop_assert_ne!(ContentHasher::hash(&bytes), ContentHasher::hash(&altered));
        }
    }
}
