//! Composite cache keys built from a content digest and a normalized prompt.

use super::hasher::ContentDigest;
use std::fmt;

/// Identifier for one (image, prompt) pair.
///
/// Equality is structural on the pair, so no separator choice can make two
/// different pairs collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    digest: ContentDigest,
    prompt: String,
}

impl CacheKey {
    pub fn digest(&self) -> &ContentDigest {
        &self.digest
    }

    /// Normalized prompt; empty when the caller supplied none
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn has_prompt(&self) -> bool {
        !self.prompt.is_empty()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.digest, self.prompt)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CacheKeyBuilder;

impl CacheKeyBuilder {
    pub fn build_key(digest: &ContentDigest, raw_prompt: Option<&str>) -> CacheKey {
        CacheKey {
            digest: *digest,
            prompt: normalize_prompt(raw_prompt),
        }
    }
}

/// Collapse missing and blank prompts to `""`; anything else is kept verbatim.
pub fn normalize_prompt(raw_prompt: Option<&str>) -> String {
    raw_prompt
        .filter(|p| !p.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ContentHasher;
    use proptest::prelude::*;

    #[test]
    fn test_blank_prompts_share_a_key() {
        let digest = ContentHasher::hash(b"diagram");
        let none = CacheKeyBuilder::build_key(&digest, None);
        let empty = CacheKeyBuilder::build_key(&digest, Some(""));
        let spaces = CacheKeyBuilder::build_key(&digest, Some("   "));
        let mixed = CacheKeyBuilder::build_key(&digest, Some("\t\n "));

        assert_eq!(none, empty);
        assert_eq!(empty, spaces);
        assert_eq!(spaces, mixed);
        assert!(!none.has_prompt());
    }

    #[test]
    fn test_different_content_different_key() {
        let a = CacheKeyBuilder::build_key(&ContentHasher::hash(b"image-a"), Some("p"));
        let b = CacheKeyBuilder::build_key(&ContentHasher::hash(b"image-b"), Some("p"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_different_prompt_different_key() {
        let digest = ContentHasher::hash(b"image");
        let plain = CacheKeyBuilder::build_key(&digest, Some(""));
        let focused = CacheKeyBuilder::build_key(&digest, Some("Focus on the database layer"));
        assert_ne!(plain, focused);
        assert_eq!(focused.prompt(), "Focus on the database layer");
    }

    #[test]
    fn test_surrounding_whitespace_is_significant() {
        let digest = ContentHasher::hash(b"image");
        let padded = CacheKeyBuilder::build_key(&digest, Some("  list the queues \n"));
        assert_ne!(
            padded,
            CacheKeyBuilder::build_key(&digest, Some("list the queues"))
        );
        assert_eq!(padded.prompt(), "  list the queues \n");
        assert_ne!(
            CacheKeyBuilder::build_key(&digest, Some("x")),
            CacheKeyBuilder::build_key(&digest, Some("  x  "))
        );
    }

    #[test]
    fn test_display_form() {
        let digest = ContentHasher::hash(b"abc");
        let key = CacheKeyBuilder::build_key(&digest, Some("x"));
        assert_eq!(key.to_string(), format!("{}-x", digest.to_hex()));
    }

    proptest! {
        #[test]
        fn prop_key_equality_tracks_inputs(
            b1 in proptest::collection::vec(any::<u8>(), 0..256),
            b2 in proptest::collection::vec(any::<u8>(), 0..256),
            p1 in "[a-z ]{0,16}",
            p2 in "[a-z ]{0,16}",
        ) {
            let k1 = CacheKeyBuilder::build_key(&ContentHasher::hash(&b1), Some(&p1));
            let k2 = CacheKeyBuilder::build_key(&ContentHasher::hash(&b2), Some(&p2));
            let normalized = |p: &str| if p.trim().is_empty() { String::new() } else { p.to_string() };
            let same_inputs = b1 == b2 && normalized(&p1) == normalized(&p2);
            prop_assert_eq!(k1 == k2, same_inputs);
        }
    }
}
