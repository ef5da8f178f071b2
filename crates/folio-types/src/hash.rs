use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::owner::OwnerId;

const DIRECT_PREFIX: &str = "direct:";

/// Key of a content entry.
///
/// Normally the lowercase hex digest of the entry's bytes. Content stored
/// below the deduplication threshold is never hashed; its entry lives under a
/// *direct key* derived from the owning `(owner, path)` pair instead. Direct
/// keys start with `direct:` and can never collide with a digest, which is
/// pure hex.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    /// Hex-encode a raw digest.
    pub fn from_digest(digest: &[u8]) -> Self {
        Self(hex::encode(digest))
    }

    /// Parse a lowercase hex digest.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        if s.is_empty() || s.len() % 2 != 0 {
            return Err(TypeError::InvalidHex(s.to_string()));
        }
        if !s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            return Err(TypeError::InvalidHex(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    /// Direct key for sub-threshold content owned by `(owner, path)`.
    ///
    /// The owner is length-prefixed so that `("a:b", "c")` and `("a", "b:c")`
    /// map to different keys.
    pub fn direct(owner: &OwnerId, path: &str) -> Self {
        Self(format!(
            "{DIRECT_PREFIX}{}:{}:{path}",
            owner.as_str().len(),
            owner.as_str()
        ))
    }

    /// Returns `true` for direct (non-deduplicated) keys.
    pub fn is_direct(&self) -> bool {
        self.0.starts_with(DIRECT_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form for log lines (first 12 characters).
    pub fn short(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(12)
            .map(|(i, _)| i)
            .unwrap_or(self.0.len());
        &self.0[..end]
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.short())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner(s: &str) -> OwnerId {
        OwnerId::new(s).unwrap()
    }

    #[test]
    fn from_digest_is_lowercase_hex() {
        let hash = ContentHash::from_digest(&[0xab, 0xcd, 0x01]);
        assert_eq!(hash.as_str(), "abcd01");
        assert!(!hash.is_direct());
    }

    #[test]
    fn from_hex_accepts_lowercase() {
        let hash = ContentHash::from_hex("00ff").unwrap();
        assert_eq!(hash.to_string(), "00ff");
    }

    #[test]
    fn from_hex_rejects_bad_input() {
        assert!(ContentHash::from_hex("").is_err());
        assert!(ContentHash::from_hex("abc").is_err());
        assert!(ContentHash::from_hex("ABCD").is_err());
        assert!(ContentHash::from_hex("zz").is_err());
        assert!(ContentHash::from_hex("direct:1:a:b").is_err());
    }

    #[test]
    fn direct_keys_are_flagged() {
        let hash = ContentHash::direct(&owner("book-1"), "cover.jpg");
        assert!(hash.is_direct());
        assert_eq!(hash.as_str(), "direct:6:book-1:cover.jpg");
    }

    #[test]
    fn direct_keys_do_not_collide_on_separators() {
        let a = ContentHash::direct(&owner("a:b"), "c");
        let b = ContentHash::direct(&owner("a"), "b:c");
        assert_ne!(a, b);
    }

    #[test]
    fn short_truncates() {
        let hash = ContentHash::from_digest(&[0x11; 32]);
        assert_eq!(hash.short().len(), 12);
        assert_eq!(format!("{hash:?}"), format!("ContentHash({})", hash.short()));
    }

    #[test]
    fn serde_is_transparent() {
        let hash = ContentHash::from_digest(&[1, 2]);
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, "\"0102\"");
        let parsed: ContentHash = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, hash);
    }
}
