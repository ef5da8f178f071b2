use std::fmt;

use serde::{Deserialize, Serialize};

use crate::hash::ContentHash;
use crate::owner::OwnerId;

/// Opaque locator of a blob inside a storage backend.
///
/// Deduplicated blobs live under `content/{hash}`; sub-threshold blobs under
/// `direct/{len}:{owner}/{path}`. Backends must treat the key as an opaque
/// string and map it onto their own namespace.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StorageKey(String);

impl StorageKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Key for a deduplicated blob.
    pub fn content(hash: &ContentHash) -> Self {
        Self(format!("content/{hash}"))
    }

    /// Key for a blob stored directly on behalf of one owner.
    pub fn direct(owner: &OwnerId, path: &str) -> Self {
        Self(format!(
            "direct/{}:{}/{path}",
            owner.as_str().len(),
            owner.as_str()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StorageKey({})", self.0)
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_key_embeds_hash() {
        let hash = ContentHash::from_digest(&[0xaa, 0xbb]);
        assert_eq!(StorageKey::content(&hash).as_str(), "content/aabb");
    }

    #[test]
    fn direct_key_is_per_owner_and_path() {
        let a = OwnerId::new("a").unwrap();
        let b = OwnerId::new("b").unwrap();
        assert_eq!(StorageKey::direct(&a, "x.css").as_str(), "direct/1:a/x.css");
        assert_ne!(StorageKey::direct(&a, "x.css"), StorageKey::direct(&b, "x.css"));
        assert_ne!(StorageKey::direct(&a, "x.css"), StorageKey::direct(&a, "y.css"));
    }
}
