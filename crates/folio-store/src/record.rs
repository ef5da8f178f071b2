//! The three record kinds a backend persists.
//!
//! Records are plain values. Mutations are expressed as methods that return a
//! modified copy, so callers always read a record, derive the new version,
//! and write it back explicitly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use folio_types::{ContentHash, OwnerId, StorageKey};

/// Metadata for one distinct byte sequence.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentEntry {
    pub hash: ContentHash,
    /// Blob length in bytes.
    pub size: u64,
    pub mime_type: String,
    /// Number of references currently pointing at `hash`.
    pub ref_count: u64,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    /// Where the blob lives in the backend.
    pub storage_key: StorageKey,
}

impl ContentEntry {
    /// A freshly stored entry with a single reference.
    pub fn new(
        hash: ContentHash,
        size: u64,
        mime_type: impl Into<String>,
        storage_key: StorageKey,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            hash,
            size,
            mime_type: mime_type.into(),
            ref_count: 1,
            created_at: now,
            last_accessed_at: now,
            storage_key,
        }
    }

    /// Copy with one more reference and a refreshed access time.
    pub fn incremented(&self, now: DateTime<Utc>) -> Self {
        Self {
            ref_count: self.ref_count + 1,
            last_accessed_at: now,
            ..self.clone()
        }
    }

    /// Copy with one fewer reference. Saturates at zero.
    pub fn decremented(&self) -> Self {
        Self {
            ref_count: self.ref_count.saturating_sub(1),
            ..self.clone()
        }
    }

    /// Copy with a refreshed access time.
    pub fn touched(&self, now: DateTime<Utc>) -> Self {
        Self {
            last_accessed_at: now,
            ..self.clone()
        }
    }

    /// Copy with the reference count overwritten.
    pub fn with_ref_count(&self, ref_count: u64) -> Self {
        Self {
            ref_count,
            ..self.clone()
        }
    }

    /// Bytes that would have been stored again without deduplication.
    pub fn bytes_saved(&self) -> u64 {
        self.ref_count.saturating_sub(1) * self.size
    }

    /// Logical bytes served by this entry across all its references.
    pub fn logical_bytes(&self) -> u64 {
        self.ref_count * self.size
    }
}

/// Ownership link from `(owner, path)` to a content entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub owner: OwnerId,
    pub path: String,
    pub hash: ContentHash,
    pub created_at: DateTime<Utc>,
}

impl Reference {
    pub fn new(
        owner: OwnerId,
        path: impl Into<String>,
        hash: ContentHash,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            owner,
            path: path.into(),
            hash,
            created_at: now,
        }
    }
}

/// Raw bytes held at a storage key.
#[derive(Clone, PartialEq, Eq)]
pub struct BlobHandle {
    pub storage_key: StorageKey,
    pub data: Vec<u8>,
}

impl BlobHandle {
    pub fn new(storage_key: StorageKey, data: Vec<u8>) -> Self {
        Self { storage_key, data }
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

impl std::fmt::Debug for BlobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobHandle")
            .field("storage_key", &self.storage_key)
            .field("size", &self.data.len())
            .finish()
    }
}
