use async_trait::async_trait;

use folio_types::{ContentHash, OwnerId, StorageKey};

use crate::error::StoreResult;
use crate::record::{BlobHandle, ContentEntry, Reference};

/// Persistence for content entries, blobs, and ownership references.
///
/// All implementations must satisfy these rules:
/// - Absence is not an error. Reads return `Ok(None)` or an empty list,
///   deletes of missing records return `Ok(false)`.
/// - Each individual get/put/delete is atomic for its key.
/// - There are no multi-key transactions. Callers order their writes so that
///   an interrupted sequence is repairable.
/// - Backend failures are propagated, never silently ignored.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Read the entry for a content hash.
    async fn get_entry(&self, hash: &ContentHash) -> StoreResult<Option<ContentEntry>>;

    /// Create or overwrite the entry keyed by `entry.hash`.
    async fn put_entry(&self, entry: &ContentEntry) -> StoreResult<()>;

    /// Delete an entry. Returns `true` if it existed.
    async fn delete_entry(&self, hash: &ContentHash) -> StoreResult<bool>;

    /// Read the blob at a storage key.
    async fn get_blob(&self, key: &StorageKey) -> StoreResult<Option<BlobHandle>>;

    /// Create or overwrite the blob at `blob.storage_key`.
    async fn put_blob(&self, blob: &BlobHandle) -> StoreResult<()>;

    /// Delete a blob. Returns `true` if it existed.
    async fn delete_blob(&self, key: &StorageKey) -> StoreResult<bool>;

    /// Whether a blob exists at a storage key.
    ///
    /// The default reads the whole blob; backends should override it with a
    /// cheaper presence check.
    async fn contains_blob(&self, key: &StorageKey) -> StoreResult<bool> {
        Ok(self.get_blob(key).await?.is_some())
    }

    /// Read the reference at `(owner, path)`.
    async fn get_reference(&self, owner: &OwnerId, path: &str) -> StoreResult<Option<Reference>>;

    /// Create or overwrite the reference keyed by `(reference.owner, reference.path)`.
    async fn put_reference(&self, reference: &Reference) -> StoreResult<()>;

    /// Delete a reference. Returns `true` if it existed.
    async fn delete_reference(&self, owner: &OwnerId, path: &str) -> StoreResult<bool>;

    /// Every entry in the store.
    async fn list_entries(&self) -> StoreResult<Vec<ContentEntry>>;

    /// Every reference in the store.
    async fn list_references(&self) -> StoreResult<Vec<Reference>>;

    /// All references held by one owner.
    async fn references_by_owner(&self, owner: &OwnerId) -> StoreResult<Vec<Reference>>;

    /// All references pointing at one content hash.
    ///
    /// Backends without a by-hash index answer this with a full scan of
    /// their references, so callers should not issue it once per entry.
    async fn references_by_hash(&self, hash: &ContentHash) -> StoreResult<Vec<Reference>>;
}
