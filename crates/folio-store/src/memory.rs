use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use folio_types::{ContentHash, OwnerId, StorageKey};

use crate::error::{StoreError, StoreResult};
use crate::record::{BlobHandle, ContentEntry, Reference};
use crate::traits::StorageBackend;

type ReferenceKey = (OwnerId, String);

fn poisoned<T>(e: PoisonError<T>) -> StoreError {
    StoreError::LockPoisoned(e.to_string())
}

/// In-memory, HashMap-based storage backend.
///
/// Intended for tests and embedding. Each record kind lives in its own table
/// behind a `RwLock`; records are cloned on read and write. Data is lost when
/// the backend is dropped.
pub struct InMemoryBackend {
    entries: RwLock<HashMap<ContentHash, ContentEntry>>,
    blobs: RwLock<HashMap<StorageKey, Vec<u8>>>,
    references: RwLock<HashMap<ReferenceKey, Reference>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            blobs: RwLock::new(HashMap::new()),
            references: RwLock::new(HashMap::new()),
        }
    }

    /// Number of content entries.
    pub fn entry_count(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Number of stored blobs.
    pub fn blob_count(&self) -> usize {
        self.blobs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Number of ownership references.
    pub fn reference_count(&self) -> usize {
        self.references
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Total bytes physically held across all blobs.
    pub fn total_blob_bytes(&self) -> u64 {
        self.blobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|data| data.len() as u64)
            .sum()
    }

    /// Remove every record.
    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.blobs.write().unwrap_or_else(PoisonError::into_inner).clear();
        self.references
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn collect_references(&self, keep: impl Fn(&Reference) -> bool) -> StoreResult<Vec<Reference>> {
        let map = self.references.read().map_err(poisoned)?;
        let mut refs: Vec<Reference> = map.values().filter(|r| keep(*r)).cloned().collect();
        refs.sort_by(|a, b| (&a.owner, &a.path).cmp(&(&b.owner, &b.path)));
        Ok(refs)
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageBackend for InMemoryBackend {
    async fn get_entry(&self, hash: &ContentHash) -> StoreResult<Option<ContentEntry>> {
        let map = self.entries.read().map_err(poisoned)?;
        Ok(map.get(hash).cloned())
    }

    async fn put_entry(&self, entry: &ContentEntry) -> StoreResult<()> {
        let mut map = self.entries.write().map_err(poisoned)?;
        map.insert(entry.hash.clone(), entry.clone());
        Ok(())
    }

    async fn delete_entry(&self, hash: &ContentHash) -> StoreResult<bool> {
        let mut map = self.entries.write().map_err(poisoned)?;
        Ok(map.remove(hash).is_some())
    }

    async fn get_blob(&self, key: &StorageKey) -> StoreResult<Option<BlobHandle>> {
        let map = self.blobs.read().map_err(poisoned)?;
        Ok(map
            .get(key)
            .map(|data| BlobHandle::new(key.clone(), data.clone())))
    }

    async fn put_blob(&self, blob: &BlobHandle) -> StoreResult<()> {
        let mut map = self.blobs.write().map_err(poisoned)?;
        map.insert(blob.storage_key.clone(), blob.data.clone());
        Ok(())
    }

    async fn delete_blob(&self, key: &StorageKey) -> StoreResult<bool> {
        let mut map = self.blobs.write().map_err(poisoned)?;
        Ok(map.remove(key).is_some())
    }

    async fn contains_blob(&self, key: &StorageKey) -> StoreResult<bool> {
        let map = self.blobs.read().map_err(poisoned)?;
        Ok(map.contains_key(key))
    }

    async fn get_reference(&self, owner: &OwnerId, path: &str) -> StoreResult<Option<Reference>> {
        let map = self.references.read().map_err(poisoned)?;
        Ok(map.get(&(owner.clone(), path.to_string())).cloned())
    }

    async fn put_reference(&self, reference: &Reference) -> StoreResult<()> {
        let mut map = self.references.write().map_err(poisoned)?;
        map.insert(
            (reference.owner.clone(), reference.path.clone()),
            reference.clone(),
        );
        Ok(())
    }

    async fn delete_reference(&self, owner: &OwnerId, path: &str) -> StoreResult<bool> {
        let mut map = self.references.write().map_err(poisoned)?;
        Ok(map.remove(&(owner.clone(), path.to_string())).is_some())
    }

    async fn list_entries(&self) -> StoreResult<Vec<ContentEntry>> {
        let map = self.entries.read().map_err(poisoned)?;
        let mut entries: Vec<ContentEntry> = map.values().cloned().collect();
        entries.sort_by(|a, b| a.hash.cmp(&b.hash));
        Ok(entries)
    }

    async fn list_references(&self) -> StoreResult<Vec<Reference>> {
        self.collect_references(|_| true)
    }

    async fn references_by_owner(&self, owner: &OwnerId) -> StoreResult<Vec<Reference>> {
        self.collect_references(|r| r.owner == *owner)
    }

    async fn references_by_hash(&self, hash: &ContentHash) -> StoreResult<Vec<Reference>> {
        self.collect_references(|r| r.hash == *hash)
    }
}

impl std::fmt::Debug for InMemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBackend")
            .field("entry_count", &self.entry_count())
            .field("blob_count", &self.blob_count())
            .field("reference_count", &self.reference_count())
            .finish()
    }
}
