use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use folio_crypto::ContentHasher;
use folio_store::{BlobHandle, ContentEntry, Reference, StorageBackend};
use folio_types::{ContentHash, OwnerId, StorageKey};

use crate::config::DedupConfig;
use crate::error::DedupResult;
use crate::report::{
    CleanupReport, DedupStats, DuplicateSummary, ExistsReport, OwnerResource, RemovalReport,
    StoreOutcome, VerifyReport,
};

/// Reference-counted, content-addressed resource store.
///
/// The manager is the only component that maintains the relationships
/// between entries, blobs, and references. It takes no locks of its own and
/// relies solely on the per-key atomicity of the backend, so every
/// multi-record sequence is ordered to fail safe:
///
/// - blobs are written before the entry that points at them;
/// - reference counts are raised before the reference is written;
/// - references are deleted before counts are lowered.
///
/// An interrupted sequence therefore leaves at worst an over-counted or
/// unreferenced entry, both of which [`cleanup`](Self::cleanup) repairs.
///
/// Reclaiming deletes the entry before the blob and re-checks the live
/// references after each step, and a store confirms its content is still in
/// place after writing its reference. Content that a store reports as stored
/// is put back if a concurrent removal or cleanup took it in between.
pub struct DedupManager<B> {
    backend: Arc<B>,
    hasher: ContentHasher,
    config: DedupConfig,
}

impl<B: StorageBackend> DedupManager<B> {
    pub fn new(backend: Arc<B>, config: DedupConfig) -> DedupResult<Self> {
        config.validate()?;
        Ok(Self::assemble(backend, config))
    }

    /// Manager with the default configuration, which always validates.
    pub fn with_defaults(backend: Arc<B>) -> Self {
        Self::assemble(backend, DedupConfig::default())
    }

    fn assemble(backend: Arc<B>, config: DedupConfig) -> Self {
        Self {
            backend,
            hasher: ContentHasher::new(config.algorithm),
            config,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &DedupConfig {
        &self.config
    }

    /// Digest of `data` under this manager's algorithm.
    pub fn compute_hash(&self, data: &[u8]) -> ContentHash {
        self.hasher.hash(data)
    }

    // ---- Writes ----

    /// Store `data` for `owner` at `path`.
    ///
    /// Content shorter than `min_size` is stored directly and never shared.
    /// Otherwise identical bytes already in the store gain a reference
    /// instead of a second copy. Re-storing the content a path already
    /// references is a no-op. If the path referenced different content
    /// before, that content is released.
    pub async fn store(
        &self,
        owner: &OwnerId,
        path: &str,
        data: &[u8],
        mime_type: &str,
    ) -> DedupResult<StoreOutcome> {
        if data.len() < self.config.min_size {
            return self.store_direct(owner, path, data, mime_type).await;
        }

        let hash = self.hasher.hash(data);
        let now = Utc::now();
        let previous = self.backend.get_reference(owner, path).await?;
        let existing = self.backend.get_entry(&hash).await?;

        if let (Some(prev), Some(entry)) = (&previous, &existing) {
            if prev.hash == hash {
                let entry = entry.touched(now);
                self.backend.put_entry(&entry).await?;
                debug!(owner = %owner, path, hash = hash.short(), "content already stored at path");
                return Ok(StoreOutcome {
                    hash,
                    is_duplicate: true,
                    storage_key: entry.storage_key,
                    bytes_saved: 0,
                    ref_count: entry.ref_count,
                });
            }
        }

        let outcome = match existing {
            Some(entry) => {
                let entry = entry.incremented(now);
                self.backend.put_entry(&entry).await?;
                debug!(
                    owner = %owner,
                    path,
                    hash = hash.short(),
                    ref_count = entry.ref_count,
                    "deduplicated content"
                );
                StoreOutcome {
                    hash: hash.clone(),
                    is_duplicate: true,
                    storage_key: entry.storage_key,
                    bytes_saved: data.len() as u64,
                    ref_count: entry.ref_count,
                }
            }
            None => {
                let storage_key = StorageKey::content(&hash);
                self.backend
                    .put_blob(&BlobHandle::new(storage_key.clone(), data.to_vec()))
                    .await?;
                let entry = ContentEntry::new(
                    hash.clone(),
                    data.len() as u64,
                    mime_type,
                    storage_key.clone(),
                    now,
                );
                self.backend.put_entry(&entry).await?;
                debug!(owner = %owner, path, hash = hash.short(), size = entry.size, "stored new content");
                StoreOutcome {
                    hash: hash.clone(),
                    is_duplicate: false,
                    storage_key,
                    bytes_saved: 0,
                    ref_count: 1,
                }
            }
        };

        self.backend
            .put_reference(&Reference::new(owner.clone(), path, hash, now))
            .await?;
        self.ensure_content(&outcome.hash, &outcome.storage_key, data, mime_type, now)
            .await?;
        self.release_replaced(previous, &outcome.hash).await?;
        Ok(outcome)
    }

    async fn store_direct(
        &self,
        owner: &OwnerId,
        path: &str,
        data: &[u8],
        mime_type: &str,
    ) -> DedupResult<StoreOutcome> {
        let hash = ContentHash::direct(owner, path);
        let storage_key = StorageKey::direct(owner, path);
        let now = Utc::now();
        let previous = self.backend.get_reference(owner, path).await?;
        let created_at = match self.backend.get_entry(&hash).await? {
            Some(entry) => entry.created_at,
            None => now,
        };

        self.backend
            .put_blob(&BlobHandle::new(storage_key.clone(), data.to_vec()))
            .await?;
        let entry = ContentEntry {
            created_at,
            ..ContentEntry::new(
                hash.clone(),
                data.len() as u64,
                mime_type,
                storage_key.clone(),
                now,
            )
        };
        self.backend.put_entry(&entry).await?;
        self.backend
            .put_reference(&Reference::new(owner.clone(), path, hash.clone(), now))
            .await?;
        self.ensure_content(&hash, &storage_key, data, mime_type, now)
            .await?;
        debug!(owner = %owner, path, size = entry.size, "stored below dedup threshold");

        self.release_replaced(previous, &hash).await?;
        Ok(StoreOutcome {
            hash,
            is_duplicate: false,
            storage_key,
            bytes_saved: 0,
            ref_count: 1,
        })
    }

    /// Put back content that was reclaimed between this store's entry write
    /// and its reference write. Does nothing once the reference itself is
    /// gone, since a later removal then owns the outcome.
    async fn ensure_content(
        &self,
        hash: &ContentHash,
        storage_key: &StorageKey,
        data: &[u8],
        mime_type: &str,
        now: DateTime<Utc>,
    ) -> DedupResult<()> {
        let entry = self.backend.get_entry(hash).await?;
        let has_blob = self.backend.contains_blob(storage_key).await?;
        if entry.is_some() && has_blob {
            return Ok(());
        }

        let live = self.live_references(hash).await?;
        if live == 0 {
            return Ok(());
        }
        warn!(hash = hash.short(), live, "content reclaimed during store, restoring");
        if !has_blob {
            self.backend
                .put_blob(&BlobHandle::new(storage_key.clone(), data.to_vec()))
                .await?;
        }
        if entry.is_none() {
            let restored = ContentEntry::new(
                hash.clone(),
                data.len() as u64,
                mime_type,
                storage_key.clone(),
                now,
            );
            self.backend.put_entry(&restored.with_ref_count(live)).await?;
        }
        Ok(())
    }

    async fn live_references(&self, hash: &ContentHash) -> DedupResult<u64> {
        Ok(self.backend.references_by_hash(hash).await?.len() as u64)
    }

    /// Whether `at` falls inside the orphan grace window.
    fn within_grace(&self, at: DateTime<Utc>) -> bool {
        self.config.orphan_grace_secs > 0 && at > Utc::now() - self.config.orphan_grace()
    }

    /// Release the content a path pointed at before it was overwritten.
    async fn release_replaced(
        &self,
        previous: Option<Reference>,
        current: &ContentHash,
    ) -> DedupResult<()> {
        if let Some(prev) = previous {
            if prev.hash != *current {
                debug!(
                    owner = %prev.owner,
                    path = %prev.path,
                    old = prev.hash.short(),
                    "path now references different content"
                );
                self.release(&prev.hash).await?;
            }
        }
        Ok(())
    }

    /// Drop one reference's worth of count from an entry whose reference has
    /// already been deleted. Reclaims the entry and its blob when no
    /// references remain and returns the bytes freed.
    async fn release(&self, hash: &ContentHash) -> DedupResult<Option<u64>> {
        let Some(entry) = self.backend.get_entry(hash).await? else {
            debug!(hash = hash.short(), "entry already gone");
            return Ok(None);
        };

        let remaining = entry.decremented();
        if remaining.ref_count > 0 {
            self.backend.put_entry(&remaining).await?;
            return Ok(None);
        }

        // The stored count may lag behind concurrent stores; never reclaim
        // content something still points at.
        let live = self.live_references(hash).await?;
        if live > 0 {
            warn!(hash = hash.short(), live, "reference count was low, correcting");
            self.backend.put_entry(&entry.with_ref_count(live)).await?;
            return Ok(None);
        }

        self.reclaim(&entry).await
    }

    /// Delete an unreferenced entry and then its blob, returning the bytes
    /// freed. A reference that appears while this runs wins: the entry is
    /// put back with the live count and, for digest-keyed content, the blob
    /// is rewritten from the copy read up front.
    async fn reclaim(&self, entry: &ContentEntry) -> DedupResult<Option<u64>> {
        let hash = &entry.hash;
        // Every store of a digest writes identical bytes, so a copy taken
        // now is valid for whichever store races the deletion. Direct keys
        // are rewritten in place and cannot be restored this way.
        let copy = if hash.is_direct() {
            None
        } else {
            self.backend.get_blob(&entry.storage_key).await?
        };

        let deleted = self.backend.delete_entry(hash).await?;
        let live = self.live_references(hash).await?;
        if live > 0 {
            warn!(hash = hash.short(), live, "content referenced during reclaim, keeping");
            self.backend.put_entry(&entry.with_ref_count(live)).await?;
            return Ok(None);
        }

        self.backend.delete_blob(&entry.storage_key).await?;
        let live = self.live_references(hash).await?;
        if live > 0 {
            warn!(hash = hash.short(), live, "content referenced during reclaim, restoring");
            if let Some(blob) = &copy {
                self.backend.put_blob(blob).await?;
            }
            if self.backend.get_entry(hash).await?.is_none() {
                self.backend.put_entry(&entry.with_ref_count(live)).await?;
            }
            return Ok(None);
        }

        debug!(hash = hash.short(), size = entry.size, "reclaimed content");
        // A concurrent reclaim that deleted the entry first reports the bytes.
        Ok(deleted.then_some(entry.size))
    }

    async fn remove_reference(
        &self,
        reference: &Reference,
        report: &mut RemovalReport,
    ) -> DedupResult<()> {
        // Someone else deleted it first and already released the count.
        if !self
            .backend
            .delete_reference(&reference.owner, &reference.path)
            .await?
        {
            return Ok(());
        }
        report.references_removed += 1;
        if let Some(freed) = self.release(&reference.hash).await? {
            report.entries_removed += 1;
            report.bytes_freed += freed;
        }
        Ok(())
    }

    /// Delete one resource of an owner.
    pub async fn remove_resource(&self, owner: &OwnerId, path: &str) -> DedupResult<RemovalReport> {
        let mut report = RemovalReport::default();
        if let Some(reference) = self.backend.get_reference(owner, path).await? {
            self.remove_reference(&reference, &mut report).await?;
        }
        Ok(report)
    }

    /// Delete every resource of an owner, reclaiming content nobody else holds.
    pub async fn remove_owner(&self, owner: &OwnerId) -> DedupResult<RemovalReport> {
        let mut report = RemovalReport::default();
        for reference in self.backend.references_by_owner(owner).await? {
            self.remove_reference(&reference, &mut report).await?;
        }
        info!(
            owner = %owner,
            references = report.references_removed,
            entries = report.entries_removed,
            bytes_freed = report.bytes_freed,
            "removed owner"
        );
        Ok(report)
    }

    // ---- Reads ----

    /// Bytes stored for `owner` at `path`, or `None`.
    ///
    /// A reference whose entry has vanished is deleted on the way, unless it
    /// was written within the orphan grace window and may belong to a store
    /// that is still completing.
    pub async fn retrieve(&self, owner: &OwnerId, path: &str) -> DedupResult<Option<Vec<u8>>> {
        let Some(reference) = self.backend.get_reference(owner, path).await? else {
            return Ok(None);
        };

        let Some(entry) = self.backend.get_entry(&reference.hash).await? else {
            if self.within_grace(reference.created_at) {
                debug!(owner = %owner, path, "reference has no entry yet");
                return Ok(None);
            }
            warn!(owner = %owner, path, hash = reference.hash.short(), "dropping orphaned reference");
            self.backend.delete_reference(owner, path).await?;
            return Ok(None);
        };

        let Some(blob) = self.backend.get_blob(&entry.storage_key).await? else {
            warn!(hash = entry.hash.short(), key = %entry.storage_key, "entry has no blob");
            return Ok(None);
        };

        self.backend.put_entry(&entry.touched(Utc::now())).await?;
        Ok(Some(blob.data))
    }

    /// Whether identical content is already stored. Never changes counts.
    pub async fn exists(&self, data: &[u8]) -> DedupResult<ExistsReport> {
        let hash = self.hasher.hash(data);
        let exists = self.backend.get_entry(&hash).await?.is_some();
        Ok(ExistsReport { exists, hash })
    }

    /// Whether `owner` holds a resource at `path`.
    pub async fn has_resource(&self, owner: &OwnerId, path: &str) -> DedupResult<bool> {
        Ok(self.backend.get_reference(owner, path).await?.is_some())
    }

    /// Resources held by `owner`, sorted by path. References without an
    /// entry are skipped.
    pub async fn list_owner_resources(&self, owner: &OwnerId) -> DedupResult<Vec<OwnerResource>> {
        let mut resources = Vec::new();
        for reference in self.backend.references_by_owner(owner).await? {
            if let Some(entry) = self.backend.get_entry(&reference.hash).await? {
                resources.push(OwnerResource {
                    resource_path: reference.path,
                    hash: entry.hash,
                    size: entry.size,
                    mime_type: entry.mime_type,
                });
            }
        }
        resources.sort_by(|a, b| a.resource_path.cmp(&b.resource_path));
        Ok(resources)
    }

    // ---- Maintenance ----

    /// Full-scan repair.
    ///
    /// Deletes references whose entry is gone, reclaims entries nothing
    /// references, and overwrites stored counts that disagree with the
    /// actual number of references. References and unreferenced entries
    /// touched within the orphan grace window are skipped so that stores
    /// still in flight are left alone; count correction always runs.
    ///
    /// Counts come from a single listing of all references. Only entries
    /// whose listed count looks wrong are re-checked against the backend.
    pub async fn cleanup(&self) -> DedupResult<CleanupReport> {
        let mut report = CleanupReport::default();
        let entries = self.backend.list_entries().await?;
        let references = self.backend.list_references().await?;
        let known: HashSet<&ContentHash> = entries.iter().map(|e| &e.hash).collect();

        let mut listed: HashMap<&ContentHash, u64> = HashMap::new();
        for reference in &references {
            if known.contains(&reference.hash) {
                *listed.entry(&reference.hash).or_default() += 1;
                continue;
            }
            if self.within_grace(reference.created_at) {
                report.skipped_recent += 1;
                continue;
            }
            // The entry may have been created after the listing.
            if self.backend.get_entry(&reference.hash).await?.is_some() {
                continue;
            }
            if self
                .backend
                .delete_reference(&reference.owner, &reference.path)
                .await?
            {
                warn!(
                    owner = %reference.owner,
                    path = %reference.path,
                    hash = reference.hash.short(),
                    "removed dangling reference"
                );
                report.dangling_references_removed += 1;
            }
        }

        for entry in &entries {
            let count = listed.get(&entry.hash).copied().unwrap_or(0);
            if count > 0 && count == entry.ref_count {
                continue;
            }

            // The listing is a snapshot; decide on current state.
            let Some(current) = self.backend.get_entry(&entry.hash).await? else {
                continue;
            };
            let actual = self.live_references(&entry.hash).await?;
            if actual == 0 {
                if self.within_grace(current.last_accessed_at) {
                    report.skipped_recent += 1;
                    continue;
                }
                if let Some(freed) = self.reclaim(&current).await? {
                    report.orphans_removed += 1;
                    report.bytes_freed += freed;
                }
            } else if actual != current.ref_count {
                debug!(
                    hash = entry.hash.short(),
                    stored = current.ref_count,
                    actual,
                    "correcting reference count"
                );
                self.backend.put_entry(&current.with_ref_count(actual)).await?;
                report.counts_corrected += 1;
            }
        }

        info!(
            orphans = report.orphans_removed,
            bytes_freed = report.bytes_freed,
            corrected = report.counts_corrected,
            dangling = report.dangling_references_removed,
            skipped = report.skipped_recent,
            "cleanup complete"
        );
        Ok(report)
    }

    /// Read-only integrity audit of every entry's blob.
    ///
    /// Digest-keyed entries are re-hashed. Direct entries carry no digest,
    /// so only their blob length is compared with the recorded size and a
    /// same-length overwrite of such a blob goes undetected.
    pub async fn verify(&self) -> DedupResult<VerifyReport> {
        let entries = self.backend.list_entries().await?;
        let mut report = VerifyReport {
            total_entries: entries.len(),
            ..VerifyReport::default()
        };

        for entry in entries {
            let Some(blob) = self.backend.get_blob(&entry.storage_key).await? else {
                warn!(hash = entry.hash.short(), key = %entry.storage_key, "blob missing");
                report.missing_content.push(entry.hash);
                continue;
            };
            let intact = if entry.hash.is_direct() {
                blob.size() == entry.size
            } else {
                self.hasher.verify(&blob.data, &entry.hash)
            };
            if intact {
                report.valid_entries += 1;
            } else {
                warn!(hash = entry.hash.short(), "blob does not match its entry");
                report.corrupted_entries.push(entry.hash);
            }
        }

        info!(
            total = report.total_entries,
            valid = report.valid_entries,
            corrupted = report.corrupted_entries.len(),
            missing = report.missing_content.len(),
            "verify complete"
        );
        Ok(report)
    }

    /// Aggregate statistics over all entries.
    pub async fn stats(&self) -> DedupResult<DedupStats> {
        let entries = self.backend.list_entries().await?;
        Ok(compute_stats(&entries, self.config.top_duplicates))
    }
}

fn compute_stats(entries: &[ContentEntry], top: usize) -> DedupStats {
    let bytes_stored: u64 = entries.iter().map(|e| e.size).sum();
    let bytes_saved: u64 = entries.iter().map(ContentEntry::bytes_saved).sum();
    let logical = bytes_stored + bytes_saved;
    let dedup_ratio = if logical == 0 {
        0.0
    } else {
        bytes_saved as f64 / logical as f64
    };

    let mut shared: Vec<&ContentEntry> = entries.iter().filter(|e| e.ref_count > 1).collect();
    shared.sort_by(|a, b| {
        b.logical_bytes()
            .cmp(&a.logical_bytes())
            .then_with(|| a.hash.cmp(&b.hash))
    });

    DedupStats {
        unique_entries: entries.len(),
        total_references: entries.iter().map(|e| e.ref_count).sum(),
        bytes_stored,
        bytes_saved,
        dedup_ratio,
        top_duplicates: shared.into_iter().take(top).map(DuplicateSummary::from).collect(),
    }
}

impl<B> std::fmt::Debug for DedupManager<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DedupManager")
            .field("algorithm", &self.hasher.algorithm())
            .field("min_size", &self.config.min_size)
            .finish()
    }
}
