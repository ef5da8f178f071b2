//! Manager behavior over the filesystem backend and over a backend that fails.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use folio_dedup::{DedupConfig, DedupError, DedupManager};
use folio_store::{
    BlobHandle, ContentEntry, FileSystemBackend, InMemoryBackend, Reference, StorageBackend,
    StoreError, StoreResult,
};
use folio_types::{ContentHash, OwnerId, StorageKey};

fn owner(id: &str) -> OwnerId {
    OwnerId::new(id).unwrap()
}

fn image(seed: u8) -> Vec<u8> {
    (0..3000u32).map(|i| (i as u8).wrapping_add(seed)).collect()
}

// ---------------------------------------------------------------------------
// Filesystem backend
// ---------------------------------------------------------------------------

#[tokio::test]
async fn filesystem_dedup_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(FileSystemBackend::open(dir.path()).await.unwrap());
    let m = DedupManager::with_defaults(backend);

    let a = owner("urn:isbn:978-0");
    let b = owner("urn:isbn:978-1");
    let data = image(3);

    m.store(&a, "OEBPS/Images/cover.jpg", &data, "image/jpeg").await.unwrap();
    let dup = m.store(&b, "images/cover.jpg", &data, "image/jpeg").await.unwrap();
    assert!(dup.is_duplicate);
    assert_eq!(dup.ref_count, 2);
    m.store(&a, "OEBPS/style.css", b"body{}", "text/css").await.unwrap();

    assert_eq!(m.retrieve(&b, "images/cover.jpg").await.unwrap(), Some(data.clone()));
    assert!(m.verify().await.unwrap().is_healthy());
    assert!(!m.cleanup().await.unwrap().repaired_anything());

    let removed = m.remove_owner(&a).await.unwrap();
    assert_eq!(removed.references_removed, 2);
    assert_eq!(removed.entries_removed, 1);

    let stats = m.stats().await.unwrap();
    assert_eq!(stats.unique_entries, 1);
    assert_eq!(stats.bytes_stored, 3000);
    assert_eq!(stats.bytes_saved, 0);
}

#[tokio::test]
async fn filesystem_state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let a = owner("book");
    let data = image(9);
    {
        let backend = Arc::new(FileSystemBackend::open(dir.path()).await.unwrap());
        let m = DedupManager::with_defaults(backend);
        m.store(&a, "cover.jpg", &data, "image/jpeg").await.unwrap();
    }

    let backend = Arc::new(FileSystemBackend::open(dir.path()).await.unwrap());
    let m = DedupManager::with_defaults(backend);
    assert!(m.has_resource(&a, "cover.jpg").await.unwrap());
    assert_eq!(m.retrieve(&a, "cover.jpg").await.unwrap(), Some(data));
}

#[tokio::test]
async fn filesystem_corruption_is_detected() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(FileSystemBackend::open(dir.path()).await.unwrap());
    let m = DedupManager::with_defaults(Arc::clone(&backend));

    let stored = m.store(&owner("a"), "x.png", &image(1), "image/png").await.unwrap();
    backend
        .put_blob(&BlobHandle::new(stored.storage_key.clone(), image(2)))
        .await
        .unwrap();

    let report = m.verify().await.unwrap();
    assert_eq!(report.corrupted_entries, vec![stored.hash]);
}

// ---------------------------------------------------------------------------
// Failing backend
// ---------------------------------------------------------------------------

/// Delegates to an in-memory backend, failing reference writes on demand.
#[derive(Default)]
struct FlakyBackend {
    inner: InMemoryBackend,
    fail_reference_writes: AtomicBool,
}

impl FlakyBackend {
    fn set_failing(&self, failing: bool) {
        self.fail_reference_writes.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> StoreResult<()> {
        if self.fail_reference_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Io(std::io::Error::other("disk full")));
        }
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for FlakyBackend {
    async fn get_entry(&self, hash: &ContentHash) -> StoreResult<Option<ContentEntry>> {
        self.inner.get_entry(hash).await
    }
    async fn put_entry(&self, entry: &ContentEntry) -> StoreResult<()> {
        self.inner.put_entry(entry).await
    }
    async fn delete_entry(&self, hash: &ContentHash) -> StoreResult<bool> {
        self.inner.delete_entry(hash).await
    }
    async fn get_blob(&self, key: &StorageKey) -> StoreResult<Option<BlobHandle>> {
        self.inner.get_blob(key).await
    }
    async fn put_blob(&self, blob: &BlobHandle) -> StoreResult<()> {
        self.inner.put_blob(blob).await
    }
    async fn delete_blob(&self, key: &StorageKey) -> StoreResult<bool> {
        self.inner.delete_blob(key).await
    }
    async fn get_reference(&self, owner: &OwnerId, path: &str) -> StoreResult<Option<Reference>> {
        self.inner.get_reference(owner, path).await
    }
    async fn put_reference(&self, reference: &Reference) -> StoreResult<()> {
        self.check()?;
        self.inner.put_reference(reference).await
    }
    async fn delete_reference(&self, owner: &OwnerId, path: &str) -> StoreResult<bool> {
        self.check()?;
        self.inner.delete_reference(owner, path).await
    }
    async fn list_entries(&self) -> StoreResult<Vec<ContentEntry>> {
        self.inner.list_entries().await
    }
    async fn list_references(&self) -> StoreResult<Vec<Reference>> {
        self.inner.list_references().await
    }
    async fn references_by_owner(&self, owner: &OwnerId) -> StoreResult<Vec<Reference>> {
        self.inner.references_by_owner(owner).await
    }
    async fn references_by_hash(&self, hash: &ContentHash) -> StoreResult<Vec<Reference>> {
        self.inner.references_by_hash(hash).await
    }
}

#[tokio::test]
async fn failed_reference_write_propagates_and_cleanup_repairs() {
    let backend = Arc::new(FlakyBackend::default());
    let m = DedupManager::with_defaults(Arc::clone(&backend));
    let data = image(5);
    m.store(&owner("a"), "cover.jpg", &data, "image/jpeg").await.unwrap();

    backend.set_failing(true);
    let err = m
        .store(&owner("b"), "cover.jpg", &data, "image/jpeg")
        .await
        .unwrap_err();
    assert!(matches!(err, DedupError::Store(StoreError::Io(_))));
    backend.set_failing(false);

    // The count was raised before the reference write failed.
    let hash = m.compute_hash(&data);
    assert_eq!(backend.get_entry(&hash).await.unwrap().unwrap().ref_count, 2);
    assert!(!m.has_resource(&owner("b"), "cover.jpg").await.unwrap());

    let report = m.cleanup().await.unwrap();
    assert_eq!(report.counts_corrected, 1);
    assert_eq!(backend.get_entry(&hash).await.unwrap().unwrap().ref_count, 1);
}

#[tokio::test]
async fn failed_novel_store_leaves_reclaimable_entry() {
    let backend = Arc::new(FlakyBackend::default());
    let config = DedupConfig {
        orphan_grace_secs: 0,
        ..DedupConfig::default()
    };
    let m = DedupManager::new(Arc::clone(&backend), config).unwrap();

    backend.set_failing(true);
    assert!(m.store(&owner("a"), "x", &image(6), "image/jpeg").await.is_err());
    backend.set_failing(false);

    let report = m.cleanup().await.unwrap();
    assert_eq!(report.orphans_removed, 1);
    assert_eq!(report.bytes_freed, 3000);
    assert_eq!(backend.inner.blob_count(), 0);
}

#[tokio::test]
async fn failed_removal_keeps_content() {
    let backend = Arc::new(FlakyBackend::default());
    let m = DedupManager::with_defaults(Arc::clone(&backend));
    let data = image(7);
    m.store(&owner("a"), "x", &data, "image/jpeg").await.unwrap();

    backend.set_failing(true);
    assert!(m.remove_owner(&owner("a")).await.is_err());
    backend.set_failing(false);

    assert_eq!(m.retrieve(&owner("a"), "x").await.unwrap(), Some(data));
}
