//! Filesystem storage backend.
//!
//! Layout under the root directory:
//!
//! ```text
//! {root}/entries/{b3(hash)}.json
//! {root}/blobs/{b3(storage_key)}
//! {root}/refs/{b3(owner)}/{b3(path)}.json
//! ```
//!
//! File names are the BLAKE3 hex of the logical key, which keeps them
//! filesystem-safe and bounded in length whatever the owner ids and resource
//! paths look like. The logical keys themselves live inside the JSON records.
//! Every write lands in a uniquely named temp file that is renamed over the
//! target, so a single record is replaced atomically. An owner's directory
//! under `refs/` is removed together with its last reference.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;
use tracing::{debug, warn};

use folio_types::{ContentHash, OwnerId, StorageKey};

use crate::error::{StoreError, StoreResult};
use crate::record::{BlobHandle, ContentEntry, Reference};
use crate::traits::StorageBackend;

const ENTRIES_DIR: &str = "entries";
const BLOBS_DIR: &str = "blobs";
const REFS_DIR: &str = "refs";
const RECORD_EXT: &str = "json";

/// Times a reference write is retried after its owner directory was pruned
/// by a concurrent delete.
const DIR_RETRIES: usize = 3;

fn file_name(logical: &str) -> String {
    blake3::hash(logical.as_bytes()).to_hex().to_string()
}

/// Storage backend persisting each record as its own file.
///
/// References are stored per owner, so `references_by_owner` reads one
/// directory while `references_by_hash` and `list_references` read and
/// decode every reference file in the store.
#[derive(Debug, Clone)]
pub struct FileSystemBackend {
    root: PathBuf,
}

impl FileSystemBackend {
    /// Open a backend rooted at `root`, creating the directory layout if needed.
    pub async fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join(ENTRIES_DIR)).await?;
        fs::create_dir_all(root.join(BLOBS_DIR)).await?;
        fs::create_dir_all(root.join(REFS_DIR)).await?;
        debug!(root = %root.display(), "opened filesystem backend");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, hash: &ContentHash) -> PathBuf {
        self.root
            .join(ENTRIES_DIR)
            .join(format!("{}.{RECORD_EXT}", file_name(hash.as_str())))
    }

    fn blob_path(&self, key: &StorageKey) -> PathBuf {
        self.root.join(BLOBS_DIR).join(file_name(key.as_str()))
    }

    fn owner_dir(&self, owner: &OwnerId) -> PathBuf {
        self.root.join(REFS_DIR).join(file_name(owner.as_str()))
    }

    fn reference_path(&self, owner: &OwnerId, path: &str) -> PathBuf {
        self.owner_dir(owner)
            .join(format!("{}.{RECORD_EXT}", file_name(path)))
    }

    async fn all_references(&self) -> StoreResult<Vec<Reference>> {
        let mut refs = Vec::new();
        let mut dirs = match fs::read_dir(self.root.join(REFS_DIR)).await {
            Ok(dirs) => dirs,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(refs),
            Err(e) => return Err(e.into()),
        };
        while let Some(dir) = dirs.next_entry().await? {
            // Owner directories may be pruned while the scan runs.
            match dir.file_type().await {
                Ok(kind) if kind.is_dir() => {
                    refs.extend(read_records::<Reference>(&dir.path()).await?);
                }
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        sort_references(&mut refs);
        Ok(refs)
    }
}

fn sort_references(refs: &mut [Reference]) {
    refs.sort_by(|a, b| (&a.owner, &a.path).cmp(&(&b.owner, &b.path)));
}

async fn read_optional(path: &Path) -> StoreResult<Option<Vec<u8>>> {
    match fs::read(path).await {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn remove_optional(path: &Path) -> StoreResult<bool> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Remove a directory if it is empty. A missing or non-empty directory is
/// left as it is.
async fn prune_dir(dir: &Path) -> StoreResult<()> {
    match fs::remove_dir(dir).await {
        Ok(()) => {
            debug!(dir = %dir.display(), "pruned empty directory");
            Ok(())
        }
        Err(e)
            if matches!(
                e.kind(),
                io::ErrorKind::NotFound | io::ErrorKind::DirectoryNotEmpty
            ) =>
        {
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

async fn write_atomic(path: &Path, data: &[u8]) -> StoreResult<()> {
    let tmp = path.with_extension(format!("{}.tmp", uuid::Uuid::now_v7()));
    fs::write(&tmp, data).await?;
    if let Err(e) = fs::rename(&tmp, path).await {
        if let Err(cleanup) = fs::remove_file(&tmp).await {
            warn!(path = %tmp.display(), error = %cleanup, "failed to remove temp file");
        }
        return Err(e.into());
    }
    Ok(())
}

fn decode<T: DeserializeOwned>(path: &Path, bytes: &[u8]) -> StoreResult<T> {
    serde_json::from_slice(bytes).map_err(|e| StoreError::InvalidRecord {
        location: path.display().to_string(),
        reason: e.to_string(),
    })
}

async fn read_record<T: DeserializeOwned>(path: &Path) -> StoreResult<Option<T>> {
    match read_optional(path).await? {
        Some(bytes) => decode(path, &bytes).map(Some),
        None => Ok(None),
    }
}

async fn write_record<T: Serialize>(path: &Path, record: &T) -> StoreResult<()> {
    let bytes = serde_json::to_vec_pretty(record)?;
    write_atomic(path, &bytes).await
}

/// Decode every `*.json` record in a directory. Temp files are skipped, as
/// are records deleted between listing and reading.
async fn read_records<T: DeserializeOwned>(dir: &Path) -> StoreResult<Vec<T>> {
    let mut records = Vec::new();
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(records),
        Err(e) => return Err(e.into()),
    };
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXT) {
            continue;
        }
        if let Some(record) = read_record(&path).await? {
            records.push(record);
        }
    }
    Ok(records)
}

#[async_trait]
impl StorageBackend for FileSystemBackend {
    async fn get_entry(&self, hash: &ContentHash) -> StoreResult<Option<ContentEntry>> {
        read_record(&self.entry_path(hash)).await
    }

    async fn put_entry(&self, entry: &ContentEntry) -> StoreResult<()> {
        write_record(&self.entry_path(&entry.hash), entry).await
    }

    async fn delete_entry(&self, hash: &ContentHash) -> StoreResult<bool> {
        remove_optional(&self.entry_path(hash)).await
    }

    async fn get_blob(&self, key: &StorageKey) -> StoreResult<Option<BlobHandle>> {
        Ok(read_optional(&self.blob_path(key))
            .await?
            .map(|data| BlobHandle::new(key.clone(), data)))
    }

    async fn put_blob(&self, blob: &BlobHandle) -> StoreResult<()> {
        write_atomic(&self.blob_path(&blob.storage_key), &blob.data).await
    }

    async fn delete_blob(&self, key: &StorageKey) -> StoreResult<bool> {
        remove_optional(&self.blob_path(key)).await
    }

    async fn contains_blob(&self, key: &StorageKey) -> StoreResult<bool> {
        Ok(fs::try_exists(self.blob_path(key)).await?)
    }

    async fn get_reference(&self, owner: &OwnerId, path: &str) -> StoreResult<Option<Reference>> {
        read_record(&self.reference_path(owner, path)).await
    }

    async fn put_reference(&self, reference: &Reference) -> StoreResult<()> {
        let dir = self.owner_dir(&reference.owner);
        let path = self.reference_path(&reference.owner, &reference.path);
        let mut attempt = 0;
        loop {
            fs::create_dir_all(&dir).await?;
            match write_record(&path, reference).await {
                // The directory was pruned between creating it and writing.
                Err(StoreError::Io(e))
                    if e.kind() == io::ErrorKind::NotFound && attempt < DIR_RETRIES =>
                {
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn delete_reference(&self, owner: &OwnerId, path: &str) -> StoreResult<bool> {
        let removed = remove_optional(&self.reference_path(owner, path)).await?;
        if removed {
            prune_dir(&self.owner_dir(owner)).await?;
        }
        Ok(removed)
    }

    async fn list_entries(&self) -> StoreResult<Vec<ContentEntry>> {
        let mut entries: Vec<ContentEntry> = read_records(&self.root.join(ENTRIES_DIR)).await?;
        entries.sort_by(|a, b| a.hash.cmp(&b.hash));
        Ok(entries)
    }

    async fn list_references(&self) -> StoreResult<Vec<Reference>> {
        self.all_references().await
    }

    async fn references_by_owner(&self, owner: &OwnerId) -> StoreResult<Vec<Reference>> {
        let mut refs: Vec<Reference> = read_records(&self.owner_dir(owner)).await?;
        sort_references(&mut refs);
        Ok(refs)
    }

    async fn references_by_hash(&self, hash: &ContentHash) -> StoreResult<Vec<Reference>> {
        let mut refs = self.all_references().await?;
        refs.retain(|r| r.hash == *hash);
        Ok(refs)
    }
}
