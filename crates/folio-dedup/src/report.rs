//! Result types returned by [`DedupManager`](crate::DedupManager) operations.

use serde::{Deserialize, Serialize};

use folio_store::ContentEntry;
use folio_types::{ContentHash, StorageKey};

/// Result of a `store` call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreOutcome {
    pub hash: ContentHash,
    /// `true` when no new blob was written.
    pub is_duplicate: bool,
    pub storage_key: StorageKey,
    /// Bytes this call avoided writing. Zero for novel content and for
    /// re-stores of content the path already references.
    pub bytes_saved: u64,
    /// Reference count of the entry after the call.
    pub ref_count: u64,
}

/// Result of an `exists` lookup.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistsReport {
    pub exists: bool,
    pub hash: ContentHash,
}

/// Result of removing references.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovalReport {
    pub references_removed: usize,
    /// Entries (and their blobs) reclaimed because their last reference went away.
    pub entries_removed: usize,
    pub bytes_freed: u64,
}

/// One resource held by an owner.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerResource {
    pub resource_path: String,
    pub hash: ContentHash,
    pub size: u64,
    pub mime_type: String,
}

/// Result of a `cleanup` pass.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    /// Entries with no remaining references, reclaimed with their blobs.
    pub orphans_removed: usize,
    pub bytes_freed: u64,
    /// Entries whose stored reference count was overwritten with the true count.
    pub counts_corrected: usize,
    /// References whose entry no longer existed.
    pub dangling_references_removed: usize,
    /// Unreferenced entries and dangling references left alone because they
    /// were touched within the orphan grace window.
    pub skipped_recent: usize,
}

impl CleanupReport {
    /// Returns `true` if the pass changed anything.
    pub fn repaired_anything(&self) -> bool {
        self.orphans_removed > 0 || self.counts_corrected > 0 || self.dangling_references_removed > 0
    }
}

/// Result of a `verify` audit.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyReport {
    pub total_entries: usize,
    pub valid_entries: usize,
    /// Entries whose blob no longer matches the recorded hash. Direct
    /// entries are only checked by size, so a same-length overwrite of one
    /// is not listed here.
    pub corrupted_entries: Vec<ContentHash>,
    /// Entries whose blob is missing.
    pub missing_content: Vec<ContentHash>,
}

impl VerifyReport {
    pub fn is_healthy(&self) -> bool {
        self.corrupted_entries.is_empty() && self.missing_content.is_empty()
    }
}

/// An entry ranked in [`DedupStats::top_duplicates`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateSummary {
    pub hash: ContentHash,
    pub mime_type: String,
    pub size: u64,
    pub ref_count: u64,
    pub bytes_saved: u64,
}

impl From<&ContentEntry> for DuplicateSummary {
    fn from(entry: &ContentEntry) -> Self {
        Self {
            hash: entry.hash.clone(),
            mime_type: entry.mime_type.clone(),
            size: entry.size,
            ref_count: entry.ref_count,
            bytes_saved: entry.bytes_saved(),
        }
    }
}

/// Aggregate storage statistics.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DedupStats {
    pub unique_entries: usize,
    /// Sum of all entry reference counts.
    pub total_references: u64,
    /// Physical bytes held: the sum of entry sizes.
    pub bytes_stored: u64,
    /// Bytes avoided: `(ref_count - 1) * size` summed over shared entries.
    pub bytes_saved: u64,
    /// `bytes_saved / (bytes_stored + bytes_saved)`, or 0 for an empty store.
    pub dedup_ratio: f64,
    /// Shared entries ranked by `ref_count * size`, largest first.
    pub top_duplicates: Vec<DuplicateSummary>,
}
