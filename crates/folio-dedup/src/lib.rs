//! Reference-counted deduplication for Folio.
//!
//! [`DedupManager`] stores each distinct byte sequence once, links every
//! `(owner, path)` that holds it through a reference, and reclaims the bytes
//! when the last reference goes away. It works against any
//! [`StorageBackend`](folio_store::StorageBackend).
//!
//! # Operations
//!
//! - `store` / `retrieve` / `exists` / `has_resource`
//! - `remove_resource` / `remove_owner` / `list_owner_resources`
//! - `cleanup` (repair), `verify` (audit), `stats`
//!
//! # Example
//!
//! ```no_run
//! # async fn demo() -> folio_dedup::DedupResult<()> {
//! use std::sync::Arc;
//! use folio_dedup::{DedupConfig, DedupManager};
//! use folio_store::InMemoryBackend;
//! use folio_types::OwnerId;
//!
//! let manager = DedupManager::new(Arc::new(InMemoryBackend::new()), DedupConfig::default())?;
//! let book = OwnerId::new("book-1").expect("non-empty");
//! let outcome = manager.store(&book, "cover.jpg", &[0u8; 4096], "image/jpeg").await?;
//! assert!(!outcome.is_duplicate);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod manager;
pub mod report;

pub use config::DedupConfig;
pub use error::{DedupError, DedupResult};
pub use manager::DedupManager;
pub use report::{
    CleanupReport, DedupStats, DuplicateSummary, ExistsReport, OwnerResource, RemovalReport,
    StoreOutcome, VerifyReport,
};
