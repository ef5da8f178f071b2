//! Storage backends for Folio.
//!
//! A backend persists three record kinds behind a narrow contract so that
//! disk, object-store, and in-memory implementations are interchangeable:
//!
//! - [`ContentEntry`] -- metadata for one distinct byte sequence
//! - [`BlobHandle`] -- the raw bytes at a storage key
//! - [`Reference`] -- an `(owner, path)` link to a content hash
//!
//! # Storage Backends
//!
//! All backends implement the [`StorageBackend`] trait:
//!
//! - [`InMemoryBackend`] -- `HashMap`-based store for tests and embedding
//! - [`FileSystemBackend`] -- one file per record under a root directory
//!
//! # Design Rules
//!
//! 1. Absence is a value (`None`, empty, `false`), never an error.
//! 2. Single-key operations are atomic; multi-key sequences are not.
//! 3. Deleting a missing record is a no-op.
//! 4. The backend never interprets blob contents.
//! 5. All I/O errors are propagated, never silently ignored.

pub mod error;
pub mod fs;
pub mod memory;
pub mod record;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use fs::FileSystemBackend;
pub use memory::InMemoryBackend;
pub use record::{BlobHandle, ContentEntry, Reference};
pub use traits::StorageBackend;
