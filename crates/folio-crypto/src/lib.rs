//! Content digests for Folio.
//!
//! Every deduplicated resource is keyed by a deterministic digest of its
//! bytes. The algorithm is chosen once per store; switching it on an existing
//! store is an operator-managed migration.
//!
//! All hashing wraps established libraries (`sha2`, `blake3`).

pub mod hasher;

pub use hasher::{ContentHasher, HashAlgorithm, HashAlgorithmError};
