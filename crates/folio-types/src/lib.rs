//! Foundation types for Folio.
//!
//! Folio stores book files and embedded assets once per distinct byte
//! sequence. This crate holds the identifiers shared by every other Folio
//! crate.
//!
//! # Key Types
//!
//! - [`ContentHash`] -- Key of a content entry (hex digest or direct key)
//! - [`OwnerId`] -- Logical owner of stored resources
//! - [`StorageKey`] -- Opaque blob locator inside a backend

pub mod error;
pub mod hash;
pub mod key;
pub mod owner;

pub use error::TypeError;
pub use hash::ContentHash;
pub use key::StorageKey;
pub use owner::OwnerId;
