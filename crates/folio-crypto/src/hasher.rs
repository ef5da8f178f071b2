use std::fmt;
use std::str::FromStr;

use folio_types::ContentHash;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Digest algorithm used to key content entries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// SHA-256, 64 hex characters.
    #[default]
    Sha256,
    /// BLAKE3 with the default 256-bit output, 64 hex characters.
    Blake3,
}

impl HashAlgorithm {
    /// Length of a digest in hex characters.
    pub const fn hex_len(self) -> usize {
        match self {
            Self::Sha256 | Self::Blake3 => 64,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Blake3 => "blake3",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = HashAlgorithmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(Self::Sha256),
            "blake3" => Ok(Self::Blake3),
            other => Err(HashAlgorithmError::Unknown(other.to_string())),
        }
    }
}

/// Deterministic content hasher.
///
/// No salt, no per-run state: identical bytes always produce the identical
/// lowercase hex digest, on every platform.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ContentHasher {
    algorithm: HashAlgorithm,
}

impl ContentHasher {
    /// SHA-256 hasher (the default).
    pub const SHA256: Self = Self {
        algorithm: HashAlgorithm::Sha256,
    };
    /// BLAKE3 hasher.
    pub const BLAKE3: Self = Self {
        algorithm: HashAlgorithm::Blake3,
    };

    pub const fn new(algorithm: HashAlgorithm) -> Self {
        Self { algorithm }
    }

    /// Hash raw bytes.
    pub fn hash(&self, data: &[u8]) -> ContentHash {
        match self.algorithm {
            HashAlgorithm::Sha256 => ContentHash::from_digest(&Sha256::digest(data)),
            HashAlgorithm::Blake3 => ContentHash::from_digest(blake3::hash(data).as_bytes()),
        }
    }

    /// Verify that data produces the expected hash.
    pub fn verify(&self, data: &[u8], expected: &ContentHash) -> bool {
        self.hash(data) == *expected
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }
}

/// Errors from parsing an algorithm name.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HashAlgorithmError {
    #[error("unknown hash algorithm: {0}")]
    Unknown(String),
}
