use std::path::Path;

use folio_crypto::HashAlgorithm;
use serde::{Deserialize, Serialize};

use crate::error::{DedupError, DedupResult};

/// Upper bound for `orphan_grace_secs` (one year).
const MAX_ORPHAN_GRACE_SECS: u64 = 365 * 24 * 60 * 60;

const DEFAULT_ORPHAN_GRACE_SECS: u64 = 300;

/// Configuration for a [`DedupManager`](crate::DedupManager).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Content shorter than this many bytes is stored directly, without
    /// hashing and without deduplication across owners.
    pub min_size: usize,
    /// Digest algorithm for content keys. Fixed for the lifetime of a store.
    pub algorithm: HashAlgorithm,
    /// Number of entries reported in `DedupStats::top_duplicates`.
    pub top_duplicates: usize,
    /// Unreferenced entries accessed, and dangling references written,
    /// within this many seconds are left alone by `cleanup` and `retrieve`,
    /// so stores still in flight are not undone. Zero repairs immediately.
    /// Reference count correction is not affected.
    pub orphan_grace_secs: u64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            min_size: 1024,
            algorithm: HashAlgorithm::Sha256,
            top_duplicates: 10,
            orphan_grace_secs: DEFAULT_ORPHAN_GRACE_SECS,
        }
    }
}

impl DedupConfig {
    /// Parse a TOML document. Missing keys take their default values.
    pub fn from_toml_str(s: &str) -> DedupResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| DedupError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML configuration file.
    pub fn load(path: &Path) -> DedupResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn to_toml_string(&self) -> DedupResult<String> {
        toml::to_string_pretty(self).map_err(|e| DedupError::Config(e.to_string()))
    }

    pub fn validate(&self) -> DedupResult<()> {
        if self.top_duplicates == 0 {
            return Err(DedupError::Config("top_duplicates must be at least 1".into()));
        }
        if self.orphan_grace_secs > MAX_ORPHAN_GRACE_SECS {
            return Err(DedupError::Config(format!(
                "orphan_grace_secs must not exceed {MAX_ORPHAN_GRACE_SECS}"
            )));
        }
        Ok(())
    }

    pub fn orphan_grace(&self) -> chrono::Duration {
        let secs = self.orphan_grace_secs.min(MAX_ORPHAN_GRACE_SECS);
        chrono::Duration::seconds(secs as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = DedupConfig::default();
        assert_eq!(c.min_size, 1024);
        assert_eq!(c.algorithm, HashAlgorithm::Sha256);
        assert_eq!(c.top_duplicates, 10);
        assert_eq!(c.orphan_grace(), chrono::Duration::minutes(5));
        assert!(c.validate().is_ok());
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let c = DedupConfig::from_toml_str("min_size = 4096\nalgorithm = \"blake3\"\n").unwrap();
        assert_eq!(c.min_size, 4096);
        assert_eq!(c.algorithm, HashAlgorithm::Blake3);
        assert_eq!(c.top_duplicates, 10);
    }

    #[test]
    fn empty_toml_is_default() {
        assert_eq!(DedupConfig::from_toml_str("").unwrap(), DedupConfig::default());
    }

    #[test]
    fn rejects_unknown_algorithm() {
        let err = DedupConfig::from_toml_str("algorithm = \"md5\"").unwrap_err();
        assert!(matches!(err, DedupError::Config(_)));
    }

    #[test]
    fn rejects_zero_top_duplicates() {
        let err = DedupConfig::from_toml_str("top_duplicates = 0").unwrap_err();
        assert!(matches!(err, DedupError::Config(_)));
    }

    #[test]
    fn rejects_unbounded_grace() {
        let c = DedupConfig {
            orphan_grace_secs: u64::MAX,
            ..DedupConfig::default()
        };
        assert!(c.validate().is_err());
        assert_eq!(c.orphan_grace(), chrono::Duration::days(365));
    }

    #[test]
    fn toml_roundtrip() {
        let c = DedupConfig {
            min_size: 0,
            algorithm: HashAlgorithm::Blake3,
            top_duplicates: 3,
            orphan_grace_secs: 600,
        };
        let parsed = DedupConfig::from_toml_str(&c.to_toml_string().unwrap()).unwrap();
        assert_eq!(parsed, c);
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("folio.toml");
        std::fs::write(&path, "orphan_grace_secs = 30\n").unwrap();
        let c = DedupConfig::load(&path).unwrap();
        assert_eq!(c.orphan_grace(), chrono::Duration::seconds(30));
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let err = DedupConfig::load(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, DedupError::Io(_)));
    }
}
