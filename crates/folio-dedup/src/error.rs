use thiserror::Error;

#[derive(Debug, Error)]
pub enum DedupError {
    /// A backend operation failed. Propagated unchanged, never retried.
    #[error("store error: {0}")]
    Store(#[from] folio_store::StoreError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type DedupResult<T> = Result<T, DedupError>;
