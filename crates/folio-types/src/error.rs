use thiserror::Error;

/// Errors produced when constructing identifiers.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex digest: {0}")]
    InvalidHex(String),

    #[error("identifier must not be empty: {0}")]
    Empty(&'static str),
}
