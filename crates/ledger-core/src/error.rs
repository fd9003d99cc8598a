use std::time::Duration;
use thiserror::Error;

/// Failures reported by a [`crate::store::KeyValueStore`] implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("no entry at height {0}")]
    NotFound(u64),
    #[error("store I/O error: {0}")]
    Io(String),
}

/// Failures surfaced by [`crate::chain::Blockchain`] operations.
///
/// Hash or linkage mismatches are never errors; they are reported as data by
/// `validate_block` and `validate_chain`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("block {0} not found")]
    NotFound(u64),
    #[error("block {height} is corrupt: {reason}")]
    Corrupt { height: u64, reason: String },
    #[error("store I/O error: {0}")]
    Io(String),
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("proof-of-work search was cancelled")]
    Cancelled,
    #[error("invalid chain config: {0}")]
    InvalidConfig(String),
}

impl From<StoreError> for ChainError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(height) => ChainError::NotFound(height),
            StoreError::Io(msg) => ChainError::Io(msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, ChainError>;
