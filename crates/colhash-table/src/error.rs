use colhash_types::{BatchFormatError, KeyTypeMismatch};
use thiserror::Error;

/// Recoverable failures while configuring, building or driving a hash table.
///
/// Contract violations inside the probing loops (missing probe selection for
/// the build-absence check, incompatible key pairs handed straight to a
/// column check) panic instead; the drivers validate up front and report
/// them through this type.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HashTableError {
    #[error("invalid hash table config: {0}")]
    InvalidConfig(String),
    #[error("hash table needs at least one key column")]
    NoKeyColumns,
    #[error("key column {index} out of bounds for {columns} columns")]
    KeyColumnOutOfBounds { index: usize, columns: usize },
    #[error("probe side has {found} key columns, build side has {expected}")]
    KeyArityMismatch { expected: usize, found: usize },
    #[error("build side has {rows} rows, more than a key id can address")]
    BuildTooLarge { rows: usize },
    #[error("probe batch of {rows} rows exceeds scratch capacity {capacity}")]
    ProbeTooLarge { rows: usize, capacity: usize },
    #[error(transparent)]
    KeyType(#[from] KeyTypeMismatch),
    #[error(transparent)]
    Batch(#[from] BatchFormatError),
}

/// Result alias for hash table operations.
pub type Result<T> = std::result::Result<T, HashTableError>;
