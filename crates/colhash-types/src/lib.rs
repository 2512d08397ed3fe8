//! Columnar batch model and key capabilities for the colhash probing core.

pub mod key;
pub mod key_id;
pub mod vectorized;

pub use key::{
    ByteKeys, FloatKey, FloatKeys, IntKey, IntKeys, KeyEq, KeyHash, KeyPairVisitor,
    KeyTypeMismatch, KeyVisitor, NULL_KEY_HASH, ROW_HASH_SEED, check_key_pair, hash_combine,
    visit_key_pair, visit_keys,
};
pub use key_id::KeyId;
pub use vectorized::{
    Batch, BatchFormatError, Column, ColumnData, ColumnSpec, ColumnVectorType,
    DEFAULT_BATCH_ROW_CAPACITY, MAX_BATCH_ROW_CAPACITY, NullBitmap, SelectionVector, Value,
};
