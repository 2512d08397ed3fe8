//! Hash table configuration.

use colhash_types::{DEFAULT_BATCH_ROW_CAPACITY, MAX_BATCH_ROW_CAPACITY};
use serde::{Deserialize, Serialize};

use crate::error::{HashTableError, Result};

/// Largest bucket array the chains will allocate.
const MAX_BUCKETS: usize = 1 << 31;

/// Tunables shared by a [`HashTable`](crate::HashTable) and the scratch
/// spaces it hands out.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HashTableConfig {
    /// Largest probe batch a scratch space accepts.
    pub batch_capacity: usize,
    /// Whether NULL key values compare equal to each other.
    pub allow_null_equality: bool,
    /// Target rows per bucket.
    pub load_factor: f64,
}

impl Default for HashTableConfig {
    fn default() -> Self {
        Self {
            batch_capacity: DEFAULT_BATCH_ROW_CAPACITY,
            allow_null_equality: false,
            load_factor: 1.0,
        }
    }
}

impl HashTableConfig {
    #[must_use]
    pub const fn with_batch_capacity(mut self, batch_capacity: usize) -> Self {
        self.batch_capacity = batch_capacity;
        self
    }

    #[must_use]
    pub const fn with_null_equality(mut self, allow_null_equality: bool) -> Self {
        self.allow_null_equality = allow_null_equality;
        self
    }

    #[must_use]
    pub const fn with_load_factor(mut self, load_factor: f64) -> Self {
        self.load_factor = load_factor;
        self
    }

    /// Reject values the table cannot honour.
    ///
    /// # Errors
    ///
    /// Returns [`HashTableError::InvalidConfig`] when the batch capacity is
    /// outside `1..=65536` or the load factor is not a positive finite number.
    pub fn validate(&self) -> Result<()> {
        if self.batch_capacity == 0 || self.batch_capacity > MAX_BATCH_ROW_CAPACITY {
            return Err(HashTableError::InvalidConfig(format!(
                "batch_capacity must be in 1..={MAX_BATCH_ROW_CAPACITY}, got {}",
                self.batch_capacity
            )));
        }
        if !self.load_factor.is_finite() || self.load_factor <= 0.0 {
            return Err(HashTableError::InvalidConfig(format!(
                "load_factor must be positive and finite, got {}",
                self.load_factor
            )));
        }
        Ok(())
    }

    /// Number of buckets for `rows` entries: the next power of two of
    /// `rows / load_factor`, at least one.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn bucket_count(&self, rows: usize) -> usize {
        let wanted = (rows as f64 / self.load_factor).ceil();
        let wanted = if wanted >= MAX_BUCKETS as f64 {
            tracing::warn!(
                rows,
                load_factor = self.load_factor,
                max_buckets = MAX_BUCKETS,
                "bucket count clamped"
            );
            MAX_BUCKETS
        } else {
            wanted as usize
        };
        wanted.max(1).next_power_of_two()
    }
}
