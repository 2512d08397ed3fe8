//! Per-batch probing state.
//!
//! A [`ProbeScratch`] is sized once for the largest batch it will see and
//! then reused: [`ProbeScratch::prepare`] zeroes the prefix a batch needs,
//! nothing is reallocated between batches.  Row-indexed arrays are indexed
//! by probe position (`0..batch.len()`), never by [`KeyId`].

use colhash_types::{Batch, Column, KeyId};

use crate::chain::BucketChains;
use crate::error::{HashTableError, Result};

/// Row-indexed probing flags shared by the column checker and the resolvers.
#[derive(Debug, Clone, Default)]
pub struct ProbeRows {
    pub(crate) to_check: Vec<usize>,
    pub(crate) group_id: Vec<Option<KeyId>>,
    pub(crate) differs: Vec<bool>,
    pub(crate) distinct: Vec<bool>,
    pub(crate) head_id: Vec<Option<KeyId>>,
}

impl ProbeRows {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            to_check: Vec::with_capacity(capacity),
            group_id: vec![None; capacity],
            differs: vec![false; capacity],
            distinct: vec![false; capacity],
            head_id: vec![None; capacity],
        }
    }

    /// Probe positions still pending in the current round.
    #[must_use]
    pub fn to_check(&self) -> &[usize] {
        &self.to_check
    }

    #[must_use]
    pub fn group_ids(&self) -> &[Option<KeyId>] {
        &self.group_id
    }

    /// Candidate build rows, written by chain walking.
    pub fn group_ids_mut(&mut self) -> &mut [Option<KeyId>] {
        &mut self.group_id
    }

    #[must_use]
    pub fn differs(&self) -> &[bool] {
        &self.differs
    }

    #[must_use]
    pub fn distinct(&self) -> &[bool] {
        &self.distinct
    }

    #[must_use]
    pub fn head_ids(&self) -> &[Option<KeyId>] {
        &self.head_id
    }
}

/// Scratch space for probing one batch at a time.
#[derive(Debug, Clone)]
pub struct ProbeScratch {
    pub(crate) rows: ProbeRows,
    pub(crate) hash_buffer: Vec<u64>,
    pub(crate) keys: Vec<Column>,
    pub(crate) batch_chains: BucketChains,
    sel_buffer: Vec<u16>,
    capacity: usize,
    len: usize,
}

impl ProbeScratch {
    /// Scratch for batches of up to `capacity` rows; the batch-local chains
    /// start with room for `buckets` buckets.
    #[must_use]
    pub fn new(capacity: usize, buckets: usize) -> Self {
        Self {
            rows: ProbeRows::with_capacity(capacity),
            hash_buffer: Vec::with_capacity(capacity),
            keys: Vec::new(),
            batch_chains: BucketChains::with_capacity(capacity, buckets),
            sel_buffer: Vec::with_capacity(capacity),
            capacity,
            len: 0,
        }
    }

    /// Reset the flags for `n` rows and mark all of them pending.
    ///
    /// # Errors
    ///
    /// Returns [`HashTableError::ProbeTooLarge`] when `n` exceeds the
    /// capacity this scratch was sized for.
    pub fn prepare(&mut self, n: usize) -> Result<()> {
        if n > self.capacity {
            return Err(HashTableError::ProbeTooLarge {
                rows: n,
                capacity: self.capacity,
            });
        }
        let rows = &mut self.rows;
        rows.group_id[..n].fill(None);
        rows.differs[..n].fill(false);
        rows.distinct[..n].fill(false);
        rows.head_id[..n].fill(None);
        rows.to_check.clear();
        rows.to_check.extend(0..n);
        self.len = n;
        Ok(())
    }

    /// Materialize the key columns of `batch` for the current probe.
    ///
    /// # Errors
    ///
    /// Returns [`HashTableError::KeyColumnOutOfBounds`] for a bad index.
    pub fn load_keys(&mut self, batch: &Batch, key_columns: &[usize]) -> Result<()> {
        self.keys.clear();
        for &index in key_columns {
            let column = batch
                .column(index)
                .ok_or_else(|| HashTableError::KeyColumnOutOfBounds {
                    index,
                    columns: batch.columns().len(),
                })?;
            self.keys.push(column.clone());
        }
        Ok(())
    }

    /// Zero every flag and drop the materialized keys.
    pub fn reset(&mut self) {
        let rows = &mut self.rows;
        rows.to_check.clear();
        rows.group_id.fill(None);
        rows.differs.fill(false);
        rows.distinct.fill(false);
        rows.head_id.fill(None);
        self.hash_buffer.clear();
        self.keys.clear();
        self.sel_buffer.clear();
        self.len = 0;
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Rows covered by the last [`prepare`](Self::prepare).
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub const fn rows(&self) -> &ProbeRows {
        &self.rows
    }

    pub fn rows_mut(&mut self) -> &mut ProbeRows {
        &mut self.rows
    }

    /// First confirmed match of probe position `row`.
    #[must_use]
    pub fn head_id(&self, row: usize) -> Option<KeyId> {
        self.rows.head_id.get(row).copied().flatten()
    }

    #[must_use]
    pub fn hash_buffer(&self) -> &[u64] {
        &self.hash_buffer
    }

    pub fn hash_buffer_mut(&mut self) -> &mut Vec<u64> {
        &mut self.hash_buffer
    }

    #[must_use]
    pub fn keys(&self) -> &[Column] {
        &self.keys
    }

    pub(crate) fn sel_buffer_mut(&mut self) -> &mut Vec<u16> {
        &mut self.sel_buffer
    }
}
