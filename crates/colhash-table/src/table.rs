//! Build-side state: the buffered build batch, its bucket chains and the
//! duplicate-key chains discovered while probing.

use colhash_types::{Batch, Column, KeyId, SelectionVector};

use crate::chain::{BucketChains, hash_key_columns};
use crate::config::HashTableConfig;
use crate::error::{HashTableError, Result};
use crate::scratch::ProbeScratch;

/// Columnar hash table over one build batch.
///
/// Build rows are numbered by [`KeyId`] over the build batch's active rows
/// (its selection, when it has one).  `same` and `visited` are indexed by
/// `KeyId` and persist across probe batches: once a build row has been
/// linked into its head's duplicate chain it stays linked.
#[derive(Debug, Clone)]
pub struct HashTable {
    pub(crate) config: HashTableConfig,
    pub(crate) build: Batch,
    pub(crate) key_columns: Vec<usize>,
    pub(crate) same: Vec<Option<KeyId>>,
    pub(crate) visited: Vec<bool>,
    pub(crate) chains: BucketChains,
}

impl HashTable {
    /// Buffer `build` and link its rows into bucket chains over
    /// `key_columns`.
    ///
    /// # Errors
    ///
    /// Returns an error when the config is invalid, no key column is given,
    /// a key column index is out of range, or the build side has more rows
    /// than a [`KeyId`] can name.
    pub fn new(config: HashTableConfig, build: Batch, key_columns: Vec<usize>) -> Result<Self> {
        config.validate()?;
        if key_columns.is_empty() {
            return Err(HashTableError::NoKeyColumns);
        }
        if let Some(&index) = key_columns
            .iter()
            .find(|&&index| index >= build.columns().len())
        {
            return Err(HashTableError::KeyColumnOutOfBounds {
                index,
                columns: build.columns().len(),
            });
        }
        let rows = build.len();
        if !u32::try_from(rows).is_ok_and(|rows| rows < u32::MAX) {
            return Err(HashTableError::BuildTooLarge { rows });
        }

        let mut hashes = Vec::with_capacity(rows);
        hash_key_columns(
            key_columns.iter().map(|&index| &build.columns()[index]),
            build.selection().map(SelectionVector::as_slice),
            rows,
            &mut hashes,
        );
        let buckets = config.bucket_count(rows);
        let mut chains = BucketChains::with_capacity(rows, buckets);
        chains.rebuild(&hashes, buckets);

        tracing::debug!(
            rows,
            buckets,
            key_columns = key_columns.len(),
            max_chain_len = chains.max_chain_len(),
            "hash table built"
        );

        Ok(Self {
            config,
            build,
            key_columns,
            same: vec![None; rows],
            visited: vec![false; rows],
            chains,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &HashTableConfig {
        &self.config
    }

    #[must_use]
    pub const fn build(&self) -> &Batch {
        &self.build
    }

    #[must_use]
    pub fn key_columns(&self) -> &[usize] {
        &self.key_columns
    }

    /// Number of build rows (key ids `1..=len`).
    #[must_use]
    pub fn len(&self) -> usize {
        self.same.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.same.is_empty()
    }

    /// The `i`-th build key column.
    #[must_use]
    pub fn build_key(&self, i: usize) -> &Column {
        &self.build.columns()[self.key_columns[i]]
    }

    pub(crate) fn build_sel(&self) -> Option<&[u16]> {
        self.build.selection().map(SelectionVector::as_slice)
    }

    /// Physical build row named by `key`.
    #[must_use]
    pub fn build_row(&self, key: KeyId) -> usize {
        self.build.physical_row(key.index())
    }

    #[must_use]
    pub const fn chains(&self) -> &BucketChains {
        &self.chains
    }

    #[must_use]
    pub fn same(&self) -> &[Option<KeyId>] {
        &self.same
    }

    #[must_use]
    pub fn visited(&self) -> &[bool] {
        &self.visited
    }

    /// `head` followed by every build row linked behind it.
    pub fn same_chain(&self, head: KeyId) -> impl Iterator<Item = KeyId> + '_ {
        std::iter::successors(Some(head), |&key| self.same[key.index()])
    }

    /// Forget all duplicate links, e.g. before reprobing from scratch.
    pub fn reset_visited(&mut self) {
        self.same.fill(None);
        self.visited.fill(false);
    }

    /// Scratch space sized for this table's batch capacity.
    #[must_use]
    pub fn new_scratch(&self) -> ProbeScratch {
        ProbeScratch::new(
            self.config.batch_capacity,
            self.config.bucket_count(self.config.batch_capacity),
        )
    }
}
