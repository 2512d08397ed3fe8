//! Bucket chains: hash → first row of the bucket, row → next row.
//!
//! Chains are singly linked through `next`, indexed by [`KeyId`], and are
//! linked so that walking a bucket visits rows in ascending row order.  The
//! first matching row a probe finds is therefore the lowest-numbered one,
//! which both the join head and the dedup representative rely on.

use colhash_types::{
    Column, KeyHash, KeyId, KeyVisitor, NULL_KEY_HASH, NullBitmap, ROW_HASH_SEED, hash_combine,
    visit_keys,
};

/// Hash → bucket head and row → next-row link arrays.
#[derive(Debug, Clone, Default)]
pub struct BucketChains {
    first: Vec<Option<KeyId>>,
    next: Vec<Option<KeyId>>,
    bucket_mask: u64,
}

impl BucketChains {
    /// Empty chains with room for `rows` rows over `buckets` buckets.
    #[must_use]
    pub fn with_capacity(rows: usize, buckets: usize) -> Self {
        Self {
            first: Vec::with_capacity(buckets),
            next: Vec::with_capacity(rows),
            bucket_mask: 0,
        }
    }

    /// Relink all rows from their hashes.  `buckets` must be a power of two.
    /// Existing allocations are reused when large enough.
    #[allow(clippy::cast_possible_truncation)]
    pub fn rebuild(&mut self, hashes: &[u64], buckets: usize) {
        debug_assert!(buckets.is_power_of_two(), "bucket count must be a power of two");
        debug_assert!(u32::try_from(hashes.len()).is_ok(), "too many rows for a key id");
        self.bucket_mask = (buckets as u64).wrapping_sub(1);
        self.first.clear();
        self.first.resize(buckets, None);
        self.next.clear();
        self.next.resize(hashes.len(), None);
        // Insert back to front so each bucket reads front to back.
        for (row, &hash) in hashes.iter().enumerate().rev() {
            let bucket = self.bucket(hash);
            self.next[row] = self.first[bucket];
            self.first[bucket] = Some(KeyId::from_index(row as u32));
        }
    }

    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    fn bucket(&self, hash: u64) -> usize {
        (hash & self.bucket_mask) as usize
    }

    /// First row of the bucket `hash` falls into.
    #[inline]
    #[must_use]
    pub fn head(&self, hash: u64) -> Option<KeyId> {
        self.first.get(self.bucket(hash)).copied().flatten()
    }

    /// Row following `key` in its bucket.
    #[inline]
    #[must_use]
    pub fn next(&self, key: KeyId) -> Option<KeyId> {
        self.next[key.index()]
    }

    /// Seed each row's candidate with the head of its bucket.
    pub fn find_buckets(&self, hashes: &[u64], group_ids: &mut [Option<KeyId>]) {
        for (group, &hash) in group_ids.iter_mut().zip(hashes) {
            *group = self.head(hash);
        }
    }

    /// Move every row listed in `to_check` to its candidate's next link.
    pub fn advance(&self, to_check: &[usize], group_ids: &mut [Option<KeyId>]) {
        for &row in to_check {
            group_ids[row] = group_ids[row].and_then(|key| self.next(key));
        }
    }

    /// Number of linked rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.next.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.next.is_empty()
    }

    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.first.len()
    }

    /// Length of the longest bucket.
    #[must_use]
    pub fn max_chain_len(&self) -> usize {
        self.first
            .iter()
            .map(|&head| std::iter::successors(head, |&key| self.next(key)).count())
            .max()
            .unwrap_or(0)
    }
}

struct HashColumn<'a> {
    validity: &'a NullBitmap,
    sel: Option<&'a [u16]>,
    out: &'a mut [u64],
}

impl KeyVisitor for HashColumn<'_> {
    type Output = ();

    fn visit<K: KeyHash>(self, keys: K) {
        let may_be_null = self.validity.has_nulls();
        for (i, slot) in self.out.iter_mut().enumerate() {
            let row = self.sel.map_or(i, |sel| usize::from(sel[i]));
            let hash = if may_be_null && self.validity.is_null(row) {
                NULL_KEY_HASH
            } else {
                keys.hash_at(row)
            };
            *slot = hash_combine(*slot, hash);
        }
    }
}

/// Hash the first `n` active rows over every key column into `out`.
///
/// `out` is resized to `n`; it does not reallocate when its capacity already
/// covers `n`.  Rows that compare equal under either null policy hash equal.
pub fn hash_key_columns<'a>(
    columns: impl IntoIterator<Item = &'a Column>,
    sel: Option<&[u16]>,
    n: usize,
    out: &mut Vec<u64>,
) {
    out.clear();
    out.resize(n, ROW_HASH_SEED);
    for column in columns {
        visit_keys(
            &column.data,
            HashColumn {
                validity: &column.validity,
                sel,
                out: &mut out[..],
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use colhash_types::{Batch, ColumnSpec, ColumnVectorType, Value};

    use super::*;

    fn int_column(values: &[Option<i64>]) -> Column {
        let rows: Vec<Vec<Value>> = values
            .iter()
            .map(|v| vec![v.map_or(Value::Null, Value::Integer)])
            .collect();
        let specs = [ColumnSpec::new("k", ColumnVectorType::Int64)];
        Batch::from_rows(&rows, &specs, 64).unwrap().columns()[0].clone()
    }

    fn walk(chains: &BucketChains, hash: u64) -> Vec<usize> {
        std::iter::successors(chains.head(hash), |&key| chains.next(key))
            .map(KeyId::index)
            .collect()
    }

    #[test]
    fn buckets_are_walked_in_row_order() {
        let mut chains = BucketChains::default();
        chains.rebuild(&[3, 5, 3, 7, 3], 4);
        assert_eq!(walk(&chains, 3), vec![0, 2, 3, 4]);
        assert_eq!(walk(&chains, 5), vec![1]);
        assert_eq!(chains.max_chain_len(), 4);
        assert_eq!(chains.len(), 5);
    }

    #[test]
    fn rebuild_reuses_buffers() {
        let mut chains = BucketChains::with_capacity(8, 8);
        chains.rebuild(&[1, 2, 3, 4, 5, 6, 7, 8], 8);
        chains.rebuild(&[9, 9], 8);
        assert_eq!(chains.len(), 2);
        assert_eq!(walk(&chains, 9), vec![0, 1]);
        assert_eq!(chains.head(2), None);
    }

    #[test]
    fn advance_follows_links_and_ends() {
        let mut chains = BucketChains::default();
        chains.rebuild(&[0, 0], 1);
        let mut groups = vec![None; 3];
        chains.find_buckets(&[0, 0, 0], &mut groups);
        assert!(groups.iter().all(|g| *g == KeyId::new(1)));

        chains.advance(&[0, 2], &mut groups);
        assert_eq!(groups, vec![KeyId::new(2), KeyId::new(1), KeyId::new(2)]);
        chains.advance(&[0], &mut groups);
        assert_eq!(groups[0], None);
        chains.advance(&[0], &mut groups);
        assert_eq!(groups[0], None, "advancing past the end stays at the end");
    }

    #[test]
    fn equal_keys_hash_equal_and_nulls_share_a_hash() {
        let column = int_column(&[Some(5), None, Some(5), None, Some(6)]);
        let mut hashes = Vec::new();
        hash_key_columns([&column], None, 5, &mut hashes);
        assert_eq!(hashes[0], hashes[2]);
        assert_eq!(hashes[1], hashes[3]);
        assert_ne!(hashes[0], hashes[4]);
        assert_ne!(hashes[0], hashes[1]);
    }

    #[test]
    fn hashing_follows_the_selection() {
        let column = int_column(&[Some(1), Some(2), Some(3)]);
        let mut all = Vec::new();
        hash_key_columns([&column], None, 3, &mut all);
        let mut picked = Vec::new();
        hash_key_columns([&column], Some(&[2, 0][..]), 2, &mut picked);
        assert_eq!(picked, vec![all[2], all[0]]);
    }
}
