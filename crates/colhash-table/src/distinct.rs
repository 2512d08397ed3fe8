//! Probe-side distinctness: collapsing equal rows within one batch and
//! finding the rows of a batch that are absent from the build side.

use colhash_types::{Column, KeyId};
use hashbrown::HashMap;
use smallvec::SmallVec;

use crate::column_check::{check_col, check_col_for_distinct, keys_equal_at};
use crate::metrics::record_distinct_rows;
use crate::resolve::resolve_rows;
use crate::scratch::ProbeScratch;
use crate::table::HashTable;

impl HashTable {
    /// One self-deduplication round: compare the scratch's probe keys
    /// against themselves through the batch-local chains, recording each
    /// row's first equal row as its head.  Returns the number of rows that
    /// keep probing.
    ///
    /// Candidates here are batch positions (`key.index()` translated through
    /// `sel`), not build rows.
    pub fn check_probe_for_distinct(
        &self,
        scratch: &mut ProbeScratch,
        sel: Option<&[u16]>,
    ) -> usize {
        for keys in &scratch.keys {
            check_col(
                &mut scratch.rows,
                keys,
                keys,
                sel,
                sel,
                self.config.allow_null_equality,
            );
        }
        resolve_rows(&mut scratch.rows, None)
    }

    /// One build-absence round.  NULL equals NULL here regardless of the
    /// table's policy.
    ///
    /// Rows whose chain is exhausted without a match are distinct: they get
    /// their own position as head (`KeyId::from_index(row)`) and leave the
    /// pending list.  Matched rows leave without a head; differing rows stay.
    /// Returns the number of rows that keep probing.
    ///
    /// The batch must not contain two rows with equal keys; only debug
    /// builds of [`distinct_against_build`](Self::distinct_against_build)
    /// verify this.
    ///
    /// # Panics
    ///
    /// Panics when `probe_sel` is `None` or a key pair cannot be compared.
    #[allow(clippy::cast_possible_truncation)]
    pub fn check_build_for_distinct(
        &self,
        scratch: &mut ProbeScratch,
        probe_sel: Option<&[u16]>,
    ) -> usize {
        let Some(probe_sel) = probe_sel else {
            panic!("build-absence check requires a probe selection vector");
        };
        assert_eq!(
            scratch.keys.len(),
            self.key_columns.len(),
            "probe key arity does not match the build side"
        );
        let n = scratch.len();
        scratch.rows.distinct[..n].fill(false);

        let build_sel = self.build_sel();
        for (i, keys) in scratch.keys.iter().enumerate() {
            check_col_for_distinct(
                &mut scratch.rows,
                keys,
                self.build_key(i),
                Some(probe_sel),
                build_sel,
            );
        }

        let rows = &mut scratch.rows;
        let mut kept = 0;
        let mut distinct = 0;
        for i in 0..rows.to_check.len() {
            let row = rows.to_check[i];
            if rows.distinct[row] {
                rows.head_id[row] = Some(KeyId::from_index(row as u32));
                distinct += 1;
            } else if rows.differs[row] {
                rows.differs[row] = false;
                rows.to_check[kept] = row;
                kept += 1;
            }
        }
        rows.to_check.truncate(kept);
        record_distinct_rows(distinct);
        kept
    }
}

/// First pair of active positions `(a, b)`, `a < b`, whose keys are equal
/// with NULL equal to NULL.  `hashes[i]` must be the row hash of position `i`.
#[must_use]
pub fn first_duplicate(
    keys: &[Column],
    sel: Option<&[u16]>,
    hashes: &[u64],
) -> Option<(usize, usize)> {
    let row = |i: usize| sel.map_or(i, |sel| usize::from(sel[i]));
    let mut seen: HashMap<u64, SmallVec<[usize; 2]>> = HashMap::with_capacity(hashes.len());
    for (i, &hash) in hashes.iter().enumerate() {
        let bucket = seen.entry(hash).or_default();
        let equal = bucket.iter().copied().find(|&earlier| {
            keys.iter().all(|column| {
                matches!(
                    keys_equal_at(column, row(earlier), column, row(i), true),
                    Ok(true)
                )
            })
        });
        if let Some(earlier) = equal {
            return Some((earlier, i));
        }
        bucket.push(i);
    }
    None
}
