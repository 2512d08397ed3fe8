//! Chain-walking drivers.
//!
//! Each driver hashes the probe keys, seeds every row with the head of its
//! bucket, then alternates a check round with a chain advance until no row
//! is pending.  The number of rounds is bounded by the longest bucket chain
//! plus one.

use colhash_types::{Batch, KeyId, SelectionVector, check_key_pair};

use crate::chain::hash_key_columns;
use crate::distinct::first_duplicate;
use crate::error::{HashTableError, Result};
use crate::metrics::record_round;
use crate::scratch::ProbeScratch;
use crate::table::HashTable;

impl HashTable {
    /// Validate the probe keys, reset the scratch for `batch`, hash the
    /// probe keys and seed candidates from the build chains.
    fn begin_probe(
        &self,
        scratch: &mut ProbeScratch,
        batch: &Batch,
        probe_key_columns: &[usize],
    ) -> Result<()> {
        if probe_key_columns.len() != self.key_columns.len() {
            return Err(HashTableError::KeyArityMismatch {
                expected: self.key_columns.len(),
                found: probe_key_columns.len(),
            });
        }
        let n = batch.len();
        scratch.prepare(n)?;
        scratch.load_keys(batch, probe_key_columns)?;
        for (i, probe) in scratch.keys.iter().enumerate() {
            check_key_pair(probe.vector_type(), self.build_key(i).vector_type())?;
        }
        hash_key_columns(
            &scratch.keys,
            batch.selection().map(SelectionVector::as_slice),
            n,
            &mut scratch.hash_buffer,
        );
        self.chains
            .find_buckets(&scratch.hash_buffer[..n], &mut scratch.rows.group_id[..n]);
        Ok(())
    }

    /// Probe `batch` in join-expansion mode.
    ///
    /// Afterwards `scratch.head_id(i)` is the first matching build row of
    /// probe position `i`, and [`same_chain`](Self::same_chain) from that
    /// head yields every matching build row.  Returns the number of probe
    /// rows with at least one match.
    ///
    /// # Errors
    ///
    /// Returns an error when the probe key columns do not line up with the
    /// build key columns or the batch does not fit the scratch.
    pub fn probe_join(
        &mut self,
        scratch: &mut ProbeScratch,
        batch: &Batch,
        probe_key_columns: &[usize],
    ) -> Result<usize> {
        let n = batch.len();
        let _span = tracing::debug_span!("vectorized_batch", batch_size = n, op = "probe_join")
            .entered();
        self.begin_probe(scratch, batch, probe_key_columns)?;
        let sel = batch.selection().map(SelectionVector::as_slice);

        let mut rounds = 0_usize;
        while !scratch.rows.to_check.is_empty() {
            record_round(scratch.rows.to_check.len());
            rounds += 1;
            self.check(scratch, sel);
            self.chains
                .advance(&scratch.rows.to_check, &mut scratch.rows.group_id);
        }

        let matched = scratch.rows.head_id[..n].iter().flatten().count();
        tracing::debug!(rows = n, rounds, matched, "join probe finished");
        Ok(matched)
    }

    /// Materialize `(probe position, build key)` pairs for the last
    /// [`probe_join`](Self::probe_join) on `scratch`, grouped by probe
    /// position.
    #[must_use]
    pub fn join_pairs(&self, scratch: &ProbeScratch) -> Vec<(usize, KeyId)> {
        let mut pairs = Vec::new();
        for (row, head) in scratch.rows.head_id[..scratch.len()].iter().enumerate() {
            if let Some(head) = *head {
                pairs.extend(self.same_chain(head).map(|key| (row, key)));
            }
        }
        pairs
    }

    /// Find the first matching build row of every probe row.
    ///
    /// Afterwards a probe position matched iff its entry in
    /// `scratch.rows().group_ids()` is set, and that entry is the lowest
    /// matching build row.  Returns the number of matched rows.
    ///
    /// # Errors
    ///
    /// See [`probe_join`](Self::probe_join).
    pub fn probe_first_match(
        &self,
        scratch: &mut ProbeScratch,
        batch: &Batch,
        probe_key_columns: &[usize],
    ) -> Result<usize> {
        let n = batch.len();
        let _span = tracing::debug_span!(
            "vectorized_batch",
            batch_size = n,
            op = "probe_first_match"
        )
        .entered();
        self.begin_probe(scratch, batch, probe_key_columns)?;
        let sel = batch.selection().map(SelectionVector::as_slice);

        let mut rounds = 0_usize;
        while !scratch.rows.to_check.is_empty() {
            record_round(scratch.rows.to_check.len());
            rounds += 1;
            self.distinct_check(scratch, sel);
            self.chains
                .advance(&scratch.rows.to_check, &mut scratch.rows.group_id);
        }

        let matched = scratch.rows.group_id[..n].iter().flatten().count();
        tracing::debug!(rows = n, rounds, matched, "first-match probe finished");
        Ok(matched)
    }

    /// Collapse rows of `batch` with equal keys (under the table's null
    /// policy) to their first occurrence and rewrite its selection.
    ///
    /// Without null equality, rows with a NULL key equal nothing, not even
    /// themselves, and are dropped from the batch.  Returns the new batch
    /// length.
    ///
    /// # Errors
    ///
    /// Returns an error when a key column is out of range or the batch does
    /// not fit the scratch.
    pub fn dedup_batch(
        &self,
        scratch: &mut ProbeScratch,
        batch: &mut Batch,
        key_columns: &[usize],
    ) -> Result<usize> {
        let n = batch.len();
        let _span =
            tracing::debug_span!("vectorized_batch", batch_size = n, op = "dedup_batch").entered();
        scratch.prepare(n)?;
        scratch.load_keys(batch, key_columns)?;

        let mut rounds = 0_usize;
        {
            let sel = batch.selection().map(SelectionVector::as_slice);
            hash_key_columns(&scratch.keys, sel, n, &mut scratch.hash_buffer);
            scratch
                .batch_chains
                .rebuild(&scratch.hash_buffer, self.config.bucket_count(n));
            scratch
                .batch_chains
                .find_buckets(&scratch.hash_buffer, &mut scratch.rows.group_id[..n]);

            while !scratch.rows.to_check.is_empty() {
                record_round(scratch.rows.to_check.len());
                rounds += 1;
                self.check_probe_for_distinct(scratch, sel);
                scratch
                    .batch_chains
                    .advance(&scratch.rows.to_check, &mut scratch.rows.group_id);
            }
        }

        let emitted = scratch.update_sel(batch);
        tracing::debug!(rows = n, rounds, emitted, "batch deduplicated");
        Ok(emitted)
    }

    /// Keep only the rows of `batch` whose key matches no build row, with
    /// NULL equal to NULL, and rewrite its selection.
    ///
    /// A batch without a selection gets an identity selection first.  The
    /// batch must not contain two rows with equal keys; debug builds panic
    /// when it does.  Returns the new batch length.
    ///
    /// # Errors
    ///
    /// See [`probe_join`](Self::probe_join).
    pub fn distinct_against_build(
        &self,
        scratch: &mut ProbeScratch,
        batch: &mut Batch,
        probe_key_columns: &[usize],
    ) -> Result<usize> {
        let n = batch.len();
        let _span = tracing::debug_span!(
            "vectorized_batch",
            batch_size = n,
            op = "distinct_against_build"
        )
        .entered();
        if batch.selection().is_none() {
            batch.set_selection(Some(SelectionVector::identity(batch.row_count())?))?;
        }
        self.begin_probe(scratch, batch, probe_key_columns)?;

        let mut rounds = 0_usize;
        {
            let sel = batch.selection().map(SelectionVector::as_slice);
            debug_assert!(
                first_duplicate(&scratch.keys, sel, &scratch.hash_buffer[..n]).is_none(),
                "probe batch for a build-absence check contains duplicate keys"
            );
            while !scratch.rows.to_check.is_empty() {
                record_round(scratch.rows.to_check.len());
                rounds += 1;
                self.check_build_for_distinct(scratch, sel);
                self.chains
                    .advance(&scratch.rows.to_check, &mut scratch.rows.group_id);
            }
        }

        let emitted = scratch.update_sel(batch);
        tracing::debug!(rows = n, rounds, emitted, "build-absence check finished");
        Ok(emitted)
    }
}

#[cfg(test)]
mod tests {
    use colhash_types::{ColumnSpec, ColumnVectorType, Value};

    use super::*;
    use crate::config::HashTableConfig;
    use crate::metrics::hash_probe_metrics_snapshot;

    fn keyed(keys: &[Option<i64>]) -> Batch {
        let rows: Vec<Vec<Value>> = keys
            .iter()
            .enumerate()
            .map(|(i, k)| {
                vec![
                    Value::Integer(i as i64 * 100),
                    k.map_or(Value::Null, Value::Integer),
                ]
            })
            .collect();
        let specs = [
            ColumnSpec::new("payload", ColumnVectorType::Int64),
            ColumnSpec::new("k", ColumnVectorType::Int64),
        ];
        Batch::from_rows(&rows, &specs, 64).unwrap()
    }

    fn table(keys: &[Option<i64>], allow_null_equality: bool) -> HashTable {
        let config = HashTableConfig::default()
            .with_batch_capacity(64)
            .with_null_equality(allow_null_equality);
        HashTable::new(config, keyed(keys), vec![1]).unwrap()
    }

    fn pairs(table: &HashTable, scratch: &ProbeScratch) -> Vec<(usize, usize)> {
        let mut pairs: Vec<(usize, usize)> = table
            .join_pairs(scratch)
            .into_iter()
            .map(|(row, key)| (row, key.index()))
            .collect();
        pairs.sort_unstable();
        pairs
    }

    #[test]
    fn join_links_duplicates_and_skips_null_probe() {
        let mut table = table(&[Some(5), Some(5), Some(7)], false);
        let mut scratch = table.new_scratch();
        let probe = keyed(&[Some(5), None, Some(5)]);

        let matched = table.probe_join(&mut scratch, &probe, &[1]).unwrap();
        assert_eq!(matched, 2);
        assert_eq!(scratch.head_id(0), KeyId::new(1));
        assert_eq!(scratch.head_id(1), None);
        assert_eq!(scratch.head_id(2), KeyId::new(1));
        assert_eq!(pairs(&table, &scratch), vec![(0, 0), (0, 1), (2, 0), (2, 1)]);
        assert_eq!(table.visited(), &[true, true, false]);
    }

    #[test]
    fn join_with_null_equality_matches_build_null() {
        let mut table = table(&[Some(5), None], true);
        let mut scratch = table.new_scratch();
        let probe = keyed(&[Some(5), None, Some(5)]);

        assert_eq!(table.probe_join(&mut scratch, &probe, &[1]).unwrap(), 3);
        assert_eq!(scratch.head_id(1), KeyId::new(2));
        assert_eq!(pairs(&table, &scratch), vec![(0, 0), (1, 1), (2, 0)]);
    }

    #[test]
    fn build_null_never_matches_without_null_equality() {
        let mut table = table(&[None, Some(1)], false);
        let mut scratch = table.new_scratch();
        let probe = keyed(&[None, Some(1)]);
        assert_eq!(table.probe_join(&mut scratch, &probe, &[1]).unwrap(), 1);
        assert_eq!(scratch.head_id(1), KeyId::new(2));
    }

    #[test]
    fn duplicate_chains_persist_across_batches() {
        let mut table = table(&[Some(3), Some(3), Some(3)], false);
        let mut scratch = table.new_scratch();
        table.probe_join(&mut scratch, &keyed(&[Some(3)]), &[1]).unwrap();
        table.probe_join(&mut scratch, &keyed(&[Some(9), Some(3)]), &[1]).unwrap();
        assert_eq!(scratch.head_id(1), KeyId::new(1));
        assert_eq!(pairs(&table, &scratch), vec![(1, 0), (1, 1), (1, 2)]);
    }

    #[test]
    fn probe_respects_selection() {
        let mut table = table(&[Some(1), Some(2)], false);
        let mut scratch = table.new_scratch();
        let mut probe = keyed(&[Some(2), Some(9), Some(1)]);
        probe
            .set_selection(Some(SelectionVector::from_indices(vec![2, 1])))
            .unwrap();
        assert_eq!(table.probe_join(&mut scratch, &probe, &[1]).unwrap(), 1);
        assert_eq!(scratch.head_id(0), KeyId::new(1));
        assert_eq!(scratch.head_id(1), None);
    }

    #[test]
    fn arity_and_type_mismatches_are_errors() {
        let mut table = table(&[Some(1)], false);
        let mut scratch = table.new_scratch();
        let probe = keyed(&[Some(1)]);
        assert_eq!(
            table.probe_join(&mut scratch, &probe, &[0, 1]).unwrap_err(),
            HashTableError::KeyArityMismatch {
                expected: 1,
                found: 2
            }
        );

        let text = Batch::from_rows(
            &[vec![Value::Text("1".into())]],
            &[ColumnSpec::new("k", ColumnVectorType::Text)],
            4,
        )
        .unwrap();
        assert!(matches!(
            table.probe_join(&mut scratch, &text, &[0]).unwrap_err(),
            HashTableError::KeyType(_)
        ));
    }

    #[test]
    fn oversized_probe_is_rejected() {
        let config = HashTableConfig::default().with_batch_capacity(2);
        let mut table = HashTable::new(config, keyed(&[Some(1)]), vec![1]).unwrap();
        let mut scratch = table.new_scratch();
        let probe = keyed(&[Some(1), Some(1), Some(1)]);
        assert_eq!(
            table.probe_join(&mut scratch, &probe, &[1]).unwrap_err(),
            HashTableError::ProbeTooLarge {
                rows: 3,
                capacity: 2
            }
        );
    }

    #[test]
    fn first_match_reports_lowest_build_row() {
        let table = table(&[Some(4), Some(6), Some(4)], false);
        let mut scratch = table.new_scratch();
        let probe = keyed(&[Some(4), Some(5), None, Some(6)]);
        assert_eq!(table.probe_first_match(&mut scratch, &probe, &[1]).unwrap(), 2);
        assert_eq!(
            &scratch.rows().group_ids()[..4],
            &[KeyId::new(1), None, None, KeyId::new(2)]
        );
    }

    #[test]
    fn dedup_collapses_to_first_occurrence() {
        let table = table(&[Some(0)], false);
        let mut scratch = table.new_scratch();
        let mut batch = keyed(&[Some(3), Some(3), Some(4)]);
        assert_eq!(table.dedup_batch(&mut scratch, &mut batch, &[1]).unwrap(), 2);
        assert_eq!(batch.selection().unwrap().as_slice(), &[0, 2]);
    }

    #[test]
    fn dedup_null_policy() {
        let strict = table(&[Some(0)], false);
        let mut scratch = strict.new_scratch();
        let mut batch = keyed(&[None, Some(1), None, Some(1)]);
        assert_eq!(strict.dedup_batch(&mut scratch, &mut batch, &[1]).unwrap(), 1);
        assert_eq!(batch.selection().unwrap().as_slice(), &[1]);

        let lenient = table(&[Some(0)], true);
        let mut batch = keyed(&[None, Some(1), None, Some(1)]);
        assert_eq!(lenient.dedup_batch(&mut scratch, &mut batch, &[1]).unwrap(), 2);
        assert_eq!(batch.selection().unwrap().as_slice(), &[0, 1]);
    }

    #[test]
    fn distinct_against_build_keeps_absent_rows() {
        let table = table(&[Some(1), None, Some(3)], false);
        let mut scratch = table.new_scratch();
        let mut batch = keyed(&[Some(3), Some(2), None, Some(4)]);
        let emitted = table
            .distinct_against_build(&mut scratch, &mut batch, &[1])
            .unwrap();
        assert_eq!(emitted, 2);
        assert_eq!(batch.selection().unwrap().as_slice(), &[1, 3]);
    }

    #[test]
    fn distinct_against_build_with_existing_selection() {
        let table = table(&[Some(2)], false);
        let mut scratch = table.new_scratch();
        let mut batch = keyed(&[Some(1), Some(2), Some(3), Some(2)]);
        batch
            .set_selection(Some(SelectionVector::from_indices(vec![0, 1, 2])))
            .unwrap();
        table
            .distinct_against_build(&mut scratch, &mut batch, &[1])
            .unwrap();
        assert_eq!(batch.selection().unwrap().as_slice(), &[0, 2]);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "contains duplicate keys")]
    fn distinct_against_build_rejects_internal_duplicates_in_debug() {
        let table = table(&[Some(1)], false);
        let mut scratch = table.new_scratch();
        let mut batch = keyed(&[Some(5), Some(5)]);
        let _ = table.distinct_against_build(&mut scratch, &mut batch, &[1]);
    }

    #[test]
    fn rounds_are_recorded() {
        let mut table = table(&[Some(1), Some(1)], false);
        let mut scratch = table.new_scratch();
        let before = hash_probe_metrics_snapshot();
        table.probe_join(&mut scratch, &keyed(&[Some(1)]), &[1]).unwrap();
        let after = hash_probe_metrics_snapshot();
        assert!(after.colhash_probe_rounds_total >= before.colhash_probe_rounds_total + 2);
        assert!(after.colhash_chain_links_total > before.colhash_chain_links_total);
    }
}
