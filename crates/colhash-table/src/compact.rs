//! Selection compaction: one surviving row per match group.

use colhash_types::{Batch, SelectionVector};

use crate::metrics::record_compacted_rows;
use crate::scratch::ProbeScratch;

impl ProbeScratch {
    /// Rewrite `batch`'s selection to the distinct heads recorded in
    /// `head_id`, in the order their groups first appear.
    ///
    /// Heads are batch positions (`head.index() < batch.len()`).  The row
    /// hash of each emitted row moves to its compacted slot in
    /// `hash_buffer`, and `head_id`/`differs` are cleared for every row.
    /// Returns the new batch length.
    ///
    /// # Panics
    ///
    /// Panics when the batch is longer than this scratch's capacity.
    #[allow(clippy::cast_possible_truncation)]
    pub fn update_sel(&mut self, batch: &mut Batch) -> usize {
        let n = batch.len();
        assert!(
            n <= self.capacity(),
            "batch of {n} rows exceeds scratch capacity {}",
            self.capacity()
        );
        let mut out = std::mem::take(self.sel_buffer_mut());
        out.clear();
        {
            let rows = &mut self.rows;
            // `distinct` doubles as the seen-head bitmap while compacting.
            let seen = &mut rows.distinct;
            seen[..n].fill(false);
            let sel = batch.selection().map(SelectionVector::as_slice);
            for i in 0..n {
                rows.differs[i] = false;
                let Some(head) = rows.head_id[i].take() else {
                    continue;
                };
                let pos = head.index();
                debug_assert!(pos < n, "head {head} is not a batch position");
                if seen[pos] {
                    continue;
                }
                seen[pos] = true;
                if i < self.hash_buffer.len() {
                    self.hash_buffer[out.len()] = self.hash_buffer[i];
                }
                out.push(sel.map_or(pos, |sel| usize::from(sel[pos])) as u16);
            }
            seen[..n].fill(false);
        }
        self.hash_buffer.truncate(out.len());
        batch.replace_selection(&out);
        let emitted = out.len();
        *self.sel_buffer_mut() = out;
        record_compacted_rows(emitted);
        tracing::trace!(rows = n, emitted, "selection compacted");
        emitted
    }
}

#[cfg(test)]
mod tests {
    use colhash_types::{ColumnSpec, ColumnVectorType, KeyId, Value};

    use super::*;

    fn batch(n: i64) -> Batch {
        let rows: Vec<Vec<Value>> = (0..n).map(|v| vec![Value::Integer(v)]).collect();
        Batch::from_rows(&rows, &[ColumnSpec::new("k", ColumnVectorType::Int64)], 16).unwrap()
    }

    #[test]
    fn keeps_first_appearance_of_each_head() {
        let mut batch = batch(5);
        let mut scratch = ProbeScratch::new(16, 16);
        scratch.prepare(5).unwrap();
        scratch.hash_buffer = vec![10, 11, 12, 13, 14];
        for (i, head) in [Some(1), Some(1), None, Some(4), Some(4)].into_iter().enumerate() {
            scratch.rows.head_id[i] = head.and_then(KeyId::new);
            scratch.rows.differs[i] = true;
        }

        assert_eq!(scratch.update_sel(&mut batch), 2);
        assert_eq!(batch.selection().unwrap().as_slice(), &[0, 3]);
        assert_eq!(batch.len(), 2);
        assert_eq!(scratch.hash_buffer(), &[10, 13]);
        assert!(scratch.rows().head_ids()[..5].iter().all(Option::is_none));
        assert!(scratch.rows().differs()[..5].iter().all(|d| !d));
        assert!(scratch.rows().distinct()[..5].iter().all(|d| !d));
    }

    #[test]
    fn heads_translate_through_existing_selection() {
        let mut batch = batch(6);
        batch
            .set_selection(Some(SelectionVector::from_indices(vec![1, 3, 5])))
            .unwrap();
        let mut scratch = ProbeScratch::new(16, 16);
        scratch.prepare(3).unwrap();
        scratch.rows.head_id[0] = KeyId::new(1);
        scratch.rows.head_id[1] = KeyId::new(3);
        scratch.rows.head_id[2] = KeyId::new(3);

        assert_eq!(scratch.update_sel(&mut batch), 2);
        assert_eq!(batch.selection().unwrap().as_slice(), &[1, 5]);
    }

    #[test]
    fn no_heads_empties_the_batch() {
        let mut batch = batch(3);
        let mut scratch = ProbeScratch::new(16, 16);
        scratch.prepare(3).unwrap();
        assert_eq!(scratch.update_sel(&mut batch), 0);
        assert!(batch.is_empty());
    }
}
