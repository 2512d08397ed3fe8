//! Turning per-column results into whole-row decisions.
//!
//! After every key column has been folded into `differs` for the current
//! chain link, a resolver walks the pending rows once and decides which of
//! them keep probing.  Two flavours exist: [`resolve_rows`] records the first
//! match of each row (and optionally builds duplicate chains), while
//! [`select_next_links`] only keeps the rows whose candidate differed.

use colhash_types::KeyId;

use crate::column_check::check_col;
use crate::metrics::record_chain_links;
use crate::scratch::{ProbeRows, ProbeScratch};
use crate::table::HashTable;

/// Build-side duplicate chain storage, indexed by [`KeyId`].
#[derive(Debug)]
pub struct SameLinks<'a> {
    pub same: &'a mut [Option<KeyId>],
    pub visited: &'a mut [bool],
}

/// Resolve the current round for every pending row.
///
/// - exhausted rows (no candidate) leave the pending list;
/// - a row that matched records its candidate as `head_id` if it has none;
/// - with `links`, a matched candidate not yet visited is spliced behind the
///   row's head and the row keeps walking to find further duplicates;
/// - differing rows stay pending with `differs` cleared.
///
/// Returns the new pending count.
pub fn resolve_rows(rows: &mut ProbeRows, mut links: Option<SameLinks<'_>>) -> usize {
    let mut kept = 0;
    let mut spliced = 0;
    for i in 0..rows.to_check.len() {
        let row = rows.to_check[i];
        let Some(key) = rows.group_id[row] else {
            rows.differs[row] = false;
            continue;
        };
        if !rows.differs[row] {
            let head = *rows.head_id[row].get_or_insert(key);
            if let Some(links) = links.as_mut()
                && !links.visited[key.index()]
            {
                links.visited[key.index()] = true;
                rows.differs[row] = true;
                if key != head {
                    links.same[key.index()] = links.same[head.index()];
                    links.same[head.index()] = Some(key);
                    spliced += 1;
                }
            }
        }
        if rows.differs[row] {
            rows.differs[row] = false;
            rows.to_check[kept] = row;
            kept += 1;
        }
    }
    rows.to_check.truncate(kept);
    record_chain_links(spliced);
    kept
}

/// Keep only the pending rows whose candidate differed, clearing the flag.
/// Matched rows keep their candidate in `group_id`.
///
/// Returns the new pending count.
pub fn select_next_links(rows: &mut ProbeRows) -> usize {
    let mut kept = 0;
    for i in 0..rows.to_check.len() {
        let row = rows.to_check[i];
        if rows.differs[row] {
            rows.differs[row] = false;
            rows.to_check[kept] = row;
            kept += 1;
        }
    }
    rows.to_check.truncate(kept);
    kept
}

impl HashTable {
    /// Fold every key column of the scratch's probe keys into `differs`.
    ///
    /// # Panics
    ///
    /// Panics when the probe key arity differs from the table's or a key
    /// pair cannot be compared.
    pub fn check_cols(&self, scratch: &mut ProbeScratch, probe_sel: Option<&[u16]>) {
        assert_eq!(
            scratch.keys.len(),
            self.key_columns.len(),
            "probe key arity does not match the build side"
        );
        let build_sel = self.build_sel();
        for (i, probe) in scratch.keys.iter().enumerate() {
            check_col(
                &mut scratch.rows,
                probe,
                self.build_key(i),
                probe_sel,
                build_sel,
                self.config.allow_null_equality,
            );
        }
    }

    /// One join-expansion round: check the current links and splice newly
    /// matched build rows into their duplicate chains.  Returns the number of
    /// rows that keep probing.
    ///
    /// # Panics
    ///
    /// See [`check_cols`](Self::check_cols).
    pub fn check(&mut self, scratch: &mut ProbeScratch, probe_sel: Option<&[u16]>) -> usize {
        self.check_cols(scratch, probe_sel);
        resolve_rows(
            &mut scratch.rows,
            Some(SameLinks {
                same: &mut self.same,
                visited: &mut self.visited,
            }),
        )
    }

    /// One first-match round: check the current links and keep only the rows
    /// that differed.  Returns the number of rows that keep probing.
    ///
    /// # Panics
    ///
    /// See [`check_cols`](Self::check_cols).
    pub fn distinct_check(&self, scratch: &mut ProbeScratch, probe_sel: Option<&[u16]>) -> usize {
        self.check_cols(scratch, probe_sel);
        select_next_links(&mut scratch.rows)
    }
}
