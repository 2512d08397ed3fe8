//! Per-column, null-aware equality between probe rows and their candidates.
//!
//! Each call folds one key column into `differs`: a row whose candidate
//! differs on any column ends the round with `differs` set.  The row loop is
//! monomorphized over the key type pair and over four flags (probe may hold
//! nulls, build may hold nulls, NULL equals NULL, mark exhausted rows as
//! distinct) so the inner loop carries no per-row dispatch.

use colhash_types::{Column, KeyEq, KeyPairVisitor, NullBitmap, visit_key_pair};

use crate::scratch::ProbeRows;

struct ColumnCheck<'a> {
    rows: &'a mut ProbeRows,
    probe_validity: &'a NullBitmap,
    build_validity: &'a NullBitmap,
    probe_sel: Option<&'a [u16]>,
    build_sel: Option<&'a [u16]>,
    allow_null_equality: bool,
    mark_distinct: bool,
}

impl KeyPairVisitor for ColumnCheck<'_> {
    type Output = ();

    fn visit<P, B>(self, probe: P, build: B)
    where
        P: KeyEq<B>,
    {
        match (
            self.probe_validity.has_nulls(),
            self.build_validity.has_nulls(),
        ) {
            (true, true) => self.with_policy::<true, true, P, B>(&probe, &build),
            (true, false) => self.with_policy::<true, false, P, B>(&probe, &build),
            (false, true) => self.with_policy::<false, true, P, B>(&probe, &build),
            (false, false) => self.with_policy::<false, false, P, B>(&probe, &build),
        }
    }
}

impl ColumnCheck<'_> {
    fn with_policy<const PROBE_NULLS: bool, const BUILD_NULLS: bool, P, B>(
        self,
        probe: &P,
        build: &B,
    ) where
        P: KeyEq<B>,
    {
        // Distinct marking always treats NULL as equal to NULL.
        match (self.allow_null_equality, self.mark_distinct) {
            (_, true) => self.run::<PROBE_NULLS, BUILD_NULLS, true, true, P, B>(probe, build),
            (true, false) => self.run::<PROBE_NULLS, BUILD_NULLS, true, false, P, B>(probe, build),
            (false, false) => {
                self.run::<PROBE_NULLS, BUILD_NULLS, false, false, P, B>(probe, build);
            }
        }
    }

    #[inline]
    fn run<
        const PROBE_NULLS: bool,
        const BUILD_NULLS: bool,
        const ALLOW_NULL_EQ: bool,
        const MARK_DISTINCT: bool,
        P,
        B,
    >(
        self,
        probe: &P,
        build: &B,
    ) where
        P: KeyEq<B>,
    {
        let rows = self.rows;
        for &row in &rows.to_check {
            let Some(key) = rows.group_id[row] else {
                if MARK_DISTINCT {
                    rows.distinct[row] = true;
                }
                continue;
            };
            let probe_idx = self.probe_sel.map_or(row, |sel| usize::from(sel[row]));
            let build_idx = self
                .build_sel
                .map_or(key.index(), |sel| usize::from(sel[key.index()]));
            let probe_null = PROBE_NULLS && self.probe_validity.is_null(probe_idx);
            let build_null = BUILD_NULLS && self.build_validity.is_null(build_idx);

            if ALLOW_NULL_EQ {
                if probe_null && build_null {
                    continue;
                }
                if probe_null || build_null {
                    rows.differs[row] = true;
                    continue;
                }
            } else if probe_null {
                // A NULL probe key can never match; stop walking its chain.
                rows.group_id[row] = None;
                continue;
            } else if build_null {
                rows.differs[row] = true;
                continue;
            }

            if !probe.key_eq(probe_idx, build, build_idx) {
                rows.differs[row] = true;
            }
        }
    }
}

fn check(
    rows: &mut ProbeRows,
    probe: &Column,
    build: &Column,
    probe_sel: Option<&[u16]>,
    build_sel: Option<&[u16]>,
    allow_null_equality: bool,
    mark_distinct: bool,
) {
    let visitor = ColumnCheck {
        rows,
        probe_validity: &probe.validity,
        build_validity: &build.validity,
        probe_sel,
        build_sel,
        allow_null_equality,
        mark_distinct,
    };
    if let Err(err) = visit_key_pair(&probe.data, &build.data, visitor) {
        panic!("{err}");
    }
}

/// Compare `probe` against `build` for every pending row that still has a
/// candidate, OR-ing mismatches into `differs`.
///
/// Probe positions are translated through `probe_sel` and candidate rows
/// (`key.index()`) through `build_sel` when present.
///
/// # Panics
///
/// Panics when the column types cannot be compared.
pub fn check_col(
    rows: &mut ProbeRows,
    probe: &Column,
    build: &Column,
    probe_sel: Option<&[u16]>,
    build_sel: Option<&[u16]>,
    allow_null_equality: bool,
) {
    check(
        rows,
        probe,
        build,
        probe_sel,
        build_sel,
        allow_null_equality,
        false,
    );
}

/// [`check_col`] with NULL equal to NULL that additionally flags pending
/// rows whose candidate is exhausted as `distinct`.
///
/// # Panics
///
/// Panics when the column types cannot be compared.
pub fn check_col_for_distinct(
    rows: &mut ProbeRows,
    probe: &Column,
    build: &Column,
    probe_sel: Option<&[u16]>,
    build_sel: Option<&[u16]>,
) {
    check(rows, probe, build, probe_sel, build_sel, true, true);
}

struct EqAt {
    probe_idx: usize,
    build_idx: usize,
}

impl KeyPairVisitor for EqAt {
    type Output = bool;

    fn visit<P, B>(self, probe: P, build: B) -> bool
    where
        P: KeyEq<B>,
    {
        probe.key_eq(self.probe_idx, &build, self.build_idx)
    }
}

/// Compare a single pair of physical positions under the given null policy.
///
/// # Errors
///
/// Returns [`KeyTypeMismatch`](colhash_types::KeyTypeMismatch) when the
/// column types cannot be compared.
pub fn keys_equal_at(
    probe: &Column,
    probe_idx: usize,
    build: &Column,
    build_idx: usize,
    allow_null_equality: bool,
) -> Result<bool, colhash_types::KeyTypeMismatch> {
    let probe_null = probe.validity.is_null(probe_idx);
    let build_null = build.validity.is_null(build_idx);
    if probe_null || build_null {
        colhash_types::check_key_pair(probe.vector_type(), build.vector_type())?;
        return Ok(allow_null_equality && probe_null && build_null);
    }
    visit_key_pair(
        &probe.data,
        &build.data,
        EqAt {
            probe_idx,
            build_idx,
        },
    )
}

#[cfg(test)]
mod tests {
    use colhash_types::{Batch, ColumnSpec, ColumnVectorType, KeyId, Value};

    use super::*;
    use crate::scratch::ProbeScratch;

    fn column(ty: ColumnVectorType, values: Vec<Value>) -> Column {
        let rows: Vec<Vec<Value>> = values.into_iter().map(|v| vec![v]).collect();
        Batch::from_rows(&rows, &[ColumnSpec::new("k", ty)], 64)
            .unwrap()
            .columns()[0]
            .clone()
    }

    fn ints(values: &[Option<i64>]) -> Column {
        column(
            ColumnVectorType::Int64,
            values
                .iter()
                .map(|v| v.map_or(Value::Null, Value::Integer))
                .collect(),
        )
    }

    /// Scratch with every row pending against the given candidates.
    fn scratch_with(groups: &[Option<u32>]) -> ProbeScratch {
        let mut scratch = ProbeScratch::new(16, 16);
        scratch.prepare(groups.len()).unwrap();
        for (slot, group) in scratch.rows_mut().group_ids_mut().iter_mut().zip(groups) {
            *slot = group.and_then(KeyId::new);
        }
        scratch
    }

    #[test]
    fn equal_values_leave_differs_clear() {
        let probe = ints(&[Some(1), Some(2), Some(3)]);
        let build = ints(&[Some(3), Some(2), Some(1)]);
        let mut scratch = scratch_with(&[Some(3), Some(1), Some(1)]);
        check_col(scratch.rows_mut(), &probe, &build, None, None, false);
        assert_eq!(&scratch.rows().differs()[..3], &[false, true, false]);
    }

    #[test]
    fn null_policy_without_null_equality() {
        // probe: NULL, NULL, 5, 5   build: NULL, 5
        let probe = ints(&[None, None, Some(5), Some(5)]);
        let build = ints(&[None, Some(5)]);
        let mut scratch = scratch_with(&[Some(1), Some(2), Some(1), Some(2)]);
        check_col(scratch.rows_mut(), &probe, &build, None, None, false);
        let rows = scratch.rows();
        assert_eq!(rows.group_ids()[0], None, "probe NULL abandons its chain");
        assert_eq!(rows.group_ids()[1], None, "probe NULL abandons its chain");
        assert!(rows.differs()[2], "build NULL never matches");
        assert!(!rows.differs()[3]);
    }

    #[test]
    fn null_policy_with_null_equality() {
        let probe = ints(&[None, None, Some(5), Some(5)]);
        let build = ints(&[None, Some(5)]);
        let mut scratch = scratch_with(&[Some(1), Some(2), Some(1), Some(2)]);
        check_col(scratch.rows_mut(), &probe, &build, None, None, true);
        let rows = scratch.rows();
        assert!(!rows.differs()[0], "NULL equals NULL");
        assert!(rows.differs()[1]);
        assert_eq!(rows.group_ids()[1], KeyId::new(2), "candidate kept");
        assert!(rows.differs()[2]);
        assert!(!rows.differs()[3]);
    }

    #[test]
    fn probe_null_against_null_free_build_keeps_candidate_when_allowed() {
        let probe = ints(&[None]);
        let build = ints(&[Some(5)]);
        let mut scratch = scratch_with(&[Some(1)]);
        check_col(scratch.rows_mut(), &probe, &build, None, None, true);
        assert!(scratch.rows().differs()[0]);
        assert_eq!(scratch.rows().group_ids()[0], KeyId::new(1));
    }

    #[test]
    fn selections_translate_both_sides() {
        let probe = ints(&[Some(9), Some(7), Some(8)]);
        let build = ints(&[Some(7), Some(0), Some(8)]);
        // position 0 -> probe row 1 (7), candidate #1 -> build row sel[0] = 0 (7)
        // position 1 -> probe row 2 (8), candidate #2 -> build row sel[1] = 2 (8)
        let mut scratch = scratch_with(&[Some(1), Some(2)]);
        check_col(
            scratch.rows_mut(),
            &probe,
            &build,
            Some(&[1, 2][..]),
            Some(&[0, 2][..]),
            false,
        );
        assert_eq!(&scratch.rows().differs()[..2], &[false, false]);
    }

    #[test]
    fn columns_accumulate_by_or() {
        let a_probe = ints(&[Some(1), Some(1)]);
        let a_build = ints(&[Some(1)]);
        let b_probe = ints(&[Some(2), Some(3)]);
        let b_build = ints(&[Some(2)]);
        let mut scratch = scratch_with(&[Some(1), Some(1)]);
        check_col(scratch.rows_mut(), &b_probe, &b_build, None, None, false);
        check_col(scratch.rows_mut(), &a_probe, &a_build, None, None, false);
        assert_eq!(&scratch.rows().differs()[..2], &[false, true]);
    }

    #[test]
    fn exhausted_rows_are_skipped_or_marked_distinct() {
        let probe = ints(&[Some(1), None]);
        let build = ints(&[Some(2)]);
        let mut scratch = scratch_with(&[None, Some(1)]);
        check_col(scratch.rows_mut(), &probe, &build, None, None, false);
        assert!(!scratch.rows().differs()[0]);
        assert!(!scratch.rows().distinct()[0]);

        let mut scratch = scratch_with(&[None, Some(1)]);
        check_col_for_distinct(scratch.rows_mut(), &probe, &build, Some(&[0, 1][..]), None);
        assert!(scratch.rows().distinct()[0]);
        assert!(!scratch.rows().distinct()[1]);
        assert!(scratch.rows().differs()[1], "NULL against a value differs");
        assert_eq!(scratch.rows().group_ids()[1], KeyId::new(1));
    }

    #[test]
    fn text_and_float_keys() {
        let probe = column(
            ColumnVectorType::Text,
            vec![Value::Text("ab".into()), Value::Text("b".into())],
        );
        let build = column(ColumnVectorType::Text, vec![Value::Text("ab".into())]);
        let mut scratch = scratch_with(&[Some(1), Some(1)]);
        check_col(scratch.rows_mut(), &probe, &build, None, None, false);
        assert_eq!(&scratch.rows().differs()[..2], &[false, true]);

        let probe = column(ColumnVectorType::Float32, vec![Value::Float(f64::NAN)]);
        let build = column(ColumnVectorType::Float64, vec![Value::Float(f64::NAN)]);
        let mut scratch = scratch_with(&[Some(1)]);
        check_col(scratch.rows_mut(), &probe, &build, None, None, false);
        assert!(!scratch.rows().differs()[0]);
    }

    #[test]
    #[should_panic(expected = "unsupported key comparison")]
    fn incompatible_types_panic() {
        let probe = ints(&[Some(1)]);
        let build = column(ColumnVectorType::Text, vec![Value::Text("1".into())]);
        let mut scratch = scratch_with(&[Some(1)]);
        check_col(scratch.rows_mut(), &probe, &build, None, None, false);
    }

    #[test]
    fn keys_equal_at_follows_null_policy() {
        let probe = ints(&[None, Some(4)]);
        let build = ints(&[None, Some(4)]);
        assert!(keys_equal_at(&probe, 0, &build, 0, true).unwrap());
        assert!(!keys_equal_at(&probe, 0, &build, 0, false).unwrap());
        assert!(!keys_equal_at(&probe, 0, &build, 1, true).unwrap());
        assert!(keys_equal_at(&probe, 1, &build, 1, false).unwrap());
        let text = column(ColumnVectorType::Text, vec![Value::Null]);
        assert!(keys_equal_at(&probe, 0, &text, 0, true).is_err());
    }
}
