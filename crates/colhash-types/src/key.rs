//! Key capabilities: per-type equality and hashing over raw column values.
//!
//! The probing loops never match on [`ColumnData`] per row.  Instead a column
//! (or a probe/build column pair) is resolved once from its runtime type tag
//! into a typed view such as [`IntKeys`] or [`ByteKeys`], and a visitor is
//! handed that view.  The visitor's generic method is monomorphized per
//! supported type pair, so the per-row loop inlines the comparison.
//!
//! Supported comparisons:
//! - any integer width against any integer width (widened to `i64`),
//! - any float width against any float width (widened to `f64`; `NaN` equals
//!   `NaN`, `-0.0` equals `0.0`),
//! - text against text and binary against binary, byte-wise.
//!
//! Hashing agrees with equality: values that compare equal hash equal.

use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

use crate::vectorized::{ColumnData, ColumnVectorType};

/// Hash assigned to NULL key values.
pub const NULL_KEY_HASH: u64 = 0x9e37_79b9_7f4a_7c15;

/// Seed for combining per-column hashes into a row hash (FNV offset basis).
pub const ROW_HASH_SEED: u64 = 0xcbf2_9ce4_8422_2325;

/// Equality between the value at `idx` of `self` and `rhs_idx` of `rhs`.
pub trait KeyEq<Rhs> {
    fn key_eq(&self, idx: usize, rhs: &Rhs, rhs_idx: usize) -> bool;
}

/// Hash of the value at `idx`.
pub trait KeyHash {
    fn hash_at(&self, idx: usize) -> u64;
}

/// Integer values that widen losslessly to `i64`.
pub trait IntKey: Copy {
    fn widen(self) -> i64;
}

/// Float values that widen losslessly to `f64`.
pub trait FloatKey: Copy {
    fn widen(self) -> f64;
}

macro_rules! impl_int_key {
    ($($ty:ty),*) => {$(
        impl IntKey for $ty {
            #[inline]
            fn widen(self) -> i64 {
                i64::from(self)
            }
        }
    )*};
}

impl_int_key!(i8, i16, i32, i64);

impl FloatKey for f32 {
    #[inline]
    fn widen(self) -> f64 {
        f64::from(self)
    }
}

impl FloatKey for f64 {
    #[inline]
    fn widen(self) -> f64 {
        self
    }
}

/// Integer column view.
#[derive(Debug, Clone, Copy)]
pub struct IntKeys<'a, T>(pub &'a [T]);

/// Float column view.
#[derive(Debug, Clone, Copy)]
pub struct FloatKeys<'a, T>(pub &'a [T]);

/// Variable-length (text or binary) column view.
#[derive(Debug, Clone, Copy)]
pub struct ByteKeys<'a> {
    offsets: &'a [u32],
    data: &'a [u8],
}

impl<'a> ByteKeys<'a> {
    #[must_use]
    pub const fn new(offsets: &'a [u32], data: &'a [u8]) -> Self {
        Self { offsets, data }
    }

    #[inline]
    #[must_use]
    pub fn get(&self, idx: usize) -> &'a [u8] {
        let start = self.offsets[idx] as usize;
        let end = self.offsets[idx + 1] as usize;
        &self.data[start..end]
    }
}

impl<L: IntKey, R: IntKey> KeyEq<IntKeys<'_, R>> for IntKeys<'_, L> {
    #[inline]
    fn key_eq(&self, idx: usize, rhs: &IntKeys<'_, R>, rhs_idx: usize) -> bool {
        self.0[idx].widen() == rhs.0[rhs_idx].widen()
    }
}

impl<L: FloatKey, R: FloatKey> KeyEq<FloatKeys<'_, R>> for FloatKeys<'_, L> {
    #[inline]
    fn key_eq(&self, idx: usize, rhs: &FloatKeys<'_, R>, rhs_idx: usize) -> bool {
        float_eq(self.0[idx].widen(), rhs.0[rhs_idx].widen())
    }
}

impl KeyEq<ByteKeys<'_>> for ByteKeys<'_> {
    #[inline]
    fn key_eq(&self, idx: usize, rhs: &ByteKeys<'_>, rhs_idx: usize) -> bool {
        self.get(idx) == rhs.get(rhs_idx)
    }
}

impl<T: IntKey> KeyHash for IntKeys<'_, T> {
    #[inline]
    fn hash_at(&self, idx: usize) -> u64 {
        xxh3_64(&self.0[idx].widen().to_le_bytes())
    }
}

impl<T: FloatKey> KeyHash for FloatKeys<'_, T> {
    #[inline]
    fn hash_at(&self, idx: usize) -> u64 {
        xxh3_64(&canonical_float_bits(self.0[idx].widen()).to_le_bytes())
    }
}

impl KeyHash for ByteKeys<'_> {
    #[inline]
    fn hash_at(&self, idx: usize) -> u64 {
        xxh3_64(self.get(idx))
    }
}

#[inline]
fn float_eq(lhs: f64, rhs: f64) -> bool {
    lhs == rhs || (lhs.is_nan() && rhs.is_nan())
}

#[inline]
fn canonical_float_bits(value: f64) -> u64 {
    if value.is_nan() {
        f64::NAN.to_bits()
    } else if value == 0.0 {
        0
    } else {
        value.to_bits()
    }
}

/// Mix a per-column hash into a running row hash.
#[inline]
#[must_use]
pub const fn hash_combine(seed: u64, hash: u64) -> u64 {
    seed ^ hash
        .wrapping_add(0x9e37_79b9_7f4a_7c15)
        .wrapping_add(seed << 6)
        .wrapping_add(seed >> 2)
}

// ── Dispatch ───────────────────────────────────────────────────────────────

/// A probe/build column pair whose types cannot be compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unsupported key comparison: {probe} probe column against {build} build column")]
pub struct KeyTypeMismatch {
    pub probe: ColumnVectorType,
    pub build: ColumnVectorType,
}

/// Check that a probe/build type pair is inside the comparison matrix without
/// touching any values.
///
/// # Errors
///
/// Returns [`KeyTypeMismatch`] for unsupported pairs.
pub const fn check_key_pair(
    probe: ColumnVectorType,
    build: ColumnVectorType,
) -> Result<(), KeyTypeMismatch> {
    let supported = (probe.is_integer() && build.is_integer())
        || (probe.is_float() && build.is_float())
        || matches!(
            (probe, build),
            (ColumnVectorType::Text, ColumnVectorType::Text)
                | (ColumnVectorType::Binary, ColumnVectorType::Binary)
        );
    if supported {
        Ok(())
    } else {
        Err(KeyTypeMismatch { probe, build })
    }
}

/// Receives the typed views of one probe/build column pair.
pub trait KeyPairVisitor {
    type Output;

    fn visit<P, B>(self, probe: P, build: B) -> Self::Output
    where
        P: KeyEq<B>;
}

/// Receives the typed view of a single column.
pub trait KeyVisitor {
    type Output;

    fn visit<K: KeyHash>(self, keys: K) -> Self::Output;
}

/// Resolve `data` into its typed view and hand it to `visitor`.
pub fn visit_keys<V: KeyVisitor>(data: &ColumnData, visitor: V) -> V::Output {
    match data {
        ColumnData::Int8(v) => visitor.visit(IntKeys(&v[..])),
        ColumnData::Int16(v) => visitor.visit(IntKeys(&v[..])),
        ColumnData::Int32(v) => visitor.visit(IntKeys(&v[..])),
        ColumnData::Int64(v) => visitor.visit(IntKeys(&v[..])),
        ColumnData::Float32(v) => visitor.visit(FloatKeys(&v[..])),
        ColumnData::Float64(v) => visitor.visit(FloatKeys(&v[..])),
        ColumnData::Text { offsets, data } | ColumnData::Binary { offsets, data } => {
            visitor.visit(ByteKeys::new(offsets, data))
        }
    }
}

/// Resolve a probe/build pair into typed views and hand them to `visitor`.
///
/// # Errors
///
/// Returns [`KeyTypeMismatch`] when the pair is outside the supported
/// comparison matrix.
pub fn visit_key_pair<V: KeyPairVisitor>(
    probe: &ColumnData,
    build: &ColumnData,
    visitor: V,
) -> Result<V::Output, KeyTypeMismatch> {
    let probe_type = probe.vector_type();
    match probe {
        ColumnData::Int8(p) => visit_int_build(IntKeys(&p[..]), probe_type, build, visitor),
        ColumnData::Int16(p) => visit_int_build(IntKeys(&p[..]), probe_type, build, visitor),
        ColumnData::Int32(p) => visit_int_build(IntKeys(&p[..]), probe_type, build, visitor),
        ColumnData::Int64(p) => visit_int_build(IntKeys(&p[..]), probe_type, build, visitor),
        ColumnData::Float32(p) => visit_float_build(FloatKeys(&p[..]), probe_type, build, visitor),
        ColumnData::Float64(p) => visit_float_build(FloatKeys(&p[..]), probe_type, build, visitor),
        ColumnData::Text { offsets, data } => match build {
            ColumnData::Text {
                offsets: b_offsets,
                data: b_data,
            } => Ok(visitor.visit(
                ByteKeys::new(offsets, data),
                ByteKeys::new(b_offsets, b_data),
            )),
            _ => Err(KeyTypeMismatch {
                probe: probe_type,
                build: build.vector_type(),
            }),
        },
        ColumnData::Binary { offsets, data } => match build {
            ColumnData::Binary {
                offsets: b_offsets,
                data: b_data,
            } => Ok(visitor.visit(
                ByteKeys::new(offsets, data),
                ByteKeys::new(b_offsets, b_data),
            )),
            _ => Err(KeyTypeMismatch {
                probe: probe_type,
                build: build.vector_type(),
            }),
        },
    }
}

fn visit_int_build<L: IntKey, V: KeyPairVisitor>(
    probe: IntKeys<'_, L>,
    probe_type: ColumnVectorType,
    build: &ColumnData,
    visitor: V,
) -> Result<V::Output, KeyTypeMismatch> {
    match build {
        ColumnData::Int8(b) => Ok(visitor.visit(probe, IntKeys(&b[..]))),
        ColumnData::Int16(b) => Ok(visitor.visit(probe, IntKeys(&b[..]))),
        ColumnData::Int32(b) => Ok(visitor.visit(probe, IntKeys(&b[..]))),
        ColumnData::Int64(b) => Ok(visitor.visit(probe, IntKeys(&b[..]))),
        _ => Err(KeyTypeMismatch {
            probe: probe_type,
            build: build.vector_type(),
        }),
    }
}

fn visit_float_build<L: FloatKey, V: KeyPairVisitor>(
    probe: FloatKeys<'_, L>,
    probe_type: ColumnVectorType,
    build: &ColumnData,
    visitor: V,
) -> Result<V::Output, KeyTypeMismatch> {
    match build {
        ColumnData::Float32(b) => Ok(visitor.visit(probe, FloatKeys(&b[..]))),
        ColumnData::Float64(b) => Ok(visitor.visit(probe, FloatKeys(&b[..]))),
        _ => Err(KeyTypeMismatch {
            probe: probe_type,
            build: build.vector_type(),
        }),
    }
}
