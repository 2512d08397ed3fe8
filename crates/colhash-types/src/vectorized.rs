//! Columnar batch layout shared by the probing core.
//!
//! A [`Batch`] is a group of equally sized [`Column`]s plus an optional
//! [`SelectionVector`] naming the rows that are currently active.  Each column
//! carries its raw values in a [`ColumnData`] and its nullability in a
//! [`NullBitmap`] (bit set = valid).  Value buffers are reference counted so
//! key columns can be shared with probe scratch space without copying.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default number of rows a batch is sized for.
pub const DEFAULT_BATCH_ROW_CAPACITY: usize = 1024;

/// Largest batch a `u16` selection vector can address.
pub const MAX_BATCH_ROW_CAPACITY: usize = u16::MAX as usize + 1;

// ── Errors ─────────────────────────────────────────────────────────────────

/// Structural problems detected while assembling a batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchFormatError {
    #[error("batch capacity must be in 1..={max}, got {0}", max = MAX_BATCH_ROW_CAPACITY)]
    InvalidCapacity(usize),
    #[error("row count {row_count} exceeds batch capacity {capacity}")]
    RowCountExceedsCapacity { row_count: usize, capacity: usize },
    #[error("column {column} has {found} values, expected {expected}")]
    ColumnLengthMismatch {
        column: String,
        expected: usize,
        found: usize,
    },
    #[error("column {column} is declared {declared} but holds {found} data")]
    ColumnTypeMismatch {
        column: String,
        declared: ColumnVectorType,
        found: ColumnVectorType,
    },
    #[error("validity bitmap for {len} rows needs {needed} bytes, got {found}")]
    ValidityTooShort {
        len: usize,
        needed: usize,
        found: usize,
    },
    #[error("selection index {index} out of bounds for {row_count} rows")]
    SelectionOutOfBounds { index: usize, row_count: usize },
    #[error("row {row} has {found} values, expected {expected}")]
    RowArity {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("row {row} value does not fit column {column} of type {vector_type}")]
    ValueTypeMismatch {
        column: String,
        row: usize,
        vector_type: ColumnVectorType,
    },
    #[error("column {column} offsets are not monotonic or exceed {data_len} data bytes")]
    InvalidOffsets { column: String, data_len: usize },
}

// ── Column Types ───────────────────────────────────────────────────────────

/// Physical vector type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnVectorType {
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Text,
    Binary,
}

impl ColumnVectorType {
    /// Stable label used in logs and error messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Int8 => "int8",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::Text => "text",
            Self::Binary => "binary",
        }
    }

    #[must_use]
    pub const fn is_integer(self) -> bool {
        matches!(self, Self::Int8 | Self::Int16 | Self::Int32 | Self::Int64)
    }

    #[must_use]
    pub const fn is_float(self) -> bool {
        matches!(self, Self::Float32 | Self::Float64)
    }

    /// Width in bytes of one fixed-size value, `None` for variable-length types.
    #[must_use]
    pub const fn width(self) -> Option<usize> {
        match self {
            Self::Int8 => Some(1),
            Self::Int16 => Some(2),
            Self::Int32 | Self::Float32 => Some(4),
            Self::Int64 | Self::Float64 => Some(8),
            Self::Text | Self::Binary => None,
        }
    }
}

impl fmt::Display for ColumnVectorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Column name and vector type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnSpec {
    pub name: Arc<str>,
    pub vector_type: ColumnVectorType,
}

impl ColumnSpec {
    #[must_use]
    pub fn new(name: impl Into<Arc<str>>, vector_type: ColumnVectorType) -> Self {
        Self {
            name: name.into(),
            vector_type,
        }
    }
}

/// Raw column values.  Variable-length types use `offsets.len() == rows + 1`.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Int8(Arc<[i8]>),
    Int16(Arc<[i16]>),
    Int32(Arc<[i32]>),
    Int64(Arc<[i64]>),
    Float32(Arc<[f32]>),
    Float64(Arc<[f64]>),
    Text { offsets: Arc<[u32]>, data: Arc<[u8]> },
    Binary { offsets: Arc<[u32]>, data: Arc<[u8]> },
}

impl ColumnData {
    #[must_use]
    pub const fn vector_type(&self) -> ColumnVectorType {
        match self {
            Self::Int8(_) => ColumnVectorType::Int8,
            Self::Int16(_) => ColumnVectorType::Int16,
            Self::Int32(_) => ColumnVectorType::Int32,
            Self::Int64(_) => ColumnVectorType::Int64,
            Self::Float32(_) => ColumnVectorType::Float32,
            Self::Float64(_) => ColumnVectorType::Float64,
            Self::Text { .. } => ColumnVectorType::Text,
            Self::Binary { .. } => ColumnVectorType::Binary,
        }
    }

    /// Number of values stored.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Int8(v) => v.len(),
            Self::Int16(v) => v.len(),
            Self::Int32(v) => v.len(),
            Self::Int64(v) => v.len(),
            Self::Float32(v) => v.len(),
            Self::Float64(v) => v.len(),
            Self::Text { offsets, .. } | Self::Binary { offsets, .. } => {
                offsets.len().saturating_sub(1)
            }
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ── Null Bitmap ────────────────────────────────────────────────────────────

/// Validity bitmap, LSB-first.  A column without nulls stores no bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NullBitmap {
    bytes: Option<Arc<[u8]>>,
    len: usize,
    null_count: usize,
}

impl NullBitmap {
    /// Bitmap for `len` rows that are all valid.
    #[must_use]
    pub const fn all_valid(len: usize) -> Self {
        Self {
            bytes: None,
            len,
            null_count: 0,
        }
    }

    /// Wrap an existing validity bitmap.
    ///
    /// # Errors
    ///
    /// Returns an error when `bytes` cannot cover `len` rows.
    pub fn from_bytes(bytes: Arc<[u8]>, len: usize) -> Result<Self, BatchFormatError> {
        let needed = len.div_ceil(8);
        if bytes.len() < needed {
            return Err(BatchFormatError::ValidityTooShort {
                len,
                needed,
                found: bytes.len(),
            });
        }
        let valid: usize = (0..len)
            .filter(|&row| bytes[row / 8] & (1_u8 << (row % 8)) != 0)
            .count();
        let null_count = len - valid;
        if null_count == 0 {
            return Ok(Self::all_valid(len));
        }
        Ok(Self {
            bytes: Some(bytes),
            len,
            null_count,
        })
    }

    /// Build a bitmap from one flag per row (`true` = valid).
    #[must_use]
    pub fn from_validity(validity: &[bool]) -> Self {
        let mut bytes = vec![0_u8; validity.len().div_ceil(8)];
        let mut null_count = 0;
        for (row, &valid) in validity.iter().enumerate() {
            if valid {
                bytes[row / 8] |= 1_u8 << (row % 8);
            } else {
                null_count += 1;
            }
        }
        if null_count == 0 {
            return Self::all_valid(validity.len());
        }
        Self {
            bytes: Some(Arc::from(bytes)),
            len: validity.len(),
            null_count,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_valid(&self, row: usize) -> bool {
        match &self.bytes {
            None => row < self.len,
            Some(bytes) => bytes
                .get(row / 8)
                .is_some_and(|byte| byte & (1_u8 << (row % 8)) != 0),
        }
    }

    #[inline]
    #[must_use]
    pub fn is_null(&self, row: usize) -> bool {
        !self.is_valid(row)
    }

    /// Whether any row may be NULL.  `false` lets callers skip null checks.
    #[inline]
    #[must_use]
    pub const fn has_nulls(&self) -> bool {
        self.null_count != 0
    }

    #[must_use]
    pub const fn null_count(&self) -> usize {
        self.null_count
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}

// ── Column ─────────────────────────────────────────────────────────────────

/// One column vector of a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub spec: ColumnSpec,
    pub data: ColumnData,
    pub validity: NullBitmap,
}

impl Column {
    /// Assemble a column, checking that data, validity and spec agree.
    ///
    /// # Errors
    ///
    /// Returns an error on type or length disagreement, or malformed offsets.
    pub fn new(
        spec: ColumnSpec,
        data: ColumnData,
        validity: NullBitmap,
    ) -> Result<Self, BatchFormatError> {
        let found = data.vector_type();
        if found != spec.vector_type {
            return Err(BatchFormatError::ColumnTypeMismatch {
                column: spec.name.to_string(),
                declared: spec.vector_type,
                found,
            });
        }
        if validity.len() != data.len() {
            return Err(BatchFormatError::ColumnLengthMismatch {
                column: spec.name.to_string(),
                expected: data.len(),
                found: validity.len(),
            });
        }
        if let ColumnData::Text { offsets, data } | ColumnData::Binary { offsets, data } = &data {
            let monotonic = offsets.windows(2).all(|w| w[0] <= w[1]);
            let in_bounds = offsets.last().is_none_or(|&end| end as usize <= data.len());
            if offsets.is_empty() || !monotonic || !in_bounds {
                return Err(BatchFormatError::InvalidOffsets {
                    column: spec.name.to_string(),
                    data_len: data.len(),
                });
            }
        }
        Ok(Self {
            spec,
            data,
            validity,
        })
    }

    #[must_use]
    pub const fn vector_type(&self) -> ColumnVectorType {
        self.data.vector_type()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

// ── Selection Vector ───────────────────────────────────────────────────────

/// Ordered list of active row positions within a batch.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SelectionVector {
    indices: Vec<u16>,
}

impl SelectionVector {
    /// Selection of rows `0..len`.
    ///
    /// # Errors
    ///
    /// Returns an error when `len` exceeds what a `u16` entry can address.
    pub fn identity(len: usize) -> Result<Self, BatchFormatError> {
        if len > MAX_BATCH_ROW_CAPACITY {
            return Err(BatchFormatError::InvalidCapacity(len));
        }
        Ok(Self {
            indices: (0..len).map(|row| row as u16).collect(),
        })
    }

    #[must_use]
    pub fn from_indices(indices: Vec<u16>) -> Self {
        Self { indices }
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            indices: Vec::with_capacity(capacity),
        }
    }

    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[u16] {
        &self.indices
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Replace the contents, reusing the existing allocation.
    pub fn overwrite(&mut self, indices: &[u16]) {
        self.indices.clear();
        self.indices.extend_from_slice(indices);
    }
}

// ── Row Values ─────────────────────────────────────────────────────────────

/// Dynamically typed value used to assemble batches row by row.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
    Blob(Vec<u8>),
}

// ── Batch ──────────────────────────────────────────────────────────────────

/// A fixed-capacity group of column vectors processed together.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    columns: Vec<Column>,
    row_count: usize,
    capacity: usize,
    selection: Option<SelectionVector>,
}

impl Batch {
    /// Assemble a batch from prebuilt columns.
    ///
    /// # Errors
    ///
    /// Returns an error when the capacity is invalid, a column length differs
    /// from `row_count`, or a selection entry is out of bounds.
    pub fn from_columns(
        columns: Vec<Column>,
        row_count: usize,
        capacity: usize,
        selection: Option<SelectionVector>,
    ) -> Result<Self, BatchFormatError> {
        if capacity == 0 || capacity > MAX_BATCH_ROW_CAPACITY {
            return Err(BatchFormatError::InvalidCapacity(capacity));
        }
        if row_count > capacity {
            return Err(BatchFormatError::RowCountExceedsCapacity {
                row_count,
                capacity,
            });
        }
        for column in &columns {
            if column.len() != row_count {
                return Err(BatchFormatError::ColumnLengthMismatch {
                    column: column.spec.name.to_string(),
                    expected: row_count,
                    found: column.len(),
                });
            }
        }
        if let Some(sel) = &selection
            && let Some(&bad) = sel.as_slice().iter().find(|&&idx| usize::from(idx) >= row_count)
        {
            return Err(BatchFormatError::SelectionOutOfBounds {
                index: usize::from(bad),
                row_count,
            });
        }
        Ok(Self {
            columns,
            row_count,
            capacity,
            selection,
        })
    }

    /// Assemble a batch from row-major values.  `Value::Null` becomes an
    /// invalid slot; integers must fit the declared width.
    ///
    /// # Errors
    ///
    /// Returns an error on arity or type mismatch, or when the rows do not
    /// fit `capacity`.
    pub fn from_rows(
        rows: &[Vec<Value>],
        specs: &[ColumnSpec],
        capacity: usize,
    ) -> Result<Self, BatchFormatError> {
        for (row, values) in rows.iter().enumerate() {
            if values.len() != specs.len() {
                return Err(BatchFormatError::RowArity {
                    row,
                    expected: specs.len(),
                    found: values.len(),
                });
            }
        }
        let mut columns = Vec::with_capacity(specs.len());
        for (col_idx, spec) in specs.iter().enumerate() {
            columns.push(column_from_rows(rows, col_idx, spec)?);
        }
        Self::from_columns(columns, rows.len(), capacity, None)
    }

    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    #[must_use]
    pub fn column(&self, idx: usize) -> Option<&Column> {
        self.columns.get(idx)
    }

    /// Physical number of rows stored in every column.
    #[must_use]
    pub const fn row_count(&self) -> usize {
        self.row_count
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of active rows: the selection length, or every row.
    #[must_use]
    pub fn len(&self) -> usize {
        self.selection
            .as_ref()
            .map_or(self.row_count, SelectionVector::len)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn selection(&self) -> Option<&SelectionVector> {
        self.selection.as_ref()
    }

    /// Install or drop the selection vector.
    ///
    /// # Errors
    ///
    /// Returns an error when a selection entry is out of bounds.
    pub fn set_selection(
        &mut self,
        selection: Option<SelectionVector>,
    ) -> Result<(), BatchFormatError> {
        if let Some(sel) = &selection
            && let Some(&bad) = sel
                .as_slice()
                .iter()
                .find(|&&idx| usize::from(idx) >= self.row_count)
        {
            return Err(BatchFormatError::SelectionOutOfBounds {
                index: usize::from(bad),
                row_count: self.row_count,
            });
        }
        self.selection = selection;
        Ok(())
    }

    /// Overwrite the selection in place, allocating only when the batch had
    /// none.  Entries must already be in bounds.
    pub fn replace_selection(&mut self, indices: &[u16]) {
        debug_assert!(
            indices.iter().all(|&idx| usize::from(idx) < self.row_count),
            "selection entry out of bounds"
        );
        match &mut self.selection {
            Some(sel) => sel.overwrite(indices),
            None => self.selection = Some(SelectionVector::from_indices(indices.to_vec())),
        }
    }

    /// Physical position of the `i`-th active row.
    #[inline]
    #[must_use]
    pub fn physical_row(&self, i: usize) -> usize {
        self.selection
            .as_ref()
            .map_or(i, |sel| usize::from(sel.as_slice()[i]))
    }
}

fn column_from_rows(
    rows: &[Vec<Value>],
    col_idx: usize,
    spec: &ColumnSpec,
) -> Result<Column, BatchFormatError> {
    let mismatch = |row: usize| BatchFormatError::ValueTypeMismatch {
        column: spec.name.to_string(),
        row,
        vector_type: spec.vector_type,
    };
    let validity: Vec<bool> = rows
        .iter()
        .map(|values| !matches!(values[col_idx], Value::Null))
        .collect();

    macro_rules! int_column {
        ($variant:ident, $ty:ty) => {{
            let mut values = Vec::with_capacity(rows.len());
            for (row, cells) in rows.iter().enumerate() {
                let value = match &cells[col_idx] {
                    Value::Null => <$ty>::default(),
                    Value::Integer(v) => <$ty>::try_from(*v).map_err(|_| mismatch(row))?,
                    _ => return Err(mismatch(row)),
                };
                values.push(value);
            }
            ColumnData::$variant(Arc::from(values))
        }};
    }

    macro_rules! bytes_column {
        ($variant:ident, $pat:ident) => {{
            let mut offsets = Vec::with_capacity(rows.len() + 1);
            let mut data: Vec<u8> = Vec::new();
            offsets.push(0_u32);
            for (row, cells) in rows.iter().enumerate() {
                match &cells[col_idx] {
                    Value::Null => {}
                    Value::$pat(bytes) => {
                        let bytes: &[u8] = bytes.as_ref();
                        data.extend_from_slice(bytes);
                    }
                    _ => return Err(mismatch(row)),
                }
                let end = u32::try_from(data.len()).map_err(|_| mismatch(row))?;
                offsets.push(end);
            }
            ColumnData::$variant {
                offsets: Arc::from(offsets),
                data: Arc::from(data),
            }
        }};
    }

    let data = match spec.vector_type {
        ColumnVectorType::Int8 => int_column!(Int8, i8),
        ColumnVectorType::Int16 => int_column!(Int16, i16),
        ColumnVectorType::Int32 => int_column!(Int32, i32),
        ColumnVectorType::Int64 => int_column!(Int64, i64),
        ColumnVectorType::Float32 => {
            let mut values = Vec::with_capacity(rows.len());
            for (row, cells) in rows.iter().enumerate() {
                values.push(match &cells[col_idx] {
                    Value::Null => 0.0,
                    Value::Float(v) => *v as f32,
                    _ => return Err(mismatch(row)),
                });
            }
            ColumnData::Float32(Arc::from(values))
        }
        ColumnVectorType::Float64 => {
            let mut values = Vec::with_capacity(rows.len());
            for (row, cells) in rows.iter().enumerate() {
                values.push(match &cells[col_idx] {
                    Value::Null => 0.0,
                    Value::Float(v) => *v,
                    _ => return Err(mismatch(row)),
                });
            }
            ColumnData::Float64(Arc::from(values))
        }
        ColumnVectorType::Text => bytes_column!(Text, Text),
        ColumnVectorType::Binary => bytes_column!(Binary, Blob),
    };

    Column::new(spec.clone(), data, NullBitmap::from_validity(&validity))
}
