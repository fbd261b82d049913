//! Typed column storage
//!
//! [`TypedColumn`] holds a dense value array plus one validity flag per row.
//! Null slots keep `T::default()` so the value array never has holes.
//! [`ColumnData`] is the closed enum of every kind; the buffer only ever
//! talks to it through the dispatch macros.

use std::cmp::Ordering;
use std::ops::Deref;

use serde_json::Value;

use crate::kind::{DataKind, Scalar};

/// Dense column of one scalar type with per-row null markers
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypedColumn<T> {
    values: Vec<T>,
    valid: Vec<bool>,
}

impl<T: Scalar> TypedColumn<T> {
    /// Create an empty column
    pub fn new() -> Self {
        Self {
            values: Vec::new(),
            valid: Vec::new(),
        }
    }

    /// Number of populated rows (may be below the owning buffer's row count)
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at `row`, `None` if null or not populated
    #[inline]
    pub fn get(&self, row: usize) -> Option<&T> {
        match self.valid.get(row) {
            Some(true) => self.values.get(row),
            _ => None,
        }
    }

    /// Whether `row` is null (unpopulated rows count as null)
    #[inline]
    pub fn is_null(&self, row: usize) -> bool {
        !self.valid.get(row).copied().unwrap_or(false)
    }

    /// Number of non-null rows
    pub fn non_null_count(&self) -> usize {
        self.valid.iter().filter(|v| **v).count()
    }

    /// Iterate rows as options
    pub fn iter(&self) -> impl Iterator<Item = Option<&T>> + '_ {
        self.values
            .iter()
            .zip(self.valid.iter())
            .map(|(value, valid)| valid.then_some(value))
    }

    /// Append one row
    pub fn push(&mut self, value: Option<T>) {
        match value {
            Some(v) => {
                self.values.push(v);
                self.valid.push(true);
            }
            None => {
                self.values.push(T::default());
                self.valid.push(false);
            }
        }
    }

    /// Write `value` at `row`, padding with nulls if the column is shorter
    pub(crate) fn write(&mut self, row: usize, value: T) {
        self.pad_to(row + 1);
        self.values[row] = value;
        self.valid[row] = true;
    }

    /// Mark `row` null, padding with nulls if the column is shorter
    pub(crate) fn write_null(&mut self, row: usize) {
        self.pad_to(row + 1);
        self.values[row] = T::default();
        self.valid[row] = false;
    }

    /// Extend with nulls up to `len` rows
    pub(crate) fn pad_to(&mut self, len: usize) {
        if self.values.len() < len {
            self.values.resize(len, T::default());
            self.valid.resize(len, false);
        }
    }

    pub(crate) fn truncate(&mut self, len: usize) {
        self.values.truncate(len);
        self.valid.truncate(len);
    }

    /// Remove the first `count` rows (or all populated rows if fewer)
    pub(crate) fn drain_front(&mut self, count: usize) {
        let count = count.min(self.values.len());
        self.values.drain(..count);
        self.valid.drain(..count);
    }

    /// Keep rows whose flag in `keep` is true; rows past `keep` are dropped
    pub(crate) fn retain_rows(&mut self, keep: &[bool]) {
        let mut row = 0;
        self.values.retain(|_| {
            let kept = keep.get(row).copied().unwrap_or(false);
            row += 1;
            kept
        });
        let mut row = 0;
        self.valid.retain(|_| {
            let kept = keep.get(row).copied().unwrap_or(false);
            row += 1;
            kept
        });
    }

    /// Move every row of `other` to the end of `self`
    pub(crate) fn append(&mut self, other: &mut Self) {
        self.values.append(&mut other.values);
        self.valid.append(&mut other.valid);
    }

    /// Reorder so that new row `i` is old row `perm[i]`.
    ///
    /// `perm` must be a permutation of `0..self.len()`.
    pub(crate) fn permute(&mut self, perm: &[usize]) {
        debug_assert_eq!(perm.len(), self.values.len());
        let mut values: Vec<Option<T>> = std::mem::take(&mut self.values)
            .into_iter()
            .map(Some)
            .collect();
        let valid = std::mem::take(&mut self.valid);

        self.values = perm
            .iter()
            .map(|&old| values[old].take().unwrap_or_default())
            .collect();
        self.valid = perm.iter().map(|&old| valid[old]).collect();
    }

    /// Compare two rows, nulls first
    pub(crate) fn compare_rows(&self, a: usize, b: usize) -> Ordering {
        match (self.get(a), self.get(b)) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(x), Some(y)) => x.order(y),
        }
    }

    pub(crate) fn cell_json(&self, row: usize) -> Option<Value> {
        self.get(row).map(Scalar::to_json)
    }

    pub(crate) fn write_json(&mut self, row: usize, value: &Value) -> bool {
        match T::from_json(value) {
            Some(v) => {
                self.write(row, v);
                true
            }
            None => {
                self.write_null(row);
                false
            }
        }
    }

    pub(crate) fn clear(&mut self) {
        self.values.clear();
        self.valid.clear();
    }
}

/// Column storage for every kind of the closed set
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Bool(TypedColumn<bool>),
    I8(TypedColumn<i8>),
    I16(TypedColumn<i16>),
    I32(TypedColumn<i32>),
    I64(TypedColumn<i64>),
    U8(TypedColumn<u8>),
    U16(TypedColumn<u16>),
    U32(TypedColumn<u32>),
    U64(TypedColumn<u64>),
    F32(TypedColumn<f32>),
    F64(TypedColumn<f64>),
    Text(TypedColumn<String>),
}

impl ColumnData {
    /// Create empty storage for `kind`
    pub fn new(kind: DataKind) -> Self {
        match kind {
            DataKind::Bool => ColumnData::Bool(TypedColumn::new()),
            DataKind::I8 => ColumnData::I8(TypedColumn::new()),
            DataKind::I16 => ColumnData::I16(TypedColumn::new()),
            DataKind::I32 => ColumnData::I32(TypedColumn::new()),
            DataKind::I64 => ColumnData::I64(TypedColumn::new()),
            DataKind::U8 => ColumnData::U8(TypedColumn::new()),
            DataKind::U16 => ColumnData::U16(TypedColumn::new()),
            DataKind::U32 => ColumnData::U32(TypedColumn::new()),
            DataKind::U64 => ColumnData::U64(TypedColumn::new()),
            DataKind::F32 => ColumnData::F32(TypedColumn::new()),
            DataKind::F64 => ColumnData::F64(TypedColumn::new()),
            DataKind::Text => ColumnData::Text(TypedColumn::new()),
        }
    }

    /// Kind tag of this storage
    pub fn kind(&self) -> DataKind {
        match self {
            ColumnData::Bool(_) => DataKind::Bool,
            ColumnData::I8(_) => DataKind::I8,
            ColumnData::I16(_) => DataKind::I16,
            ColumnData::I32(_) => DataKind::I32,
            ColumnData::I64(_) => DataKind::I64,
            ColumnData::U8(_) => DataKind::U8,
            ColumnData::U16(_) => DataKind::U16,
            ColumnData::U32(_) => DataKind::U32,
            ColumnData::U64(_) => DataKind::U64,
            ColumnData::F32(_) => DataKind::F32,
            ColumnData::F64(_) => DataKind::F64,
            ColumnData::Text(_) => DataKind::Text,
        }
    }

    pub fn len(&self) -> usize {
        with_column!(self, col => col.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_null(&self, row: usize) -> bool {
        with_column!(self, col => col.is_null(row))
    }

    /// Set a row from a JSON value; unrepresentable values become null.
    ///
    /// Returns whether the value was stored as non-null.
    pub fn write_json(&mut self, row: usize, value: &Value) -> bool {
        with_column!(self, col => col.write_json(row, value))
    }

    pub(crate) fn write_null(&mut self, row: usize) {
        with_column!(self, col => col.write_null(row))
    }

    pub(crate) fn pad_to(&mut self, len: usize) {
        with_column!(self, col => col.pad_to(len))
    }

    pub(crate) fn truncate(&mut self, len: usize) {
        with_column!(self, col => col.truncate(len))
    }

    pub(crate) fn drain_front(&mut self, count: usize) {
        with_column!(self, col => col.drain_front(count))
    }

    pub(crate) fn retain_rows(&mut self, keep: &[bool]) {
        with_column!(self, col => col.retain_rows(keep))
    }

    pub(crate) fn permute(&mut self, perm: &[usize]) {
        with_column!(self, col => col.permute(perm))
    }

    pub(crate) fn compare_rows(&self, a: usize, b: usize) -> Ordering {
        with_column!(self, col => col.compare_rows(a, b))
    }

    pub(crate) fn cell_json(&self, row: usize) -> Option<Value> {
        with_column!(self, col => col.cell_json(row))
    }

    pub(crate) fn clear(&mut self) {
        with_column!(self, col => col.clear())
    }

    /// Move all rows of `other` to the end of `self`.
    ///
    /// Returns `false` (and moves nothing) if the kinds differ.
    pub(crate) fn append(&mut self, other: &mut ColumnData) -> bool {
        with_column_pair!(self, other, dst, src => {
            dst.append(src);
            true
        }, else false)
    }
}

/// Mutable typed view of one column, bounded by the buffer's row count.
///
/// Writes at or beyond the row count are programming errors and panic.
#[derive(Debug)]
pub struct ColumnMut<'a, T> {
    column: &'a mut TypedColumn<T>,
    row_count: usize,
    name: &'a str,
}

impl<'a, T: Scalar> ColumnMut<'a, T> {
    pub(crate) fn new(column: &'a mut TypedColumn<T>, row_count: usize, name: &'a str) -> Self {
        Self {
            column,
            row_count,
            name,
        }
    }

    /// Set `row` to `value`
    pub fn set(&mut self, row: usize, value: T) {
        self.check_row(row);
        self.column.write(row, value);
    }

    /// Set `row` to null
    pub fn set_null(&mut self, row: usize) {
        self.check_row(row);
        self.column.write_null(row);
    }

    /// Set `row` from an option
    pub fn set_opt(&mut self, row: usize, value: Option<T>) {
        match value {
            Some(v) => self.set(row, v),
            None => self.set_null(row),
        }
    }

    /// Row count of the owning buffer
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    fn check_row(&self, row: usize) {
        assert!(
            row < self.row_count,
            "row {row} out of range for column '{}' (row count {})",
            self.name,
            self.row_count
        );
    }
}

impl<T> Deref for ColumnMut<'_, T> {
    type Target = TypedColumn<T>;

    fn deref(&self) -> &Self::Target {
        self.column
    }
}
