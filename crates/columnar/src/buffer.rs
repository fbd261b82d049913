//! Record buffer
//!
//! A [`RecordBuffer`] is an ordered set of named, typed columns sharing one
//! authoritative row count. Columns may be shorter than the row count; the
//! missing tail reads as null. Every row-level operation applies to all
//! columns in lock-step.

use std::collections::{BTreeSet, HashMap};
use std::ops::Range;

use serde_json::{Map, Value};

use crate::column::{ColumnData, ColumnMut, TypedColumn};
use crate::error::{BufferError, Result};
use crate::kind::{DataKind, Scalar};

/// A named column inside a [`RecordBuffer`]
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    name: String,
    data: ColumnData,
}

impl Column {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> DataKind {
        self.data.kind()
    }

    pub fn data(&self) -> &ColumnData {
        &self.data
    }
}

/// Columnar record set with one row count for all columns
#[derive(Debug)]
pub struct RecordBuffer {
    columns: Vec<Column>,
    index: HashMap<String, usize>,
    row_count: usize,
    last_chunk: bool,
    strict: bool,
}

impl Default for RecordBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordBuffer {
    /// Create an empty buffer with no columns.
    ///
    /// Strict bounds checking is on in debug builds.
    pub fn new() -> Self {
        Self {
            columns: Vec::new(),
            index: HashMap::new(),
            row_count: 0,
            last_chunk: false,
            strict: cfg!(debug_assertions),
        }
    }

    /// Create an empty buffer with declared columns
    pub fn with_columns<I, S>(columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, DataKind)>,
        S: Into<String>,
    {
        let mut buffer = Self::new();
        for (name, kind) in columns {
            buffer.add_column(name, kind)?;
        }
        Ok(buffer)
    }

    /// Enable or disable the post-mutation bounds assertion
    pub fn set_strict(&mut self, strict: bool) {
        self.strict = strict;
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    // ------------------------------------------------------------------
    // Schema
    // ------------------------------------------------------------------

    /// Declare a new column
    pub fn add_column(&mut self, name: impl Into<String>, kind: DataKind) -> Result<()> {
        let name = name.into();
        if self.index.contains_key(&name) {
            return Err(BufferError::DuplicateColumn { name });
        }
        self.index.insert(name.clone(), self.columns.len());
        self.columns.push(Column {
            name,
            data: ColumnData::new(kind),
        });
        Ok(())
    }

    /// Declare a new column from a textual kind name
    pub fn add_column_named(&mut self, name: impl Into<String>, kind: &str) -> Result<()> {
        let kind: DataKind = kind.parse()?;
        self.add_column(name, kind)
    }

    /// Declare `name` unless it already exists with the same kind
    pub fn ensure_column(&mut self, name: &str, kind: DataKind) -> Result<()> {
        match self.column_kind(name) {
            Some(actual) if actual == kind => Ok(()),
            Some(actual) => Err(BufferError::KindMismatch {
                name: name.to_string(),
                expected: kind,
                actual,
            }),
            None => self.add_column(name, kind),
        }
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn column_kind(&self, name: &str) -> Option<DataKind> {
        self.find(name).map(Column::kind)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Untyped read access to a column
    pub fn column_data(&self, name: &str) -> Option<&ColumnData> {
        self.find(name).map(Column::data)
    }

    // ------------------------------------------------------------------
    // Rows
    // ------------------------------------------------------------------

    #[inline]
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }

    /// Append one row (all cells null) and return its index
    pub fn push_row(&mut self) -> usize {
        self.row_count += 1;
        self.row_count - 1
    }

    /// Append `count` null rows and return their index range
    pub fn push_rows(&mut self, count: usize) -> Range<usize> {
        let start = self.row_count;
        self.row_count += count;
        start..self.row_count
    }

    pub fn is_last_chunk(&self) -> bool {
        self.last_chunk
    }

    pub fn set_last_chunk(&mut self, last: bool) {
        self.last_chunk = last;
    }

    // ------------------------------------------------------------------
    // Typed access
    // ------------------------------------------------------------------

    /// Mutable typed view of `name`.
    ///
    /// # Panics
    ///
    /// Panics if the column does not exist or holds a different kind.
    pub fn column<T: Scalar>(&mut self, name: &str) -> ColumnMut<'_, T> {
        match self.try_column(name) {
            Ok(column) => column,
            Err(e) => panic!("typed column access failed: {e}"),
        }
    }

    /// Mutable typed view of `name`, without panicking
    pub fn try_column<T: Scalar>(&mut self, name: &str) -> Result<ColumnMut<'_, T>> {
        let row_count = self.row_count;
        let position = *self
            .index
            .get(name)
            .ok_or_else(|| BufferError::missing_column(name))?;
        let column = &mut self.columns[position];
        let actual = column.data.kind();
        match T::peel_mut(&mut column.data) {
            Some(typed) => Ok(ColumnMut::new(typed, row_count, &column.name)),
            None => Err(BufferError::KindMismatch {
                name: name.to_string(),
                expected: T::KIND,
                actual,
            }),
        }
    }

    /// Typed read access to `name`.
    ///
    /// # Panics
    ///
    /// Panics if the column does not exist or holds a different kind.
    pub fn column_ref<T: Scalar>(&self, name: &str) -> &TypedColumn<T> {
        match self.try_column_ref(name) {
            Ok(column) => column,
            Err(e) => panic!("typed column access failed: {e}"),
        }
    }

    pub fn try_column_ref<T: Scalar>(&self, name: &str) -> Result<&TypedColumn<T>> {
        let column = self
            .find(name)
            .ok_or_else(|| BufferError::missing_column(name))?;
        T::peel(&column.data).ok_or_else(|| BufferError::KindMismatch {
            name: name.to_string(),
            expected: T::KIND,
            actual: column.kind(),
        })
    }

    /// Set one cell.
    ///
    /// # Panics
    ///
    /// Panics on a missing column, a kind mismatch or `row >= row_count`.
    pub fn set_value<T: Scalar>(&mut self, name: &str, row: usize, value: T) {
        self.column::<T>(name).set(row, value);
        self.check_invariants();
    }

    /// Null one cell.
    ///
    /// # Panics
    ///
    /// Panics on a missing column or `row >= row_count`.
    pub fn set_null(&mut self, name: &str, row: usize) {
        self.check_row(name, row);
        let data = self.data_mut(name);
        data.write_null(row);
        self.check_invariants();
    }

    /// Set one cell from JSON, converting to the column's kind.
    ///
    /// Returns `Ok(false)` if the value was not representable and the cell
    /// was stored as null.
    ///
    /// # Panics
    ///
    /// Panics if `row >= row_count`.
    pub fn set_json(&mut self, name: &str, row: usize, value: &Value) -> Result<bool> {
        if !self.has_column(name) {
            return Err(BufferError::missing_column(name));
        }
        self.check_row(name, row);
        let stored = self.data_mut(name).write_json(row, value);
        self.check_invariants();
        Ok(stored)
    }

    // ------------------------------------------------------------------
    // Bulk operations
    // ------------------------------------------------------------------

    /// Reorder all rows by the values of `name`, nulls first.
    ///
    /// The sort is not stable; every column receives the same permutation.
    pub fn sort_by_column(&mut self, name: &str) -> Result<()> {
        let key = self
            .index
            .get(name)
            .copied()
            .ok_or_else(|| BufferError::missing_column(name))?;

        let row_count = self.row_count;
        for column in &mut self.columns {
            column.data.pad_to(row_count);
        }

        let mut perm: Vec<usize> = (0..row_count).collect();
        let key_data = &self.columns[key].data;
        perm.sort_unstable_by(|a, b| key_data.compare_rows(*a, *b));

        for column in &mut self.columns {
            column.data.permute(&perm);
        }
        self.check_invariants();
        Ok(())
    }

    /// Move every row of `other` to the end of `self`.
    ///
    /// Columns only present in `other` are added (earlier rows null); columns
    /// only present in `self` get null cells for the appended rows. `other`
    /// keeps its columns but ends with zero rows. Compatibility is checked
    /// before anything moves.
    pub fn merge(&mut self, other: &mut RecordBuffer) -> Result<()> {
        for column in &other.columns {
            if let Some(actual) = self.column_kind(&column.name) {
                if actual != column.kind() {
                    return Err(BufferError::KindMismatch {
                        name: column.name.clone(),
                        expected: actual,
                        actual: column.kind(),
                    });
                }
            }
        }

        let base = self.row_count;
        let added = other.row_count;

        for column in &mut self.columns {
            column.data.pad_to(base);
        }

        for source in &mut other.columns {
            source.data.pad_to(added);
            let position = match self.index.get(&source.name).copied() {
                Some(position) => position,
                None => {
                    self.add_column(source.name.clone(), source.kind())?;
                    let position = self.columns.len() - 1;
                    self.columns[position].data.pad_to(base);
                    position
                }
            };
            let appended = self.columns[position].data.append(&mut source.data);
            debug_assert!(appended, "merge compatibility checked above");
        }

        self.row_count = base + added;
        for column in &mut self.columns {
            column.data.pad_to(self.row_count);
        }

        other.row_count = 0;
        if other.last_chunk {
            self.last_chunk = true;
        }
        self.check_invariants();
        Ok(())
    }

    /// Keep only the first `len` rows
    pub fn truncate(&mut self, len: usize) {
        if len >= self.row_count {
            return;
        }
        for column in &mut self.columns {
            column.data.truncate(len);
        }
        self.row_count = len;
        self.check_invariants();
    }

    /// Discard rows `0..=last` and shift the remainder down.
    ///
    /// # Panics
    ///
    /// Panics if `last >= row_count`.
    pub fn drop_leading(&mut self, last: usize) {
        assert!(
            last < self.row_count,
            "drop_leading({last}) out of range (row count {})",
            self.row_count
        );
        let count = last + 1;
        for column in &mut self.columns {
            column.data.drain_front(count);
        }
        self.row_count -= count;
        self.check_invariants();
    }

    /// Remove the given row indices and renumber the rest.
    ///
    /// # Panics
    ///
    /// Panics if any index is `>= row_count`.
    pub fn remove_rows(&mut self, rows: &BTreeSet<usize>) {
        if rows.is_empty() {
            return;
        }
        if let Some(&max) = rows.last() {
            assert!(
                max < self.row_count,
                "remove_rows index {max} out of range (row count {})",
                self.row_count
            );
        }
        if rows.len() == self.row_count {
            self.clear();
            return;
        }

        let mut keep = vec![true; self.row_count];
        for &row in rows {
            keep[row] = false;
        }
        for column in &mut self.columns {
            column.data.retain_rows(&keep);
        }
        self.row_count -= rows.len();
        self.check_invariants();
    }

    /// Drop all rows, keeping the declared columns
    pub fn clear(&mut self) {
        for column in &mut self.columns {
            column.data.clear();
        }
        self.row_count = 0;
    }

    /// Copy the requested columns into a new buffer
    pub fn project(&self, names: &[&str]) -> Result<RecordBuffer> {
        if self.row_count == 0 {
            return Err(BufferError::EmptyBuffer);
        }
        let mut projected = RecordBuffer::new();
        projected.strict = self.strict;
        projected.last_chunk = self.last_chunk;
        projected.row_count = self.row_count;
        for name in names {
            let column = self
                .find(name)
                .ok_or_else(|| BufferError::missing_column(*name))?;
            if projected.has_column(name) {
                return Err(BufferError::DuplicateColumn {
                    name: name.to_string(),
                });
            }
            projected.index.insert(column.name.clone(), projected.columns.len());
            projected.columns.push(column.clone());
        }
        Ok(projected)
    }

    /// Row-major JSON view: an array with one object per row, holding only
    /// the non-null cells
    pub fn to_record_tree(&self) -> Value {
        let rows = (0..self.row_count)
            .map(|row| {
                let mut record = Map::new();
                for column in &self.columns {
                    if let Some(value) = column.data.cell_json(row) {
                        record.insert(column.name.clone(), value);
                    }
                }
                Value::Object(record)
            })
            .collect();
        Value::Array(rows)
    }

    /// Assert every column fits within the row count (strict mode only)
    pub fn check_invariants(&self) {
        if !self.strict {
            return;
        }
        for column in &self.columns {
            assert!(
                column.data.len() <= self.row_count,
                "column '{}' holds {} rows, buffer row count is {}",
                column.name,
                column.data.len(),
                self.row_count
            );
        }
    }

    fn find(&self, name: &str) -> Option<&Column> {
        self.index.get(name).map(|position| &self.columns[*position])
    }

    fn data_mut(&mut self, name: &str) -> &mut ColumnData {
        match self.index.get(name) {
            Some(position) => &mut self.columns[*position].data,
            None => panic!("column '{name}' not found"),
        }
    }

    fn check_row(&self, name: &str, row: usize) {
        assert!(
            row < self.row_count,
            "row {row} out of range for column '{name}' (row count {})",
            self.row_count
        );
    }
}
