//! Column dispatch macros
//!
//! Every operation over [`ColumnData`](crate::ColumnData) goes through these
//! macros, so each match lists every kind of the closed set. Adding a kind
//! without handling it everywhere fails to compile.

/// Run `$body` with `$col` bound to the typed column inside `$data`.
///
/// # Usage
/// ```ignore
/// let len = with_column!(&self.data, col => col.len());
/// ```
macro_rules! with_column {
    ($data:expr, $col:ident => $body:expr) => {
        match $data {
            $crate::ColumnData::Bool($col) => $body,
            $crate::ColumnData::I8($col) => $body,
            $crate::ColumnData::I16($col) => $body,
            $crate::ColumnData::I32($col) => $body,
            $crate::ColumnData::I64($col) => $body,
            $crate::ColumnData::U8($col) => $body,
            $crate::ColumnData::U16($col) => $body,
            $crate::ColumnData::U32($col) => $body,
            $crate::ColumnData::U64($col) => $body,
            $crate::ColumnData::F32($col) => $body,
            $crate::ColumnData::F64($col) => $body,
            $crate::ColumnData::Text($col) => $body,
        }
    };
}

/// Run `$body` with two typed columns of the same kind, or `$mismatch` when
/// the kinds differ.
macro_rules! with_column_pair {
    ($a:expr, $b:expr, $x:ident, $y:ident => $body:expr, else $mismatch:expr) => {
        match ($a, $b) {
            ($crate::ColumnData::Bool($x), $crate::ColumnData::Bool($y)) => $body,
            ($crate::ColumnData::I8($x), $crate::ColumnData::I8($y)) => $body,
            ($crate::ColumnData::I16($x), $crate::ColumnData::I16($y)) => $body,
            ($crate::ColumnData::I32($x), $crate::ColumnData::I32($y)) => $body,
            ($crate::ColumnData::I64($x), $crate::ColumnData::I64($y)) => $body,
            ($crate::ColumnData::U8($x), $crate::ColumnData::U8($y)) => $body,
            ($crate::ColumnData::U16($x), $crate::ColumnData::U16($y)) => $body,
            ($crate::ColumnData::U32($x), $crate::ColumnData::U32($y)) => $body,
            ($crate::ColumnData::U64($x), $crate::ColumnData::U64($y)) => $body,
            ($crate::ColumnData::F32($x), $crate::ColumnData::F32($y)) => $body,
            ($crate::ColumnData::F64($x), $crate::ColumnData::F64($y)) => $body,
            ($crate::ColumnData::Text($x), $crate::ColumnData::Text($y)) => $body,
            _ => $mismatch,
        }
    };
}

/// Implement [`Scalar`](crate::Scalar) for a primitive type.
///
/// `int` types order with `Ord`; `float` types use IEEE total ordering so
/// that NaN still sorts deterministically. The last argument selects the
/// JSON conversion family (`signed`, `unsigned`, `float`).
macro_rules! impl_scalar {
    (int $ty:ty, $variant:ident, $family:ident) => {
        impl_scalar!(@common $ty, $variant, $family, |a: &$ty, b: &$ty| Ord::cmp(a, b));
    };
    (float $ty:ty, $variant:ident) => {
        impl_scalar!(@common $ty, $variant, float, |a: &$ty, b: &$ty| a.total_cmp(b));
    };
    (@common $ty:ty, $variant:ident, $family:ident, $cmp:expr) => {
        impl $crate::Scalar for $ty {
            const KIND: $crate::DataKind = $crate::DataKind::$variant;

            fn wrap(column: $crate::TypedColumn<Self>) -> $crate::ColumnData {
                $crate::ColumnData::$variant(column)
            }

            fn peel(data: &$crate::ColumnData) -> Option<&$crate::TypedColumn<Self>> {
                match data {
                    $crate::ColumnData::$variant(column) => Some(column),
                    _ => None,
                }
            }

            fn peel_mut(data: &mut $crate::ColumnData) -> Option<&mut $crate::TypedColumn<Self>> {
                match data {
                    $crate::ColumnData::$variant(column) => Some(column),
                    _ => None,
                }
            }

            fn to_json(&self) -> serde_json::Value {
                serde_json::Value::from(*self)
            }

            fn from_json(value: &serde_json::Value) -> Option<Self> {
                $crate::kind::$family::<$ty>(value)
            }

            fn order(&self, other: &Self) -> std::cmp::Ordering {
                ($cmp)(self, other)
            }
        }
    };
}
