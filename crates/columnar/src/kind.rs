//! Scalar kinds
//!
//! The closed set of value kinds a column may hold, and the [`Scalar`]
//! capability each concrete Rust type implements for its kind.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::column::{ColumnData, TypedColumn};
use crate::error::BufferError;

/// Column value kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataKind {
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Text,
}

impl DataKind {
    /// Every kind, in declaration order
    pub const ALL: [DataKind; 12] = [
        DataKind::Bool,
        DataKind::I8,
        DataKind::I16,
        DataKind::I32,
        DataKind::I64,
        DataKind::U8,
        DataKind::U16,
        DataKind::U32,
        DataKind::U64,
        DataKind::F32,
        DataKind::F64,
        DataKind::Text,
    ];

    /// Canonical lowercase name (matches the serde representation)
    pub fn as_str(self) -> &'static str {
        match self {
            DataKind::Bool => "bool",
            DataKind::I8 => "i8",
            DataKind::I16 => "i16",
            DataKind::I32 => "i32",
            DataKind::I64 => "i64",
            DataKind::U8 => "u8",
            DataKind::U16 => "u16",
            DataKind::U32 => "u32",
            DataKind::U64 => "u64",
            DataKind::F32 => "f32",
            DataKind::F64 => "f64",
            DataKind::Text => "text",
        }
    }

    /// Whether values of this kind are numbers
    pub fn is_numeric(self) -> bool {
        !matches!(self, DataKind::Bool | DataKind::Text)
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataKind {
    type Err = BufferError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        let kind = match lowered.as_str() {
            "string" | "varchar" => DataKind::Text,
            "double" => DataKind::F64,
            "float" => DataKind::F32,
            "boolean" => DataKind::Bool,
            other => DataKind::ALL
                .into_iter()
                .find(|kind| kind.as_str() == other)
                .ok_or_else(|| BufferError::UnknownKind {
                    kind: s.to_string(),
                })?,
        };
        Ok(kind)
    }
}

/// A Rust type stored in one column kind.
///
/// Implemented exactly once per [`DataKind`]; the buffer algorithms are
/// written generically against this trait.
pub trait Scalar: Clone + Default + fmt::Debug + PartialEq + Send + Sync + 'static {
    /// Kind tag of columns holding this type
    const KIND: DataKind;

    /// Wrap a typed column into the closed column enum
    fn wrap(column: TypedColumn<Self>) -> ColumnData;

    /// Borrow the typed column if `data` holds this kind
    fn peel(data: &ColumnData) -> Option<&TypedColumn<Self>>;

    /// Mutably borrow the typed column if `data` holds this kind
    fn peel_mut(data: &mut ColumnData) -> Option<&mut TypedColumn<Self>>;

    /// Convert to a JSON value
    fn to_json(&self) -> Value;

    /// Convert from a JSON value, `None` if not representable
    fn from_json(value: &Value) -> Option<Self>;

    /// Total order used for sorting
    fn order(&self, other: &Self) -> Ordering;
}

impl_scalar!(int i8, I8, signed);
impl_scalar!(int i16, I16, signed);
impl_scalar!(int i32, I32, signed);
impl_scalar!(int i64, I64, signed);
impl_scalar!(int u8, U8, unsigned);
impl_scalar!(int u16, U16, unsigned);
impl_scalar!(int u32, U32, unsigned);
impl_scalar!(int u64, U64, unsigned);
impl_scalar!(float f32, F32);
impl_scalar!(float f64, F64);

impl Scalar for bool {
    const KIND: DataKind = DataKind::Bool;

    fn wrap(column: TypedColumn<Self>) -> ColumnData {
        ColumnData::Bool(column)
    }

    fn peel(data: &ColumnData) -> Option<&TypedColumn<Self>> {
        match data {
            ColumnData::Bool(column) => Some(column),
            _ => None,
        }
    }

    fn peel_mut(data: &mut ColumnData) -> Option<&mut TypedColumn<Self>> {
        match data {
            ColumnData::Bool(column) => Some(column),
            _ => None,
        }
    }

    fn to_json(&self) -> Value {
        Value::Bool(*self)
    }

    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => match n.as_i64() {
                Some(0) => Some(false),
                Some(1) => Some(true),
                _ => None,
            },
            Value::String(s) => match s.trim() {
                "true" | "1" => Some(true),
                "false" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    fn order(&self, other: &Self) -> Ordering {
        self.cmp(other)
    }
}

impl Scalar for String {
    const KIND: DataKind = DataKind::Text;

    fn wrap(column: TypedColumn<Self>) -> ColumnData {
        ColumnData::Text(column)
    }

    fn peel(data: &ColumnData) -> Option<&TypedColumn<Self>> {
        match data {
            ColumnData::Text(column) => Some(column),
            _ => None,
        }
    }

    fn peel_mut(data: &mut ColumnData) -> Option<&mut TypedColumn<Self>> {
        match data {
            ColumnData::Text(column) => Some(column),
            _ => None,
        }
    }

    fn to_json(&self) -> Value {
        Value::String(self.clone())
    }

    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    fn order(&self, other: &Self) -> Ordering {
        self.cmp(other)
    }
}

/// Float narrowing used by the JSON conversion of `f32`/`f64`
pub(crate) trait FromF64 {
    fn from_f64(value: f64) -> Self;
}

impl FromF64 for f32 {
    fn from_f64(value: f64) -> Self {
        value as f32
    }
}

impl FromF64 for f64 {
    fn from_f64(value: f64) -> Self {
        value
    }
}

fn integral_f64(n: &serde_json::Number) -> Option<f64> {
    n.as_f64().filter(|f| f.is_finite() && f.fract() == 0.0)
}

pub(crate) fn signed<T: TryFrom<i64>>(value: &Value) -> Option<T> {
    let wide = match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            integral_f64(n)
                .filter(|f| *f >= i64::MIN as f64 && *f <= i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }?;
    T::try_from(wide).ok()
}

pub(crate) fn unsigned<T: TryFrom<u64>>(value: &Value) -> Option<T> {
    let wide = match value {
        Value::Number(n) => n.as_u64().or_else(|| {
            integral_f64(n)
                .filter(|f| *f >= 0.0 && *f <= u64::MAX as f64)
                .map(|f| f as u64)
        }),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        Value::Bool(b) => Some(u64::from(*b)),
        _ => None,
    }?;
    T::try_from(wide).ok()
}

pub(crate) fn float<T: FromF64>(value: &Value) -> Option<T> {
    let wide = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }?;
    Some(T::from_f64(wide))
}
