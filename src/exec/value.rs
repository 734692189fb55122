use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};

/// A decoded cell value.
///
/// Serializes untagged: booleans and numbers as themselves, text as a string,
/// timestamps as RFC 3339 strings, bytes as lower-case hex and null as `null`.
#[derive(Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Bool(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    /// UTF-8 text, without NUL characters.
    Text(String),
    Timestamp(DateTime<Utc>),
    Bytes(#[serde(serialize_with = "serialize_hex")] Vec<u8>),
    /// The column is not set in the record, or its type is unknown.
    Null,
}

fn serialize_hex<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex::encode(bytes))
}

impl CellValue {
    /// Returns the canonical variant name.
    pub fn kind(&self) -> &'static str {
        match self {
            CellValue::Bool(_) => "bool",
            CellValue::Int16(_) => "int16",
            CellValue::Int32(_) => "int32",
            CellValue::Int64(_) => "int64",
            CellValue::Float32(_) => "float32",
            CellValue::Float64(_) => "float64",
            CellValue::Text(_) => "text",
            CellValue::Timestamp(_) => "timestamp",
            CellValue::Bytes(_) => "bytes",
            CellValue::Null => "null",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            CellValue::Timestamp(inner) => Some(*inner),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(inner) => Some(inner),
            _ => None,
        }
    }

    /// Returns the value as a 64-bit integer if it is any integer variant.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            CellValue::Int16(inner) => Some(inner.into()),
            CellValue::Int32(inner) => Some(inner.into()),
            CellValue::Int64(inner) => Some(inner),
            _ => None,
        }
    }
}

macro_rules! impl_from {
    ($($type:ty => $variant:ident),+) => {
        $(
            impl From<$type> for CellValue {
                fn from(value: $type) -> Self {
                    CellValue::$variant(value)
                }
            }
        )+
    };
}

impl_from![
    bool => Bool,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    f32 => Float32,
    f64 => Float64,
    String => Text,
    DateTime<Utc> => Timestamp,
    Vec<u8> => Bytes
];

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(CellValue::Null, Into::into)
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Bool(inner) => fmt::Display::fmt(inner, f),
            CellValue::Int16(inner) => fmt::Display::fmt(inner, f),
            CellValue::Int32(inner) => fmt::Display::fmt(inner, f),
            CellValue::Int64(inner) => fmt::Display::fmt(inner, f),
            CellValue::Float32(inner) => fmt::Display::fmt(inner, f),
            CellValue::Float64(inner) => fmt::Display::fmt(inner, f),
            CellValue::Text(inner) => fmt::Display::fmt(inner, f),
            CellValue::Timestamp(inner) => {
                f.write_str(&inner.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            CellValue::Bytes(inner) => f.write_str(&hex::encode(inner)),
            CellValue::Null => f.write_str("NULL"),
        }
    }
}

impl fmt::Debug for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Text(inner) => write!(f, "{inner:?}"),
            CellValue::Bytes(inner) => write!(f, "<bytes ({})>", inner.len()),
            other => write!(f, "{}({other})", other.kind()),
        }
    }
}
