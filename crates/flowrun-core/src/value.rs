//! Value types carried by dataset channels.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Declared element type of a dataset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    /// Opaque byte strings.
    #[default]
    Bytes,
    /// UTF-8 text.
    Text,
    /// Signed 64-bit integers.
    Int64,
    /// 64-bit floats.
    Float64,
    /// Booleans.
    Bool,
    /// Arbitrary JSON documents.
    Json,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bytes => "bytes",
            Self::Text => "text",
            Self::Int64 => "int64",
            Self::Float64 => "float64",
            Self::Bool => "bool",
            Self::Json => "json",
        };
        f.write_str(name)
    }
}

/// A single record flowing between stages.
#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    Bytes(Vec<u8>),
    Text(String),
    Int64(i64),
    Float64(f64),
    Bool(bool),
    Json(serde_json::Value),
}

impl Datum {
    /// The type tag of this value.
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Bytes(_) => ValueType::Bytes,
            Self::Text(_) => ValueType::Text,
            Self::Int64(_) => ValueType::Int64,
            Self::Float64(_) => ValueType::Float64,
            Self::Bool(_) => ValueType::Bool,
            Self::Json(_) => ValueType::Json,
        }
    }

    /// Borrow the text payload, if this is a text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get the integer payload, if this is an integer value.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int64(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<String> for Datum {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for Datum {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<i64> for Datum {
    fn from(v: i64) -> Self {
        Self::Int64(v)
    }
}

impl From<f64> for Datum {
    fn from(v: f64) -> Self {
        Self::Float64(v)
    }
}

impl From<bool> for Datum {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<Vec<u8>> for Datum {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<serde_json::Value> for Datum {
    fn from(v: serde_json::Value) -> Self {
        Self::Json(v)
    }
}
