use std::{borrow::Borrow, fmt::Display};

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// A single column value, as read from a row or extracted from a record.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Boolean(bool),
    Integer(i64),
    // only used for unsigned values that don't fit in an i64
    Unsigned(u64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Name of the variant, used in conversion errors.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean(_) => "boolean",
            Self::Integer(_) => "integer",
            Self::Unsigned(_) => "unsigned integer",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
        }
    }

    /// Read a raw textual cell. The null marker and empty cells are `Null`,
    /// everything else is kept as text and parsed on assignment.
    pub fn from_cell(cell: &str, null_marker: &str) -> Self {
        if cell.is_empty() || cell == null_marker {
            Self::Null
        } else {
            Self::Text(cell.to_string())
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Boolean(val) => write!(f, "{}", val),
            Self::Integer(val) => write!(f, "{}", val),
            Self::Unsigned(val) => write!(f, "{}", val),
            Self::Float(val) => write!(f, "{}", val),
            Self::Text(val) => write!(f, "{}", val),
            Self::Bytes(val) => write!(f, "{:?}", val),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// The column types a leaf field may have.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Boolean,
    Integer,
    Unsigned,
    Float,
    Text,
    Bytes,
    Dynamic,
}

impl Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Boolean => write!(f, "Boolean"),
            Self::Integer => write!(f, "Integer"),
            Self::Unsigned => write!(f, "Unsigned"),
            Self::Float => write!(f, "Float"),
            Self::Text => write!(f, "Text"),
            Self::Bytes => write!(f, "Bytes"),
            Self::Dynamic => write!(f, "Dynamic"),
        }
    }
}

// newtype structs..

#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
#[serde(into = "String")]
#[serde(from = "String")]
pub struct ColumnName(pub SmolStr);

impl From<&str> for ColumnName {
    fn from(value: &str) -> Self {
        ColumnName::new(value)
    }
}

impl From<String> for ColumnName {
    fn from(value: String) -> Self {
        ColumnName::new(&value)
    }
}

impl From<ColumnName> for String {
    fn from(val: ColumnName) -> Self {
        val.0.to_string()
    }
}

// SmolStr hashes as its str, so lookups by &str are consistent.
impl Borrow<str> for ColumnName {
    fn borrow(&self) -> &str {
        self.0.as_str()
    }
}

impl PartialEq<str> for ColumnName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for ColumnName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl ColumnName {
    pub fn new(value: &str) -> Self {
        Self(SmolStr::new(value))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}
