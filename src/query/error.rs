use thiserror;

use super::types::ColumnName;

/// Everything that can go wrong while resolving, scanning or extracting.
///
/// None of these are transient: they point at a mismatch between the records
/// and the query, so retrying won't help.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("expected a non-null reference to a record, got {0}")]
    InvalidTarget(&'static str),
    #[error("failed to find a record in {0}")]
    NotARecord(&'static str),
    #[error("duplicate column \"{0}\" in query")]
    DuplicateQueryColumn(ColumnName),
    #[error("unresolved column \"{0}\": no sql tag matches it")]
    UnresolvedColumn(ColumnName),
    #[error("duplicate sql tag \"{tag}\" in {record}")]
    DuplicateTag {
        tag: ColumnName,
        record: &'static str,
    },
    #[error("duplicate sql tag \"{tag}\" between records {first} and {second}")]
    AmbiguousTag {
        tag: ColumnName,
        first: &'static str,
        second: &'static str,
    },
    #[error("duplicate column \"{column}\" in record {record}")]
    DuplicateColumn {
        column: ColumnName,
        record: &'static str,
    },
    #[error("scanner was initialized for records [{expected}], got [{given}]")]
    TargetMismatch { expected: String, given: String },
    #[error(transparent)]
    Rows(#[from] anyhow::Error),
}

/// Failure to convert a scanned [`Value`](super::types::Value) into a field.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ConversionError {
    #[error("cannot scan {given} into {target}")]
    Unsupported {
        target: &'static str,
        given: &'static str,
    },
    #[error("value {value} is out of range for {target}")]
    OutOfRange { target: &'static str, value: String },
    #[error("cannot parse {value:?} as {target}")]
    Parse { target: &'static str, value: String },
    #[error("invalid UTF-8 in bytes scanned into {target}")]
    InvalidUtf8 { target: &'static str },
}

pub type Result<T> = std::result::Result<T, Error>;
