//! Map query result rows into tagged structs, and structs back into
//! column/value sets.
//!
//! Structs are declared with [`record!`], naming their columns with
//! `#[sql = "..."]`:
//!
//! ```
//! use tagscan::{types::Value, MemoryRows, Scanner};
//!
//! tagscan::record! {
//!     #[derive(Debug, Default)]
//!     pub struct Post {
//!         #[sql = "f"]
//!         pub flag: bool,
//!         #[sql = "t"]
//!         pub text: String,
//!     }
//! }
//!
//! let mut rows = MemoryRows::new(["f", "t"]);
//! rows.push(vec![Value::Boolean(true), Value::from("hi")]);
//!
//! let mut scanner = Scanner::new(rows);
//! let mut post = Post::default();
//! while scanner.rows_mut().advance() {
//!     scanner.scan(&mut [&mut post]).unwrap();
//! }
//! assert!(post.flag);
//! assert_eq!(post.text, "hi");
//!
//! let values = tagscan::sql_values(&post, &["t"]).unwrap();
//! assert_eq!(values.get("f"), Some(&Value::Boolean(true)));
//! assert!(!values.contains_key("t"));
//! ```
pub use catalog::{FieldIndex, FieldIndexCache};
pub use query::error::{ConversionError, Error, Result};
pub use query::{error, types};
pub use query::{ColumnMetadata, Extractor, Scanner, ValueSet};
pub use record::{Assign, Field, FieldDef, FieldKind, FieldRef, Record, RecordType};
pub use rows::{CsvOptions, CsvRows, MemoryRows, Rows};

#[doc(hidden)]
pub use record::opaque_kind as __opaque_kind;

use types::ColumnName;

mod catalog;
mod query;
mod record;
pub mod rows;

/// Scan the current row of `rows` into `targets` in one go.
///
/// Resolves the columns on every call; keep a [`Scanner`] around to scan
/// more than one row.
pub fn scan<R: Rows>(rows: R, targets: &mut [&mut dyn Field]) -> Result<()> {
    Scanner::new(rows).scan(targets)
}

/// [`Extractor::sql_values`] on the global cache.
pub fn sql_values(value: &dyn Field, exclusions: &[&str]) -> Result<ValueSet> {
    Extractor::default().sql_values(value, exclusions)
}

/// [`Extractor::column_names`] on the global cache.
pub fn column_names(
    record_type: &'static RecordType,
    exclusions: &[&str],
) -> Result<Vec<ColumnName>> {
    Extractor::default().column_names(record_type, exclusions)
}
