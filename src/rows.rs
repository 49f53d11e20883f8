//! Row sources: the cursor side of a query.
//!
//! The scanner only needs two things from a cursor: the result column names
//! and a way to write the current row into a list of destinations. Database
//! drivers implement [`Rows`] for their own cursors; [`MemoryRows`] and
//! [`CsvRows`] are small sources for tests and flat files.
use std::{collections::VecDeque, fs::File, io, path::Path};

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use crate::{query::types::Value, record::Assign};

pub trait Rows {
    /// Result column names, in order.
    fn columns(&mut self) -> anyhow::Result<Vec<String>>;

    /// Write the current row into `dest`, one destination per column.
    fn scan(&mut self, dest: &mut [&mut dyn Assign]) -> anyhow::Result<()>;
}

impl<R: Rows + ?Sized> Rows for &mut R {
    fn columns(&mut self) -> anyhow::Result<Vec<String>> {
        (**self).columns()
    }

    fn scan(&mut self, dest: &mut [&mut dyn Assign]) -> anyhow::Result<()> {
        (**self).scan(dest)
    }
}

/// Rows held in memory. Call [`MemoryRows::advance`] before each scan.
#[derive(Debug, Clone, Default)]
pub struct MemoryRows {
    columns: Vec<String>,
    pending: VecDeque<Vec<Value>>,
    current: Option<Vec<Value>>,
}

impl MemoryRows {
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            pending: VecDeque::new(),
            current: None,
        }
    }

    pub fn push(&mut self, row: Vec<Value>) -> &mut Self {
        self.pending.push_back(row);
        self
    }

    /// Move to the next row. Returns false once the rows are exhausted.
    pub fn advance(&mut self) -> bool {
        self.current = self.pending.pop_front();
        self.current.is_some()
    }
}

impl Rows for MemoryRows {
    fn columns(&mut self) -> anyhow::Result<Vec<String>> {
        Ok(self.columns.clone())
    }

    fn scan(&mut self, dest: &mut [&mut dyn Assign]) -> anyhow::Result<()> {
        assign_row(&self.columns, self.current.as_deref(), dest)
    }
}

/// How [`CsvRows`] reads its input.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvOptions {
    pub delimiter: char,
    /// Cells equal to this are null. Empty cells are always null.
    pub null_marker: String,
    pub trim: bool,
}

impl CsvOptions {
    /// Load options from a JSON file. Missing keys keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("CsvOptions: Unable to open file: {}", path.display()))?;
        let reader = io::BufReader::new(file);
        serde_json::from_reader(reader).with_context(|| "Unable to parse JSON")
    }
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: ',',
            null_marker: "NULL".to_string(),
            trim: true,
        }
    }
}

/// Rows read from a CSV document whose first line holds the column names.
///
/// Cells are handed to the destinations as text (or null) and converted by
/// the destination field, so `"42"` scans into an `i32` and a `String` alike.
pub struct CsvRows<R> {
    reader: csv::Reader<R>,
    columns: Vec<String>,
    null_marker: String,
    record: csv::StringRecord,
    current: Option<Vec<Value>>,
}

impl CsvRows<File> {
    pub fn from_path(path: impl AsRef<Path>, options: CsvOptions) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("CsvRows: Unable to open file: {}", path.display()))?;
        Self::from_reader(file, options)
    }
}

impl<R: io::Read> CsvRows<R> {
    pub fn from_reader(reader: R, options: CsvOptions) -> anyhow::Result<Self> {
        if !options.delimiter.is_ascii() {
            bail!(
                "CSV delimiter must be an ASCII character, got {:?}",
                options.delimiter
            );
        }
        let trim = if options.trim {
            csv::Trim::All
        } else {
            csv::Trim::None
        };
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(options.delimiter as u8)
            .trim(trim)
            .has_headers(true)
            .from_reader(reader);
        let columns = reader
            .headers()
            .with_context(|| "Unable to read CSV header")?
            .iter()
            .map(str::to_string)
            .collect();
        Ok(Self {
            reader,
            columns,
            null_marker: options.null_marker,
            record: csv::StringRecord::new(),
            current: None,
        })
    }

    /// Move to the next row. Returns false at the end of the input.
    pub fn advance(&mut self) -> anyhow::Result<bool> {
        if !self.reader.read_record(&mut self.record)? {
            self.current = None;
            return Ok(false);
        }
        let row = self
            .record
            .iter()
            .map(|cell| Value::from_cell(cell, &self.null_marker))
            .collect();
        self.current = Some(row);
        Ok(true)
    }
}

impl<R: io::Read> Rows for CsvRows<R> {
    fn columns(&mut self) -> anyhow::Result<Vec<String>> {
        Ok(self.columns.clone())
    }

    fn scan(&mut self, dest: &mut [&mut dyn Assign]) -> anyhow::Result<()> {
        assign_row(&self.columns, self.current.as_deref(), dest)
    }
}

fn assign_row(
    columns: &[String],
    row: Option<&[Value]>,
    dest: &mut [&mut dyn Assign],
) -> anyhow::Result<()> {
    let Some(row) = row else {
        bail!("scan called without a current row");
    };
    if row.len() != dest.len() {
        bail!(
            "expected {} destination arguments in scan, not {}",
            row.len(),
            dest.len()
        );
    }
    for (idx, (target, value)) in dest.iter_mut().zip(row).enumerate() {
        target.assign(value.clone()).with_context(|| {
            let column = columns.get(idx).map_or("?", String::as_str);
            format!("converting column \"{}\"", column)
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_memory_rows() -> anyhow::Result<()> {
        let mut rows = MemoryRows::new(["id", "name"]);
        rows.push(vec![Value::Integer(1), Value::from("a")])
            .push(vec![Value::Integer(2), Value::Null]);
        assert_eq!(rows.columns()?, vec!["id", "name"]);

        let mut id = 0u32;
        let mut name: Option<String> = None;

        assert!(rows.advance());
        rows.scan(&mut [&mut id, &mut name])?;
        assert_eq!((id, name.as_deref()), (1, Some("a")));

        assert!(rows.advance());
        rows.scan(&mut [&mut id, &mut name])?;
        assert_eq!((id, name.as_deref()), (2, None));

        assert!(!rows.advance());
        assert!(rows.scan(&mut [&mut id, &mut name]).is_err());
        Ok(())
    }

    #[test]
    fn test_memory_rows_destination_count() {
        let mut rows = MemoryRows::new(["id", "name"]);
        rows.push(vec![Value::Integer(1), Value::from("a")]);
        rows.advance();
        let mut id = 0i64;
        let err = rows.scan(&mut [&mut id]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "expected 2 destination arguments in scan, not 1"
        );
    }

    #[test]
    fn test_conversion_error_names_column() {
        let mut rows = MemoryRows::new(["id"]);
        rows.push(vec![Value::from("abc")]);
        rows.advance();
        let mut id = 0i64;
        let err = rows.scan(&mut [&mut id]).unwrap_err();
        assert_eq!(err.to_string(), "converting column \"id\"");
        assert_eq!(
            err.root_cause().to_string(),
            "cannot parse \"abc\" as i64"
        );
    }

    #[test]
    fn test_csv_rows() -> anyhow::Result<()> {
        let data = "id, name , score\n1, ada, 1.5\n2, NULL,\n";
        let mut rows = CsvRows::from_reader(data.as_bytes(), CsvOptions::default())?;
        assert_eq!(rows.columns()?, vec!["id", "name", "score"]);

        let mut id = 0i32;
        let mut name: Option<String> = None;
        let mut score: Option<f64> = None;

        assert!(rows.advance()?);
        rows.scan(&mut [&mut id, &mut name, &mut score])?;
        assert_eq!(id, 1);
        assert_eq!(name.as_deref(), Some("ada"));
        assert_eq!(score, Some(1.5));

        assert!(rows.advance()?);
        rows.scan(&mut [&mut id, &mut name, &mut score])?;
        assert_eq!(id, 2);
        assert_eq!(name, None);
        assert_eq!(score, None);

        assert!(!rows.advance()?);
        Ok(())
    }

    #[test]
    fn test_csv_options_from_json() -> anyhow::Result<()> {
        let options: CsvOptions = serde_json::from_value(json!({
            "delimiter": ";",
            "null_marker": "\\N",
        }))?;
        assert_eq!(options.delimiter, ';');
        assert!(options.trim);

        let mut rows = CsvRows::from_reader("a;b\n\\N;NULL\n".as_bytes(), options)?;
        assert!(rows.advance()?);
        let mut a: Option<String> = None;
        let mut b: Option<String> = None;
        rows.scan(&mut [&mut a, &mut b])?;
        assert_eq!(a, None);
        assert_eq!(b.as_deref(), Some("NULL"));
        Ok(())
    }

    #[test]
    fn test_csv_rejects_non_ascii_delimiter() {
        let options = CsvOptions {
            delimiter: '§',
            ..CsvOptions::default()
        };
        assert!(CsvRows::from_reader("a\n".as_bytes(), options).is_err());
    }

    #[test]
    fn test_csv_from_missing_path() {
        let err = CsvRows::from_path("/definitely/not/here.csv", CsvOptions::default())
            .err()
            .map(|err| err.to_string());
        assert_eq!(
            err.as_deref(),
            Some("CsvRows: Unable to open file: /definitely/not/here.csv")
        );
    }
}
