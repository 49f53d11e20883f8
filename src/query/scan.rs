use std::collections::{HashMap, HashSet};

use crate::{
    catalog::FieldIndexCache,
    record::{Assign, Field, Record, RecordType},
    rows::Rows,
};

use super::{
    error::{Error, Result},
    types::ColumnName,
};

/// Where a query column lands: which target record, which of its fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMetadata {
    pub record_index: usize,
    pub field_position: usize,
}

/// Scans the rows of one query into records.
///
/// The first call to [`Scanner::scan`] asks the row source for its columns
/// and binds each of them to a tagged field of the targets. Later calls reuse
/// that binding, so every call must pass records of the same types in the
/// same order. The row source is asked for its columns once, even when the
/// first binding fails. A scanner wraps a sequential cursor and is meant to be driven
/// by one caller at a time.
#[derive(Debug)]
pub struct Scanner<R> {
    rows: R,
    cache: FieldIndexCache,
    query_columns: Option<Vec<ColumnName>>,
    binding: Option<Binding>,
}

#[derive(Debug)]
struct Binding {
    record_types: Vec<&'static RecordType>,
    columns: Vec<ColumnMetadata>,
}

impl<R: Rows> Scanner<R> {
    pub fn new(rows: R) -> Self {
        Self::with_cache(rows, FieldIndexCache::global())
    }

    pub fn with_cache(rows: R, cache: FieldIndexCache) -> Self {
        Self {
            rows,
            cache,
            query_columns: None,
            binding: None,
        }
    }

    /// Scan the current row into `targets`.
    ///
    /// Each target must be a record, or a `Some` around one. Errors from the
    /// row source are returned as they are.
    pub fn scan(&mut self, targets: &mut [&mut dyn Field]) -> Result<()> {
        let mut records = to_records(targets)?;
        self.do_scan(&mut records)
    }

    /// Column bindings in query order; `None` until the first scan.
    pub fn columns(&self) -> Option<&[ColumnMetadata]> {
        self.binding.as_ref().map(|binding| binding.columns.as_slice())
    }

    /// Column names reported by the row source; `None` until the first scan.
    pub fn query_columns(&self) -> Option<&[ColumnName]> {
        self.query_columns.as_deref()
    }

    pub fn rows(&self) -> &R {
        &self.rows
    }

    pub fn rows_mut(&mut self) -> &mut R {
        &mut self.rows
    }

    pub fn into_rows(self) -> R {
        self.rows
    }

    fn do_scan(&mut self, records: &mut [&mut dyn Record]) -> Result<()> {
        let binding = match &mut self.binding {
            Some(binding) => {
                binding.check_targets(records)?;
                binding
            }
            slot @ None => {
                let columns = match self.query_columns.take() {
                    Some(columns) => columns,
                    None => fetch_columns(&mut self.rows)?,
                };
                let columns = self.query_columns.insert(columns);
                slot.insert(init(columns, &self.cache, records)?)
            }
        };
        let mut dest = new_dest(&binding.columns, records);
        self.rows.scan(&mut dest)?;
        Ok(())
    }
}

impl Binding {
    fn check_targets(&self, records: &[&mut dyn Record]) -> Result<()> {
        let same = self.record_types.len() == records.len()
            && self
                .record_types
                .iter()
                .zip(records.iter())
                .all(|(expected, record)| expected.type_id() == record.record_type().type_id());
        if same {
            Ok(())
        } else {
            Err(Error::TargetMismatch {
                expected: type_names(self.record_types.iter().copied()),
                given: type_names(records.iter().map(|record| record.record_type())),
            })
        }
    }
}

fn fetch_columns<R: Rows>(rows: &mut R) -> Result<Vec<ColumnName>> {
    let columns = rows.columns()?;
    Ok(columns.into_iter().map(ColumnName::from).collect())
}

fn init(
    columns: &[ColumnName],
    cache: &FieldIndexCache,
    records: &[&mut dyn Record],
) -> Result<Binding> {
    // a repeated column is an error whatever the targets look like
    let mut uniq = HashSet::with_capacity(columns.len());
    for column in columns {
        if !uniq.insert(column) {
            return Err(Error::DuplicateQueryColumn(column.clone()));
        }
    }

    let by_name = compute_metadata(cache, &uniq, records)?;
    let mut resolved = Vec::with_capacity(columns.len());
    for column in columns {
        match by_name.get(column) {
            None => return Err(Error::UnresolvedColumn(column.clone())),
            Some(metadata) => resolved.push(*metadata),
        }
    }

    tracing::debug!(
        columns = resolved.len(),
        records = records.len(),
        "resolved scan columns"
    );
    Ok(Binding {
        record_types: records.iter().map(|record| record.record_type()).collect(),
        columns: resolved,
    })
}

/// Metadata by column name for the tagged fields of all `records`, filtered
/// by the query's `columns`. A tag declared by two records is ambiguous even
/// when the query doesn't select it.
fn compute_metadata(
    cache: &FieldIndexCache,
    columns: &HashSet<&ColumnName>,
    records: &[&mut dyn Record],
) -> Result<HashMap<ColumnName, ColumnMetadata>> {
    let mut result = HashMap::with_capacity(columns.len());
    let mut owners: HashMap<ColumnName, &'static RecordType> = HashMap::new();

    for (record_index, record) in records.iter().enumerate() {
        let record_type = record.record_type();
        let index = cache.field_index(record_type)?;

        for (name, field_position) in index.iter() {
            if let Some(first) = owners.insert(name.clone(), record_type) {
                return Err(Error::AmbiguousTag {
                    tag: name.clone(),
                    first: first.name,
                    second: record_type.name,
                });
            }
            if !columns.contains(name) {
                continue;
            }
            result.insert(
                name.clone(),
                ColumnMetadata {
                    record_index,
                    field_position,
                },
            );
        }
    }

    Ok(result)
}

/// Destinations in query column order.
fn new_dest<'r>(
    columns: &[ColumnMetadata],
    records: &'r mut [&mut dyn Record],
) -> Vec<&'r mut dyn Assign> {
    let mut fields: Vec<Vec<Option<&mut dyn Assign>>> = records
        .iter_mut()
        .map(|record| record.fields_mut())
        .collect();

    // bindings are unique per (record, field) and were checked against these
    // record types, so every slot is taken exactly once
    columns
        .iter()
        .filter_map(|column| {
            fields
                .get_mut(column.record_index)
                .and_then(|record| record.get_mut(column.field_position))
                .and_then(Option::take)
        })
        .collect()
}

fn to_records<'a>(targets: &'a mut [&mut dyn Field]) -> Result<Vec<&'a mut dyn Record>> {
    targets
        .iter_mut()
        .map(|target| {
            let type_name = target.type_name();
            target
                .as_record_mut()
                .ok_or(Error::InvalidTarget(type_name))
        })
        .collect()
}

fn type_names<'a>(record_types: impl Iterator<Item = &'a RecordType>) -> String {
    record_types
        .map(|record_type| record_type.name)
        .collect::<Vec<_>>()
        .join(", ")
}
