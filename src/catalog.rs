use std::{
    any::TypeId,
    collections::HashMap,
    sync::{Arc, OnceLock, PoisonError, RwLock},
};

use crate::{
    query::{
        error::{Error, Result},
        types::ColumnName,
    },
    record::RecordType,
};

static GLOBAL_CACHE: OnceLock<FieldIndexCache> = OnceLock::new();

/// Column name to field position for one record type.
///
/// Only tagged fields are indexed. Built once per type by the
/// [`FieldIndexCache`] and never changed afterwards.
#[derive(Debug)]
pub struct FieldIndex {
    record_type: &'static RecordType,
    by_name: HashMap<ColumnName, usize>,
    // same length as the record's field list; `None` for untagged fields
    by_position: Vec<Option<ColumnName>>,
}

impl FieldIndex {
    pub(crate) fn build(record_type: &'static RecordType) -> Result<Self> {
        let mut by_name = HashMap::with_capacity(record_type.fields.len());
        let mut by_position = Vec::with_capacity(record_type.fields.len());
        for (position, field) in record_type.fields.iter().enumerate() {
            let column = field.sql_name().map(ColumnName::new);
            if let Some(column) = &column {
                if by_name.insert(column.clone(), position).is_some() {
                    return Err(Error::DuplicateTag {
                        tag: column.clone(),
                        record: record_type.name,
                    });
                }
            }
            by_position.push(column);
        }
        Ok(Self {
            record_type,
            by_name,
            by_position,
        })
    }

    pub fn record_type(&self) -> &'static RecordType {
        self.record_type
    }

    /// Position of the field tagged with `column`.
    pub fn get(&self, column: &str) -> Option<usize> {
        self.by_name.get(column).copied()
    }

    /// Column of the field at `position`, if that field is tagged.
    pub fn column_at(&self, position: usize) -> Option<&ColumnName> {
        self.by_position.get(position).and_then(Option::as_ref)
    }

    /// Tagged fields in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&ColumnName, usize)> {
        self.by_position
            .iter()
            .enumerate()
            .filter_map(|(position, column)| column.as_ref().map(|column| (column, position)))
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

/// Memoized [`FieldIndex`] per record type.
///
/// Entries are built lazily on first use and kept for as long as the cache
/// lives; a record type's layout can't change at runtime, so nothing is ever
/// evicted. Cloning gives another handle to the same entries.
///
/// Two threads missing on the same type may both build the index; the first
/// one stored wins and both get it back.
#[derive(Debug, Clone, Default)]
pub struct FieldIndexCache {
    indexes: Arc<RwLock<HashMap<TypeId, Arc<FieldIndex>>>>,
}

impl FieldIndexCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide cache used by [`Scanner::new`](crate::Scanner::new)
    /// and [`sql_values`](crate::sql_values).
    pub fn global() -> Self {
        GLOBAL_CACHE.get_or_init(FieldIndexCache::new).clone()
    }

    pub fn field_index(&self, record_type: &'static RecordType) -> Result<Arc<FieldIndex>> {
        let type_id = record_type.type_id();
        if let Some(index) = self.lookup(&type_id) {
            return Ok(index);
        }

        // built without holding the lock
        let index = Arc::new(FieldIndex::build(record_type)?);
        tracing::debug!(
            record = record_type.name,
            columns = index.len(),
            "built field index"
        );

        let mut indexes = self
            .indexes
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(indexes.entry(type_id).or_insert(index)))
    }

    pub fn contains(&self, record_type: &RecordType) -> bool {
        self.lookup(&record_type.type_id()).is_some()
    }

    pub fn len(&self) -> usize {
        self.indexes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup(&self, type_id: &TypeId) -> Option<Arc<FieldIndex>> {
        self.indexes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(type_id)
            .cloned()
    }
}
