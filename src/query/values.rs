use std::collections::{HashMap, HashSet};

use crate::{
    catalog::{FieldIndex, FieldIndexCache},
    record::{Field, FieldKind, FieldRef, Record, RecordType},
};

use super::{
    error::{Error, Result},
    types::{ColumnName, Value},
};

/// Column to value, as extracted from one record.
pub type ValueSet = HashMap<ColumnName, Value>;

/// Flattens records into column/value sets.
#[derive(Debug, Clone)]
pub struct Extractor {
    cache: FieldIndexCache,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new(FieldIndexCache::global())
    }
}

impl Extractor {
    pub fn new(cache: FieldIndexCache) -> Self {
        Self { cache }
    }

    /// Values of every tagged column of `value`, nested records included,
    /// minus the `exclusions`.
    ///
    /// `value` must be a record or an `Option` holding one. A `None` nested
    /// record still contributes its columns, all `Null`, so the result always
    /// has the same keys for a given type and exclusion list.
    pub fn sql_values(&self, value: &dyn Field, exclusions: &[&str]) -> Result<ValueSet> {
        let FieldRef::Record(record) = value.get() else {
            return Err(Error::NotARecord(value.type_name()));
        };
        let root = record.record_type();
        tracing::trace!(record = root.name, "extracting sql values");

        let mut collector = ValueCollector::new(&self.cache, root, exclusions, false);
        collector.walk_value(record)?;
        Ok(collector.values)
    }

    /// Tagged columns of `record_type` in declaration order, flattened the
    /// same way [`Extractor::sql_values`] flattens values.
    pub fn column_names(
        &self,
        record_type: &'static RecordType,
        exclusions: &[&str],
    ) -> Result<Vec<ColumnName>> {
        let mut collector = ValueCollector::new(&self.cache, record_type, exclusions, true);
        collector.walk_type(record_type)?;
        Ok(collector.order.unwrap_or_default())
    }
}

struct ValueCollector<'a> {
    cache: &'a FieldIndexCache,
    root: &'static RecordType,
    exclusions: HashSet<&'a str>,
    values: ValueSet,
    // declaration order, only kept for column_names
    order: Option<Vec<ColumnName>>,
}

impl<'a> ValueCollector<'a> {
    fn new(
        cache: &'a FieldIndexCache,
        root: &'static RecordType,
        exclusions: &[&'a str],
        keep_order: bool,
    ) -> Self {
        Self {
            cache,
            root,
            exclusions: exclusions.iter().copied().collect(),
            values: HashMap::new(),
            order: keep_order.then(Vec::new),
        }
    }

    /// Walk a live record.
    fn walk_value(&mut self, record: &dyn Record) -> Result<()> {
        let record_type = record.record_type();
        let index = self.cache.field_index(record_type)?;

        for (position, field) in record.fields().into_iter().enumerate() {
            match field {
                FieldRef::Record(nested) => self.walk_value(nested)?,
                FieldRef::Value(value) => self.add(&index, position, value)?,
                FieldRef::Absent => match record_type.field(position).map(|def| def.kind()) {
                    Some(FieldKind::Record(nested)) => self.walk_type(nested)?,
                    Some(FieldKind::Leaf(_)) => self.add(&index, position, Value::Null)?,
                    Some(FieldKind::Opaque) | None => {}
                },
                FieldRef::Opaque => {}
            }
        }
        Ok(())
    }

    /// Walk a record that isn't there: every leaf below it is `Null`.
    fn walk_type(&mut self, record_type: &'static RecordType) -> Result<()> {
        let index = self.cache.field_index(record_type)?;

        for (position, field) in record_type.fields.iter().enumerate() {
            match field.kind() {
                FieldKind::Record(nested) => self.walk_type(nested)?,
                FieldKind::Leaf(_) => self.add(&index, position, Value::Null)?,
                FieldKind::Opaque => {}
            }
        }
        Ok(())
    }

    fn add(&mut self, index: &FieldIndex, position: usize, value: Value) -> Result<()> {
        let Some(column) = index.column_at(position) else {
            return Ok(());
        };
        if self.exclusions.contains(column.as_str()) {
            return Ok(());
        }
        if self.values.contains_key(column) {
            return Err(Error::DuplicateColumn {
                column: column.clone(),
                record: self.root.name,
            });
        }
        if let Some(order) = &mut self.order {
            order.push(column.clone());
        }
        self.values.insert(column.clone(), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use serde_json::json;

    use super::*;

    crate::record! {
        #[derive(Default)]
        struct Flat {
            #[sql = "bool"]
            flag: bool,
            #[sql = "data"]
            bytes: Vec<u8>,
            count: i32,
            #[sql = "string"]
            text: String,
        }
    }

    crate::record! {
        #[derive(Default)]
        struct Nested {
            #[sql = "mainBool"]
            main_flag: bool,
            main_count: i32,
            #[sql = "mainString"]
            main_text: String,
            nested: Flat,
            #[sql = "reader"]
            reader: Option<Box<dyn Read + Send>>,
        }
    }

    crate::record! {
        #[derive(Default)]
        struct NestedPointer {
            #[sql = "mainBool"]
            main_flag: bool,
            #[sql = "mainString"]
            main_text: String,
            pointer: Option<Flat>,
        }
    }

    crate::record! {
        #[derive(Default)]
        struct Deep {
            #[sql = "top"]
            top: u8,
            middle: Option<NestedPointer>,
        }
    }

    crate::record! {
        #[derive(Default)]
        struct Clashing {
            #[sql = "bool"]
            flag: bool,
            nested: Flat,
        }
    }

    crate::record! {
        #[derive(Default)]
        struct Dynamic {
            #[sql = "any"]
            any: Value,
            #[sql = "maybe"]
            maybe: Option<i64>,
            #[sql = "ratio"]
            ratio: f32,
        }
    }

    crate::record! {
        #[derive(Default)]
        struct WithExtras {
            #[sql = "a"]
            a: bool,
            #[sql(skip)]
            labels: Vec<String>,
            #[sql(skip)]
            meta: HashMap<String, String>,
            #[sql(skip)]
            shared: Option<std::sync::Arc<Flat>>,
            boxed: Option<Box<Flat>>,
        }
    }

    fn extract(value: &dyn Field, exclusions: &[&str]) -> Result<serde_json::Value> {
        let values = Extractor::new(FieldIndexCache::new()).sql_values(value, exclusions)?;
        Ok(serde_json::to_value(values).expect("value sets serialize"))
    }

    fn flat_zero() -> serde_json::Value {
        json!({"bool": false, "data": [], "string": ""})
    }

    #[test]
    fn test_flat_record() -> anyhow::Result<()> {
        assert_eq!(extract(&Flat::default(), &[])?, flat_zero());
        assert_eq!(extract(&Some(Flat::default()), &[])?, flat_zero());
        Ok(())
    }

    #[test]
    fn test_nested_record() -> anyhow::Result<()> {
        let expected = json!({
            "mainBool": false,
            "mainString": "",
            "bool": false,
            "data": [],
            "string": "",
        });
        assert_eq!(extract(&Nested::default(), &[])?, expected);
        assert_eq!(extract(&Some(Nested::default()), &[])?, expected);
        Ok(())
    }

    #[test]
    fn test_absent_nested_record_yields_nulls() -> anyhow::Result<()> {
        let expected = json!({
            "mainBool": false,
            "mainString": "",
            "bool": null,
            "data": null,
            "string": null,
        });
        assert_eq!(extract(&NestedPointer::default(), &[])?, expected);

        let present = NestedPointer {
            pointer: Some(Flat::default()),
            ..NestedPointer::default()
        };
        assert_eq!(
            extract(&present, &[])?,
            json!({
                "mainBool": false,
                "mainString": "",
                "bool": false,
                "data": [],
                "string": "",
            })
        );
        Ok(())
    }

    #[test]
    fn test_absent_chain_is_null_all_the_way_down() -> anyhow::Result<()> {
        let values = Extractor::new(FieldIndexCache::new()).sql_values(&Deep::default(), &[])?;
        assert_eq!(values.len(), 6);
        assert_eq!(values.get("top"), Some(&Value::Integer(0)));
        for column in ["mainBool", "mainString", "bool", "data", "string"] {
            assert_eq!(values.get(column), Some(&Value::Null), "{}", column);
        }

        // present middle, absent pointer below it
        let deep = Deep {
            top: 1,
            middle: Some(NestedPointer::default()),
        };
        let values = Extractor::new(FieldIndexCache::new()).sql_values(&deep, &[])?;
        assert_eq!(values.get("mainBool"), Some(&Value::Boolean(false)));
        assert_eq!(values.get("bool"), Some(&Value::Null));
        Ok(())
    }

    #[test]
    fn test_exclusions() -> anyhow::Result<()> {
        let expected = json!({"mainBool": false, "bool": false, "string": ""});
        assert_eq!(
            extract(&Nested::default(), &["data", "mainString"])?,
            expected
        );
        assert_eq!(
            extract(&Some(Nested::default()), &["data", "mainString"])?,
            expected
        );
        // unknown exclusions are ignored
        assert_eq!(extract(&Flat::default(), &["nope"])?, flat_zero());
        Ok(())
    }

    #[test]
    fn test_exclusion_avoids_duplicate() -> anyhow::Result<()> {
        assert!(extract(&Clashing::default(), &[]).is_err());
        assert_eq!(
            extract(&Clashing::default(), &["bool"])?,
            json!({"data": [], "string": ""})
        );
        Ok(())
    }

    #[test]
    fn test_duplicate_column_across_nested_records() {
        let err = Extractor::new(FieldIndexCache::new())
            .sql_values(&Clashing::default(), &[])
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "duplicate column \"bool\" in record Clashing"
        );
    }

    #[test]
    fn test_not_a_record() {
        let extractor = Extractor::new(FieldIndexCache::new());
        let err = extractor.sql_values(&42i32, &[]).unwrap_err();
        assert_eq!(err.to_string(), "failed to find a record in i32");
        let err = extractor.sql_values(&None::<Flat>, &[]).unwrap_err();
        assert!(matches!(err, Error::NotARecord(_)));
    }

    #[test]
    fn test_current_values() -> anyhow::Result<()> {
        let flat = Flat {
            flag: true,
            bytes: b"abc".to_vec(),
            count: 3,
            text: "hi".to_string(),
        };
        let values = Extractor::default().sql_values(&flat, &[])?;
        assert_eq!(values.len(), 3);
        assert_eq!(values.get("bool"), Some(&Value::Boolean(true)));
        assert_eq!(values.get("data"), Some(&Value::Bytes(b"abc".to_vec())));
        assert_eq!(values.get("string"), Some(&Value::from("hi")));
        assert_eq!(values.get("count"), None);
        Ok(())
    }

    #[test]
    fn test_dynamic_and_optional_leaves() -> anyhow::Result<()> {
        let record = Dynamic {
            any: Value::from("x"),
            maybe: None,
            ratio: 0.5,
        };
        assert_eq!(
            extract(&record, &[])?,
            json!({"any": "x", "maybe": null, "ratio": 0.5})
        );
        Ok(())
    }

    #[test]
    fn test_skipped_and_boxed_fields() -> anyhow::Result<()> {
        let mut record = WithExtras {
            a: true,
            labels: vec!["x".to_string()],
            ..WithExtras::default()
        };
        record.meta.insert("k".to_string(), "v".to_string());
        assert_eq!(
            extract(&record, &[])?,
            json!({"a": true, "bool": null, "data": null, "string": null})
        );

        record.boxed = Some(Box::new(Flat {
            text: "boxed".to_string(),
            ..Flat::default()
        }));
        assert_eq!(
            extract(&record, &[])?,
            json!({"a": true, "bool": false, "data": [], "string": "boxed"})
        );
        assert_eq!(extract(&Box::new(Flat::default()), &[])?, flat_zero());

        let names = Extractor::new(FieldIndexCache::new())
            .column_names(WithExtras::descriptor(), &[])?;
        assert_eq!(names, vec!["a", "bool", "data", "string"]);
        Ok(())
    }

    #[test]
    fn test_column_names() -> anyhow::Result<()> {
        let extractor = Extractor::new(FieldIndexCache::new());
        let names = extractor.column_names(Nested::descriptor(), &["data"])?;
        assert_eq!(names, vec!["mainBool", "mainString", "bool", "string"]);
        let names = extractor.column_names(Deep::descriptor(), &[])?;
        assert_eq!(
            names,
            vec!["top", "mainBool", "mainString", "bool", "data", "string"]
        );
        Ok(())
    }

    #[test]
    fn test_repeated_extraction_is_stable() -> anyhow::Result<()> {
        let cache = FieldIndexCache::new();
        let extractor = Extractor::new(cache.clone());
        let first = extractor.sql_values(&NestedPointer::default(), &[])?;
        let cached = cache.len();
        let second = extractor.sql_values(&NestedPointer::default(), &[])?;
        assert_eq!(first, second);
        assert_eq!(cache.len(), cached);
        assert!(cache.contains(Flat::descriptor()));
        Ok(())
    }
}
