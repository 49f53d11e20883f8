//! Describing records to the scanner and the extractor.
//!
//! There's no runtime reflection in Rust, so a struct opts in by being
//! declared through [`record!`](crate::record). The macro keeps the struct as
//! written and generates a static [`RecordType`] plus the accessors both
//! pipelines need: read access to every field and every field as a scan
//! destination.
use std::{
    any::TypeId,
    io::Read,
    sync::mpsc::{Receiver, Sender},
};

use smol_str::SmolStr;

use crate::query::{
    error::ConversionError,
    types::{Value, ValueKind},
};

/// Static description of a registered struct.
#[derive(Debug)]
pub struct RecordType {
    pub name: &'static str,
    pub type_id: fn() -> TypeId,
    /// In declaration order; a field's position is its index here.
    pub fields: &'static [FieldDef],
}

impl RecordType {
    pub fn type_id(&self) -> TypeId {
        (self.type_id)()
    }

    pub fn field(&self, position: usize) -> Option<&FieldDef> {
        self.fields.get(position)
    }
}

#[derive(Debug)]
pub struct FieldDef {
    pub name: &'static str,
    /// Value of the `#[sql = "..."]` annotation, if any.
    pub tag: Option<&'static str>,
    pub kind: fn() -> FieldKind,
}

impl FieldDef {
    /// The column this field maps to. Fields without a tag never take part
    /// in scanning or extraction.
    pub fn sql_name(&self) -> Option<&'static str> {
        self.tag
    }

    pub fn kind(&self) -> FieldKind {
        (self.kind)()
    }
}

#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    /// A column type: booleans, numbers, text, bytes or a dynamic [`Value`].
    Leaf(ValueKind),
    /// Another registered record; its columns are flattened into the parent.
    Record(&'static RecordType),
    /// Anything else. Never extracted.
    Opaque,
}

/// Current content of a field, as seen by the extractor.
pub enum FieldRef<'a> {
    Value(Value),
    Record(&'a dyn Record),
    /// A `None` reference. The field's kind says what would have been there.
    Absent,
    Opaque,
}

/// A type that can live in a record.
///
/// Implemented for the column types, `Option` of any field, a few opaque
/// types and every type declared with [`record!`](crate::record).
pub trait Field {
    fn kind() -> FieldKind
    where
        Self: Sized;

    fn get(&self) -> FieldRef<'_>;

    fn from_value(value: Value) -> Result<Self, ConversionError>
    where
        Self: Sized,
    {
        Err(ConversionError::Unsupported {
            target: std::any::type_name::<Self>(),
            given: value.kind_name(),
        })
    }

    /// The record behind this field, if there is one to write into.
    fn as_record_mut(&mut self) -> Option<&mut dyn Record> {
        None
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// A scan destination: something a row source can write a value into.
pub trait Assign {
    fn assign(&mut self, value: Value) -> Result<(), ConversionError>;
}

impl<T: Field> Assign for T {
    fn assign(&mut self, value: Value) -> Result<(), ConversionError> {
        *self = T::from_value(value)?;
        Ok(())
    }
}

/// Implemented by [`record!`](crate::record); not meant to be written by hand.
pub trait Record {
    fn descriptor() -> &'static RecordType
    where
        Self: Sized;

    fn record_type(&self) -> &'static RecordType;

    /// Every field, in declaration order.
    fn fields(&self) -> Vec<FieldRef<'_>>;

    /// Every field as a scan destination, in declaration order. Skipped
    /// fields have no destination.
    fn fields_mut(&mut self) -> Vec<Option<&mut dyn Assign>>;
}

/// Declare a struct whose fields map to query columns.
///
/// Columns are named with a `#[sql = "..."]` annotation, which may sit
/// anywhere among the field's other attributes. Untagged fields are ignored
/// by the scanner and the extractor, but their type must still implement
/// [`Field`] since nested records, directly or behind `Option` or `Box`, are
/// untagged and get flattened by the extractor. Fields of any other type are
/// marked `#[sql(skip)]`: they are opaque to both pipelines.
///
/// ```
/// use std::collections::HashMap;
///
/// tagscan::record! {
///     #[derive(Debug, Default)]
///     pub struct Author {
///         #[sql = "id"]
///         pub id: i64,
///         /// Display name.
///         #[sql = "name"]
///         pub name: String,
///         pub cached_rank: u32,
///         #[sql(skip)]
///         pub extra: HashMap<String, String>,
///     }
/// }
///
/// let values = tagscan::sql_values(&Author::default(), &[]).unwrap();
/// assert_eq!(values.len(), 2);
/// ```
#[macro_export]
macro_rules! record {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $($body:tt)*
        }
    ) => {
        $crate::__record_fields! {
            [$(#[$meta])*] [$vis] $name
            fields: []
            attrs: []
            tag: []
            rest: [$($body)*]
        }
    };
}

// Munches the struct body one attribute or field at a time, pulling the sql
// markers out of each field's attributes.
#[doc(hidden)]
#[macro_export]
macro_rules! __record_fields {
    (
        [$($meta:tt)*] [$($vis:tt)*] $name:ident
        fields: [$($fields:tt)*]
        attrs: [$($attrs:tt)*]
        tag: [$($tag:tt)*]
        rest: [#[sql = $column:literal] $($rest:tt)*]
    ) => {
        $crate::__record_fields! {
            [$($meta)*] [$($vis)*] $name
            fields: [$($fields)*]
            attrs: [$($attrs)*]
            tag: [$column]
            rest: [$($rest)*]
        }
    };
    (
        [$($meta:tt)*] [$($vis:tt)*] $name:ident
        fields: [$($fields:tt)*]
        attrs: [$($attrs:tt)*]
        tag: [$($tag:tt)*]
        rest: [#[sql(skip)] $($rest:tt)*]
    ) => {
        $crate::__record_fields! {
            [$($meta)*] [$($vis)*] $name
            fields: [$($fields)*]
            attrs: [$($attrs)*]
            tag: [skip]
            rest: [$($rest)*]
        }
    };
    (
        [$($meta:tt)*] [$($vis:tt)*] $name:ident
        fields: [$($fields:tt)*]
        attrs: [$($attrs:tt)*]
        tag: [$($tag:tt)*]
        rest: [#[$($attr:tt)*] $($rest:tt)*]
    ) => {
        $crate::__record_fields! {
            [$($meta)*] [$($vis)*] $name
            fields: [$($fields)*]
            attrs: [$($attrs)* #[$($attr)*]]
            tag: [$($tag)*]
            rest: [$($rest)*]
        }
    };
    (
        [$($meta:tt)*] [$($vis:tt)*] $name:ident
        fields: [$($fields:tt)*]
        attrs: [$($attrs:tt)*]
        tag: [$($tag:tt)*]
        rest: [$fvis:vis $field:ident : $fty:ty $(, $($rest:tt)*)?]
    ) => {
        $crate::__record_fields! {
            [$($meta)*] [$($vis)*] $name
            fields: [$($fields)* { [$($attrs)*] [$($tag)*] [$fvis] $field [$fty] }]
            attrs: []
            tag: []
            rest: [$($($rest)*)?]
        }
    };
    (
        [$($meta:tt)*] [$($vis:tt)*] $name:ident
        fields: [$({ [$($fattr:tt)*] [$($ftag:tt)*] [$($fvis:tt)*] $field:ident [$fty:ty] })*]
        attrs: []
        tag: []
        rest: []
    ) => {
        $($meta)*
        $($vis)* struct $name {
            $(
                $($fattr)*
                $($fvis)* $field: $fty,
            )*
        }

        impl $crate::Record for $name {
            fn descriptor() -> &'static $crate::RecordType {
                static RECORD_TYPE: $crate::RecordType = $crate::RecordType {
                    name: ::std::stringify!($name),
                    type_id: ::std::any::TypeId::of::<$name>,
                    fields: &[
                        $(
                            $crate::FieldDef {
                                name: ::std::stringify!($field),
                                tag: $crate::__sql_tag!($($ftag)*),
                                kind: $crate::__field_kind!([$($ftag)*] $fty),
                            },
                        )*
                    ],
                };
                &RECORD_TYPE
            }

            fn record_type(&self) -> &'static $crate::RecordType {
                <Self as $crate::Record>::descriptor()
            }

            fn fields(&self) -> ::std::vec::Vec<$crate::FieldRef<'_>> {
                ::std::vec![$( $crate::__field_get!([$($ftag)*] &self.$field) ),*]
            }

            fn fields_mut(
                &mut self,
            ) -> ::std::vec::Vec<::std::option::Option<&mut dyn $crate::Assign>> {
                ::std::vec![$( $crate::__field_dest!([$($ftag)*] &mut self.$field) ),*]
            }
        }

        impl $crate::Field for $name {
            fn kind() -> $crate::FieldKind {
                $crate::FieldKind::Record(<Self as $crate::Record>::descriptor())
            }

            fn get(&self) -> $crate::FieldRef<'_> {
                $crate::FieldRef::Record(self)
            }

            fn as_record_mut(&mut self) -> ::std::option::Option<&mut dyn $crate::Record> {
                ::std::option::Option::Some(self)
            }
        }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __sql_tag {
    () => {
        ::std::option::Option::None
    };
    (skip) => {
        ::std::option::Option::None
    };
    ($tag:literal) => {
        ::std::option::Option::Some($tag)
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __field_kind {
    ([skip] $fty:ty) => {
        $crate::__opaque_kind
    };
    ([$($tag:tt)*] $fty:ty) => {
        <$fty as $crate::Field>::kind
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __field_get {
    ([skip] $field:expr) => {
        $crate::FieldRef::Opaque
    };
    ([$($tag:tt)*] $field:expr) => {
        $crate::Field::get($field)
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __field_dest {
    ([skip] $field:expr) => {
        ::std::option::Option::None
    };
    ([$($tag:tt)*] $field:expr) => {
        ::std::option::Option::Some($field as &mut dyn $crate::Assign)
    };
}

#[doc(hidden)]
pub fn opaque_kind() -> FieldKind {
    FieldKind::Opaque
}

// conversions

fn unsupported(target: &'static str, value: &Value) -> ConversionError {
    ConversionError::Unsupported {
        target,
        given: value.kind_name(),
    }
}

fn out_of_range(target: &'static str, value: impl ToString) -> ConversionError {
    ConversionError::OutOfRange {
        target,
        value: value.to_string(),
    }
}

fn parse_error(target: &'static str, value: String) -> ConversionError {
    ConversionError::Parse { target, value }
}

fn to_i64(value: Value, target: &'static str) -> Result<i64, ConversionError> {
    match value {
        Value::Integer(val) => Ok(val),
        Value::Unsigned(val) => i64::try_from(val).map_err(|_| out_of_range(target, val)),
        Value::Text(val) => val.trim().parse().map_err(|_| parse_error(target, val)),
        other => Err(unsupported(target, &other)),
    }
}

fn to_u64(value: Value, target: &'static str) -> Result<u64, ConversionError> {
    match value {
        Value::Integer(val) => u64::try_from(val).map_err(|_| out_of_range(target, val)),
        Value::Unsigned(val) => Ok(val),
        Value::Text(val) => val.trim().parse().map_err(|_| parse_error(target, val)),
        other => Err(unsupported(target, &other)),
    }
}

macro_rules! signed_fields {
    ($($t:ty),+ $(,)?) => {$(
        impl Field for $t {
            fn kind() -> FieldKind {
                FieldKind::Leaf(ValueKind::Integer)
            }

            fn get(&self) -> FieldRef<'_> {
                FieldRef::Value(Value::Integer(*self as i64))
            }

            fn from_value(value: Value) -> Result<Self, ConversionError> {
                let target = std::any::type_name::<$t>();
                let int = to_i64(value, target)?;
                <$t>::try_from(int).map_err(|_| out_of_range(target, int))
            }
        }
    )+};
}

macro_rules! unsigned_fields {
    ($($t:ty),+ $(,)?) => {$(
        impl Field for $t {
            fn kind() -> FieldKind {
                FieldKind::Leaf(ValueKind::Unsigned)
            }

            fn get(&self) -> FieldRef<'_> {
                let value = i64::try_from(*self)
                    .map_or(Value::Unsigned(*self as u64), Value::Integer);
                FieldRef::Value(value)
            }

            fn from_value(value: Value) -> Result<Self, ConversionError> {
                let target = std::any::type_name::<$t>();
                let int = to_u64(value, target)?;
                <$t>::try_from(int).map_err(|_| out_of_range(target, int))
            }
        }
    )+};
}

macro_rules! float_fields {
    ($($t:ty),+ $(,)?) => {$(
        impl Field for $t {
            fn kind() -> FieldKind {
                FieldKind::Leaf(ValueKind::Float)
            }

            fn get(&self) -> FieldRef<'_> {
                FieldRef::Value(Value::Float(*self as f64))
            }

            fn from_value(value: Value) -> Result<Self, ConversionError> {
                let target = std::any::type_name::<$t>();
                match value {
                    Value::Float(val) => Ok(val as $t),
                    Value::Integer(val) => Ok(val as $t),
                    Value::Unsigned(val) => Ok(val as $t),
                    Value::Text(val) => val.trim().parse().map_err(|_| parse_error(target, val)),
                    other => Err(unsupported(target, &other)),
                }
            }
        }
    )+};
}

signed_fields!(i8, i16, i32, i64, isize);
unsigned_fields!(u8, u16, u32, u64, usize);
float_fields!(f32, f64);

impl Field for bool {
    fn kind() -> FieldKind {
        FieldKind::Leaf(ValueKind::Boolean)
    }

    fn get(&self) -> FieldRef<'_> {
        FieldRef::Value(Value::Boolean(*self))
    }

    fn from_value(value: Value) -> Result<Self, ConversionError> {
        let target = "bool";
        match value {
            Value::Boolean(val) => Ok(val),
            Value::Integer(0) | Value::Unsigned(0) => Ok(false),
            Value::Integer(1) | Value::Unsigned(1) => Ok(true),
            Value::Integer(val) => Err(out_of_range(target, val)),
            Value::Unsigned(val) => Err(out_of_range(target, val)),
            Value::Text(val) => match val.trim().to_ascii_lowercase().as_str() {
                "1" | "t" | "true" => Ok(true),
                "0" | "f" | "false" => Ok(false),
                _ => Err(parse_error(target, val)),
            },
            other => Err(unsupported(target, &other)),
        }
    }
}

impl Field for String {
    fn kind() -> FieldKind {
        FieldKind::Leaf(ValueKind::Text)
    }

    fn get(&self) -> FieldRef<'_> {
        FieldRef::Value(Value::Text(self.clone()))
    }

    fn from_value(value: Value) -> Result<Self, ConversionError> {
        let target = "String";
        match value {
            Value::Text(val) => Ok(val),
            Value::Bytes(val) => {
                String::from_utf8(val).map_err(|_| ConversionError::InvalidUtf8 { target })
            }
            Value::Boolean(val) => Ok(val.to_string()),
            Value::Integer(val) => Ok(val.to_string()),
            Value::Unsigned(val) => Ok(val.to_string()),
            Value::Float(val) => Ok(val.to_string()),
            Value::Null => Err(unsupported(target, &Value::Null)),
        }
    }
}

impl Field for SmolStr {
    fn kind() -> FieldKind {
        FieldKind::Leaf(ValueKind::Text)
    }

    fn get(&self) -> FieldRef<'_> {
        FieldRef::Value(Value::Text(self.to_string()))
    }

    fn from_value(value: Value) -> Result<Self, ConversionError> {
        String::from_value(value).map(SmolStr::from)
    }
}

impl Field for Vec<u8> {
    fn kind() -> FieldKind {
        FieldKind::Leaf(ValueKind::Bytes)
    }

    fn get(&self) -> FieldRef<'_> {
        FieldRef::Value(Value::Bytes(self.clone()))
    }

    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Bytes(val) => Ok(val),
            Value::Text(val) => Ok(val.into_bytes()),
            other => Err(unsupported("Vec<u8>", &other)),
        }
    }
}

// A dynamic field takes whatever the row holds, nulls included.
impl Field for Value {
    fn kind() -> FieldKind {
        FieldKind::Leaf(ValueKind::Dynamic)
    }

    fn get(&self) -> FieldRef<'_> {
        FieldRef::Value(self.clone())
    }

    fn from_value(value: Value) -> Result<Self, ConversionError> {
        Ok(value)
    }
}

impl<T: Field> Field for Option<T> {
    fn kind() -> FieldKind {
        T::kind()
    }

    fn get(&self) -> FieldRef<'_> {
        match self {
            None => FieldRef::Absent,
            Some(val) => val.get(),
        }
    }

    fn from_value(value: Value) -> Result<Self, ConversionError> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }

    fn as_record_mut(&mut self) -> Option<&mut dyn Record> {
        self.as_mut().and_then(|val| val.as_record_mut())
    }
}

// A box is followed like the value it holds.
impl<T: Field> Field for Box<T> {
    fn kind() -> FieldKind {
        T::kind()
    }

    fn get(&self) -> FieldRef<'_> {
        (**self).get()
    }

    fn from_value(value: Value) -> Result<Self, ConversionError> {
        T::from_value(value).map(Box::new)
    }

    fn as_record_mut(&mut self) -> Option<&mut dyn Record> {
        (**self).as_record_mut()
    }
}

macro_rules! opaque_fields {
    ($(impl$(<$g:ident>)? for $t:ty;)+) => {$(
        impl$(<$g>)? Field for $t {
            fn kind() -> FieldKind {
                FieldKind::Opaque
            }

            fn get(&self) -> FieldRef<'_> {
                FieldRef::Opaque
            }
        }
    )+};
}

opaque_fields! {
    impl for Box<dyn Read + Send>;
    impl<T> for Sender<T>;
    impl<T> for Receiver<T>;
}
