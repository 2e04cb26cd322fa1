// Typed column builders behind one enum
//
// Each variant wraps the arrow builder for a physical column type. Values are
// passed as the small `Value` enum and checked against the column width here,
// so callers never touch arrow builders directly.

use arrow::array::{
    Array, ArrayBuilder, ArrayRef, AsArray, BinaryBuilder, BooleanBuilder,
    DurationNanosecondBuilder, Float64Builder, Int32Builder, Int64Builder, ListBuilder,
    StringBuilder, StringDictionaryBuilder, StructArray, TimestampNanosecondBuilder,
    UInt16Builder, UInt32Builder, UInt64Builder, UInt8Builder,
};
use arrow::buffer::NullBuffer;
use arrow::datatypes::{DataType, Field, FieldRef, Fields, TimeUnit, UInt16Type, UInt8Type};
use arrow::error::ArrowError;
use std::fmt;
use std::sync::Arc;

/// A single value handed to a column builder
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value<'a> {
    Null,
    Bool(bool),
    UInt(u64),
    Int(i64),
    Float(f64),
    Str(&'a str),
    Bytes(&'a [u8]),
    UInt64s(&'a [u64]),
    Float64s(&'a [f64]),
}

impl Value<'_> {
    fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::UInt(_) => "unsigned integer",
            Value::Int(_) => "signed integer",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::UInt64s(_) => "u64 list",
            Value::Float64s(_) => "f64 list",
        }
    }

    /// Null for `None`, otherwise the mapped value
    pub fn opt<T>(value: Option<T>, map: impl FnOnce(T) -> Self) -> Self {
        value.map(map).unwrap_or(Value::Null)
    }

    /// Null for empty strings
    pub fn non_empty_str(value: &str) -> Value<'_> {
        if value.is_empty() {
            Value::Null
        } else {
            Value::Str(value)
        }
    }

    /// Null for empty byte strings
    pub fn non_empty_bytes(value: &[u8]) -> Value<'_> {
        if value.is_empty() {
            Value::Null
        } else {
            Value::Bytes(value)
        }
    }

    /// Null for zero counters and flags
    pub fn non_zero(value: u64) -> Value<'static> {
        if value == 0 {
            Value::Null
        } else {
            Value::UInt(value)
        }
    }

    /// Null for zero timestamps; u64 nanoseconds are stored bit-for-bit as i64
    pub fn timestamp_or_null(nanos: u64) -> Value<'static> {
        if nanos == 0 {
            Value::Null
        } else {
            Value::Int(nanos as i64)
        }
    }

    pub fn timestamp(nanos: u64) -> Value<'static> {
        Value::Int(nanos as i64)
    }
}

/// Why a value was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum AppendError {
    TypeMismatch {
        expected: &'static str,
        got: &'static str,
    },
    OutOfRange {
        value: String,
        target: &'static str,
    },
    Arrow(String),
}

impl fmt::Display for AppendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppendError::TypeMismatch { expected, got } => {
                write!(f, "expected {expected} value, got {got}")
            }
            AppendError::OutOfRange { value, target } => {
                write!(f, "value {value} does not fit in {target}")
            }
            AppendError::Arrow(message) => f.write_str(message),
        }
    }
}

/// Outcome of a successful append
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Appended {
    Value,
    /// The dictionary ran out of keys and the column was rewritten as plain strings
    DictionaryFallback,
}

pub(crate) struct StructColumn {
    fields: Fields,
    pub(crate) children: Vec<Column>,
    validity: Vec<bool>,
}

pub(crate) enum Column {
    Boolean(BooleanBuilder),
    UInt8(UInt8Builder),
    UInt16(UInt16Builder),
    UInt32(UInt32Builder),
    UInt64(UInt64Builder),
    Int32(Int32Builder),
    Int64(Int64Builder),
    Float64(Float64Builder),
    Timestamp(TimestampNanosecondBuilder),
    Duration(DurationNanosecondBuilder),
    Utf8(StringBuilder),
    Binary(BinaryBuilder),
    Dict8(StringDictionaryBuilder<UInt8Type>),
    Dict16(StringDictionaryBuilder<UInt16Type>),
    UInt64List(ListBuilder<UInt64Builder>),
    Float64List(ListBuilder<Float64Builder>),
    Struct(StructColumn),
}

macro_rules! append_int {
    ($builder:expr, $native:ty, $value:expr, $target:literal) => {
        match $value {
            Value::Null => {
                $builder.append_null();
                Ok(Appended::Value)
            }
            Value::UInt(v) => {
                let v = <$native>::try_from(v).map_err(|_| AppendError::OutOfRange {
                    value: v.to_string(),
                    target: $target,
                })?;
                $builder.append_value(v);
                Ok(Appended::Value)
            }
            Value::Int(v) => {
                let v = <$native>::try_from(v).map_err(|_| AppendError::OutOfRange {
                    value: v.to_string(),
                    target: $target,
                })?;
                $builder.append_value(v);
                Ok(Appended::Value)
            }
            other => Err(AppendError::TypeMismatch {
                expected: $target,
                got: other.kind(),
            }),
        }
    };
}

fn mismatch(expected: &'static str, value: &Value<'_>) -> AppendError {
    AppendError::TypeMismatch {
        expected,
        got: value.kind(),
    }
}

fn list_item(item: &FieldRef, expected: &DataType) -> Result<FieldRef, ArrowError> {
    if item.data_type() == expected {
        Ok(Arc::clone(item))
    } else {
        Err(ArrowError::NotYetImplemented(format!(
            "list of {} is not a supported column type",
            item.data_type()
        )))
    }
}

impl Column {
    /// Create an empty builder for a schema data type
    pub(crate) fn new(data_type: &DataType, capacity: usize) -> Result<Self, ArrowError> {
        let column = match data_type {
            DataType::Boolean => Column::Boolean(BooleanBuilder::with_capacity(capacity)),
            DataType::UInt8 => Column::UInt8(UInt8Builder::with_capacity(capacity)),
            DataType::UInt16 => Column::UInt16(UInt16Builder::with_capacity(capacity)),
            DataType::UInt32 => Column::UInt32(UInt32Builder::with_capacity(capacity)),
            DataType::UInt64 => Column::UInt64(UInt64Builder::with_capacity(capacity)),
            DataType::Int32 => Column::Int32(Int32Builder::with_capacity(capacity)),
            DataType::Int64 => Column::Int64(Int64Builder::with_capacity(capacity)),
            DataType::Float64 => Column::Float64(Float64Builder::with_capacity(capacity)),
            DataType::Timestamp(TimeUnit::Nanosecond, tz) => Column::Timestamp(
                TimestampNanosecondBuilder::with_capacity(capacity).with_timezone_opt(tz.clone()),
            ),
            DataType::Duration(TimeUnit::Nanosecond) => {
                Column::Duration(DurationNanosecondBuilder::with_capacity(capacity))
            }
            DataType::Utf8 => Column::Utf8(StringBuilder::with_capacity(capacity, capacity * 8)),
            DataType::Binary => {
                Column::Binary(BinaryBuilder::with_capacity(capacity, capacity * 8))
            }
            DataType::Dictionary(key, value) if value.as_ref() == &DataType::Utf8 => {
                match key.as_ref() {
                    DataType::UInt8 => Column::Dict8(StringDictionaryBuilder::with_capacity(
                        capacity, 16, 256,
                    )),
                    DataType::UInt16 => Column::Dict16(StringDictionaryBuilder::with_capacity(
                        capacity, 64, 1024,
                    )),
                    other => {
                        return Err(ArrowError::NotYetImplemented(format!(
                            "dictionary key {other} is not supported"
                        )))
                    }
                }
            }
            DataType::List(item) if item.data_type() == &DataType::UInt64 => Column::UInt64List(
                ListBuilder::with_capacity(UInt64Builder::new(), capacity)
                    .with_field(list_item(item, &DataType::UInt64)?),
            ),
            DataType::List(item) if item.data_type() == &DataType::Float64 => Column::Float64List(
                ListBuilder::with_capacity(Float64Builder::new(), capacity)
                    .with_field(list_item(item, &DataType::Float64)?),
            ),
            DataType::Struct(fields) => {
                let children = fields
                    .iter()
                    .map(|child| Column::new(child.data_type(), capacity))
                    .collect::<Result<Vec<_>, _>>()?;
                Column::Struct(StructColumn {
                    fields: fields.clone(),
                    children,
                    validity: Vec::with_capacity(capacity),
                })
            }
            other => {
                return Err(ArrowError::NotYetImplemented(format!(
                    "{other} is not a supported column type"
                )))
            }
        };
        Ok(column)
    }

    pub(crate) fn len(&self) -> usize {
        match self {
            Column::Boolean(b) => b.len(),
            Column::UInt8(b) => b.len(),
            Column::UInt16(b) => b.len(),
            Column::UInt32(b) => b.len(),
            Column::UInt64(b) => b.len(),
            Column::Int32(b) => b.len(),
            Column::Int64(b) => b.len(),
            Column::Float64(b) => b.len(),
            Column::Timestamp(b) => b.len(),
            Column::Duration(b) => b.len(),
            Column::Utf8(b) => b.len(),
            Column::Binary(b) => b.len(),
            Column::Dict8(b) => b.len(),
            Column::Dict16(b) => b.len(),
            Column::UInt64List(b) => b.len(),
            Column::Float64List(b) => b.len(),
            Column::Struct(s) => s.validity.len(),
        }
    }

    pub(crate) fn is_struct(&self) -> bool {
        matches!(self, Column::Struct(_))
    }

    /// Append one value, checking it against the column's physical type
    pub(crate) fn append(&mut self, value: Value<'_>) -> Result<Appended, AppendError> {
        match self {
            Column::Boolean(b) => match value {
                Value::Null => b.append_null(),
                Value::Bool(v) => b.append_value(v),
                other => return Err(mismatch("bool", &other)),
            },
            Column::UInt8(b) => return append_int!(b, u8, value, "UInt8"),
            Column::UInt16(b) => return append_int!(b, u16, value, "UInt16"),
            Column::UInt32(b) => return append_int!(b, u32, value, "UInt32"),
            Column::UInt64(b) => return append_int!(b, u64, value, "UInt64"),
            Column::Int32(b) => return append_int!(b, i32, value, "Int32"),
            Column::Int64(b) => return append_int!(b, i64, value, "Int64"),
            Column::Timestamp(b) => return append_int!(b, i64, value, "Timestamp(ns)"),
            Column::Duration(b) => return append_int!(b, i64, value, "Duration(ns)"),
            Column::Float64(b) => match value {
                Value::Null => b.append_null(),
                Value::Float(v) => b.append_value(v),
                other => return Err(mismatch("float", &other)),
            },
            Column::Utf8(b) => match value {
                Value::Null => b.append_null(),
                Value::Str(v) => b.append_value(v),
                other => return Err(mismatch("string", &other)),
            },
            Column::Binary(b) => match value {
                Value::Null => b.append_null(),
                Value::Bytes(v) => b.append_value(v),
                other => return Err(mismatch("bytes", &other)),
            },
            Column::Dict8(b) => match value {
                Value::Null => b.append_null(),
                Value::Str(v) => match b.append(v) {
                    Ok(_) => {}
                    Err(ArrowError::DictionaryKeyOverflowError) => {
                        return self.fall_back_to_plain(v)
                    }
                    Err(e) => return Err(AppendError::Arrow(e.to_string())),
                },
                other => return Err(mismatch("string", &other)),
            },
            Column::Dict16(b) => match value {
                Value::Null => b.append_null(),
                Value::Str(v) => match b.append(v) {
                    Ok(_) => {}
                    Err(ArrowError::DictionaryKeyOverflowError) => {
                        return self.fall_back_to_plain(v)
                    }
                    Err(e) => return Err(AppendError::Arrow(e.to_string())),
                },
                other => return Err(mismatch("string", &other)),
            },
            Column::UInt64List(b) => match value {
                Value::Null => b.append_null(),
                Value::UInt64s(values) => {
                    b.values().append_slice(values);
                    b.append(true);
                }
                other => return Err(mismatch("u64 list", &other)),
            },
            Column::Float64List(b) => match value {
                Value::Null => b.append_null(),
                Value::Float64s(values) => {
                    b.values().append_slice(values);
                    b.append(true);
                }
                other => return Err(mismatch("f64 list", &other)),
            },
            Column::Struct(s) => match value {
                Value::Null => s.append_null().map_err(|e| AppendError::Arrow(e.to_string()))?,
                other => return Err(mismatch("struct validity", &other)),
            },
        }
        Ok(Appended::Value)
    }

    /// Mark the next struct row valid; children are appended individually
    pub(crate) fn append_struct_valid(&mut self) -> Result<(), AppendError> {
        match self {
            Column::Struct(s) => {
                s.validity.push(true);
                Ok(())
            }
            _ => Err(AppendError::TypeMismatch {
                expected: "non-struct value",
                got: "struct validity",
            }),
        }
    }

    /// Rewrite a dictionary column as plain strings, then append `value`
    fn fall_back_to_plain(&mut self, value: &str) -> Result<Appended, AppendError> {
        let array: ArrayRef = match self {
            Column::Dict8(b) => Arc::new(b.finish()),
            Column::Dict16(b) => Arc::new(b.finish()),
            _ => return Err(AppendError::Arrow("not a dictionary column".to_string())),
        };
        let plain = arrow::compute::cast(&array, &DataType::Utf8)
            .map_err(|e| AppendError::Arrow(e.to_string()))?;
        let strings = plain.as_string::<i32>();
        let mut builder = StringBuilder::with_capacity(strings.len() * 2, strings.len() * 16);
        for existing in strings.iter() {
            builder.append_option(existing);
        }
        builder.append_value(value);
        *self = Column::Utf8(builder);
        Ok(Appended::DictionaryFallback)
    }

    /// Drain the builder into an array
    pub(crate) fn finish(&mut self) -> Result<ArrayRef, ArrowError> {
        let array: ArrayRef = match self {
            Column::Boolean(b) => Arc::new(b.finish()),
            Column::UInt8(b) => Arc::new(b.finish()),
            Column::UInt16(b) => Arc::new(b.finish()),
            Column::UInt32(b) => Arc::new(b.finish()),
            Column::UInt64(b) => Arc::new(b.finish()),
            Column::Int32(b) => Arc::new(b.finish()),
            Column::Int64(b) => Arc::new(b.finish()),
            Column::Float64(b) => Arc::new(b.finish()),
            Column::Timestamp(b) => Arc::new(b.finish()),
            Column::Duration(b) => Arc::new(b.finish()),
            Column::Utf8(b) => Arc::new(b.finish()),
            Column::Binary(b) => Arc::new(b.finish()),
            Column::Dict8(b) => Arc::new(b.finish()),
            Column::Dict16(b) => Arc::new(b.finish()),
            Column::UInt64List(b) => Arc::new(b.finish()),
            Column::Float64List(b) => Arc::new(b.finish()),
            Column::Struct(s) => Arc::new(s.finish()?),
        };
        Ok(array)
    }
}

impl StructColumn {
    fn append_null(&mut self) -> Result<(), ArrowError> {
        for child in &mut self.children {
            child
                .append(Value::Null)
                .map_err(|e| ArrowError::InvalidArgumentError(e.to_string()))?;
        }
        self.validity.push(false);
        Ok(())
    }

    fn finish(&mut self) -> Result<StructArray, ArrowError> {
        let arrays = self
            .children
            .iter_mut()
            .map(Column::finish)
            .collect::<Result<Vec<_>, _>>()?;
        // Child types may differ from the schema after a dictionary fallback
        let fields: Fields = self
            .fields
            .iter()
            .zip(&arrays)
            .map(|(field, array)| retype(field, array.data_type()))
            .collect();
        let validity = std::mem::take(&mut self.validity);
        let nulls = if validity.iter().all(|valid| *valid) {
            None
        } else {
            Some(NullBuffer::from(validity))
        };
        let len = arrays.first().map(|a| a.len()).unwrap_or(0);
        if let Some(nulls) = &nulls {
            if nulls.len() != len {
                return Err(ArrowError::InvalidArgumentError(format!(
                    "struct validity has {} rows but children have {}",
                    nulls.len(),
                    len
                )));
            }
        }
        StructArray::try_new(fields, arrays, nulls)
    }
}

/// Same field with a different physical type, keeping name, nullability and metadata
pub(crate) fn retype(field: &FieldRef, data_type: &DataType) -> FieldRef {
    if field.data_type() == data_type {
        Arc::clone(field)
    } else {
        Arc::new(
            Field::new(field.name(), data_type.clone(), field.is_nullable())
                .with_metadata(field.metadata().clone()),
        )
    }
}
