// Column layouts shared across signals: resource/scope structs, attribute
// tables and the AnyValue layout reused by log bodies.

use arrow::datatypes::{DataType, Field, Fields, TimeUnit};

use super::consts;
use super::{field, Hint};

/// Type code stored in the `type` column of attribute tables and log bodies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AttributeValueType {
    Empty = 0,
    Str = 1,
    Int = 2,
    Double = 3,
    Bool = 4,
    Map = 5,
    Array = 6,
    Bytes = 7,
}

impl AttributeValueType {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Empty),
            1 => Some(Self::Str),
            2 => Some(Self::Int),
            3 => Some(Self::Double),
            4 => Some(Self::Bool),
            5 => Some(Self::Map),
            6 => Some(Self::Array),
            7 => Some(Self::Bytes),
            _ => None,
        }
    }
}

pub(crate) fn timestamp_ns() -> DataType {
    DataType::Timestamp(TimeUnit::Nanosecond, None)
}

pub(crate) fn dictionary(key: DataType) -> DataType {
    DataType::Dictionary(Box::new(key), Box::new(DataType::Utf8))
}

pub(crate) fn dict8() -> DataType {
    dictionary(DataType::UInt8)
}

pub(crate) fn dict16() -> DataType {
    dictionary(DataType::UInt16)
}

/// `resource` struct column: the resource id plus the scalar resource fields
pub(crate) fn resource_field() -> Field {
    let children = Fields::from(vec![
        Field::new(consts::ID, DataType::UInt16, true),
        field(consts::SCHEMA_URL, dict8(), &[Hint::Optional, Hint::Dictionary8]),
        Field::new(consts::DROPPED_ATTRIBUTES_COUNT, DataType::UInt32, true),
    ]);
    field(consts::RESOURCE, DataType::Struct(children), &[Hint::Optional])
}

/// `scope` struct column: the scope id plus the instrumentation scope fields
pub(crate) fn scope_field() -> Field {
    let children = Fields::from(vec![
        Field::new(consts::ID, DataType::UInt16, true),
        field(consts::NAME, dict8(), &[Hint::Optional, Hint::Dictionary8]),
        field(consts::VERSION, dict8(), &[Hint::Optional, Hint::Dictionary8]),
        Field::new(consts::DROPPED_ATTRIBUTES_COUNT, DataType::UInt32, true),
    ]);
    field(consts::SCOPE, DataType::Struct(children), &[Hint::Optional])
}

/// Value columns of the AnyValue layout, in table order
fn any_value_fields() -> Vec<Field> {
    vec![
        field(consts::ATTRIBUTE_TYPE, DataType::UInt8, &[]),
        field(consts::ATTRIBUTE_STR, dict16(), &[Hint::Optional, Hint::Dictionary16]),
        field(consts::ATTRIBUTE_INT, DataType::Int64, &[Hint::Optional]),
        field(consts::ATTRIBUTE_DOUBLE, DataType::Float64, &[Hint::Optional]),
        field(consts::ATTRIBUTE_BOOL, DataType::Boolean, &[Hint::Optional]),
        field(consts::ATTRIBUTE_BYTES, DataType::Binary, &[Hint::Optional]),
        field(consts::ATTRIBUTE_SER, DataType::Binary, &[Hint::Optional]),
    ]
}

/// Attribute table: one row per key/value, keyed by the owning row id
pub(crate) fn attrs_fields(parent_type: DataType) -> Vec<Field> {
    let mut fields = vec![
        field(consts::PARENT_ID, parent_type, &[Hint::DeltaEncoding]),
        field(consts::KEY, dict8(), &[Hint::Dictionary8]),
    ];
    fields.extend(any_value_fields());
    fields
}

/// `body` struct column of the logs table
pub(crate) fn body_field() -> Field {
    // Struct children are always nullable; the type column is null only when
    // the whole body is absent.
    let children: Vec<Field> = any_value_fields()
        .into_iter()
        .map(|child| child.with_nullable(true))
        .collect();
    field(
        consts::BODY,
        DataType::Struct(Fields::from(children)),
        &[Hint::Optional],
    )
}
