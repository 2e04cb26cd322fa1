// AnyValue column layout
//
// Scalars go to their typed column; maps and arrays are stored as the prost
// encoding of the whole AnyValue in `ser` so nested values survive unchanged.

use opentelemetry_proto::tonic::common::v1::{any_value, AnyValue};
use prost::Message;

use crate::builder::{ColumnId, RecordBuilder, Value};
use crate::error::Result;
use crate::schema::{consts, AttributeValueType};

/// Resolved ids of the seven AnyValue columns of a table or struct
#[derive(Debug, Clone, Copy)]
pub(crate) struct AnyValueColumns {
    kind: ColumnId,
    str: ColumnId,
    int: ColumnId,
    double: ColumnId,
    bool: ColumnId,
    bytes: ColumnId,
    ser: ColumnId,
}

impl AnyValueColumns {
    /// Columns at the top level of an attribute table
    pub(crate) fn top_level(builder: &RecordBuilder) -> Result<Self> {
        Ok(Self {
            kind: builder.column(consts::ATTRIBUTE_TYPE)?,
            str: builder.column(consts::ATTRIBUTE_STR)?,
            int: builder.column(consts::ATTRIBUTE_INT)?,
            double: builder.column(consts::ATTRIBUTE_DOUBLE)?,
            bool: builder.column(consts::ATTRIBUTE_BOOL)?,
            bytes: builder.column(consts::ATTRIBUTE_BYTES)?,
            ser: builder.column(consts::ATTRIBUTE_SER)?,
        })
    }

    /// Columns nested in a struct column (log body)
    pub(crate) fn children(builder: &RecordBuilder, parent: ColumnId) -> Result<Self> {
        Ok(Self {
            kind: builder.child(parent, consts::ATTRIBUTE_TYPE)?,
            str: builder.child(parent, consts::ATTRIBUTE_STR)?,
            int: builder.child(parent, consts::ATTRIBUTE_INT)?,
            double: builder.child(parent, consts::ATTRIBUTE_DOUBLE)?,
            bool: builder.child(parent, consts::ATTRIBUTE_BOOL)?,
            bytes: builder.child(parent, consts::ATTRIBUTE_BYTES)?,
            ser: builder.child(parent, consts::ATTRIBUTE_SER)?,
        })
    }

    /// Write one value; absent values are stored with the empty type code
    ///
    /// An `AnyValue` without a value also gets the empty type code plus an
    /// empty `ser` entry, which keeps it apart from a missing value.
    pub(crate) fn append(&self, builder: &mut RecordBuilder, value: Option<&AnyValue>) -> Result<()> {
        let mut kind = AttributeValueType::Empty;
        let mut str = Value::Null;
        let mut int = Value::Null;
        let mut double = Value::Null;
        let mut boolean = Value::Null;
        let mut bytes = Value::Null;
        let mut ser = None;

        if let Some(inner) = value.and_then(|v| v.value.as_ref()) {
            match inner {
                any_value::Value::StringValue(s) => {
                    kind = AttributeValueType::Str;
                    str = Value::Str(s);
                }
                any_value::Value::IntValue(i) => {
                    kind = AttributeValueType::Int;
                    int = Value::Int(*i);
                }
                any_value::Value::DoubleValue(d) => {
                    kind = AttributeValueType::Double;
                    double = Value::Float(*d);
                }
                any_value::Value::BoolValue(b) => {
                    kind = AttributeValueType::Bool;
                    boolean = Value::Bool(*b);
                }
                any_value::Value::BytesValue(b) => {
                    kind = AttributeValueType::Bytes;
                    bytes = Value::Bytes(b);
                }
                any_value::Value::KvlistValue(_) => {
                    kind = AttributeValueType::Map;
                    ser = value.map(Message::encode_to_vec);
                }
                any_value::Value::ArrayValue(_) => {
                    kind = AttributeValueType::Array;
                    ser = value.map(Message::encode_to_vec);
                }
            }
        }

        if matches!(value, Some(AnyValue { value: None })) {
            ser = Some(Vec::new());
        }

        builder.append(self.kind, Value::UInt(u64::from(kind.code())))?;
        builder.append(self.str, str)?;
        builder.append(self.int, int)?;
        builder.append(self.double, double)?;
        builder.append(self.bool, boolean)?;
        builder.append(self.bytes, bytes)?;
        builder.append(
            self.ser,
            ser.as_deref().map(Value::Bytes).unwrap_or(Value::Null),
        )
    }
}
