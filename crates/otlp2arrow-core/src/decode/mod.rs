//! Column readers shared by the signal decoders
//!
//! Decoding is the inverse of the builders: nulls turn back into proto
//! defaults, attribute and child tables are joined on `parent_id`, and
//! consecutive primary rows with the same resource/scope key are folded
//! back into one envelope.

use arrow::array::{
    Array, ArrayRef, AsArray, BinaryArray, BooleanArray, ListArray, PrimitiveArray, RecordBatch,
    StringArray, StructArray, UInt32Array,
};
use arrow::datatypes::{ArrowPrimitiveType, DataType, UInt32Type, UInt64Type, Float64Type};
use opentelemetry_proto::tonic::common::v1::{any_value, AnyValue, InstrumentationScope, KeyValue};
use opentelemetry_proto::tonic::resource::v1::Resource;
use prost::Message;
use std::collections::HashMap;

use crate::batch::EncodedBatch;
use crate::error::{Error, Result};
use crate::schema::{consts, AttributeValueType, PayloadType};

/// Named columns of a record batch or struct array
pub(crate) struct Table<'a> {
    payload: PayloadType,
    prefix: &'a str,
    len: usize,
    columns: Vec<(&'a str, &'a ArrayRef)>,
}

impl<'a> Table<'a> {
    pub(crate) fn from_batch(payload: PayloadType, batch: &'a RecordBatch) -> Self {
        let columns = batch
            .schema_ref()
            .fields()
            .iter()
            .map(|field| field.name().as_str())
            .zip(batch.columns())
            .collect();
        Self {
            payload,
            prefix: "",
            len: batch.num_rows(),
            columns,
        }
    }

    /// Children of a struct column, addressed by their own names
    pub(crate) fn nested(&self, name: &'a str) -> Result<Table<'a>> {
        let array = self.structs(name)?;
        let columns = array
            .fields()
            .iter()
            .map(|field| field.name().as_str())
            .zip(array.columns())
            .collect();
        Ok(Table {
            payload: self.payload,
            prefix: name,
            len: array.len(),
            columns,
        })
    }

    pub(crate) fn payload(&self) -> PayloadType {
        self.payload
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn error(&self, reason: impl Into<String>) -> Error {
        Error::decode(self.payload, reason)
    }

    fn qualified(&self, name: &str) -> String {
        if self.prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", self.prefix, name)
        }
    }

    pub(crate) fn column(&self, name: &str) -> Result<&'a ArrayRef> {
        self.columns
            .iter()
            .find(|(column, _)| *column == name)
            .map(|(_, array)| *array)
            .ok_or_else(|| self.error(format!("missing column '{}'", self.qualified(name))))
    }

    fn wrong_type(&self, name: &str, expected: &str, array: &ArrayRef) -> Error {
        self.error(format!(
            "column '{}' has type {}, expected {}",
            self.qualified(name),
            array.data_type(),
            expected
        ))
    }

    fn cast(&self, name: &str, array: &ArrayRef, to: &DataType) -> Result<ArrayRef> {
        arrow::compute::cast(array, to).map_err(|err| {
            self.error(format!(
                "column '{}' cannot be read as {}: {}",
                self.qualified(name),
                to,
                err
            ))
        })
    }

    pub(crate) fn primitive<T: ArrowPrimitiveType>(
        &self,
        name: &str,
    ) -> Result<&'a PrimitiveArray<T>> {
        let array = self.column(name)?;
        array
            .as_primitive_opt::<T>()
            .ok_or_else(|| self.wrong_type(name, &T::DATA_TYPE.to_string(), array))
    }

    /// Unsigned integer column widened to u32 (ids and counters)
    pub(crate) fn u32s(&self, name: &str) -> Result<UInt32Array> {
        let array = self.column(name)?;
        match array.data_type() {
            DataType::UInt8 | DataType::UInt16 | DataType::UInt32 => {
                let widened = self.cast(name, array, &DataType::UInt32)?;
                Ok(widened.as_primitive::<UInt32Type>().clone())
            }
            _ => Err(self.wrong_type(name, "unsigned integer", array)),
        }
    }

    /// String column, dictionary encoded or plain
    pub(crate) fn strings(&self, name: &str) -> Result<StringArray> {
        let array = self.column(name)?;
        match array.data_type() {
            DataType::Utf8 => Ok(array.as_string::<i32>().clone()),
            DataType::Dictionary(_, value) if value.as_ref() == &DataType::Utf8 => {
                let plain = self.cast(name, array, &DataType::Utf8)?;
                Ok(plain.as_string::<i32>().clone())
            }
            _ => Err(self.wrong_type(name, "string", array)),
        }
    }

    pub(crate) fn binary(&self, name: &str) -> Result<&'a BinaryArray> {
        let array = self.column(name)?;
        array
            .as_binary_opt::<i32>()
            .ok_or_else(|| self.wrong_type(name, "binary", array))
    }

    pub(crate) fn boolean(&self, name: &str) -> Result<&'a BooleanArray> {
        let array = self.column(name)?;
        array
            .as_boolean_opt()
            .ok_or_else(|| self.wrong_type(name, "boolean", array))
    }

    pub(crate) fn structs(&self, name: &str) -> Result<&'a StructArray> {
        let array = self.column(name)?;
        array
            .as_struct_opt()
            .ok_or_else(|| self.wrong_type(name, "struct", array))
    }

    pub(crate) fn list(&self, name: &str) -> Result<&'a ListArray> {
        let array = self.column(name)?;
        array
            .as_list_opt::<i32>()
            .ok_or_else(|| self.wrong_type(name, "list", array))
    }
}

/// Value at `row`, `None` when null
pub(crate) fn get<T: ArrowPrimitiveType>(array: &PrimitiveArray<T>, row: usize) -> Option<T::Native> {
    array.is_valid(row).then(|| array.value(row))
}

pub(crate) fn get_u32(array: &UInt32Array, row: usize) -> Option<u32> {
    get(array, row)
}

pub(crate) fn get_str(array: &StringArray, row: usize) -> Option<&str> {
    array.is_valid(row).then(|| array.value(row))
}

/// String value or the proto default
pub(crate) fn string_or_default(array: &StringArray, row: usize) -> String {
    get_str(array, row).unwrap_or_default().to_string()
}

pub(crate) fn bytes_or_default(array: &BinaryArray, row: usize) -> Vec<u8> {
    if array.is_valid(row) {
        array.value(row).to_vec()
    } else {
        Vec::new()
    }
}

pub(crate) fn get_bool(array: &BooleanArray, row: usize) -> Option<bool> {
    array.is_valid(row).then(|| array.value(row))
}

/// Nanosecond timestamp read back bit-for-bit as u64
pub(crate) fn nanos(array: &PrimitiveArray<impl ArrowPrimitiveType<Native = i64>>, row: usize) -> u64 {
    get(array, row).map(|v| v as u64).unwrap_or(0)
}

pub(crate) fn u64_list(list: &ListArray, row: usize) -> Vec<u64> {
    if list.is_null(row) {
        return Vec::new();
    }
    let values = list.value(row);
    values
        .as_primitive_opt::<UInt64Type>()
        .map(|v| v.values().to_vec())
        .unwrap_or_default()
}

pub(crate) fn f64_list(list: &ListArray, row: usize) -> Vec<f64> {
    if list.is_null(row) {
        return Vec::new();
    }
    let values = list.value(row);
    values
        .as_primitive_opt::<Float64Type>()
        .map(|v| v.values().to_vec())
        .unwrap_or_default()
}

/// Readers for the seven AnyValue columns
pub(crate) struct AnyValueReader {
    payload: PayloadType,
    kind: UInt32Array,
    str: StringArray,
    int: PrimitiveArray<arrow::datatypes::Int64Type>,
    double: PrimitiveArray<Float64Type>,
    bool: BooleanArray,
    bytes: BinaryArray,
    ser: BinaryArray,
}

impl AnyValueReader {
    pub(crate) fn new(table: &Table<'_>) -> Result<Self> {
        Ok(Self {
            payload: table.payload(),
            kind: table.u32s(consts::ATTRIBUTE_TYPE)?,
            str: table.strings(consts::ATTRIBUTE_STR)?,
            int: table.primitive(consts::ATTRIBUTE_INT)?.clone(),
            double: table.primitive(consts::ATTRIBUTE_DOUBLE)?.clone(),
            bool: table.boolean(consts::ATTRIBUTE_BOOL)?.clone(),
            bytes: table.binary(consts::ATTRIBUTE_BYTES)?.clone(),
            ser: table.binary(consts::ATTRIBUTE_SER)?.clone(),
        })
    }

    /// Value at `row`
    ///
    /// A null type reads back as `None`. The empty type code reads back as an
    /// empty `AnyValue` when `ser` is set and as `None` otherwise.
    pub(crate) fn value(&self, row: usize) -> Result<Option<AnyValue>> {
        let Some(code) = get_u32(&self.kind, row) else {
            return Ok(None);
        };
        let kind = u8::try_from(code)
            .ok()
            .and_then(AttributeValueType::from_code)
            .ok_or_else(|| Error::decode(self.payload, format!("unknown value type {code} at row {row}")))?;
        let value = match kind {
            AttributeValueType::Empty => {
                return Ok(self.ser.is_valid(row).then(AnyValue::default));
            }
            AttributeValueType::Str => {
                any_value::Value::StringValue(string_or_default(&self.str, row))
            }
            AttributeValueType::Int => any_value::Value::IntValue(get(&self.int, row).unwrap_or(0)),
            AttributeValueType::Double => {
                any_value::Value::DoubleValue(get(&self.double, row).unwrap_or(0.0))
            }
            AttributeValueType::Bool => {
                any_value::Value::BoolValue(get_bool(&self.bool, row).unwrap_or(false))
            }
            AttributeValueType::Bytes => any_value::Value::BytesValue(bytes_or_default(&self.bytes, row)),
            AttributeValueType::Map | AttributeValueType::Array => {
                let encoded = bytes_or_default(&self.ser, row);
                return AnyValue::decode(encoded.as_slice()).map(Some).map_err(|e| {
                    Error::decode(self.payload, format!("invalid nested value at row {row}: {e}"))
                });
            }
        };
        Ok(Some(AnyValue { value: Some(value) }))
    }
}

/// Attribute sets keyed by parent id, in table order
#[derive(Debug, Default)]
pub(crate) struct AttributeIndex {
    by_parent: HashMap<u32, Vec<KeyValue>>,
}

impl AttributeIndex {
    pub(crate) fn load(batch: &EncodedBatch, payload: PayloadType) -> Result<Self> {
        let Some(records) = batch.table(payload) else {
            return Ok(Self::default());
        };
        let table = Table::from_batch(payload, records);
        let parents = table.u32s(consts::PARENT_ID)?;
        let keys = table.strings(consts::KEY)?;
        let values = AnyValueReader::new(&table)?;

        let mut by_parent: HashMap<u32, Vec<KeyValue>> = HashMap::new();
        for row in 0..table.len() {
            let parent = get_u32(&parents, row)
                .ok_or_else(|| table.error(format!("null parent_id at row {row}")))?;
            by_parent.entry(parent).or_default().push(KeyValue {
                key: string_or_default(&keys, row),
                value: values.value(row)?,
            });
        }
        Ok(Self { by_parent })
    }

    /// Attributes owned by a single row
    pub(crate) fn take(&mut self, parent: u32) -> Vec<KeyValue> {
        self.by_parent.remove(&parent).unwrap_or_default()
    }

    /// Attributes shared by many rows (resources, scopes)
    pub(crate) fn get(&self, parent: u32) -> Vec<KeyValue> {
        self.by_parent.get(&parent).cloned().unwrap_or_default()
    }
}

/// Child rows grouped by parent id, in table order
pub(crate) struct Children<T> {
    by_parent: HashMap<u32, Vec<T>>,
}

impl<T> Default for Children<T> {
    fn default() -> Self {
        Self {
            by_parent: HashMap::new(),
        }
    }
}

impl<T> Children<T> {
    pub(crate) fn push(&mut self, parent: u32, child: T) {
        self.by_parent.entry(parent).or_default().push(child);
    }

    pub(crate) fn take(&mut self, parent: u32) -> Vec<T> {
        self.by_parent.remove(&parent).unwrap_or_default()
    }
}

/// Resource columns of one primary row
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ResourceKey {
    valid: bool,
    id: Option<u32>,
    schema_url: Option<String>,
    dropped: Option<u32>,
}

/// Scope columns of one primary row, including the scope schema URL
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ScopeKey {
    valid: bool,
    id: Option<u32>,
    name: Option<String>,
    version: Option<String>,
    dropped: Option<u32>,
    schema_url: Option<String>,
}

/// Reads the resource / scope envelope of primary rows
pub(crate) struct EnvelopeReader {
    resource_valid: Option<arrow::buffer::NullBuffer>,
    resource_id: UInt32Array,
    resource_schema_url: StringArray,
    resource_dropped: UInt32Array,
    scope_valid: Option<arrow::buffer::NullBuffer>,
    scope_id: UInt32Array,
    scope_name: StringArray,
    scope_version: StringArray,
    scope_dropped: UInt32Array,
    schema_url: StringArray,
    resource_attrs: AttributeIndex,
    scope_attrs: AttributeIndex,
}

impl EnvelopeReader {
    pub(crate) fn new(batch: &EncodedBatch, primary: &Table<'_>) -> Result<Self> {
        let resource = primary.nested(consts::RESOURCE)?;
        let scope = primary.nested(consts::SCOPE)?;
        Ok(Self {
            resource_valid: primary.structs(consts::RESOURCE)?.nulls().cloned(),
            resource_id: resource.u32s(consts::ID)?,
            resource_schema_url: resource.strings(consts::SCHEMA_URL)?,
            resource_dropped: resource.u32s(consts::DROPPED_ATTRIBUTES_COUNT)?,
            scope_valid: primary.structs(consts::SCOPE)?.nulls().cloned(),
            scope_id: scope.u32s(consts::ID)?,
            scope_name: scope.strings(consts::NAME)?,
            scope_version: scope.strings(consts::VERSION)?,
            scope_dropped: scope.u32s(consts::DROPPED_ATTRIBUTES_COUNT)?,
            schema_url: primary.strings(consts::SCHEMA_URL)?,
            resource_attrs: AttributeIndex::load(batch, PayloadType::ResourceAttrs)?,
            scope_attrs: AttributeIndex::load(batch, PayloadType::ScopeAttrs)?,
        })
    }

    fn resource_key(&self, row: usize) -> ResourceKey {
        let valid = self.resource_valid.as_ref().map_or(true, |n| n.is_valid(row));
        if !valid {
            return ResourceKey {
                valid,
                id: None,
                schema_url: None,
                dropped: None,
            };
        }
        ResourceKey {
            valid,
            id: get_u32(&self.resource_id, row),
            schema_url: get_str(&self.resource_schema_url, row).map(str::to_string),
            dropped: get_u32(&self.resource_dropped, row),
        }
    }

    fn scope_key(&self, row: usize) -> ScopeKey {
        let valid = self.scope_valid.as_ref().map_or(true, |n| n.is_valid(row));
        let schema_url = get_str(&self.schema_url, row).map(str::to_string);
        if !valid {
            return ScopeKey {
                valid,
                id: None,
                name: None,
                version: None,
                dropped: None,
                schema_url,
            };
        }
        ScopeKey {
            valid,
            id: get_u32(&self.scope_id, row),
            name: get_str(&self.scope_name, row).map(str::to_string),
            version: get_str(&self.scope_version, row).map(str::to_string),
            dropped: get_u32(&self.scope_dropped, row),
            schema_url,
        }
    }

    fn resource(&self, key: &ResourceKey) -> Option<Resource> {
        let id = key.id?;
        Some(Resource {
            attributes: self.resource_attrs.get(id),
            dropped_attributes_count: key.dropped.unwrap_or(0),
            ..Default::default()
        })
    }

    fn scope(&self, key: &ScopeKey) -> Option<InstrumentationScope> {
        if !key.valid {
            return None;
        }
        Some(InstrumentationScope {
            name: key.name.clone().unwrap_or_default(),
            version: key.version.clone().unwrap_or_default(),
            attributes: key.id.map(|id| self.scope_attrs.get(id)).unwrap_or_default(),
            dropped_attributes_count: key.dropped.unwrap_or(0),
        })
    }

    /// Fold primary rows back into resource and scope envelopes
    ///
    /// `rows[i]` is the decoded signal row for primary row `i`. A new envelope
    /// starts whenever the resource (or scope) columns differ from the
    /// previous row.
    pub(crate) fn assemble<T, S, R>(
        &self,
        rows: Vec<T>,
        mut make_scope: impl FnMut(Option<InstrumentationScope>, String, Vec<T>) -> S,
        mut make_resource: impl FnMut(Option<Resource>, String, Vec<S>) -> R,
    ) -> Vec<R> {
        let mut resources = Vec::new();
        let mut current_resource: Option<(ResourceKey, Vec<S>)> = None;
        let mut current_scope: Option<(ScopeKey, Vec<T>)> = None;

        for (row, item) in rows.into_iter().enumerate() {
            let resource_key = self.resource_key(row);
            let scope_key = self.scope_key(row);

            let resource_changed = current_resource
                .as_ref()
                .map_or(true, |(key, _)| *key != resource_key);
            let scope_changed = resource_changed
                || current_scope
                    .as_ref()
                    .map_or(true, |(key, _)| *key != scope_key);

            if scope_changed {
                if let Some((key, items)) = current_scope.take() {
                    let scope = make_scope(self.scope(&key), key.schema_url.unwrap_or_default(), items);
                    if let Some((_, scopes)) = current_resource.as_mut() {
                        scopes.push(scope);
                    }
                }
            }
            if resource_changed {
                if let Some((key, scopes)) = current_resource.take() {
                    resources.push(make_resource(
                        self.resource(&key),
                        key.schema_url.clone().unwrap_or_default(),
                        scopes,
                    ));
                }
                current_resource = Some((resource_key, Vec::new()));
            }
            match current_scope.as_mut() {
                Some((_, items)) if !scope_changed => items.push(item),
                _ => current_scope = Some((scope_key, vec![item])),
            }
        }

        if let Some((key, items)) = current_scope.take() {
            let scope = make_scope(self.scope(&key), key.schema_url.unwrap_or_default(), items);
            if let Some((_, scopes)) = current_resource.as_mut() {
                scopes.push(scope);
            }
        }
        if let Some((key, scopes)) = current_resource.take() {
            resources.push(make_resource(
                self.resource(&key),
                key.schema_url.clone().unwrap_or_default(),
                scopes,
            ));
        }
        resources
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{DictionaryArray, Int64Array, UInt16Array};
    use arrow::datatypes::{Field, Schema, UInt8Type};
    use std::sync::Arc;

    fn batch(columns: Vec<(&str, ArrayRef)>) -> RecordBatch {
        let fields: Vec<Field> = columns
            .iter()
            .map(|(name, array)| Field::new(*name, array.data_type().clone(), true))
            .collect();
        let arrays = columns.into_iter().map(|(_, array)| array).collect();
        RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays).unwrap()
    }

    #[test]
    fn narrow_ids_and_dictionary_strings_are_widened() {
        let names: DictionaryArray<UInt8Type> = vec!["a", "b", "a"].into_iter().collect();
        let batch = batch(vec![
            ("id", Arc::new(UInt16Array::from(vec![0, 1, 2])) as ArrayRef),
            ("name", Arc::new(names) as ArrayRef),
        ]);
        let table = Table::from_batch(PayloadType::Metrics, &batch);
        assert_eq!(table.u32s("id").unwrap().values().to_vec(), vec![0, 1, 2]);
        let strings = table.strings("name").unwrap();
        assert_eq!(strings.value(2), "a");
    }

    #[test]
    fn type_mismatches_name_the_table() {
        let batch = batch(vec![
            ("id", Arc::new(Int64Array::from(vec![-1])) as ArrayRef),
            ("name", Arc::new(UInt16Array::from(vec![7])) as ArrayRef),
        ]);
        let table = Table::from_batch(PayloadType::Spans, &batch);
        for err in [table.u32s("id").unwrap_err(), table.strings("name").unwrap_err()] {
            assert!(
                matches!(err, Error::Decode { payload: PayloadType::Spans, .. }),
                "{err}"
            );
        }
        let err = table.u32s("missing").unwrap_err();
        assert!(err.to_string().contains("missing column 'missing'"));
    }
}
