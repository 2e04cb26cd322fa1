//! Correlation accumulators
//!
//! Attribute sets are written to their own table, one row per key/value,
//! keyed by the id of the row that owns them. Resource and scope attributes
//! are shared by many signal rows, so they are only written when the owning
//! group changes and the id is reused otherwise.

pub(crate) mod any_value;

use arrow::array::RecordBatch;
use opentelemetry_proto::tonic::common::v1::KeyValue;

use crate::builder::{ColumnId, RecordBuilder, Value};
use crate::error::Result;
use crate::schema::{consts, PayloadType};
use any_value::AnyValueColumns;

/// Attribute table writer for one payload type
pub struct AttributesAccumulator {
    builder: RecordBuilder,
    parent_id: ColumnId,
    key: ColumnId,
    values: AnyValueColumns,
    next_id: u32,
    current: Option<(usize, u32)>,
}

impl AttributesAccumulator {
    pub fn new(payload: PayloadType) -> Result<Self> {
        let builder = RecordBuilder::new(payload)?;
        Ok(Self {
            parent_id: builder.column(consts::PARENT_ID)?,
            key: builder.column(consts::KEY)?,
            values: AnyValueColumns::top_level(&builder)?,
            builder,
            next_id: 0,
            current: None,
        })
    }

    pub fn payload(&self) -> PayloadType {
        self.builder.payload()
    }

    /// Number of attribute rows pending
    pub fn len(&self) -> usize {
        self.builder.len()
    }

    pub fn is_empty(&self) -> bool {
        self.builder.is_empty()
    }

    /// Write every attribute of `attrs` under `parent_id`
    pub fn append(&mut self, parent_id: u32, attrs: &[KeyValue]) -> Result<()> {
        for attr in attrs {
            self.builder
                .append(self.parent_id, Value::UInt(u64::from(parent_id)))?;
            self.builder.append(self.key, Value::Str(&attr.key))?;
            self.values.append(&mut self.builder, attr.value.as_ref())?;
        }
        Ok(())
    }

    /// Id for a shared attribute set (resource or scope)
    ///
    /// While `group` matches the previous call the previous id is returned and
    /// nothing is written. A new group mints the next id and writes its rows.
    pub fn append_for_group(&mut self, group: usize, attrs: &[KeyValue]) -> Result<u32> {
        if let Some((current, id)) = self.current {
            if current == group {
                return Ok(id);
            }
        }
        let id = self.next_id;
        self.append(id, attrs)?;
        self.next_id += 1;
        self.current = Some((group, id));
        Ok(id)
    }

    /// Forget the current group; the next `append_for_group` mints a fresh id
    pub fn reset_grouping(&mut self) {
        self.current = None;
    }

    pub fn build(&mut self) -> Result<RecordBatch> {
        self.next_id = 0;
        self.current = None;
        self.builder.build()
    }

    pub fn reset(&mut self) {
        self.next_id = 0;
        self.current = None;
        self.builder.reset();
    }

    pub fn release(&mut self) {
        self.builder.release();
    }
}

/// Monotonic id source for child rows (data points, exemplars, events, links)
#[derive(Debug, Default)]
pub(crate) struct IdSequence {
    next: u32,
}

impl IdSequence {
    /// Hand out the next id; the id column range check reports overflow
    pub(crate) fn next(&mut self) -> u32 {
        let id = self.next;
        self.next = self.next.saturating_add(1);
        id
    }

    pub(crate) fn reset(&mut self) {
        self.next = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, AsArray};
    use arrow::datatypes::{UInt16Type, UInt8Type};
    use opentelemetry_proto::tonic::common::v1::{any_value, AnyValue, ArrayValue};
    use prost::Message;

    fn kv(key: &str, value: any_value::Value) -> KeyValue {
        KeyValue {
            key: key.to_string(),
            value: Some(AnyValue { value: Some(value) }),
        }
    }

    #[test]
    fn group_reuses_id_until_group_changes() {
        let mut acc = AttributesAccumulator::new(PayloadType::ResourceAttrs).unwrap();
        let attrs = vec![kv("service.name", any_value::Value::StringValue("api".into()))];

        assert_eq!(acc.append_for_group(0, &attrs).unwrap(), 0);
        assert_eq!(acc.append_for_group(0, &attrs).unwrap(), 0);
        assert_eq!(acc.len(), 1);
        assert_eq!(acc.append_for_group(1, &attrs).unwrap(), 1);
        assert_eq!(acc.len(), 2);

        acc.reset_grouping();
        assert_eq!(acc.append_for_group(1, &attrs).unwrap(), 2);

        let batch = acc.build().unwrap();
        let parents = batch.column(0).as_primitive::<UInt16Type>();
        assert_eq!(parents.values().to_vec(), vec![0, 1, 2]);

        // Ids restart after build
        assert_eq!(acc.append_for_group(5, &attrs).unwrap(), 0);
    }

    #[test]
    fn empty_attribute_sets_still_mint_ids() {
        let mut acc = AttributesAccumulator::new(PayloadType::ScopeAttrs).unwrap();
        assert_eq!(acc.append_for_group(0, &[]).unwrap(), 0);
        assert_eq!(acc.append_for_group(1, &[]).unwrap(), 1);
        assert!(acc.is_empty());
    }

    #[test]
    fn values_land_in_typed_columns() {
        let nested = AnyValue {
            value: Some(any_value::Value::ArrayValue(ArrayValue {
                values: vec![AnyValue {
                    value: Some(any_value::Value::IntValue(1)),
                }],
            })),
        };
        let attrs = vec![
            kv("s", any_value::Value::StringValue("x".into())),
            kv("i", any_value::Value::IntValue(-4)),
            kv("b", any_value::Value::BoolValue(true)),
            KeyValue {
                key: "arr".into(),
                value: Some(nested.clone()),
            },
            KeyValue {
                key: "none".into(),
                value: None,
            },
        ];
        let mut acc = AttributesAccumulator::new(PayloadType::MetricAttrs).unwrap();
        acc.append(3, &attrs).unwrap();
        let batch = acc.build().unwrap();
        assert_eq!(batch.num_rows(), 5);

        let types = batch
            .column_by_name(consts::ATTRIBUTE_TYPE)
            .unwrap()
            .as_primitive::<UInt8Type>();
        assert_eq!(types.values().to_vec(), vec![1, 2, 4, 6, 0]);

        let ser = batch
            .column_by_name(consts::ATTRIBUTE_SER)
            .unwrap()
            .as_binary::<i32>();
        assert!(ser.is_null(0));
        assert_eq!(AnyValue::decode(ser.value(3)).unwrap(), nested);
    }

    #[test]
    fn released_accumulator_rejects_appends() {
        let mut acc = AttributesAccumulator::new(PayloadType::LogAttrs).unwrap();
        acc.release();
        let attrs = vec![kv("k", any_value::Value::IntValue(1))];
        assert!(acc.append(0, &attrs).unwrap_err().is_already_released());
        // Empty sets never touch the builder
        assert!(acc.append(0, &[]).is_ok());
    }
}
