//! Column builder adapter
//!
//! `RecordBuilder` owns one typed builder per schema column and exposes a
//! uniform lifecycle: `reserve` → `append`* → `build` → ... → `release`.
//! Builders are re-created from the schema after every `build`, whether it
//! succeeded or not, so a failed batch never leaks into the next one.

mod column;

pub use column::Value;

use arrow::array::RecordBatch;
use arrow::datatypes::{Schema, SchemaRef};
use arrow::error::ArrowError;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::schema::{schema_for, ColumnHints, PayloadType};
use column::{retype, AppendError, Appended, Column};

/// Resolved position of a column (or of a struct child) in a table schema
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnId {
    index: usize,
    child: Option<usize>,
}

#[derive(Debug, Clone, Copy, Default)]
struct DeltaTracker {
    last: Option<u64>,
    max_delta: Option<u64>,
}

impl DeltaTracker {
    fn check(&self, value: u64) -> std::result::Result<(), String> {
        let Some(last) = self.last else {
            return Ok(());
        };
        if value < last {
            return Err(format!(
                "delta encoded column must be non-decreasing, got {value} after {last}"
            ));
        }
        if let Some(max) = self.max_delta {
            if value - last > max {
                return Err(format!(
                    "delta {} between {last} and {value} exceeds maximum {max}",
                    value - last
                ));
            }
        }
        Ok(())
    }
}

/// Row-oriented writer for one columnar table
pub struct RecordBuilder {
    payload: PayloadType,
    schema: SchemaRef,
    columns: Vec<Column>,
    deltas: Vec<Option<DeltaTracker>>,
    released: bool,
}

impl RecordBuilder {
    pub fn new(payload: PayloadType) -> Result<Self> {
        let schema = schema_for(payload);
        let columns = Self::create_columns(payload, &schema, 0)?;
        let deltas = schema
            .fields()
            .iter()
            .map(|field| ColumnHints::of(field).delta.then(DeltaTracker::default))
            .collect();
        Ok(Self {
            payload,
            schema,
            columns,
            deltas,
            released: false,
        })
    }

    fn create_columns(
        payload: PayloadType,
        schema: &Schema,
        capacity: usize,
    ) -> Result<Vec<Column>> {
        schema
            .fields()
            .iter()
            .map(|field| Column::new(field.data_type(), capacity))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|source| Error::Build { payload, source })
    }

    pub fn payload(&self) -> PayloadType {
        self.payload
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Number of rows appended since the last build
    pub fn len(&self) -> usize {
        self.columns.first().map(Column::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ensure_open(&self) -> Result<()> {
        if self.released {
            return Err(Error::already_released(self.builder_name()));
        }
        Ok(())
    }

    fn builder_name(&self) -> &'static str {
        self.payload.as_str()
    }

    /// Resolve a top-level column by name
    pub fn column(&self, name: &str) -> Result<ColumnId> {
        self.schema
            .index_of(name)
            .map(|index| ColumnId { index, child: None })
            .map_err(|_| Error::Schema {
                payload: self.payload,
                column: name.to_string(),
            })
    }

    /// Resolve a child of a struct column by name
    pub fn child(&self, parent: ColumnId, name: &str) -> Result<ColumnId> {
        let missing = || Error::Schema {
            payload: self.payload,
            column: format!("{}.{}", self.schema.field(parent.index).name(), name),
        };
        if parent.child.is_some() {
            return Err(missing());
        }
        match self.schema.field(parent.index).data_type() {
            arrow::datatypes::DataType::Struct(fields) => fields
                .find(name)
                .map(|(child, _)| ColumnId {
                    index: parent.index,
                    child: Some(child),
                })
                .ok_or_else(missing),
            _ => Err(missing()),
        }
    }

    fn column_name(&self, id: ColumnId) -> String {
        let field = self.schema.field(id.index);
        match (id.child, field.data_type()) {
            (Some(child), arrow::datatypes::DataType::Struct(fields)) => {
                format!("{}.{}", field.name(), fields[child].name())
            }
            _ => field.name().clone(),
        }
    }

    /// Cap the step between consecutive values of a delta encoded column
    pub fn set_max_delta(&mut self, column: ColumnId, max_delta: u64) -> Result<()> {
        let is_delta = column.child.is_none()
            && matches!(self.deltas.get(column.index), Some(Some(_)));
        if !is_delta {
            return Err(Error::Schema {
                payload: self.payload,
                column: format!("{} (delta encoded)", self.column_name(column)),
            });
        }
        if let Some(Some(tracker)) = self.deltas.get_mut(column.index) {
            tracker.max_delta = Some(max_delta);
        }
        Ok(())
    }

    /// Capacity hint; only applied while the table is empty
    pub fn reserve(&mut self, rows: usize) -> Result<()> {
        self.ensure_open()?;
        if self.is_empty() && rows > 0 {
            self.columns = Self::create_columns(self.payload, &self.schema, rows)?;
        }
        Ok(())
    }

    fn slot(&mut self, id: ColumnId) -> Option<&mut Column> {
        let column = self.columns.get_mut(id.index)?;
        match (id.child, column) {
            (None, column) => Some(column),
            (Some(child), Column::Struct(s)) => s.children.get_mut(child),
            (Some(_), _) => None,
        }
    }

    /// Append one value; on failure the error names the table, column and row
    pub fn append(&mut self, id: ColumnId, value: Value<'_>) -> Result<()> {
        self.ensure_open()?;
        let payload = self.payload;

        if id.child.is_none() {
            if let Some(Some(tracker)) = self.deltas.get(id.index) {
                let raw = match value {
                    Value::UInt(v) => Some(Ok(v)),
                    Value::Int(v) => Some(u64::try_from(v).map_err(|_| {
                        format!("delta encoded column must be non-negative, got {v}")
                    })),
                    _ => None,
                };
                if let Some(raw) = raw {
                    if let Err(reason) = raw.and_then(|raw| tracker.check(raw)) {
                        let row = self.columns[id.index].len();
                        return Err(Error::column_append(
                            payload,
                            self.column_name(id),
                            row,
                            reason,
                        ));
                    }
                }
            }
        }

        let Some(column) = self.slot(id) else {
            return Err(Error::Schema {
                payload,
                column: format!("#{}", id.index),
            });
        };
        let row = column.len();
        match column.append(value) {
            Ok(appended) => {
                if appended == Appended::DictionaryFallback {
                    tracing::debug!(
                        payload = %payload,
                        column = %self.column_name(id),
                        row,
                        "dictionary key space exhausted, column continues as plain strings"
                    );
                }
                if let Some(Some(tracker)) = self.deltas.get_mut(id.index) {
                    if id.child.is_none() {
                        match value {
                            Value::UInt(v) => tracker.last = Some(v),
                            Value::Int(v) => {
                                if let Ok(v) = u64::try_from(v) {
                                    tracker.last = Some(v);
                                }
                            }
                            _ => {}
                        }
                    }
                }
                Ok(())
            }
            Err(reason) => Err(self.append_error(id, row, reason)),
        }
    }

    /// Mark the next row of a struct column valid or null
    ///
    /// A null row fills every child with null; a valid row expects each child
    /// to be appended separately.
    pub fn append_struct(&mut self, id: ColumnId, valid: bool) -> Result<()> {
        self.ensure_open()?;
        let payload = self.payload;
        let Some(column) = self.slot(id).filter(|c| c.is_struct()) else {
            return Err(Error::Schema {
                payload,
                column: format!("{} (struct)", self.column_name(id)),
            });
        };
        let row = column.len();
        let outcome = if valid {
            column.append_struct_valid()
        } else {
            column.append(Value::Null).map(|_| ())
        };
        outcome.map_err(|reason| self.append_error(id, row, reason))
    }

    fn append_error(&self, id: ColumnId, row: usize, reason: AppendError) -> Error {
        Error::column_append(self.payload, self.column_name(id), row, reason.to_string())
    }

    /// Drain all columns into a record batch and start a fresh table
    pub fn build(&mut self) -> Result<RecordBatch> {
        self.ensure_open()?;
        let result = self.try_build();
        self.reset();
        result.map_err(|source| Error::Build {
            payload: self.payload,
            source,
        })
    }

    fn try_build(&mut self) -> std::result::Result<RecordBatch, ArrowError> {
        let arrays = self
            .columns
            .iter_mut()
            .map(Column::finish)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let fields: Vec<_> = self
            .schema
            .fields()
            .iter()
            .zip(&arrays)
            .map(|(field, array)| retype(field, array.data_type()))
            .collect();
        let schema = Schema::new_with_metadata(fields, self.schema.metadata().clone());
        RecordBatch::try_new(Arc::new(schema), arrays)
    }

    /// Discard pending rows and re-create every builder from the schema
    pub fn reset(&mut self) {
        match Self::create_columns(self.payload, &self.schema, 0) {
            Ok(columns) => self.columns = columns,
            // Schemas are validated at construction; keep the drained builders otherwise
            Err(err) => tracing::warn!(payload = %self.payload, error = %err, "failed to reset builders"),
        }
        for tracker in self.deltas.iter_mut().flatten() {
            tracker.last = None;
        }
    }

    /// Free builder memory; idempotent
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.columns = Vec::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::consts;
    use arrow::array::{Array, AsArray};
    use arrow::datatypes::{DataType, UInt16Type};

    fn metrics_row(builder: &mut RecordBuilder, id: u64, name: &str) -> Result<()> {
        let id_col = builder.column(consts::ID)?;
        let resource = builder.column(consts::RESOURCE)?;
        let scope = builder.column(consts::SCOPE)?;
        builder.append(id_col, Value::UInt(id))?;
        builder.append_struct(resource, false)?;
        builder.append_struct(scope, false)?;
        for column in [
            consts::SCHEMA_URL,
            consts::DESCRIPTION,
            consts::UNIT,
            consts::AGGREGATION_TEMPORALITY,
            consts::IS_MONOTONIC,
        ] {
            let column = builder.column(column)?;
            builder.append(column, Value::Null)?;
        }
        let metric_type = builder.column(consts::METRIC_TYPE)?;
        builder.append(metric_type, Value::UInt(1))?;
        let name_col = builder.column(consts::NAME)?;
        builder.append(name_col, Value::Str(name))
    }

    #[test]
    fn builds_batch_with_schema_metadata() {
        let mut builder = RecordBuilder::new(PayloadType::Metrics).unwrap();
        metrics_row(&mut builder, 0, "cpu").unwrap();
        metrics_row(&mut builder, 1, "mem").unwrap();
        assert_eq!(builder.len(), 2);

        let batch = builder.build().unwrap();
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(
            batch.schema().metadata().get(crate::schema::METADATA_PAYLOAD_TYPE),
            Some(&"METRICS".to_string())
        );
        let ids = batch.column(0).as_primitive::<UInt16Type>();
        assert_eq!(ids.values().to_vec(), vec![0, 1]);
        assert!(batch.column(1).is_null(0));
        assert!(builder.is_empty());
    }

    #[test]
    fn delta_violation_names_column_and_row() {
        let mut builder = RecordBuilder::new(PayloadType::Metrics).unwrap();
        let id = builder.column(consts::ID).unwrap();
        builder.set_max_delta(id, 1).unwrap();
        builder.append(id, Value::UInt(0)).unwrap();
        builder.append(id, Value::UInt(1)).unwrap();

        let err = builder.append(id, Value::UInt(3)).unwrap_err();
        match err {
            Error::ColumnAppend {
                payload,
                column,
                row,
                reason,
            } => {
                assert_eq!(payload, PayloadType::Metrics);
                assert_eq!(column, "id");
                assert_eq!(row, 2);
                assert!(reason.contains("exceeds maximum 1"));
            }
            other => panic!("unexpected error {other}"),
        }

        let err = builder.append(id, Value::UInt(0)).unwrap_err();
        assert!(err.to_string().contains("non-decreasing"));
    }

    #[test]
    fn negative_delta_values_are_rejected_without_restarting_the_check() {
        let mut builder = RecordBuilder::new(PayloadType::Metrics).unwrap();
        let id = builder.column(consts::ID).unwrap();
        builder.append(id, Value::Int(5)).unwrap();

        let err = builder.append(id, Value::Int(-1)).unwrap_err();
        assert!(matches!(err, Error::ColumnAppend { row: 1, .. }), "{err}");
        assert!(err.to_string().contains("non-negative"));

        // The last accepted value still anchors the check
        let err = builder.append(id, Value::Int(2)).unwrap_err();
        assert!(err.to_string().contains("non-decreasing"));
        builder.append(id, Value::Int(5)).unwrap();
    }

    #[test]
    fn unknown_columns_are_schema_errors() {
        let builder = RecordBuilder::new(PayloadType::Logs).unwrap();
        assert!(matches!(
            builder.column("nope"),
            Err(Error::Schema { .. })
        ));
        let resource = builder.column(consts::RESOURCE).unwrap();
        assert!(builder.child(resource, consts::ID).is_ok());
        assert!(builder.child(resource, "nope").is_err());
        let id = builder.column(consts::ID).unwrap();
        assert!(builder.child(id, "x").is_err());
    }

    #[test]
    fn failed_build_resets_builders() {
        let mut builder = RecordBuilder::new(PayloadType::Metrics).unwrap();
        let id = builder.column(consts::ID).unwrap();
        // Only one column gets a row, so column lengths disagree
        builder.append(id, Value::UInt(0)).unwrap();

        let err = builder.build().unwrap_err();
        assert!(matches!(err, Error::Build { .. }));
        assert!(builder.is_empty());

        metrics_row(&mut builder, 0, "cpu").unwrap();
        assert_eq!(builder.build().unwrap().num_rows(), 1);
    }

    #[test]
    fn release_is_idempotent_and_terminal() {
        let mut builder = RecordBuilder::new(PayloadType::SpanAttrs).unwrap();
        builder.release();
        builder.release();
        assert!(builder.is_released());
        assert!(builder.build().unwrap_err().is_already_released());
        let key = builder.column(consts::KEY).unwrap();
        assert!(builder
            .append(key, Value::Str("k"))
            .unwrap_err()
            .is_already_released());
        assert!(builder.reserve(10).unwrap_err().is_already_released());
    }

    #[test]
    fn reserve_only_applies_to_empty_tables() {
        let mut builder = RecordBuilder::new(PayloadType::Metrics).unwrap();
        builder.reserve(1024).unwrap();
        metrics_row(&mut builder, 0, "cpu").unwrap();
        builder.reserve(4096).unwrap();
        assert_eq!(builder.len(), 1);
    }

    #[test]
    fn schema_reflects_dictionary_fallback() {
        let mut builder = RecordBuilder::new(PayloadType::Metrics).unwrap();
        for i in 0..300u64 {
            metrics_row(&mut builder, i, &format!("metric-{i}")).unwrap();
        }
        let batch = builder.build().unwrap();
        let name = batch.schema().field_with_name(consts::NAME).unwrap().clone();
        assert_eq!(name.data_type(), &DataType::Utf8);
        assert!(ColumnHints::of(&name).dictionary.is_some());
        assert_eq!(batch.column_by_name(consts::NAME).unwrap().as_string::<i32>().value(299), "metric-299");

        // Fresh builders start dictionary encoded again
        metrics_row(&mut builder, 0, "cpu").unwrap();
        let batch = builder.build().unwrap();
        assert!(matches!(
            batch.schema().field_with_name(consts::NAME).unwrap().data_type(),
            DataType::Dictionary(_, _)
        ));
    }
}
