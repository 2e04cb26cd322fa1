// OTLP logs to columnar tables
//
// One LOGS row per log record. The body is stored inline as a struct using
// the attribute value layout; record attributes go to LOG_ATTRS.

use opentelemetry_proto::tonic::logs::v1::{LogRecord, LogsData, SeverityNumber};

use super::optimizer::optimize;
use crate::accumulator::any_value::AnyValueColumns;
use crate::accumulator::{AttributesAccumulator, IdSequence};
use crate::batch::{EncodedBatch, SignalEncoder};
use crate::builder::{ColumnId, RecordBuilder, Value};
use crate::config::{EncoderConfig, LogsSort};
use crate::error::{Error, Result};
use crate::otlp::common::grouping::Optimized;
use crate::otlp::common::resource::{EnvelopeAttributes, EnvelopeColumns};
use crate::schema::{consts, PayloadType, SignalType};
use crate::stats::{Analyzer, BatchStats};

#[derive(Debug, Clone, Copy)]
struct LogColumns {
    id: ColumnId,
    time: ColumnId,
    observed_time: ColumnId,
    trace_id: ColumnId,
    span_id: ColumnId,
    severity_number: ColumnId,
    severity_text: ColumnId,
    body: ColumnId,
    body_value: AnyValueColumns,
    dropped_attributes_count: ColumnId,
    flags: ColumnId,
}

impl LogColumns {
    fn new(builder: &RecordBuilder) -> Result<Self> {
        let body = builder.column(consts::BODY)?;
        Ok(Self {
            id: builder.column(consts::ID)?,
            time: builder.column(consts::TIME_UNIX_NANO)?,
            observed_time: builder.column(consts::OBSERVED_TIME_UNIX_NANO)?,
            trace_id: builder.column(consts::TRACE_ID)?,
            span_id: builder.column(consts::SPAN_ID)?,
            severity_number: builder.column(consts::SEVERITY_NUMBER)?,
            severity_text: builder.column(consts::SEVERITY_TEXT)?,
            body,
            body_value: AnyValueColumns::children(builder, body)?,
            dropped_attributes_count: builder.column(consts::DROPPED_ATTRIBUTES_COUNT)?,
            flags: builder.column(consts::FLAGS)?,
        })
    }
}

/// Encodes `LogsData` into LOGS and its related tables
pub struct LogsBuilder {
    sort: LogsSort,
    builder: RecordBuilder,
    columns: LogColumns,
    envelope: EnvelopeColumns,
    envelope_attrs: EnvelopeAttributes,
    log_attrs: AttributesAccumulator,
    ids: IdSequence,
    analyzer: Option<Analyzer>,
    released: bool,
}

impl LogsBuilder {
    pub fn new() -> Result<Self> {
        Self::with_config(&EncoderConfig::default())
    }

    pub fn with_config(config: &EncoderConfig) -> Result<Self> {
        let mut builder = RecordBuilder::new(PayloadType::Logs)?;
        let columns = LogColumns::new(&builder)?;
        builder.set_max_delta(columns.id, u64::from(config.max_id_delta))?;
        Ok(Self {
            sort: config.logs.sort,
            envelope: EnvelopeColumns::new(&builder)?,
            columns,
            builder,
            envelope_attrs: EnvelopeAttributes::new()?,
            log_attrs: AttributesAccumulator::new(PayloadType::LogAttrs)?,
            ids: IdSequence::default(),
            analyzer: config
                .stats
                .schema_stats
                .then(|| Analyzer::new(SignalType::Logs)),
            released: false,
        })
    }

    pub fn analyzer(&self) -> Option<&Analyzer> {
        self.analyzer.as_ref()
    }

    pub fn len(&self) -> usize {
        self.builder.len()
    }

    pub fn is_empty(&self) -> bool {
        self.builder.is_empty()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.released {
            return Err(Error::already_released("logs"));
        }
        Ok(())
    }

    fn append_optimized(&mut self, optimized: &Optimized<'_, LogRecord>) -> Result<()> {
        self.builder.reserve(optimized.row_count())?;
        self.envelope_attrs.reset_grouping();

        let mut scope_ordinal = 0;
        for (resource_ordinal, resource) in optimized.resources.iter().enumerate() {
            for scope in &resource.scopes {
                for record in &scope.items {
                    let id = self.ids.next();
                    self.builder
                        .append(self.columns.id, Value::UInt(u64::from(id)))?;
                    self.envelope.append(
                        &mut self.builder,
                        &mut self.envelope_attrs,
                        resource_ordinal,
                        resource,
                        scope_ordinal,
                        scope,
                    )?;
                    self.append_record(id, record)?;
                }
                scope_ordinal += 1;
            }
        }
        Ok(())
    }

    fn append_record(&mut self, id: u32, record: &LogRecord) -> Result<()> {
        let columns = self.columns;
        let builder = &mut self.builder;
        builder.append(columns.time, Value::timestamp_or_null(record.time_unix_nano))?;
        builder.append(
            columns.observed_time,
            Value::timestamp_or_null(record.observed_time_unix_nano),
        )?;
        builder.append(columns.trace_id, Value::non_empty_bytes(&record.trace_id))?;
        builder.append(columns.span_id, Value::non_empty_bytes(&record.span_id))?;
        builder.append(
            columns.severity_number,
            if record.severity_number == 0 {
                Value::Null
            } else {
                Value::Int(i64::from(record.severity_number))
            },
        )?;
        builder.append(
            columns.severity_text,
            Value::non_empty_str(&record.severity_text),
        )?;
        match &record.body {
            Some(body) => {
                builder.append_struct(columns.body, true)?;
                columns.body_value.append(builder, Some(body))?;
            }
            None => builder.append_struct(columns.body, false)?,
        }
        builder.append(
            columns.dropped_attributes_count,
            Value::non_zero(u64::from(record.dropped_attributes_count)),
        )?;
        builder.append(columns.flags, Value::non_zero(u64::from(record.flags)))?;
        self.log_attrs.append(id, &record.attributes)
    }

    fn try_build(&mut self) -> Result<EncodedBatch> {
        let mut tables = vec![(PayloadType::Logs, self.builder.build()?)];
        tables.extend(self.envelope_attrs.build()?);
        tables.push((PayloadType::LogAttrs, self.log_attrs.build()?));
        tables.retain(|(payload, table)| *payload == PayloadType::Logs || table.num_rows() > 0);
        EncodedBatch::new(SignalType::Logs, tables)
    }

    fn reset(&mut self) {
        self.ids.reset();
        self.builder.reset();
        self.envelope_attrs.reset();
        self.log_attrs.reset();
    }
}

fn severity_name(severity: i32) -> &'static str {
    SeverityNumber::try_from(severity)
        .map(|s| s.as_str_name())
        .unwrap_or("SEVERITY_NUMBER_UNKNOWN")
}

fn batch_stats(optimized: &Optimized<'_, LogRecord>) -> BatchStats {
    let mut stats = BatchStats {
        resource_groups: optimized.resources.len(),
        scope_groups: optimized.scope_count(),
        rows: optimized.row_count(),
        ..Default::default()
    };
    for record in optimized.rows() {
        stats.count_kind(severity_name(record.severity_number));
        stats.attributes += record.attributes.len();
    }
    stats.count_name_runs(optimized.rows().map(|r| r.severity_text.as_str()));
    stats
}

impl SignalEncoder for LogsBuilder {
    type Input = LogsData;

    fn signal(&self) -> SignalType {
        SignalType::Logs
    }

    fn append(&mut self, input: &LogsData) -> Result<()> {
        self.ensure_open()?;
        let optimized = optimize(input, self.sort);
        if let Err(err) = self.append_optimized(&optimized) {
            self.reset();
            return Err(err);
        }
        if let Some(analyzer) = self.analyzer.as_mut() {
            analyzer.observe(&batch_stats(&optimized));
        }
        Ok(())
    }

    fn build(&mut self) -> Result<EncodedBatch> {
        self.ensure_open()?;
        let result = self.try_build();
        self.reset();
        let batch = result?;
        tracing::debug!(
            logs = batch.num_rows(),
            tables = batch.tables().len(),
            "built logs batch"
        );
        if let Some(analyzer) = self.analyzer.as_mut() {
            analyzer.observe_build(&batch);
        }
        Ok(batch)
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.builder.release();
        self.envelope_attrs.release();
        self.log_attrs.release();
    }

    fn is_released(&self) -> bool {
        self.released
    }
}
