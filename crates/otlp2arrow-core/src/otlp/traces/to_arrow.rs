// OTLP traces to columnar tables
//
// One SPANS row per span. End time is written as a duration from the start,
// status as an optional struct; events and links go to their own tables.

use opentelemetry_proto::tonic::trace::v1::{span::SpanKind, Span, TracesData};

use super::optimizer::optimize;
use super::related::RelatedData;
use crate::accumulator::IdSequence;
use crate::batch::{EncodedBatch, SignalEncoder};
use crate::builder::{ColumnId, RecordBuilder, Value};
use crate::config::{EncoderConfig, TracesSort};
use crate::error::{Error, Result};
use crate::otlp::common::grouping::Optimized;
use crate::otlp::common::resource::EnvelopeColumns;
use crate::schema::{consts, PayloadType, SignalType};
use crate::stats::{Analyzer, BatchStats};

#[derive(Debug, Clone, Copy)]
struct SpanColumns {
    id: ColumnId,
    start_time: ColumnId,
    duration: ColumnId,
    trace_id: ColumnId,
    span_id: ColumnId,
    trace_state: ColumnId,
    parent_span_id: ColumnId,
    flags: ColumnId,
    name: ColumnId,
    kind: ColumnId,
    dropped_attributes_count: ColumnId,
    dropped_events_count: ColumnId,
    dropped_links_count: ColumnId,
    status: ColumnId,
    status_code: ColumnId,
    status_message: ColumnId,
}

impl SpanColumns {
    fn new(builder: &RecordBuilder) -> Result<Self> {
        let status = builder.column(consts::STATUS)?;
        Ok(Self {
            id: builder.column(consts::ID)?,
            start_time: builder.column(consts::START_TIME_UNIX_NANO)?,
            duration: builder.column(consts::DURATION_TIME_UNIX_NANO)?,
            trace_id: builder.column(consts::TRACE_ID)?,
            span_id: builder.column(consts::SPAN_ID)?,
            trace_state: builder.column(consts::TRACE_STATE)?,
            parent_span_id: builder.column(consts::PARENT_SPAN_ID)?,
            flags: builder.column(consts::FLAGS)?,
            name: builder.column(consts::NAME)?,
            kind: builder.column(consts::KIND)?,
            dropped_attributes_count: builder.column(consts::DROPPED_ATTRIBUTES_COUNT)?,
            dropped_events_count: builder.column(consts::DROPPED_EVENTS_COUNT)?,
            dropped_links_count: builder.column(consts::DROPPED_LINKS_COUNT)?,
            status,
            status_code: builder.child(status, consts::STATUS_CODE)?,
            status_message: builder.child(status, consts::STATUS_MESSAGE)?,
        })
    }
}

/// Encodes `TracesData` into SPANS and its related tables
pub struct TracesBuilder {
    sort: TracesSort,
    builder: RecordBuilder,
    columns: SpanColumns,
    envelope: EnvelopeColumns,
    related: RelatedData,
    ids: IdSequence,
    analyzer: Option<Analyzer>,
    released: bool,
}

impl TracesBuilder {
    pub fn new() -> Result<Self> {
        Self::with_config(&EncoderConfig::default())
    }

    pub fn with_config(config: &EncoderConfig) -> Result<Self> {
        let mut builder = RecordBuilder::new(PayloadType::Spans)?;
        let columns = SpanColumns::new(&builder)?;
        builder.set_max_delta(columns.id, u64::from(config.max_id_delta))?;
        Ok(Self {
            sort: config.traces.sort,
            envelope: EnvelopeColumns::new(&builder)?,
            columns,
            builder,
            related: RelatedData::new()?,
            ids: IdSequence::default(),
            analyzer: config
                .stats
                .schema_stats
                .then(|| Analyzer::new(SignalType::Traces)),
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
            return Err(Error::already_released("traces"));
        }
        Ok(())
    }

    fn append_optimized(&mut self, optimized: &Optimized<'_, Span>) -> Result<()> {
        self.builder.reserve(optimized.row_count())?;
        self.related.envelope.reset_grouping();

        let mut scope_ordinal = 0;
        for (resource_ordinal, resource) in optimized.resources.iter().enumerate() {
            for scope in &resource.scopes {
                for span in &scope.items {
                    let id = self.ids.next();
                    self.builder
                        .append(self.columns.id, Value::UInt(u64::from(id)))?;
                    self.envelope.append(
                        &mut self.builder,
                        &mut self.related.envelope,
                        resource_ordinal,
                        resource,
                        scope_ordinal,
                        scope,
                    )?;
                    self.append_span(id, span)?;
                }
                scope_ordinal += 1;
            }
        }
        Ok(())
    }

    fn append_span(&mut self, id: u32, span: &Span) -> Result<()> {
        let c = self.columns;
        let builder = &mut self.builder;
        builder.append(c.start_time, Value::timestamp(span.start_time_unix_nano))?;
        builder.append(
            c.duration,
            Value::Int(span.end_time_unix_nano.wrapping_sub(span.start_time_unix_nano) as i64),
        )?;
        builder.append(c.trace_id, Value::non_empty_bytes(&span.trace_id))?;
        builder.append(c.span_id, Value::non_empty_bytes(&span.span_id))?;
        builder.append(c.trace_state, Value::non_empty_str(&span.trace_state))?;
        builder.append(c.parent_span_id, Value::non_empty_bytes(&span.parent_span_id))?;
        builder.append(c.flags, Value::non_zero(u64::from(span.flags)))?;
        builder.append(c.name, Value::Str(&span.name))?;
        builder.append(
            c.kind,
            if span.kind == 0 {
                Value::Null
            } else {
                Value::Int(i64::from(span.kind))
            },
        )?;
        builder.append(
            c.dropped_attributes_count,
            Value::non_zero(u64::from(span.dropped_attributes_count)),
        )?;
        builder.append(
            c.dropped_events_count,
            Value::non_zero(u64::from(span.dropped_events_count)),
        )?;
        builder.append(
            c.dropped_links_count,
            Value::non_zero(u64::from(span.dropped_links_count)),
        )?;
        match &span.status {
            Some(status) => {
                builder.append_struct(c.status, true)?;
                builder.append(c.status_code, Value::Int(i64::from(status.code)))?;
                builder.append(c.status_message, Value::non_empty_str(&status.message))?;
            }
            None => builder.append_struct(c.status, false)?,
        }

        self.related.span_attrs.append(id, &span.attributes)?;
        self.related.events.append(id, &span.events)?;
        self.related.links.append(id, &span.links)
    }

    fn try_build(&mut self) -> Result<EncodedBatch> {
        let mut tables = vec![(PayloadType::Spans, self.builder.build()?)];
        tables.extend(
            self.related
                .build()?
                .into_iter()
                .filter(|(_, table)| table.num_rows() > 0),
        );
        EncodedBatch::new(SignalType::Traces, tables)
    }

    fn reset(&mut self) {
        self.ids.reset();
        self.builder.reset();
        self.related.reset();
    }
}

fn kind_name(kind: i32) -> &'static str {
    SpanKind::try_from(kind)
        .map(|k| k.as_str_name())
        .unwrap_or("SPAN_KIND_UNKNOWN")
}

fn batch_stats(optimized: &Optimized<'_, Span>) -> BatchStats {
    let mut stats = BatchStats {
        resource_groups: optimized.resources.len(),
        scope_groups: optimized.scope_count(),
        rows: optimized.row_count(),
        ..Default::default()
    };
    for span in optimized.rows() {
        stats.count_kind(kind_name(span.kind));
        stats.children += span.events.len() + span.links.len();
        stats.attributes += span.attributes.len()
            + span.events.iter().map(|e| e.attributes.len()).sum::<usize>()
            + span.links.iter().map(|l| l.attributes.len()).sum::<usize>();
    }
    stats.count_name_runs(optimized.rows().map(|s| s.name.as_str()));
    stats
}

impl SignalEncoder for TracesBuilder {
    type Input = TracesData;

    fn signal(&self) -> SignalType {
        SignalType::Traces
    }

    fn append(&mut self, input: &TracesData) -> Result<()> {
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
            spans = batch.num_rows(),
            tables = batch.tables().len(),
            "built traces batch"
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
        self.related.release();
    }

    fn is_released(&self) -> bool {
        self.released
    }
}
