// SPAN_EVENTS and SPAN_LINKS
//
// Events and links are child rows of a span: parent_id is the span id and each
// row gets its own id keying its attribute table.

use arrow::array::RecordBatch;
use opentelemetry_proto::tonic::trace::v1::span::{Event, Link};

use crate::accumulator::{AttributesAccumulator, IdSequence};
use crate::builder::{ColumnId, RecordBuilder, Value};
use crate::error::Result;
use crate::otlp::common::resource::EnvelopeAttributes;
use crate::schema::{consts, PayloadType};

type Tables = Vec<(PayloadType, RecordBatch)>;

pub(crate) struct EventsAccumulator {
    builder: RecordBuilder,
    ids: IdSequence,
    id: ColumnId,
    parent_id: ColumnId,
    time: ColumnId,
    name: ColumnId,
    dropped_attributes_count: ColumnId,
    attrs: AttributesAccumulator,
}

impl EventsAccumulator {
    fn new() -> Result<Self> {
        let builder = RecordBuilder::new(PayloadType::SpanEvents)?;
        Ok(Self {
            id: builder.column(consts::ID)?,
            parent_id: builder.column(consts::PARENT_ID)?,
            time: builder.column(consts::TIME_UNIX_NANO)?,
            name: builder.column(consts::NAME)?,
            dropped_attributes_count: builder.column(consts::DROPPED_ATTRIBUTES_COUNT)?,
            builder,
            ids: IdSequence::default(),
            attrs: AttributesAccumulator::new(PayloadType::SpanEventAttrs)?,
        })
    }

    pub(crate) fn append(&mut self, parent_id: u32, events: &[Event]) -> Result<()> {
        for event in events {
            let id = self.ids.next();
            self.builder.append(self.id, Value::UInt(u64::from(id)))?;
            self.builder
                .append(self.parent_id, Value::UInt(u64::from(parent_id)))?;
            self.builder
                .append(self.time, Value::timestamp_or_null(event.time_unix_nano))?;
            self.builder
                .append(self.name, Value::non_empty_str(&event.name))?;
            self.builder.append(
                self.dropped_attributes_count,
                Value::non_zero(u64::from(event.dropped_attributes_count)),
            )?;
            self.attrs.append(id, &event.attributes)?;
        }
        Ok(())
    }

    fn build(&mut self, tables: &mut Tables) -> Result<()> {
        self.ids.reset();
        tables.push((PayloadType::SpanEvents, self.builder.build()?));
        tables.push((PayloadType::SpanEventAttrs, self.attrs.build()?));
        Ok(())
    }

    fn reset(&mut self) {
        self.ids.reset();
        self.builder.reset();
        self.attrs.reset();
    }

    fn release(&mut self) {
        self.builder.release();
        self.attrs.release();
    }
}

pub(crate) struct LinksAccumulator {
    builder: RecordBuilder,
    ids: IdSequence,
    id: ColumnId,
    parent_id: ColumnId,
    trace_id: ColumnId,
    span_id: ColumnId,
    trace_state: ColumnId,
    flags: ColumnId,
    dropped_attributes_count: ColumnId,
    attrs: AttributesAccumulator,
}

impl LinksAccumulator {
    fn new() -> Result<Self> {
        let builder = RecordBuilder::new(PayloadType::SpanLinks)?;
        Ok(Self {
            id: builder.column(consts::ID)?,
            parent_id: builder.column(consts::PARENT_ID)?,
            trace_id: builder.column(consts::TRACE_ID)?,
            span_id: builder.column(consts::SPAN_ID)?,
            trace_state: builder.column(consts::TRACE_STATE)?,
            flags: builder.column(consts::FLAGS)?,
            dropped_attributes_count: builder.column(consts::DROPPED_ATTRIBUTES_COUNT)?,
            builder,
            ids: IdSequence::default(),
            attrs: AttributesAccumulator::new(PayloadType::SpanLinkAttrs)?,
        })
    }

    pub(crate) fn append(&mut self, parent_id: u32, links: &[Link]) -> Result<()> {
        for link in links {
            let id = self.ids.next();
            self.builder.append(self.id, Value::UInt(u64::from(id)))?;
            self.builder
                .append(self.parent_id, Value::UInt(u64::from(parent_id)))?;
            self.builder
                .append(self.trace_id, Value::non_empty_bytes(&link.trace_id))?;
            self.builder
                .append(self.span_id, Value::non_empty_bytes(&link.span_id))?;
            self.builder
                .append(self.trace_state, Value::non_empty_str(&link.trace_state))?;
            self.builder
                .append(self.flags, Value::non_zero(u64::from(link.flags)))?;
            self.builder.append(
                self.dropped_attributes_count,
                Value::non_zero(u64::from(link.dropped_attributes_count)),
            )?;
            self.attrs.append(id, &link.attributes)?;
        }
        Ok(())
    }

    fn build(&mut self, tables: &mut Tables) -> Result<()> {
        self.ids.reset();
        tables.push((PayloadType::SpanLinks, self.builder.build()?));
        tables.push((PayloadType::SpanLinkAttrs, self.attrs.build()?));
        Ok(())
    }

    fn reset(&mut self) {
        self.ids.reset();
        self.builder.reset();
        self.attrs.reset();
    }

    fn release(&mut self) {
        self.builder.release();
        self.attrs.release();
    }
}

/// Every table related to SPANS, owned by the traces builder
pub(crate) struct RelatedData {
    pub(crate) envelope: EnvelopeAttributes,
    pub(crate) span_attrs: AttributesAccumulator,
    pub(crate) events: EventsAccumulator,
    pub(crate) links: LinksAccumulator,
}

impl RelatedData {
    pub(crate) fn new() -> Result<Self> {
        Ok(Self {
            envelope: EnvelopeAttributes::new()?,
            span_attrs: AttributesAccumulator::new(PayloadType::SpanAttrs)?,
            events: EventsAccumulator::new()?,
            links: LinksAccumulator::new()?,
        })
    }

    pub(crate) fn build(&mut self) -> Result<Tables> {
        let mut tables = self.envelope.build()?;
        tables.push((PayloadType::SpanAttrs, self.span_attrs.build()?));
        self.events.build(&mut tables)?;
        self.links.build(&mut tables)?;
        Ok(tables)
    }

    pub(crate) fn reset(&mut self) {
        self.envelope.reset();
        self.span_attrs.reset();
        self.events.reset();
        self.links.reset();
    }

    pub(crate) fn release(&mut self) {
        self.envelope.release();
        self.span_attrs.release();
        self.events.release();
        self.links.release();
    }
}
