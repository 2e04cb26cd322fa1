// Columnar tables back to OTLP traces

use arrow::array::Array;
use arrow::datatypes::{DurationNanosecondType, Int32Type, TimestampNanosecondType};
use opentelemetry_proto::tonic::trace::v1::{
    span::{Event, Link},
    ResourceSpans, ScopeSpans, Span, Status, TracesData,
};

use crate::batch::EncodedBatch;
use crate::decode::{
    bytes_or_default, get, get_u32, nanos, string_or_default, AttributeIndex, Children,
    EnvelopeReader, Table,
};
use crate::error::{Error, Result};
use crate::schema::{consts, PayloadType, SignalType};

/// Rebuilds `TracesData` from an encoded traces batch
#[derive(Debug, Default, Clone, Copy)]
pub struct TracesDecoder;

impl TracesDecoder {
    pub fn decode(batch: &EncodedBatch) -> Result<TracesData> {
        if batch.signal() != SignalType::Traces {
            return Err(Error::decode(
                PayloadType::Spans,
                format!("expected a traces batch, got {}", batch.signal()),
            ));
        }
        let primary = Table::from_batch(PayloadType::Spans, batch.primary());
        let ids = primary.u32s(consts::ID)?;
        let start = primary.primitive::<TimestampNanosecondType>(consts::START_TIME_UNIX_NANO)?;
        let duration = primary.primitive::<DurationNanosecondType>(consts::DURATION_TIME_UNIX_NANO)?;
        let trace_ids = primary.binary(consts::TRACE_ID)?;
        let span_ids = primary.binary(consts::SPAN_ID)?;
        let trace_states = primary.strings(consts::TRACE_STATE)?;
        let parent_span_ids = primary.binary(consts::PARENT_SPAN_ID)?;
        let flags = primary.u32s(consts::FLAGS)?;
        let names = primary.strings(consts::NAME)?;
        let kinds = primary.primitive::<Int32Type>(consts::KIND)?;
        let dropped_attributes = primary.u32s(consts::DROPPED_ATTRIBUTES_COUNT)?;
        let dropped_events = primary.u32s(consts::DROPPED_EVENTS_COUNT)?;
        let dropped_links = primary.u32s(consts::DROPPED_LINKS_COUNT)?;
        let status_valid = primary.structs(consts::STATUS)?.nulls().cloned();
        let status = primary.nested(consts::STATUS)?;
        let status_codes = status.primitive::<Int32Type>(consts::STATUS_CODE)?;
        let status_messages = status.strings(consts::STATUS_MESSAGE)?;

        let mut attrs = AttributeIndex::load(batch, PayloadType::SpanAttrs)?;
        let mut events = events(batch)?;
        let mut links = links(batch)?;

        let mut spans = Vec::with_capacity(primary.len());
        for row in 0..primary.len() {
            let id = get_u32(&ids, row)
                .ok_or_else(|| primary.error(format!("null id at row {row}")))?;
            let start_time_unix_nano = nanos(start, row);
            let elapsed = get(duration, row).unwrap_or(0) as u64;
            let status = status_valid
                .as_ref()
                .map_or(true, |n| n.is_valid(row))
                .then(|| Status {
                    message: string_or_default(&status_messages, row),
                    code: get(status_codes, row).unwrap_or(0),
                });

            spans.push(Span {
                trace_id: bytes_or_default(trace_ids, row),
                span_id: bytes_or_default(span_ids, row),
                trace_state: string_or_default(&trace_states, row),
                parent_span_id: bytes_or_default(parent_span_ids, row),
                flags: get_u32(&flags, row).unwrap_or(0),
                name: string_or_default(&names, row),
                kind: get(kinds, row).unwrap_or(0),
                start_time_unix_nano,
                end_time_unix_nano: start_time_unix_nano.wrapping_add(elapsed),
                attributes: attrs.take(id),
                dropped_attributes_count: get_u32(&dropped_attributes, row).unwrap_or(0),
                events: events.take(id),
                dropped_events_count: get_u32(&dropped_events, row).unwrap_or(0),
                links: links.take(id),
                dropped_links_count: get_u32(&dropped_links, row).unwrap_or(0),
                status,
            });
        }

        let envelope = EnvelopeReader::new(batch, &primary)?;
        let resource_spans = envelope.assemble(
            spans,
            |scope, schema_url, spans| ScopeSpans {
                scope,
                spans,
                schema_url,
            },
            |resource, schema_url, scope_spans| ResourceSpans {
                resource,
                scope_spans,
                schema_url,
            },
        );
        Ok(TracesData { resource_spans })
    }
}

fn events(batch: &EncodedBatch) -> Result<Children<Event>> {
    let mut children = Children::default();
    let Some(records) = batch.table(PayloadType::SpanEvents) else {
        return Ok(children);
    };
    let table = Table::from_batch(PayloadType::SpanEvents, records);
    let ids = table.u32s(consts::ID)?;
    let parents = table.u32s(consts::PARENT_ID)?;
    let time = table.primitive::<TimestampNanosecondType>(consts::TIME_UNIX_NANO)?;
    let names = table.strings(consts::NAME)?;
    let dropped = table.u32s(consts::DROPPED_ATTRIBUTES_COUNT)?;
    let mut attrs = AttributeIndex::load(batch, PayloadType::SpanEventAttrs)?;

    for row in 0..table.len() {
        let (Some(id), Some(parent)) = (get_u32(&ids, row), get_u32(&parents, row)) else {
            return Err(table.error(format!("null id or parent_id at row {row}")));
        };
        children.push(
            parent,
            Event {
                time_unix_nano: nanos(time, row),
                name: string_or_default(&names, row),
                attributes: attrs.take(id),
                dropped_attributes_count: get_u32(&dropped, row).unwrap_or(0),
            },
        );
    }
    Ok(children)
}

fn links(batch: &EncodedBatch) -> Result<Children<Link>> {
    let mut children = Children::default();
    let Some(records) = batch.table(PayloadType::SpanLinks) else {
        return Ok(children);
    };
    let table = Table::from_batch(PayloadType::SpanLinks, records);
    let ids = table.u32s(consts::ID)?;
    let parents = table.u32s(consts::PARENT_ID)?;
    let trace_ids = table.binary(consts::TRACE_ID)?;
    let span_ids = table.binary(consts::SPAN_ID)?;
    let trace_states = table.strings(consts::TRACE_STATE)?;
    let flags = table.u32s(consts::FLAGS)?;
    let dropped = table.u32s(consts::DROPPED_ATTRIBUTES_COUNT)?;
    let mut attrs = AttributeIndex::load(batch, PayloadType::SpanLinkAttrs)?;

    for row in 0..table.len() {
        let (Some(id), Some(parent)) = (get_u32(&ids, row), get_u32(&parents, row)) else {
            return Err(table.error(format!("null id or parent_id at row {row}")));
        };
        children.push(
            parent,
            Link {
                trace_id: bytes_or_default(trace_ids, row),
                span_id: bytes_or_default(span_ids, row),
                trace_state: string_or_default(&trace_states, row),
                attributes: attrs.take(id),
                dropped_attributes_count: get_u32(&dropped, row).unwrap_or(0),
                flags: get_u32(&flags, row).unwrap_or(0),
            },
        );
    }
    Ok(children)
}
