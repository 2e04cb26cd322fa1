// Traces table layouts
//
// Span end time is stored as a duration relative to the start time so that
// the column compresses well for spans of similar length.

use arrow::datatypes::{DataType, Field, Fields, TimeUnit};

use super::common::{dict8, resource_field, scope_field, timestamp_ns};
use super::consts;
use super::{field, Hint};

fn status_field() -> Field {
    let children = Fields::from(vec![
        Field::new(consts::STATUS_CODE, DataType::Int32, true),
        Field::new(consts::STATUS_MESSAGE, DataType::Utf8, true),
    ]);
    field(consts::STATUS, DataType::Struct(children), &[Hint::Optional])
}

pub(crate) fn spans_fields() -> Vec<Field> {
    vec![
        field(consts::ID, DataType::UInt16, &[Hint::DeltaEncoding]),
        resource_field(),
        scope_field(),
        field(consts::SCHEMA_URL, dict8(), &[Hint::Optional, Hint::Dictionary8]),
        field(consts::START_TIME_UNIX_NANO, timestamp_ns(), &[]),
        field(
            consts::DURATION_TIME_UNIX_NANO,
            DataType::Duration(TimeUnit::Nanosecond),
            &[],
        ),
        field(consts::TRACE_ID, DataType::Binary, &[Hint::Optional]),
        field(consts::SPAN_ID, DataType::Binary, &[Hint::Optional]),
        field(consts::TRACE_STATE, dict8(), &[Hint::Optional, Hint::Dictionary8]),
        field(consts::PARENT_SPAN_ID, DataType::Binary, &[Hint::Optional]),
        field(consts::FLAGS, DataType::UInt32, &[Hint::Optional]),
        field(consts::NAME, dict8(), &[Hint::Dictionary8]),
        field(consts::KIND, DataType::Int32, &[Hint::Optional]),
        field(
            consts::DROPPED_ATTRIBUTES_COUNT,
            DataType::UInt32,
            &[Hint::Optional],
        ),
        field(consts::DROPPED_EVENTS_COUNT, DataType::UInt32, &[Hint::Optional]),
        field(consts::DROPPED_LINKS_COUNT, DataType::UInt32, &[Hint::Optional]),
        status_field(),
    ]
}

pub(crate) fn span_events_fields() -> Vec<Field> {
    vec![
        field(consts::ID, DataType::UInt32, &[Hint::DeltaEncoding]),
        field(consts::PARENT_ID, DataType::UInt16, &[Hint::DeltaEncoding]),
        field(consts::TIME_UNIX_NANO, timestamp_ns(), &[Hint::Optional]),
        field(consts::NAME, dict8(), &[Hint::Optional, Hint::Dictionary8]),
        field(
            consts::DROPPED_ATTRIBUTES_COUNT,
            DataType::UInt32,
            &[Hint::Optional],
        ),
    ]
}

pub(crate) fn span_links_fields() -> Vec<Field> {
    vec![
        field(consts::ID, DataType::UInt32, &[Hint::DeltaEncoding]),
        field(consts::PARENT_ID, DataType::UInt16, &[Hint::DeltaEncoding]),
        field(consts::TRACE_ID, DataType::Binary, &[Hint::Optional]),
        field(consts::SPAN_ID, DataType::Binary, &[Hint::Optional]),
        field(consts::TRACE_STATE, dict8(), &[Hint::Optional, Hint::Dictionary8]),
        field(consts::FLAGS, DataType::UInt32, &[Hint::Optional]),
        field(
            consts::DROPPED_ATTRIBUTES_COUNT,
            DataType::UInt32,
            &[Hint::Optional],
        ),
    ]
}
