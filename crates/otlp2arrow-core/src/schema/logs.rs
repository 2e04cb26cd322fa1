use arrow::datatypes::{DataType, Field};

use super::common::{body_field, dict8, resource_field, scope_field, timestamp_ns};
use super::consts;
use super::{field, Hint};

/// LOGS: one row per log record
pub(crate) fn logs_fields() -> Vec<Field> {
    vec![
        field(consts::ID, DataType::UInt16, &[Hint::DeltaEncoding]),
        resource_field(),
        scope_field(),
        field(consts::SCHEMA_URL, dict8(), &[Hint::Optional, Hint::Dictionary8]),
        field(consts::TIME_UNIX_NANO, timestamp_ns(), &[Hint::Optional]),
        field(
            consts::OBSERVED_TIME_UNIX_NANO,
            timestamp_ns(),
            &[Hint::Optional],
        ),
        field(consts::TRACE_ID, DataType::Binary, &[Hint::Optional]),
        field(consts::SPAN_ID, DataType::Binary, &[Hint::Optional]),
        field(consts::SEVERITY_NUMBER, DataType::Int32, &[Hint::Optional]),
        field(
            consts::SEVERITY_TEXT,
            dict8(),
            &[Hint::Optional, Hint::Dictionary8],
        ),
        body_field(),
        field(
            consts::DROPPED_ATTRIBUTES_COUNT,
            DataType::UInt32,
            &[Hint::Optional],
        ),
        field(consts::FLAGS, DataType::UInt32, &[Hint::Optional]),
    ]
}
