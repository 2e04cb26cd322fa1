// Metrics table layouts
//
// METRICS holds one row per metric. Data points live in one table per point
// shape (number, summary, histogram, exponential histogram), exemplars in one
// table per point shape that carries them.

use arrow::datatypes::{DataType, Field, Fields};

use super::common::{dict8, resource_field, scope_field, timestamp_ns};
use super::consts;
use super::{field, list_of, Hint};

pub(crate) fn metrics_fields() -> Vec<Field> {
    vec![
        field(consts::ID, DataType::UInt16, &[Hint::DeltaEncoding]),
        resource_field(),
        scope_field(),
        field(consts::SCHEMA_URL, dict8(), &[Hint::Optional, Hint::Dictionary8]),
        field(consts::METRIC_TYPE, DataType::UInt8, &[]),
        field(consts::NAME, dict8(), &[Hint::Dictionary8]),
        field(consts::DESCRIPTION, dict8(), &[Hint::Optional, Hint::Dictionary8]),
        field(consts::UNIT, dict8(), &[Hint::Optional, Hint::Dictionary8]),
        field(consts::AGGREGATION_TEMPORALITY, DataType::Int32, &[Hint::Optional]),
        field(consts::IS_MONOTONIC, DataType::Boolean, &[Hint::Optional]),
    ]
}

/// Columns every data point table starts with
fn data_point_prefix() -> Vec<Field> {
    vec![
        field(consts::ID, DataType::UInt32, &[Hint::DeltaEncoding]),
        field(consts::PARENT_ID, DataType::UInt16, &[Hint::DeltaEncoding]),
        field(consts::START_TIME_UNIX_NANO, timestamp_ns(), &[Hint::Optional]),
        field(consts::TIME_UNIX_NANO, timestamp_ns(), &[]),
    ]
}

pub(crate) fn number_data_points_fields() -> Vec<Field> {
    let mut fields = data_point_prefix();
    fields.extend([
        field(consts::INT_VALUE, DataType::Int64, &[Hint::Optional]),
        field(consts::DOUBLE_VALUE, DataType::Float64, &[Hint::Optional]),
        field(consts::FLAGS, DataType::UInt32, &[Hint::Optional]),
    ]);
    fields
}

pub(crate) fn summary_data_points_fields() -> Vec<Field> {
    let mut fields = data_point_prefix();
    fields.extend([
        field(consts::COUNT, DataType::UInt64, &[]),
        field(consts::SUM, DataType::Float64, &[]),
        field(
            consts::QUANTILE_QUANTILES,
            list_of(DataType::Float64),
            &[Hint::Optional],
        ),
        field(
            consts::QUANTILE_VALUES,
            list_of(DataType::Float64),
            &[Hint::Optional],
        ),
        field(consts::FLAGS, DataType::UInt32, &[Hint::Optional]),
    ]);
    fields
}

pub(crate) fn histogram_data_points_fields() -> Vec<Field> {
    let mut fields = data_point_prefix();
    fields.extend([
        field(consts::COUNT, DataType::UInt64, &[]),
        field(consts::SUM, DataType::Float64, &[Hint::Optional]),
        field(
            consts::BUCKET_COUNTS,
            list_of(DataType::UInt64),
            &[Hint::Optional],
        ),
        field(
            consts::EXPLICIT_BOUNDS,
            list_of(DataType::Float64),
            &[Hint::Optional],
        ),
        field(consts::FLAGS, DataType::UInt32, &[Hint::Optional]),
        field(consts::MIN, DataType::Float64, &[Hint::Optional]),
        field(consts::MAX, DataType::Float64, &[Hint::Optional]),
    ]);
    fields
}

/// `positive` / `negative` bucket struct of exponential histograms
fn buckets_field(name: &str) -> Field {
    let children = Fields::from(vec![
        Field::new(consts::OFFSET, DataType::Int32, true),
        Field::new(consts::BUCKET_COUNTS, list_of(DataType::UInt64), true),
    ]);
    field(name, DataType::Struct(children), &[Hint::Optional])
}

pub(crate) fn exp_histogram_data_points_fields() -> Vec<Field> {
    let mut fields = data_point_prefix();
    fields.extend([
        field(consts::COUNT, DataType::UInt64, &[]),
        field(consts::SUM, DataType::Float64, &[Hint::Optional]),
        field(consts::SCALE, DataType::Int32, &[]),
        field(consts::ZERO_COUNT, DataType::UInt64, &[]),
        buckets_field(consts::POSITIVE),
        buckets_field(consts::NEGATIVE),
        field(consts::FLAGS, DataType::UInt32, &[Hint::Optional]),
        field(consts::MIN, DataType::Float64, &[Hint::Optional]),
        field(consts::MAX, DataType::Float64, &[Hint::Optional]),
        field(consts::ZERO_THRESHOLD, DataType::Float64, &[]),
    ]);
    fields
}

pub(crate) fn exemplars_fields() -> Vec<Field> {
    vec![
        field(consts::ID, DataType::UInt32, &[Hint::DeltaEncoding]),
        field(consts::PARENT_ID, DataType::UInt32, &[Hint::DeltaEncoding]),
        field(consts::TIME_UNIX_NANO, timestamp_ns(), &[]),
        field(consts::INT_VALUE, DataType::Int64, &[Hint::Optional]),
        field(consts::DOUBLE_VALUE, DataType::Float64, &[Hint::Optional]),
        field(consts::SPAN_ID, DataType::Binary, &[Hint::Optional]),
        field(consts::TRACE_ID, DataType::Binary, &[Hint::Optional]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_point_tables_share_prefix() {
        for fields in [
            number_data_points_fields(),
            summary_data_points_fields(),
            histogram_data_points_fields(),
            exp_histogram_data_points_fields(),
        ] {
            assert_eq!(fields[0].name(), consts::ID);
            assert_eq!(fields[0].data_type(), &DataType::UInt32);
            assert_eq!(fields[1].name(), consts::PARENT_ID);
            assert_eq!(fields[1].data_type(), &DataType::UInt16);
            assert_eq!(fields[3].name(), consts::TIME_UNIX_NANO);
        }
    }

    #[test]
    fn metric_name_is_required() {
        let fields = metrics_fields();
        let name = fields.iter().find(|f| f.name() == consts::NAME).unwrap();
        assert!(!name.is_nullable());
        let unit = fields.iter().find(|f| f.name() == consts::UNIT).unwrap();
        assert!(unit.is_nullable());
    }
}
