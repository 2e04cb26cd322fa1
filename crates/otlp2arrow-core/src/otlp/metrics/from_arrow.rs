// Columnar tables back to OTLP metrics

use arrow::array::{Array, PrimitiveArray, UInt32Array};
use arrow::datatypes::{Float64Type, Int32Type, Int64Type, TimestampNanosecondType, UInt64Type};
use opentelemetry_proto::tonic::metrics::v1::{
    exemplar, exponential_histogram_data_point::Buckets, metric::Data, number_data_point,
    summary_data_point::ValueAtQuantile, Exemplar, ExponentialHistogram,
    ExponentialHistogramDataPoint, Gauge, Histogram, HistogramDataPoint, Metric, MetricsData,
    NumberDataPoint, ResourceMetrics, ScopeMetrics, Sum, Summary, SummaryDataPoint,
};

use super::MetricType;
use crate::batch::EncodedBatch;
use crate::decode::{
    bytes_or_default, f64_list, get, get_bool, get_u32, nanos, string_or_default, u64_list,
    AttributeIndex, Children, EnvelopeReader, Table,
};
use crate::error::{Error, Result};
use crate::schema::{consts, PayloadType, SignalType};

/// Rebuilds `MetricsData` from an encoded metrics batch
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsDecoder;

impl MetricsDecoder {
    pub fn decode(batch: &EncodedBatch) -> Result<MetricsData> {
        if batch.signal() != SignalType::Metrics {
            return Err(Error::decode(
                PayloadType::Metrics,
                format!("expected a metrics batch, got {}", batch.signal()),
            ));
        }
        let primary = Table::from_batch(PayloadType::Metrics, batch.primary());
        let ids = primary.u32s(consts::ID)?;
        let kinds = primary.u32s(consts::METRIC_TYPE)?;
        let names = primary.strings(consts::NAME)?;
        let descriptions = primary.strings(consts::DESCRIPTION)?;
        let units = primary.strings(consts::UNIT)?;
        let temporality = primary.primitive::<Int32Type>(consts::AGGREGATION_TEMPORALITY)?;
        let monotonic = primary.boolean(consts::IS_MONOTONIC)?;

        let mut metadata = AttributeIndex::load(batch, PayloadType::MetricAttrs)?;
        let mut numbers = number_points(batch)?;
        let mut summaries = summary_points(batch)?;
        let mut histograms = histogram_points(batch)?;
        let mut exp_histograms = exp_histogram_points(batch)?;

        let mut metrics = Vec::with_capacity(primary.len());
        for row in 0..primary.len() {
            let id = get_u32(&ids, row)
                .ok_or_else(|| primary.error(format!("null id at row {row}")))?;
            let code = get_u32(&kinds, row).unwrap_or(0);
            let kind = u8::try_from(code)
                .ok()
                .and_then(MetricType::from_code)
                .ok_or_else(|| {
                    primary.error(format!("unknown metric_type {code} at row {row}"))
                })?;
            let aggregation_temporality = get(temporality, row).unwrap_or(0);

            let data = match kind {
                MetricType::Empty => None,
                MetricType::Gauge => Some(Data::Gauge(Gauge {
                    data_points: numbers.take(id),
                })),
                MetricType::Sum => Some(Data::Sum(Sum {
                    data_points: numbers.take(id),
                    aggregation_temporality,
                    is_monotonic: get_bool(monotonic, row).unwrap_or(false),
                })),
                MetricType::Histogram => Some(Data::Histogram(Histogram {
                    data_points: histograms.take(id),
                    aggregation_temporality,
                })),
                MetricType::ExponentialHistogram => {
                    Some(Data::ExponentialHistogram(ExponentialHistogram {
                        data_points: exp_histograms.take(id),
                        aggregation_temporality,
                    }))
                }
                MetricType::Summary => Some(Data::Summary(Summary {
                    data_points: summaries.take(id),
                })),
            };

            metrics.push(Metric {
                name: string_or_default(&names, row),
                description: string_or_default(&descriptions, row),
                unit: string_or_default(&units, row),
                metadata: metadata.take(id),
                data,
            });
        }

        let envelope = EnvelopeReader::new(batch, &primary)?;
        let resource_metrics = envelope.assemble(
            metrics,
            |scope, schema_url, metrics| ScopeMetrics {
                scope,
                metrics,
                schema_url,
            },
            |resource, schema_url, scope_metrics| ResourceMetrics {
                resource,
                scope_metrics,
                schema_url,
            },
        );
        Ok(MetricsData { resource_metrics })
    }
}

/// id, parent_id and timestamps of a data point table
struct PointPrefix<'a> {
    ids: UInt32Array,
    parents: UInt32Array,
    start: &'a PrimitiveArray<TimestampNanosecondType>,
    time: &'a PrimitiveArray<TimestampNanosecondType>,
}

impl<'a> PointPrefix<'a> {
    fn new(table: &Table<'a>) -> Result<Self> {
        Ok(Self {
            ids: table.u32s(consts::ID)?,
            parents: table.u32s(consts::PARENT_ID)?,
            start: table.primitive(consts::START_TIME_UNIX_NANO)?,
            time: table.primitive(consts::TIME_UNIX_NANO)?,
        })
    }

    /// (id, parent_id) of a row; both are required
    fn keys(&self, table: &Table<'_>, row: usize) -> Result<(u32, u32)> {
        match (get_u32(&self.ids, row), get_u32(&self.parents, row)) {
            (Some(id), Some(parent)) => Ok((id, parent)),
            _ => Err(table.error(format!("null id or parent_id at row {row}"))),
        }
    }
}

fn exemplars(
    batch: &EncodedBatch,
    payload: PayloadType,
    attrs_payload: PayloadType,
) -> Result<Children<Exemplar>> {
    let mut children = Children::default();
    let Some(records) = batch.table(payload) else {
        return Ok(children);
    };
    let table = Table::from_batch(payload, records);
    let ids = table.u32s(consts::ID)?;
    let parents = table.u32s(consts::PARENT_ID)?;
    let time = table.primitive::<TimestampNanosecondType>(consts::TIME_UNIX_NANO)?;
    let ints = table.primitive::<Int64Type>(consts::INT_VALUE)?;
    let doubles = table.primitive::<Float64Type>(consts::DOUBLE_VALUE)?;
    let span_ids = table.binary(consts::SPAN_ID)?;
    let trace_ids = table.binary(consts::TRACE_ID)?;
    let mut attrs = AttributeIndex::load(batch, attrs_payload)?;

    for row in 0..table.len() {
        let (Some(id), Some(parent)) = (get_u32(&ids, row), get_u32(&parents, row)) else {
            return Err(table.error(format!("null id or parent_id at row {row}")));
        };
        let value = match (get(ints, row), get(doubles, row)) {
            (Some(v), _) => Some(exemplar::Value::AsInt(v)),
            (None, Some(v)) => Some(exemplar::Value::AsDouble(v)),
            (None, None) => None,
        };
        children.push(
            parent,
            Exemplar {
                filtered_attributes: attrs.take(id),
                time_unix_nano: nanos(time, row),
                span_id: bytes_or_default(span_ids, row),
                trace_id: bytes_or_default(trace_ids, row),
                value,
            },
        );
    }
    Ok(children)
}

fn number_points(batch: &EncodedBatch) -> Result<Children<NumberDataPoint>> {
    let mut children = Children::default();
    let Some(records) = batch.table(PayloadType::NumberDataPoints) else {
        return Ok(children);
    };
    let table = Table::from_batch(PayloadType::NumberDataPoints, records);
    let prefix = PointPrefix::new(&table)?;
    let ints = table.primitive::<Int64Type>(consts::INT_VALUE)?;
    let doubles = table.primitive::<Float64Type>(consts::DOUBLE_VALUE)?;
    let flags = table.u32s(consts::FLAGS)?;
    let mut attrs = AttributeIndex::load(batch, PayloadType::NumberDpAttrs)?;
    let mut exemplars = exemplars(
        batch,
        PayloadType::NumberDpExemplars,
        PayloadType::NumberDpExemplarAttrs,
    )?;

    for row in 0..table.len() {
        let (id, parent) = prefix.keys(&table, row)?;
        let value = match (get(ints, row), get(doubles, row)) {
            (Some(v), _) => Some(number_data_point::Value::AsInt(v)),
            (None, Some(v)) => Some(number_data_point::Value::AsDouble(v)),
            (None, None) => None,
        };
        children.push(
            parent,
            NumberDataPoint {
                attributes: attrs.take(id),
                start_time_unix_nano: nanos(prefix.start, row),
                time_unix_nano: nanos(prefix.time, row),
                exemplars: exemplars.take(id),
                flags: get_u32(&flags, row).unwrap_or(0),
                value,
            },
        );
    }
    Ok(children)
}

fn summary_points(batch: &EncodedBatch) -> Result<Children<SummaryDataPoint>> {
    let mut children = Children::default();
    let Some(records) = batch.table(PayloadType::SummaryDataPoints) else {
        return Ok(children);
    };
    let table = Table::from_batch(PayloadType::SummaryDataPoints, records);
    let prefix = PointPrefix::new(&table)?;
    let counts = table.primitive::<UInt64Type>(consts::COUNT)?;
    let sums = table.primitive::<Float64Type>(consts::SUM)?;
    let quantiles = table.list(consts::QUANTILE_QUANTILES)?;
    let values = table.list(consts::QUANTILE_VALUES)?;
    let flags = table.u32s(consts::FLAGS)?;
    let mut attrs = AttributeIndex::load(batch, PayloadType::SummaryDpAttrs)?;

    for row in 0..table.len() {
        let (id, parent) = prefix.keys(&table, row)?;
        let quantile_values = f64_list(quantiles, row)
            .into_iter()
            .zip(f64_list(values, row))
            .map(|(quantile, value)| ValueAtQuantile { quantile, value })
            .collect();
        children.push(
            parent,
            SummaryDataPoint {
                attributes: attrs.take(id),
                start_time_unix_nano: nanos(prefix.start, row),
                time_unix_nano: nanos(prefix.time, row),
                count: get(counts, row).unwrap_or(0),
                sum: get(sums, row).unwrap_or(0.0),
                quantile_values,
                flags: get_u32(&flags, row).unwrap_or(0),
            },
        );
    }
    Ok(children)
}

fn histogram_points(batch: &EncodedBatch) -> Result<Children<HistogramDataPoint>> {
    let mut children = Children::default();
    let Some(records) = batch.table(PayloadType::HistogramDataPoints) else {
        return Ok(children);
    };
    let table = Table::from_batch(PayloadType::HistogramDataPoints, records);
    let prefix = PointPrefix::new(&table)?;
    let counts = table.primitive::<UInt64Type>(consts::COUNT)?;
    let sums = table.primitive::<Float64Type>(consts::SUM)?;
    let bucket_counts = table.list(consts::BUCKET_COUNTS)?;
    let bounds = table.list(consts::EXPLICIT_BOUNDS)?;
    let flags = table.u32s(consts::FLAGS)?;
    let mins = table.primitive::<Float64Type>(consts::MIN)?;
    let maxs = table.primitive::<Float64Type>(consts::MAX)?;
    let mut attrs = AttributeIndex::load(batch, PayloadType::HistogramDpAttrs)?;
    let mut exemplars = exemplars(
        batch,
        PayloadType::HistogramDpExemplars,
        PayloadType::HistogramDpExemplarAttrs,
    )?;

    for row in 0..table.len() {
        let (id, parent) = prefix.keys(&table, row)?;
        children.push(
            parent,
            HistogramDataPoint {
                attributes: attrs.take(id),
                start_time_unix_nano: nanos(prefix.start, row),
                time_unix_nano: nanos(prefix.time, row),
                count: get(counts, row).unwrap_or(0),
                sum: get(sums, row),
                bucket_counts: u64_list(bucket_counts, row),
                explicit_bounds: f64_list(bounds, row),
                exemplars: exemplars.take(id),
                flags: get_u32(&flags, row).unwrap_or(0),
                min: get(mins, row),
                max: get(maxs, row),
            },
        );
    }
    Ok(children)
}

/// Reader for a `positive` / `negative` bucket struct
struct BucketsReader<'a> {
    valid: Option<arrow::buffer::NullBuffer>,
    offsets: &'a PrimitiveArray<Int32Type>,
    counts: &'a arrow::array::ListArray,
}

impl<'a> BucketsReader<'a> {
    fn new(table: &Table<'a>, name: &'a str) -> Result<Self> {
        let nested = table.nested(name)?;
        Ok(Self {
            valid: table.structs(name)?.nulls().cloned(),
            offsets: nested.primitive(consts::OFFSET)?,
            counts: nested.list(consts::BUCKET_COUNTS)?,
        })
    }

    fn get(&self, row: usize) -> Option<Buckets> {
        if !self.valid.as_ref().map_or(true, |n| n.is_valid(row)) {
            return None;
        }
        Some(Buckets {
            offset: get(self.offsets, row).unwrap_or(0),
            bucket_counts: u64_list(self.counts, row),
        })
    }
}

fn exp_histogram_points(batch: &EncodedBatch) -> Result<Children<ExponentialHistogramDataPoint>> {
    let mut children = Children::default();
    let Some(records) = batch.table(PayloadType::ExpHistogramDataPoints) else {
        return Ok(children);
    };
    let table = Table::from_batch(PayloadType::ExpHistogramDataPoints, records);
    let prefix = PointPrefix::new(&table)?;
    let counts = table.primitive::<UInt64Type>(consts::COUNT)?;
    let sums = table.primitive::<Float64Type>(consts::SUM)?;
    let scales = table.primitive::<Int32Type>(consts::SCALE)?;
    let zero_counts = table.primitive::<UInt64Type>(consts::ZERO_COUNT)?;
    let positive = BucketsReader::new(&table, consts::POSITIVE)?;
    let negative = BucketsReader::new(&table, consts::NEGATIVE)?;
    let flags = table.u32s(consts::FLAGS)?;
    let mins = table.primitive::<Float64Type>(consts::MIN)?;
    let maxs = table.primitive::<Float64Type>(consts::MAX)?;
    let zero_thresholds = table.primitive::<Float64Type>(consts::ZERO_THRESHOLD)?;
    let mut attrs = AttributeIndex::load(batch, PayloadType::ExpHistogramDpAttrs)?;
    let mut exemplars = exemplars(
        batch,
        PayloadType::ExpHistogramDpExemplars,
        PayloadType::ExpHistogramDpExemplarAttrs,
    )?;

    for row in 0..table.len() {
        let (id, parent) = prefix.keys(&table, row)?;
        children.push(
            parent,
            ExponentialHistogramDataPoint {
                attributes: attrs.take(id),
                start_time_unix_nano: nanos(prefix.start, row),
                time_unix_nano: nanos(prefix.time, row),
                count: get(counts, row).unwrap_or(0),
                sum: get(sums, row),
                scale: get(scales, row).unwrap_or(0),
                zero_count: get(zero_counts, row).unwrap_or(0),
                positive: positive.get(row),
                negative: negative.get(row),
                flags: get_u32(&flags, row).unwrap_or(0),
                exemplars: exemplars.take(id),
                min: get(mins, row),
                max: get(maxs, row),
                zero_threshold: get(zero_thresholds, row).unwrap_or(0.0),
            },
        );
    }
    Ok(children)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::SignalEncoder;
    use crate::otlp::metrics::{optimize, MetricsBuilder};
    use crate::config::MetricsSort;
    use opentelemetry_proto::tonic::common::v1::{any_value, AnyValue, KeyValue};
    use opentelemetry_proto::tonic::metrics::v1::exemplar;

    fn kv(key: &str, value: &str) -> KeyValue {
        KeyValue {
            key: key.into(),
            value: Some(AnyValue {
                value: Some(any_value::Value::StringValue(value.into())),
            }),
        }
    }

    #[test]
    fn every_point_shape_survives() {
        let metrics = vec![
            Metric {
                name: "latency".into(),
                unit: "ms".into(),
                metadata: vec![kv("origin", "sdk")],
                data: Some(Data::Histogram(Histogram {
                    data_points: vec![HistogramDataPoint {
                        attributes: vec![kv("route", "/")],
                        time_unix_nano: 10,
                        count: 3,
                        sum: Some(12.5),
                        bucket_counts: vec![1, 2],
                        explicit_bounds: vec![5.0],
                        exemplars: vec![Exemplar {
                            filtered_attributes: vec![kv("user", "u1")],
                            time_unix_nano: 9,
                            span_id: vec![1; 8],
                            trace_id: vec![2; 16],
                            value: Some(exemplar::Value::AsDouble(4.0)),
                        }],
                        min: Some(1.0),
                        ..Default::default()
                    }],
                    aggregation_temporality: 1,
                })),
                ..Default::default()
            },
            Metric {
                name: "size".into(),
                data: Some(Data::ExponentialHistogram(ExponentialHistogram {
                    data_points: vec![ExponentialHistogramDataPoint {
                        time_unix_nano: 11,
                        count: 4,
                        scale: -2,
                        zero_count: 1,
                        positive: Some(Buckets {
                            offset: -3,
                            bucket_counts: vec![1, 2],
                        }),
                        zero_threshold: 0.001,
                        ..Default::default()
                    }],
                    aggregation_temporality: 2,
                })),
                ..Default::default()
            },
            Metric {
                name: "rpc".into(),
                data: Some(Data::Summary(Summary {
                    data_points: vec![SummaryDataPoint {
                        start_time_unix_nano: 1,
                        time_unix_nano: 12,
                        count: 2,
                        sum: 7.0,
                        quantile_values: vec![ValueAtQuantile {
                            quantile: 0.5,
                            value: 3.0,
                        }],
                        flags: 1,
                        ..Default::default()
                    }],
                })),
                ..Default::default()
            },
        ];
        let data = MetricsData {
            resource_metrics: vec![ResourceMetrics {
                scope_metrics: vec![ScopeMetrics {
                    metrics,
                    ..Default::default()
                }],
                schema_url: "https://opentelemetry.io/schemas/1.21.0".into(),
                ..Default::default()
            }],
        };

        let mut builder = MetricsBuilder::new().unwrap();
        builder.append(&data).unwrap();
        let batch = builder.build().unwrap();
        let decoded = MetricsDecoder::decode(&batch).unwrap();
        assert_eq!(decoded, optimize(&data, MetricsSort::None).to_metrics_data());
    }

    #[test]
    fn unknown_metric_type_is_a_decode_error() {
        use arrow::array::{ArrayRef, RecordBatch, UInt8Array};
        use std::sync::Arc;

        let data = MetricsData {
            resource_metrics: vec![ResourceMetrics {
                scope_metrics: vec![ScopeMetrics {
                    metrics: vec![Metric {
                        name: "m".into(),
                        ..Default::default()
                    }],
                    ..Default::default()
                }],
                ..Default::default()
            }],
        };
        let mut builder = MetricsBuilder::new().unwrap();
        builder.append(&data).unwrap();
        let batch = builder.build().unwrap();

        let primary = batch.primary();
        let index = primary.schema().index_of(consts::METRIC_TYPE).unwrap();
        let mut columns = primary.columns().to_vec();
        columns[index] = Arc::new(UInt8Array::from(vec![9])) as ArrayRef;
        let corrupted = RecordBatch::try_new(primary.schema(), columns).unwrap();
        let batch =
            EncodedBatch::new(SignalType::Metrics, vec![(PayloadType::Metrics, corrupted)])
                .unwrap();

        let err = MetricsDecoder::decode(&batch).unwrap_err();
        assert!(err.to_string().contains("unknown metric_type 9"));
    }
}
