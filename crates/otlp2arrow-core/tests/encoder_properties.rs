// Integration tests for encoder bookkeeping: id assignment, grouping, reuse
// after failure and release semantics across the three signal builders.

use arrow::array::{Array, AsArray, StructArray};
use arrow::datatypes::{DataType, UInt16Type};
use opentelemetry_proto::tonic::common::v1::{any_value, AnyValue, InstrumentationScope, KeyValue};
use opentelemetry_proto::tonic::logs::v1::{LogRecord, LogsData, ResourceLogs, ScopeLogs};
use opentelemetry_proto::tonic::metrics::v1::{
    metric::Data, number_data_point, Gauge, Metric, MetricsData, NumberDataPoint,
    ResourceMetrics, ScopeMetrics,
};
use opentelemetry_proto::tonic::resource::v1::Resource;
use opentelemetry_proto::tonic::trace::v1::{ResourceSpans, ScopeSpans, Span, TracesData};
use otlp2arrow_core::config::MetricsSort;
use otlp2arrow_core::otlp::metrics;
use otlp2arrow_core::schema::consts;
use otlp2arrow_core::{
    EncodedBatch, Error, LogsBuilder, MetricsBuilder, MetricsDecoder, PayloadType,
    SignalEncoder, TracesBuilder,
};

fn resource(service: &str) -> Option<Resource> {
    Some(Resource {
        attributes: vec![KeyValue {
            key: "service.name".to_string(),
            value: Some(AnyValue {
                value: Some(any_value::Value::StringValue(service.to_string())),
            }),
        }],
        ..Default::default()
    })
}

fn scope(name: &str) -> Option<InstrumentationScope> {
    Some(InstrumentationScope {
        name: name.to_string(),
        ..Default::default()
    })
}

fn gauge(name: &str, value: f64) -> Metric {
    Metric {
        name: name.to_string(),
        data: Some(Data::Gauge(Gauge {
            data_points: vec![NumberDataPoint {
                time_unix_nano: 1_700_000_000_000_000_000,
                value: Some(number_data_point::Value::AsDouble(value)),
                ..Default::default()
            }],
        })),
        ..Default::default()
    }
}

fn scope_metrics(scope_name: &str, metrics: Vec<Metric>) -> ScopeMetrics {
    ScopeMetrics {
        scope: scope(scope_name),
        metrics,
        ..Default::default()
    }
}

fn ids(batch: &EncodedBatch) -> Vec<u16> {
    batch
        .primary()
        .column_by_name(consts::ID)
        .unwrap()
        .as_primitive::<UInt16Type>()
        .values()
        .to_vec()
}

fn envelope_ids(batch: &EncodedBatch, column: &str) -> Vec<Option<u16>> {
    let envelope = batch
        .primary()
        .column_by_name(column)
        .unwrap()
        .as_any()
        .downcast_ref::<StructArray>()
        .unwrap();
    let ids = envelope
        .column_by_name(consts::ID)
        .unwrap()
        .as_primitive::<UInt16Type>();
    (0..ids.len())
        .map(|row| ids.is_valid(row).then(|| ids.value(row)))
        .collect()
}

fn names(data: &MetricsData) -> Vec<(String, String)> {
    data.resource_metrics
        .iter()
        .flat_map(|rm| rm.scope_metrics.iter())
        .flat_map(|sm| {
            let scope = sm.scope.as_ref().map(|s| s.name.clone()).unwrap_or_default();
            sm.metrics.iter().map(move |m| (scope.clone(), m.name.clone()))
        })
        .collect()
}

#[test]
fn repeated_scope_is_grouped_with_stable_sort() {
    // Scopes arrive as [B, A, B]; the second B folds into the first
    let data = MetricsData {
        resource_metrics: vec![ResourceMetrics {
            resource: resource("api"),
            scope_metrics: vec![
                scope_metrics("b", vec![gauge("z", 1.0), gauge("m", 2.0)]),
                scope_metrics("a", vec![gauge("k", 3.0)]),
                scope_metrics("b", vec![gauge("m", 4.0), gauge("a", 5.0)]),
            ],
            ..Default::default()
        }],
    };

    let optimized = metrics::optimize(&data, MetricsSort::Name);
    assert_eq!(optimized.scope_count(), 2);
    let grouped = optimized.to_metrics_data();
    assert_eq!(
        names(&grouped),
        vec![
            ("b".to_string(), "a".to_string()),
            ("b".to_string(), "m".to_string()),
            ("b".to_string(), "m".to_string()),
            ("b".to_string(), "z".to_string()),
            ("a".to_string(), "k".to_string()),
        ]
    );
    // Ties keep their original relative order: the value 2.0 "m" came first
    let values: Vec<f64> = grouped.resource_metrics[0].scope_metrics[0]
        .metrics
        .iter()
        .filter(|m| m.name == "m")
        .map(|m| match &m.data {
            Some(Data::Gauge(g)) => match g.data_points[0].value {
                Some(number_data_point::Value::AsDouble(v)) => v,
                _ => f64::NAN,
            },
            _ => f64::NAN,
        })
        .collect();
    assert_eq!(values, vec![2.0, 4.0]);

    let mut builder = MetricsBuilder::new().unwrap();
    builder.append(&data).unwrap();
    let batch = builder.build().unwrap();
    assert_eq!(
        envelope_ids(&batch, consts::SCOPE),
        vec![Some(0), Some(0), Some(0), Some(0), Some(1)]
    );
}

#[test]
fn ids_increase_and_envelopes_share_ids() {
    let data = MetricsData {
        resource_metrics: vec![
            ResourceMetrics {
                resource: resource("api"),
                scope_metrics: vec![scope_metrics("meter", vec![gauge("a", 1.0), gauge("b", 2.0)])],
                ..Default::default()
            },
            ResourceMetrics {
                resource: resource("worker"),
                scope_metrics: vec![scope_metrics("meter", vec![gauge("c", 3.0)])],
                ..Default::default()
            },
            ResourceMetrics {
                resource: resource("api"),
                scope_metrics: vec![scope_metrics("meter", vec![gauge("d", 4.0)])],
                ..Default::default()
            },
        ],
    };
    let mut builder = MetricsBuilder::new().unwrap();
    builder.append(&data).unwrap();
    let batch = builder.build().unwrap();

    let row_ids = ids(&batch);
    assert!(row_ids.windows(2).all(|pair| pair[0] < pair[1]));

    // The third resource equals the first and is merged into it
    let resources = envelope_ids(&batch, consts::RESOURCE);
    assert_eq!(resources, vec![Some(0), Some(0), Some(0), Some(1)]);
    let scopes = envelope_ids(&batch, consts::SCOPE);
    assert_eq!(scopes[0], scopes[1]);
    assert_ne!(scopes[0], scopes[3]);

    let resource_attrs = batch.table(PayloadType::ResourceAttrs).unwrap();
    assert_eq!(resource_attrs.num_rows(), 2);
}

#[test]
fn missing_resource_has_null_id() {
    let data = LogsData {
        resource_logs: vec![ResourceLogs {
            scope_logs: vec![ScopeLogs {
                log_records: vec![LogRecord {
                    time_unix_nano: 5,
                    ..Default::default()
                }],
                ..Default::default()
            }],
            ..Default::default()
        }],
    };
    let mut builder = LogsBuilder::new().unwrap();
    builder.append(&data).unwrap();
    let batch = builder.build().unwrap();

    assert_eq!(envelope_ids(&batch, consts::RESOURCE), vec![None]);
    assert_eq!(batch.primary().column_by_name(consts::RESOURCE).unwrap().null_count(), 1);
    assert!(batch.table(PayloadType::ResourceAttrs).is_none());
}

#[test]
fn ids_continue_across_appends_within_one_batch() {
    let first = MetricsData {
        resource_metrics: vec![ResourceMetrics {
            resource: resource("api"),
            scope_metrics: vec![scope_metrics("meter", vec![gauge("a", 1.0), gauge("b", 2.0)])],
            ..Default::default()
        }],
    };
    let second = MetricsData {
        resource_metrics: vec![ResourceMetrics {
            resource: resource("api"),
            scope_metrics: vec![scope_metrics("meter", vec![gauge("c", 3.0)])],
            ..Default::default()
        }],
    };

    let mut builder = MetricsBuilder::new().unwrap();
    builder.append(&first).unwrap();
    builder.append(&second).unwrap();
    assert_eq!(builder.len(), 3);
    let batch = builder.build().unwrap();
    assert_eq!(ids(&batch), vec![0, 1, 2]);

    // Each append mints its own envelope ids
    assert_eq!(
        envelope_ids(&batch, consts::RESOURCE),
        vec![Some(0), Some(0), Some(1)]
    );

    let decoded = MetricsDecoder::decode(&batch).unwrap();
    assert_eq!(decoded.resource_metrics.len(), 2);
    assert!(builder.is_empty());
}

#[test]
fn builder_is_reusable_after_append_failure() {
    let spans: Vec<Span> = (0..=u16::MAX as u64 + 1)
        .map(|i| Span {
            name: "tick".to_string(),
            start_time_unix_nano: i,
            end_time_unix_nano: i + 1,
            ..Default::default()
        })
        .collect();
    let oversized = TracesData {
        resource_spans: vec![ResourceSpans {
            scope_spans: vec![ScopeSpans {
                spans,
                ..Default::default()
            }],
            ..Default::default()
        }],
    };

    let mut builder = TracesBuilder::new().unwrap();
    let err = builder.append(&oversized).unwrap_err();
    assert!(matches!(err, Error::ColumnAppend { .. }), "got {err}");
    assert!(builder.is_empty());

    let small = TracesData {
        resource_spans: vec![ResourceSpans {
            scope_spans: vec![ScopeSpans {
                spans: vec![Span {
                    name: "ok".to_string(),
                    ..Default::default()
                }],
                ..Default::default()
            }],
            ..Default::default()
        }],
    };
    builder.append(&small).unwrap();
    let batch = builder.build().unwrap();
    assert_eq!(batch.num_rows(), 1);
    assert_eq!(ids(&batch), vec![0]);
}

#[test]
fn released_builders_reject_every_operation() {
    let mut meters = MetricsBuilder::new().unwrap();
    let mut logs = LogsBuilder::new().unwrap();
    let mut traces = TracesBuilder::new().unwrap();

    meters.release();
    meters.release();
    logs.release();
    traces.release();

    assert!(meters.is_released());
    assert!(meters.append(&MetricsData::default()).unwrap_err().is_already_released());
    assert!(meters.build().unwrap_err().is_already_released());
    assert!(logs.append(&LogsData::default()).unwrap_err().is_already_released());
    assert!(logs.build().unwrap_err().is_already_released());
    assert!(traces.append(&TracesData::default()).unwrap_err().is_already_released());
    assert!(traces.build().unwrap_err().is_already_released());
}

#[test]
fn dictionary_overflow_falls_back_and_still_decodes() {
    let many: Vec<Metric> = (0..300)
        .map(|i| gauge(&format!("metric.{i}"), i as f64))
        .collect();
    let data = MetricsData {
        resource_metrics: vec![ResourceMetrics {
            resource: resource("api"),
            scope_metrics: vec![scope_metrics("meter", many)],
            ..Default::default()
        }],
    };
    let mut builder = MetricsBuilder::new().unwrap();
    builder.append(&data).unwrap();
    let batch = builder.build().unwrap();

    let schema = batch.primary().schema();
    let name = schema.field_with_name(consts::NAME).unwrap();
    assert_eq!(name.data_type(), &DataType::Utf8);

    let decoded = MetricsDecoder::decode(&batch).unwrap();
    assert_eq!(decoded, metrics::optimize(&data, MetricsSort::None).to_metrics_data());
}
