// Round trip tests for otlp2arrow-core
//
// OTLP batch -> builder -> (IPC bytes) -> decoder must give back the batch in
// optimizer order.

use opentelemetry_proto::tonic::common::v1::{
    any_value, AnyValue, ArrayValue, InstrumentationScope, KeyValue, KeyValueList,
};
use opentelemetry_proto::tonic::logs::v1::{LogRecord, LogsData, ResourceLogs, ScopeLogs};
use opentelemetry_proto::tonic::metrics::v1::{
    exemplar, metric::Data, number_data_point, summary_data_point::ValueAtQuantile, Exemplar,
    Gauge, Metric, MetricsData, NumberDataPoint, ResourceMetrics, ScopeMetrics, Sum, Summary,
    SummaryDataPoint,
};
use opentelemetry_proto::tonic::resource::v1::Resource;
use opentelemetry_proto::tonic::trace::v1::{
    span::{Event, Link},
    ResourceSpans, ScopeSpans, Span, Status, TracesData,
};
use otlp2arrow_core::codec::{deserialize_batch, serialize_batch};
use otlp2arrow_core::config::{LogsSort, MetricsSort, TracesSort};
use otlp2arrow_core::otlp::{logs, metrics, traces};
use otlp2arrow_core::{
    EncoderConfig, LogsBuilder, LogsDecoder, MetricsBuilder, MetricsDecoder, PayloadType,
    SignalEncoder, SignalType, TracesBuilder, TracesDecoder,
};

fn string(value: &str) -> Option<AnyValue> {
    Some(AnyValue {
        value: Some(any_value::Value::StringValue(value.to_string())),
    })
}

fn kv(key: &str, value: Option<AnyValue>) -> KeyValue {
    KeyValue {
        key: key.to_string(),
        value,
    }
}

fn resource(service: &str) -> Option<Resource> {
    Some(Resource {
        attributes: vec![
            kv("service.name", string(service)),
            kv(
                "host.tags",
                Some(AnyValue {
                    value: Some(any_value::Value::ArrayValue(ArrayValue {
                        values: vec![string("a").unwrap_or_default(), string("b").unwrap_or_default()],
                    })),
                }),
            ),
        ],
        ..Default::default()
    })
}

fn scope(name: &str) -> Option<InstrumentationScope> {
    Some(InstrumentationScope {
        name: name.to_string(),
        version: "1.2.3".to_string(),
        attributes: vec![kv("scope.kind", string("library"))],
        ..Default::default()
    })
}

fn sample_metrics() -> MetricsData {
    let points = |base: u64| -> Vec<NumberDataPoint> {
        (0..3)
            .map(|i| NumberDataPoint {
                attributes: vec![kv("core", Some(AnyValue {
                    value: Some(any_value::Value::IntValue(i)),
                }))],
                start_time_unix_nano: base,
                time_unix_nano: base + i as u64 + 1,
                exemplars: if i == 0 {
                    vec![Exemplar {
                        filtered_attributes: vec![kv("sampled", string("yes"))],
                        time_unix_nano: base,
                        span_id: vec![1; 8],
                        trace_id: vec![2; 16],
                        value: Some(exemplar::Value::AsInt(5)),
                    }]
                } else {
                    Vec::new()
                },
                value: Some(number_data_point::Value::AsDouble(i as f64)),
                ..Default::default()
            })
            .collect()
    };
    let metrics = |service_base: u64| {
        vec![
            Metric {
                name: "system.cpu".to_string(),
                unit: "1".to_string(),
                data: Some(Data::Gauge(Gauge {
                    data_points: points(service_base),
                })),
                ..Default::default()
            },
            Metric {
                name: "http.requests".to_string(),
                description: "served requests".to_string(),
                data: Some(Data::Sum(Sum {
                    data_points: points(service_base + 100),
                    aggregation_temporality: 2,
                    is_monotonic: true,
                })),
                ..Default::default()
            },
            Metric {
                name: "rpc.latency".to_string(),
                data: Some(Data::Summary(Summary {
                    data_points: vec![SummaryDataPoint {
                        time_unix_nano: service_base,
                        count: 4,
                        sum: 9.5,
                        quantile_values: vec![
                            ValueAtQuantile {
                                quantile: 0.5,
                                value: 2.0,
                            },
                            ValueAtQuantile {
                                quantile: 0.99,
                                value: 4.0,
                            },
                        ],
                        ..Default::default()
                    }],
                })),
                ..Default::default()
            },
        ]
    };
    MetricsData {
        resource_metrics: vec![
            ResourceMetrics {
                resource: resource("api"),
                scope_metrics: vec![ScopeMetrics {
                    scope: scope("meter"),
                    metrics: metrics(1_000),
                    schema_url: "https://opentelemetry.io/schemas/1.24.0".to_string(),
                }],
                schema_url: "https://opentelemetry.io/schemas/1.24.0".to_string(),
            },
            ResourceMetrics {
                resource: resource("worker"),
                scope_metrics: vec![
                    ScopeMetrics {
                        scope: scope("meter"),
                        metrics: metrics(2_000),
                        ..Default::default()
                    },
                    ScopeMetrics {
                        metrics: metrics(3_000),
                        ..Default::default()
                    },
                ],
                ..Default::default()
            },
        ],
    }
}

fn sample_logs() -> LogsData {
    let records = |base: u64| -> Vec<LogRecord> {
        vec![
            LogRecord {
                time_unix_nano: base + 2,
                observed_time_unix_nano: base + 3,
                severity_number: 9,
                severity_text: "INFO".to_string(),
                body: string("request served"),
                attributes: vec![kv("http.route", string("/users"))],
                trace_id: vec![3; 16],
                span_id: vec![4; 8],
                flags: 1,
                ..Default::default()
            },
            LogRecord {
                time_unix_nano: base + 1,
                severity_number: 17,
                severity_text: "ERROR".to_string(),
                body: Some(AnyValue {
                    value: Some(any_value::Value::KvlistValue(KeyValueList {
                        values: vec![kv("error", string("timeout")), kv("empty", None)],
                    })),
                }),
                attributes: vec![
                    kv("retry", Some(AnyValue {
                        value: Some(any_value::Value::BoolValue(true)),
                    })),
                    kv("ratio", Some(AnyValue {
                        value: Some(any_value::Value::DoubleValue(0.25)),
                    })),
                ],
                ..Default::default()
            },
        ]
    };
    LogsData {
        resource_logs: vec![
            ResourceLogs {
                resource: resource("api"),
                scope_logs: vec![ScopeLogs {
                    scope: scope("logger"),
                    log_records: records(10),
                    ..Default::default()
                }],
                ..Default::default()
            },
            ResourceLogs {
                resource: resource("api"),
                scope_logs: vec![ScopeLogs {
                    scope: scope("logger"),
                    log_records: records(20),
                    ..Default::default()
                }],
                ..Default::default()
            },
        ],
    }
}

fn sample_traces() -> TracesData {
    let span = |name: &str, start: u64| Span {
        trace_id: vec![7; 16],
        span_id: start.to_le_bytes().to_vec(),
        name: name.to_string(),
        kind: 3,
        start_time_unix_nano: start,
        end_time_unix_nano: start + 500,
        attributes: vec![kv("db.system", string("postgres"))],
        events: vec![Event {
            time_unix_nano: start + 10,
            name: "query".to_string(),
            attributes: vec![kv("rows", Some(AnyValue {
                value: Some(any_value::Value::IntValue(12)),
            }))],
            ..Default::default()
        }],
        links: vec![Link {
            trace_id: vec![8; 16],
            span_id: vec![9; 8],
            trace_state: "k=v".to_string(),
            ..Default::default()
        }],
        status: Some(Status {
            message: String::new(),
            code: 1,
        }),
        ..Default::default()
    };
    TracesData {
        resource_spans: vec![ResourceSpans {
            resource: resource("db"),
            scope_spans: vec![ScopeSpans {
                scope: scope("tracer"),
                spans: vec![span("select", 300), span("insert", 100), span("select", 200)],
                ..Default::default()
            }],
            ..Default::default()
        }],
    }
}

#[test]
fn metrics_round_trip() {
    let data = sample_metrics();
    let mut builder = MetricsBuilder::new().unwrap();
    builder.append(&data).unwrap();
    let batch = builder.build().unwrap();

    assert_eq!(batch.signal(), SignalType::Metrics);
    assert_eq!(batch.tables()[0].0, PayloadType::Metrics);
    let decoded = MetricsDecoder::decode(&batch).unwrap();
    assert_eq!(
        decoded,
        metrics::optimize(&data, MetricsSort::None).to_metrics_data()
    );
}

#[test]
fn sorted_metrics_round_trip_in_sorted_order() {
    let data = sample_metrics();
    let mut config = EncoderConfig::default();
    config.metrics.sort = MetricsSort::Name;
    let mut builder = MetricsBuilder::with_config(&config).unwrap();
    builder.append(&data).unwrap();
    let decoded = MetricsDecoder::decode(&builder.build().unwrap()).unwrap();

    let expected = metrics::optimize(&data, MetricsSort::Name).to_metrics_data();
    assert_eq!(decoded, expected);
    let names: Vec<&str> = decoded.resource_metrics[0].scope_metrics[0]
        .metrics
        .iter()
        .map(|m| m.name.as_str())
        .collect();
    assert_eq!(names, vec!["http.requests", "rpc.latency", "system.cpu"]);
}

#[test]
fn logs_round_trip_merges_identical_envelopes() {
    let data = sample_logs();
    let mut config = EncoderConfig::default();
    config.logs.sort = LogsSort::Time;
    let mut builder = LogsBuilder::with_config(&config).unwrap();
    builder.append(&data).unwrap();
    let batch = builder.build().unwrap();

    // Both resources carry identical content and fold into one envelope
    assert_eq!(batch.table(PayloadType::ResourceAttrs).unwrap().num_rows(), 2);
    assert_eq!(batch.table(PayloadType::ScopeAttrs).unwrap().num_rows(), 1);

    let decoded = LogsDecoder::decode(&batch).unwrap();
    assert_eq!(decoded.resource_logs.len(), 1);
    assert_eq!(decoded, logs::optimize(&data, LogsSort::Time).to_logs_data());
}

#[test]
fn empty_and_missing_attribute_values_stay_distinct() {
    let data = LogsData {
        resource_logs: vec![ResourceLogs {
            resource: resource("api"),
            scope_logs: vec![ScopeLogs {
                log_records: vec![LogRecord {
                    body: Some(AnyValue::default()),
                    attributes: vec![
                        kv("missing", None),
                        kv("empty", Some(AnyValue::default())),
                        kv("route", string("/users")),
                    ],
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

    let decoded = LogsDecoder::decode(&batch).unwrap();
    let attributes = &decoded.resource_logs[0].scope_logs[0].log_records[0].attributes;
    assert_eq!(attributes[0].value, None);
    assert_eq!(attributes[1].value, Some(AnyValue::default()));
    assert_eq!(decoded, logs::optimize(&data, LogsSort::None).to_logs_data());
}

#[test]
fn traces_round_trip() {
    let data = sample_traces();
    let mut config = EncoderConfig::default();
    config.traces.sort = TracesSort::StartTime;
    let mut builder = TracesBuilder::with_config(&config).unwrap();
    builder.append(&data).unwrap();
    let batch = builder.build().unwrap();
    assert_eq!(batch.table(PayloadType::SpanEvents).unwrap().num_rows(), 3);
    assert_eq!(batch.table(PayloadType::SpanLinks).unwrap().num_rows(), 3);

    let decoded = TracesDecoder::decode(&batch).unwrap();
    assert_eq!(
        decoded,
        traces::optimize(&data, TracesSort::StartTime).to_traces_data()
    );
}

#[test]
fn round_trip_through_ipc_bytes() {
    let data = sample_metrics();
    let mut builder = MetricsBuilder::new().unwrap();
    builder.append(&data).unwrap();
    let batch = builder.build().unwrap();

    let blobs = serialize_batch(&batch).unwrap();
    assert_eq!(blobs.len(), batch.tables().len());
    assert_eq!(blobs[0].0, PayloadType::Metrics);

    // Table order on the wire does not matter
    let mut bytes: Vec<Vec<u8>> = blobs.into_iter().map(|(_, bytes)| bytes).collect();
    bytes.reverse();
    let restored = deserialize_batch(SignalType::Metrics, &bytes).unwrap();
    assert_eq!(restored.tables()[0].0, PayloadType::Metrics);

    let decoded = MetricsDecoder::decode(&restored).unwrap();
    assert_eq!(
        decoded,
        metrics::optimize(&data, MetricsSort::None).to_metrics_data()
    );

    let traces = sample_traces();
    let mut builder = TracesBuilder::new().unwrap();
    builder.append(&traces).unwrap();
    let batch = builder.build().unwrap();
    let bytes: Vec<Vec<u8>> = serialize_batch(&batch)
        .unwrap()
        .into_iter()
        .map(|(_, bytes)| bytes)
        .collect();
    let restored = deserialize_batch(SignalType::Traces, &bytes).unwrap();
    assert_eq!(
        TracesDecoder::decode(&restored).unwrap(),
        traces::optimize(&traces, TracesSort::None).to_traces_data()
    );
}
