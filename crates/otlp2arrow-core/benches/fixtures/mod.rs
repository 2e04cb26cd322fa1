// Synthetic OTLP metrics for benchmarking
//
// Metrics are spread over a handful of resources and scopes with repeated
// names, so the optimizer has groups to merge and names to sort.

use opentelemetry_proto::tonic::common::v1::{any_value, AnyValue, InstrumentationScope, KeyValue};
use opentelemetry_proto::tonic::metrics::v1::{
    metric::Data, number_data_point, Gauge, Histogram, HistogramDataPoint, Metric, MetricsData,
    NumberDataPoint, ResourceMetrics, ScopeMetrics, Sum,
};
use opentelemetry_proto::tonic::resource::v1::Resource;

/// Workload size presets; metric counts stay below the u16 primary id range
#[derive(Debug, Clone, Copy)]
pub enum WorkloadSize {
    Small,  // 1k metrics
    Medium, // 20k metrics
}

impl WorkloadSize {
    pub fn metric_count(&self) -> usize {
        match self {
            WorkloadSize::Small => 1_000,
            WorkloadSize::Medium => 20_000,
        }
    }
}

fn kv(key: &str, value: impl Into<String>) -> KeyValue {
    KeyValue {
        key: key.to_string(),
        value: Some(AnyValue {
            value: Some(any_value::Value::StringValue(value.into())),
        }),
    }
}

fn metric(index: usize, base_time: u64) -> Metric {
    let attributes = vec![kv("host", format!("host-{}", index % 7)), kv("region", "eu-west-1")];
    let time = base_time + index as u64 * 1_000_000;
    let data = match index % 3 {
        0 => Data::Gauge(Gauge {
            data_points: vec![NumberDataPoint {
                attributes,
                time_unix_nano: time,
                value: Some(number_data_point::Value::AsDouble(index as f64 * 0.5)),
                ..Default::default()
            }],
        }),
        1 => Data::Sum(Sum {
            data_points: (0..4)
                .map(|i| NumberDataPoint {
                    attributes: attributes.clone(),
                    start_time_unix_nano: base_time,
                    time_unix_nano: time + i,
                    value: Some(number_data_point::Value::AsInt(i as i64)),
                    ..Default::default()
                })
                .collect(),
            aggregation_temporality: 2,
            is_monotonic: true,
        }),
        _ => Data::Histogram(Histogram {
            data_points: vec![HistogramDataPoint {
                attributes,
                time_unix_nano: time,
                count: 10,
                sum: Some(42.0),
                bucket_counts: vec![1, 2, 3, 4],
                explicit_bounds: vec![1.0, 5.0, 10.0],
                ..Default::default()
            }],
            aggregation_temporality: 1,
        }),
    };
    Metric {
        name: format!("app.metric.{}", index % 50),
        unit: "1".to_string(),
        data: Some(data),
        ..Default::default()
    }
}

pub fn generate_metrics(size: WorkloadSize) -> MetricsData {
    let count = size.metric_count();
    let base_time = 1_700_000_000_000_000_000;
    let num_resources = (count / 500).clamp(1, 20);
    let per_resource = count / num_resources;

    let resource_metrics = (0..num_resources)
        .map(|r| ResourceMetrics {
            resource: Some(Resource {
                attributes: vec![kv("service.name", format!("bench-service-{}", r % 5))],
                ..Default::default()
            }),
            scope_metrics: vec![ScopeMetrics {
                scope: Some(InstrumentationScope {
                    name: "bench".to_string(),
                    version: "1.0.0".to_string(),
                    ..Default::default()
                }),
                metrics: (0..per_resource)
                    .map(|i| metric(r * per_resource + i, base_time))
                    .collect(),
                ..Default::default()
            }],
            ..Default::default()
        })
        .collect();
    MetricsData { resource_metrics }
}
