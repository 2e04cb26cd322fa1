use opentelemetry_proto::tonic::metrics::v1::{Metric, MetricsData, ResourceMetrics, ScopeMetrics};

use super::MetricType;
use crate::config::MetricsSort;
use crate::otlp::common::grouping::{regroup, Optimized};

/// Regroup a metrics batch by resource and scope, then sort metrics per scope
pub fn optimize(data: &MetricsData, sort: MetricsSort) -> Optimized<'_, Metric> {
    match sort {
        MetricsSort::None => regroup(&data.resource_metrics, |_, _| std::cmp::Ordering::Equal),
        MetricsSort::Name => regroup(&data.resource_metrics, |a: &Metric, b: &Metric| {
            a.name.cmp(&b.name)
        }),
        MetricsSort::TypeName => regroup(&data.resource_metrics, |a: &Metric, b: &Metric| {
            MetricType::of(a)
                .cmp(&MetricType::of(b))
                .then_with(|| a.name.cmp(&b.name))
        }),
    }
}

impl Optimized<'_, Metric> {
    /// Materialize the regrouped batch
    pub fn to_metrics_data(&self) -> MetricsData {
        MetricsData {
            resource_metrics: self
                .resources
                .iter()
                .map(|resource| ResourceMetrics {
                    resource: resource.resource.cloned(),
                    schema_url: resource.schema_url.to_string(),
                    scope_metrics: resource
                        .scopes
                        .iter()
                        .map(|scope| ScopeMetrics {
                            scope: scope.scope.cloned(),
                            schema_url: scope.schema_url.to_string(),
                            metrics: scope.items.iter().map(|m| (*m).clone()).collect(),
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry_proto::tonic::common::v1::{any_value, AnyValue, KeyValue};
    use opentelemetry_proto::tonic::metrics::v1::{metric::Data, Gauge, Sum};
    use opentelemetry_proto::tonic::resource::v1::Resource;

    fn resource(service: &str) -> Option<Resource> {
        Some(Resource {
            attributes: vec![KeyValue {
                key: "service.name".into(),
                value: Some(AnyValue {
                    value: Some(any_value::Value::StringValue(service.into())),
                }),
            }],
            ..Default::default()
        })
    }

    fn metric(name: &str, data: Option<Data>) -> Metric {
        Metric {
            name: name.into(),
            data,
            ..Default::default()
        }
    }

    fn resource_metrics(service: &str, metrics: Vec<Metric>) -> ResourceMetrics {
        ResourceMetrics {
            resource: resource(service),
            scope_metrics: vec![ScopeMetrics {
                metrics,
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn identical_resources_merge_in_first_appearance_order() {
        // [B, A, B] -> [B(b1, b2), A(a1)]
        let data = MetricsData {
            resource_metrics: vec![
                resource_metrics("b", vec![metric("b1", None)]),
                resource_metrics("a", vec![metric("a1", None)]),
                resource_metrics("b", vec![metric("b2", None)]),
            ],
        };
        let optimized = optimize(&data, MetricsSort::None);
        assert_eq!(optimized.resources.len(), 2);
        assert_eq!(optimized.scope_count(), 2);

        let names: Vec<&str> = optimized.rows().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["b1", "b2", "a1"]);

        let rebuilt = optimized.to_metrics_data();
        assert_eq!(rebuilt.resource_metrics[0].resource, resource("b"));
        assert_eq!(rebuilt.resource_metrics[1].resource, resource("a"));
    }

    #[test]
    fn type_name_sort_is_stable() {
        let gauge = || Some(Data::Gauge(Gauge::default()));
        let sum = || Some(Data::Sum(Sum::default()));
        let data = MetricsData {
            resource_metrics: vec![resource_metrics(
                "svc",
                vec![
                    metric("z", sum()),
                    metric("b", gauge()),
                    metric("a", sum()),
                    metric("b", gauge()),
                ],
            )],
        };
        let optimized = optimize(&data, MetricsSort::TypeName);
        let order: Vec<(MetricType, &str)> = optimized
            .rows()
            .map(|m| (MetricType::of(m), m.name.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![
                (MetricType::Gauge, "b"),
                (MetricType::Gauge, "b"),
                (MetricType::Sum, "a"),
                (MetricType::Sum, "z"),
            ]
        );
    }
}
