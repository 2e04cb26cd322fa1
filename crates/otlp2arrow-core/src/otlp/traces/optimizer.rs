use opentelemetry_proto::tonic::trace::v1::{ResourceSpans, ScopeSpans, Span, TracesData};

use crate::config::TracesSort;
use crate::otlp::common::grouping::{regroup, Optimized};

/// Regroup a traces batch by resource and scope, then sort spans per scope
pub fn optimize(data: &TracesData, sort: TracesSort) -> Optimized<'_, Span> {
    match sort {
        TracesSort::None => regroup(&data.resource_spans, |_, _| std::cmp::Ordering::Equal),
        TracesSort::Name => regroup(&data.resource_spans, |a: &Span, b: &Span| {
            a.name.cmp(&b.name)
        }),
        TracesSort::StartTime => regroup(&data.resource_spans, |a: &Span, b: &Span| {
            a.start_time_unix_nano.cmp(&b.start_time_unix_nano)
        }),
    }
}

impl Optimized<'_, Span> {
    /// Materialize the regrouped batch
    pub fn to_traces_data(&self) -> TracesData {
        TracesData {
            resource_spans: self
                .resources
                .iter()
                .map(|resource| ResourceSpans {
                    resource: resource.resource.cloned(),
                    schema_url: resource.schema_url.to_string(),
                    scope_spans: resource
                        .scopes
                        .iter()
                        .map(|scope| ScopeSpans {
                            scope: scope.scope.cloned(),
                            schema_url: scope.schema_url.to_string(),
                            spans: scope.items.iter().map(|s| (*s).clone()).collect(),
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

    #[test]
    fn spans_sort_by_name_within_scope() {
        let span = |name: &str, start: u64| Span {
            name: name.into(),
            start_time_unix_nano: start,
            ..Default::default()
        };
        let data = TracesData {
            resource_spans: vec![ResourceSpans {
                scope_spans: vec![ScopeSpans {
                    spans: vec![span("b", 1), span("a", 2), span("b", 0)],
                    ..Default::default()
                }],
                ..Default::default()
            }],
        };
        let optimized = optimize(&data, TracesSort::Name);
        let order: Vec<(&str, u64)> = optimized
            .rows()
            .map(|s| (s.name.as_str(), s.start_time_unix_nano))
            .collect();
        assert_eq!(order, vec![("a", 2), ("b", 1), ("b", 0)]);

        let optimized = optimize(&data, TracesSort::StartTime);
        let starts: Vec<u64> = optimized.rows().map(|s| s.start_time_unix_nano).collect();
        assert_eq!(starts, vec![0, 1, 2]);
    }
}
