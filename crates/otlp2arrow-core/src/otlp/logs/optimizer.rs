use opentelemetry_proto::tonic::logs::v1::{LogRecord, LogsData, ResourceLogs, ScopeLogs};

use crate::config::LogsSort;
use crate::otlp::common::grouping::{regroup, Optimized};

/// Regroup a logs batch by resource and scope, then sort records per scope
pub fn optimize(data: &LogsData, sort: LogsSort) -> Optimized<'_, LogRecord> {
    match sort {
        LogsSort::None => regroup(&data.resource_logs, |_, _| std::cmp::Ordering::Equal),
        LogsSort::Time => regroup(&data.resource_logs, |a: &LogRecord, b: &LogRecord| {
            a.time_unix_nano.cmp(&b.time_unix_nano)
        }),
        LogsSort::Severity => regroup(&data.resource_logs, |a: &LogRecord, b: &LogRecord| {
            a.severity_number.cmp(&b.severity_number)
        }),
    }
}

impl Optimized<'_, LogRecord> {
    /// Materialize the regrouped batch
    pub fn to_logs_data(&self) -> LogsData {
        LogsData {
            resource_logs: self
                .resources
                .iter()
                .map(|resource| ResourceLogs {
                    resource: resource.resource.cloned(),
                    schema_url: resource.schema_url.to_string(),
                    scope_logs: resource
                        .scopes
                        .iter()
                        .map(|scope| ScopeLogs {
                            scope: scope.scope.cloned(),
                            schema_url: scope.schema_url.to_string(),
                            log_records: scope.items.iter().map(|r| (*r).clone()).collect(),
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}
