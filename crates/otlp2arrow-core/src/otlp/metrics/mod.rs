// OTLP metrics <-> columnar tables

mod from_arrow;
mod optimizer;
mod related;
mod to_arrow;

pub use from_arrow::MetricsDecoder;
pub use optimizer::optimize;
pub use to_arrow::MetricsBuilder;

use opentelemetry_proto::tonic::metrics::v1::{metric::Data, Metric};

/// Value of the `metric_type` column
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum MetricType {
    /// No data, or a kind this build does not know
    Empty = 0,
    Gauge = 1,
    Sum = 2,
    Histogram = 3,
    ExponentialHistogram = 4,
    Summary = 5,
}

impl MetricType {
    pub fn of(metric: &Metric) -> Self {
        match &metric.data {
            None => MetricType::Empty,
            Some(Data::Gauge(_)) => MetricType::Gauge,
            Some(Data::Sum(_)) => MetricType::Sum,
            Some(Data::Histogram(_)) => MetricType::Histogram,
            Some(Data::ExponentialHistogram(_)) => MetricType::ExponentialHistogram,
            Some(Data::Summary(_)) => MetricType::Summary,
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(MetricType::Empty),
            1 => Some(MetricType::Gauge),
            2 => Some(MetricType::Sum),
            3 => Some(MetricType::Histogram),
            4 => Some(MetricType::ExponentialHistogram),
            5 => Some(MetricType::Summary),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MetricType::Empty => "empty",
            MetricType::Gauge => "gauge",
            MetricType::Sum => "sum",
            MetricType::Histogram => "histogram",
            MetricType::ExponentialHistogram => "exponential_histogram",
            MetricType::Summary => "summary",
        }
    }
}
