// Schema registry for columnar OTLP tables
//
// Every table (payload type) has one ordered, immutable Arrow schema. Columns
// carry encoding hints in their field metadata:
//
// - `otlp2arrow.optional`   - the column may hold nulls (absent proto values)
// - `otlp2arrow.dictionary` - string column is dictionary encoded with 8 or 16 bit keys
// - `otlp2arrow.encoding`   - `delta` for monotonically increasing integer keys
//
// Schemas are built once per process and shared as `Arc<Schema>`.

pub mod consts;
mod common;
mod logs;
mod metrics;
mod traces;

use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

pub use common::AttributeValueType;

pub const METADATA_OPTIONAL: &str = "otlp2arrow.optional";
pub const METADATA_DICTIONARY: &str = "otlp2arrow.dictionary";
pub const METADATA_ENCODING: &str = "otlp2arrow.encoding";
pub const METADATA_PAYLOAD_TYPE: &str = "otlp2arrow.payload_type";
pub const METADATA_SCHEMA_VERSION: &str = "otlp2arrow.schema_version";

pub const SCHEMA_VERSION: &str = "1.0.0";
const DELTA_ENCODING: &str = "delta";

/// Telemetry signal a table belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalType {
    Metrics,
    Logs,
    Traces,
}

impl SignalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalType::Metrics => "metrics",
            SignalType::Logs => "logs",
            SignalType::Traces => "traces",
        }
    }
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignalType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "metrics" => Ok(SignalType::Metrics),
            "logs" => Ok(SignalType::Logs),
            "traces" | "spans" => Ok(SignalType::Traces),
            _ => anyhow::bail!("Unsupported signal: {}. Supported: metrics, logs, traces", s),
        }
    }
}

/// Identifies one columnar table: a primary signal table or one of its related tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayloadType {
    ResourceAttrs,
    ScopeAttrs,
    // Metrics
    Metrics,
    MetricAttrs,
    NumberDataPoints,
    NumberDpAttrs,
    NumberDpExemplars,
    NumberDpExemplarAttrs,
    SummaryDataPoints,
    SummaryDpAttrs,
    HistogramDataPoints,
    HistogramDpAttrs,
    HistogramDpExemplars,
    HistogramDpExemplarAttrs,
    ExpHistogramDataPoints,
    ExpHistogramDpAttrs,
    ExpHistogramDpExemplars,
    ExpHistogramDpExemplarAttrs,
    // Logs
    Logs,
    LogAttrs,
    // Traces
    Spans,
    SpanAttrs,
    SpanEvents,
    SpanEventAttrs,
    SpanLinks,
    SpanLinkAttrs,
}

impl PayloadType {
    pub const ALL: [PayloadType; 26] = [
        PayloadType::ResourceAttrs,
        PayloadType::ScopeAttrs,
        PayloadType::Metrics,
        PayloadType::MetricAttrs,
        PayloadType::NumberDataPoints,
        PayloadType::NumberDpAttrs,
        PayloadType::NumberDpExemplars,
        PayloadType::NumberDpExemplarAttrs,
        PayloadType::SummaryDataPoints,
        PayloadType::SummaryDpAttrs,
        PayloadType::HistogramDataPoints,
        PayloadType::HistogramDpAttrs,
        PayloadType::HistogramDpExemplars,
        PayloadType::HistogramDpExemplarAttrs,
        PayloadType::ExpHistogramDataPoints,
        PayloadType::ExpHistogramDpAttrs,
        PayloadType::ExpHistogramDpExemplars,
        PayloadType::ExpHistogramDpExemplarAttrs,
        PayloadType::Logs,
        PayloadType::LogAttrs,
        PayloadType::Spans,
        PayloadType::SpanAttrs,
        PayloadType::SpanEvents,
        PayloadType::SpanEventAttrs,
        PayloadType::SpanLinks,
        PayloadType::SpanLinkAttrs,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PayloadType::ResourceAttrs => "RESOURCE_ATTRS",
            PayloadType::ScopeAttrs => "SCOPE_ATTRS",
            PayloadType::Metrics => "METRICS",
            PayloadType::MetricAttrs => "METRIC_ATTRS",
            PayloadType::NumberDataPoints => "NUMBER_DATA_POINTS",
            PayloadType::NumberDpAttrs => "NUMBER_DP_ATTRS",
            PayloadType::NumberDpExemplars => "NUMBER_DP_EXEMPLARS",
            PayloadType::NumberDpExemplarAttrs => "NUMBER_DP_EXEMPLAR_ATTRS",
            PayloadType::SummaryDataPoints => "SUMMARY_DATA_POINTS",
            PayloadType::SummaryDpAttrs => "SUMMARY_DP_ATTRS",
            PayloadType::HistogramDataPoints => "HISTOGRAM_DATA_POINTS",
            PayloadType::HistogramDpAttrs => "HISTOGRAM_DP_ATTRS",
            PayloadType::HistogramDpExemplars => "HISTOGRAM_DP_EXEMPLARS",
            PayloadType::HistogramDpExemplarAttrs => "HISTOGRAM_DP_EXEMPLAR_ATTRS",
            PayloadType::ExpHistogramDataPoints => "EXP_HISTOGRAM_DATA_POINTS",
            PayloadType::ExpHistogramDpAttrs => "EXP_HISTOGRAM_DP_ATTRS",
            PayloadType::ExpHistogramDpExemplars => "EXP_HISTOGRAM_DP_EXEMPLARS",
            PayloadType::ExpHistogramDpExemplarAttrs => "EXP_HISTOGRAM_DP_EXEMPLAR_ATTRS",
            PayloadType::Logs => "LOGS",
            PayloadType::LogAttrs => "LOG_ATTRS",
            PayloadType::Spans => "SPANS",
            PayloadType::SpanAttrs => "SPAN_ATTRS",
            PayloadType::SpanEvents => "SPAN_EVENTS",
            PayloadType::SpanEventAttrs => "SPAN_EVENT_ATTRS",
            PayloadType::SpanLinks => "SPAN_LINKS",
            PayloadType::SpanLinkAttrs => "SPAN_LINK_ATTRS",
        }
    }

    /// Primary table of a signal
    pub fn primary(signal: SignalType) -> Self {
        match signal {
            SignalType::Metrics => PayloadType::Metrics,
            SignalType::Logs => PayloadType::Logs,
            SignalType::Traces => PayloadType::Spans,
        }
    }

    /// True for tables made of attribute rows
    pub fn is_attributes(&self) -> bool {
        matches!(
            self,
            PayloadType::ResourceAttrs
                | PayloadType::ScopeAttrs
                | PayloadType::MetricAttrs
                | PayloadType::NumberDpAttrs
                | PayloadType::NumberDpExemplarAttrs
                | PayloadType::SummaryDpAttrs
                | PayloadType::HistogramDpAttrs
                | PayloadType::HistogramDpExemplarAttrs
                | PayloadType::ExpHistogramDpAttrs
                | PayloadType::ExpHistogramDpExemplarAttrs
                | PayloadType::LogAttrs
                | PayloadType::SpanAttrs
                | PayloadType::SpanEventAttrs
                | PayloadType::SpanLinkAttrs
        )
    }
}

impl fmt::Display for PayloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PayloadType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        PayloadType::ALL
            .iter()
            .copied()
            .find(|payload| payload.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| anyhow::anyhow!("Unknown payload type: {}", s))
    }
}

/// Key width of a dictionary encoded column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DictionaryWidth {
    U8,
    U16,
}

/// Encoding hints attached to a column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hint {
    Optional,
    Dictionary8,
    Dictionary16,
    DeltaEncoding,
}

/// Encoding hints parsed back from a field's metadata
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColumnHints {
    pub optional: bool,
    pub dictionary: Option<DictionaryWidth>,
    pub delta: bool,
}

impl ColumnHints {
    pub fn of(field: &Field) -> Self {
        let metadata = field.metadata();
        let dictionary = match metadata.get(METADATA_DICTIONARY).map(String::as_str) {
            Some("8") => Some(DictionaryWidth::U8),
            Some("16") => Some(DictionaryWidth::U16),
            _ => None,
        };
        Self {
            optional: metadata
                .get(METADATA_OPTIONAL)
                .is_some_and(|value| value == "true"),
            dictionary,
            delta: metadata
                .get(METADATA_ENCODING)
                .is_some_and(|value| value == DELTA_ENCODING),
        }
    }
}

/// Create a Field whose nullability and metadata follow the given hints
pub(crate) fn field(name: &str, data_type: DataType, hints: &[Hint]) -> Field {
    let mut metadata = HashMap::new();
    let mut nullable = false;
    for hint in hints {
        match hint {
            Hint::Optional => {
                nullable = true;
                metadata.insert(METADATA_OPTIONAL.to_string(), "true".to_string());
            }
            Hint::Dictionary8 => {
                metadata.insert(METADATA_DICTIONARY.to_string(), "8".to_string());
            }
            Hint::Dictionary16 => {
                metadata.insert(METADATA_DICTIONARY.to_string(), "16".to_string());
            }
            Hint::DeltaEncoding => {
                metadata.insert(METADATA_ENCODING.to_string(), DELTA_ENCODING.to_string());
            }
        }
    }
    Field::new(name, data_type, nullable).with_metadata(metadata)
}

/// Element field used by every list column
pub(crate) fn list_of(data_type: DataType) -> DataType {
    DataType::List(Arc::new(Field::new("item", data_type, true)))
}

fn schema_with_payload(payload: PayloadType, fields: Vec<Field>) -> Schema {
    let metadata = HashMap::from([
        (
            METADATA_PAYLOAD_TYPE.to_string(),
            payload.as_str().to_string(),
        ),
        (
            METADATA_SCHEMA_VERSION.to_string(),
            SCHEMA_VERSION.to_string(),
        ),
    ]);
    Schema::new_with_metadata(fields, metadata)
}

fn build_schema(payload: PayloadType) -> Schema {
    let fields = match payload {
        PayloadType::ResourceAttrs
        | PayloadType::ScopeAttrs
        | PayloadType::MetricAttrs
        | PayloadType::LogAttrs
        | PayloadType::SpanAttrs => common::attrs_fields(DataType::UInt16),
        PayloadType::NumberDpAttrs
        | PayloadType::NumberDpExemplarAttrs
        | PayloadType::SummaryDpAttrs
        | PayloadType::HistogramDpAttrs
        | PayloadType::HistogramDpExemplarAttrs
        | PayloadType::ExpHistogramDpAttrs
        | PayloadType::ExpHistogramDpExemplarAttrs
        | PayloadType::SpanEventAttrs
        | PayloadType::SpanLinkAttrs => common::attrs_fields(DataType::UInt32),
        PayloadType::Metrics => metrics::metrics_fields(),
        PayloadType::NumberDataPoints => metrics::number_data_points_fields(),
        PayloadType::SummaryDataPoints => metrics::summary_data_points_fields(),
        PayloadType::HistogramDataPoints => metrics::histogram_data_points_fields(),
        PayloadType::ExpHistogramDataPoints => metrics::exp_histogram_data_points_fields(),
        PayloadType::NumberDpExemplars
        | PayloadType::HistogramDpExemplars
        | PayloadType::ExpHistogramDpExemplars => metrics::exemplars_fields(),
        PayloadType::Logs => logs::logs_fields(),
        PayloadType::Spans => traces::spans_fields(),
        PayloadType::SpanEvents => traces::span_events_fields(),
        PayloadType::SpanLinks => traces::span_links_fields(),
    };
    schema_with_payload(payload, fields)
}

/// Returns the cached schema for a payload type
///
/// Lookup is total: every `PayloadType` has exactly one schema for the
/// lifetime of the process.
pub fn schema_for(payload: PayloadType) -> SchemaRef {
    static REGISTRY: OnceLock<HashMap<PayloadType, SchemaRef>> = OnceLock::new();
    let registry = REGISTRY.get_or_init(|| {
        PayloadType::ALL
            .iter()
            .map(|payload| (*payload, Arc::new(build_schema(*payload))))
            .collect()
    });
    match registry.get(&payload) {
        Some(schema) => Arc::clone(schema),
        None => Arc::new(build_schema(payload)),
    }
}

/// Payload type recorded in a schema's metadata, if any
pub fn payload_of(schema: &Schema) -> Option<PayloadType> {
    schema
        .metadata()
        .get(METADATA_PAYLOAD_TYPE)
        .and_then(|name| name.parse().ok())
}
