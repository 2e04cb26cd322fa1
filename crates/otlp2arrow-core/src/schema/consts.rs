// Column names shared by every columnar OTLP table
//
// Names follow the OTLP proto field names wherever a column maps one-to-one
// onto a proto field.

// ============ Identity & correlation ============
pub const ID: &str = "id";
pub const PARENT_ID: &str = "parent_id";

// ============ Resource / scope ============
pub const RESOURCE: &str = "resource";
pub const SCOPE: &str = "scope";
pub const SCHEMA_URL: &str = "schema_url";
pub const DROPPED_ATTRIBUTES_COUNT: &str = "dropped_attributes_count";
pub const NAME: &str = "name";
pub const VERSION: &str = "version";

// ============ Attributes & AnyValue ============
pub const KEY: &str = "key";
pub const ATTRIBUTE_TYPE: &str = "type";
pub const ATTRIBUTE_STR: &str = "str";
pub const ATTRIBUTE_INT: &str = "int";
pub const ATTRIBUTE_DOUBLE: &str = "double";
pub const ATTRIBUTE_BOOL: &str = "bool";
pub const ATTRIBUTE_BYTES: &str = "bytes";
pub const ATTRIBUTE_SER: &str = "ser";

// ============ Metrics ============
pub const METRIC_TYPE: &str = "metric_type";
pub const DESCRIPTION: &str = "description";
pub const UNIT: &str = "unit";
pub const AGGREGATION_TEMPORALITY: &str = "aggregation_temporality";
pub const IS_MONOTONIC: &str = "is_monotonic";

// ============ Data points ============
pub const START_TIME_UNIX_NANO: &str = "start_time_unix_nano";
pub const TIME_UNIX_NANO: &str = "time_unix_nano";
pub const INT_VALUE: &str = "int_value";
pub const DOUBLE_VALUE: &str = "double_value";
pub const FLAGS: &str = "flags";
pub const COUNT: &str = "count";
pub const SUM: &str = "sum";
pub const MIN: &str = "min";
pub const MAX: &str = "max";
pub const BUCKET_COUNTS: &str = "bucket_counts";
pub const EXPLICIT_BOUNDS: &str = "explicit_bounds";
pub const QUANTILE_QUANTILES: &str = "quantile_quantiles";
pub const QUANTILE_VALUES: &str = "quantile_values";
pub const SCALE: &str = "scale";
pub const ZERO_COUNT: &str = "zero_count";
pub const ZERO_THRESHOLD: &str = "zero_threshold";
pub const POSITIVE: &str = "positive";
pub const NEGATIVE: &str = "negative";
pub const OFFSET: &str = "offset";

// ============ Exemplars, spans, logs ============
pub const TRACE_ID: &str = "trace_id";
pub const SPAN_ID: &str = "span_id";
pub const PARENT_SPAN_ID: &str = "parent_span_id";
pub const TRACE_STATE: &str = "trace_state";
pub const KIND: &str = "kind";
pub const DURATION_TIME_UNIX_NANO: &str = "duration_time_unix_nano";
pub const DROPPED_EVENTS_COUNT: &str = "dropped_events_count";
pub const DROPPED_LINKS_COUNT: &str = "dropped_links_count";
pub const STATUS: &str = "status";
pub const STATUS_CODE: &str = "code";
pub const STATUS_MESSAGE: &str = "status_message";
pub const OBSERVED_TIME_UNIX_NANO: &str = "observed_time_unix_nano";
pub const SEVERITY_NUMBER: &str = "severity_number";
pub const SEVERITY_TEXT: &str = "severity_text";
pub const BODY: &str = "body";
