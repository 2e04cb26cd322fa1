// otlp2arrow-core - Columnar OTLP transcoding
//
// Pure conversion between OTLP batches (metrics, logs, traces) and a family of
// correlated Arrow tables. No I/O beyond reading config files, no async.
//
// - schema:      one schema per payload type, hints in field metadata
// - builder:     typed column builders behind a uniform append/build API
// - accumulator: attribute tables keyed by parent id
// - otlp:        optimizer, builder and decoder per signal
// - codec:       per-table Arrow IPC framing

pub mod accumulator;
pub mod batch;
pub mod builder;
pub mod codec;
pub mod config;
pub(crate) mod decode;
pub mod error;
pub mod otlp;
pub mod schema;
pub mod stats;

pub use batch::{EncodedBatch, SignalEncoder};
pub use config::EncoderConfig;
pub use error::{Error, Result};
pub use otlp::logs::{LogsBuilder, LogsDecoder};
pub use otlp::metrics::{MetricsBuilder, MetricsDecoder};
pub use otlp::traces::{TracesBuilder, TracesDecoder};
pub use schema::{schema_for, PayloadType, SignalType};
pub use stats::{Analyzer, AnalyzerReport, BatchStats};
