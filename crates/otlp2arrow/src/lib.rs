// otlp2arrow - command line front end for the columnar OTLP transcoder
//
// Reads OTLP protobuf files (MetricsData / LogsData / TracesData or the
// wire-identical Export*ServiceRequest), encodes them into correlated Arrow
// tables, writes one IPC file per table, and reads them back.

use anyhow::{Context, Result};
use opentelemetry_proto::tonic::logs::v1::LogsData;
use opentelemetry_proto::tonic::metrics::v1::MetricsData;
use opentelemetry_proto::tonic::trace::v1::TracesData;
use otlp2arrow_core::otlp::{logs, metrics, traces};
use otlp2arrow_core::{
    codec, AnalyzerReport, EncodedBatch, EncoderConfig, LogsBuilder, LogsDecoder, MetricsBuilder,
    MetricsDecoder, SignalEncoder, SignalType, TracesBuilder, TracesDecoder,
};
use prost::Message;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

mod init;
pub mod sink;

pub use init::init_tracing;
use sink::{ipc_files, IpcDirectorySink, SinkRegistry};

/// One decoded OTLP batch of any signal
#[derive(Debug, Clone, PartialEq)]
pub enum Telemetry {
    Metrics(MetricsData),
    Logs(LogsData),
    Traces(TracesData),
}

/// Output of an encoder run
#[derive(Debug)]
pub struct Encoded {
    pub batch: EncodedBatch,
    pub report: Option<AnalyzerReport>,
}

/// Append, build and release a single-use encoder
fn run<E: SignalEncoder>(
    mut encoder: E,
    input: &E::Input,
    report: fn(&E) -> Option<AnalyzerReport>,
) -> Result<Encoded> {
    let result = encoder.append(input).and_then(|()| encoder.build());
    let report = report(&encoder);
    encoder.release();
    Ok(Encoded {
        batch: result?,
        report,
    })
}

impl Telemetry {
    /// Parse protobuf bytes as the given signal
    pub fn from_protobuf(signal: SignalType, bytes: &[u8]) -> Result<Self> {
        let telemetry = match signal {
            SignalType::Metrics => Telemetry::Metrics(MetricsData::decode(bytes)?),
            SignalType::Logs => Telemetry::Logs(LogsData::decode(bytes)?),
            SignalType::Traces => Telemetry::Traces(TracesData::decode(bytes)?),
        };
        Ok(telemetry)
    }

    pub fn read(signal: SignalType, path: &Path) -> Result<Self> {
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read input: {}", path.display()))?;
        Self::from_protobuf(signal, &bytes)
            .with_context(|| format!("Failed to parse {} protobuf: {}", signal, path.display()))
    }

    pub fn to_protobuf(&self) -> Vec<u8> {
        match self {
            Telemetry::Metrics(data) => data.encode_to_vec(),
            Telemetry::Logs(data) => data.encode_to_vec(),
            Telemetry::Traces(data) => data.encode_to_vec(),
        }
    }

    pub fn signal(&self) -> SignalType {
        match self {
            Telemetry::Metrics(_) => SignalType::Metrics,
            Telemetry::Logs(_) => SignalType::Logs,
            Telemetry::Traces(_) => SignalType::Traces,
        }
    }

    /// Encode with a fresh builder configured from `config`
    pub fn encode(&self, config: &EncoderConfig) -> Result<Encoded> {
        match self {
            Telemetry::Metrics(data) => run(MetricsBuilder::with_config(config)?, data, |e| {
                e.analyzer().map(|a| a.report().clone())
            }),
            Telemetry::Logs(data) => run(LogsBuilder::with_config(config)?, data, |e| {
                e.analyzer().map(|a| a.report().clone())
            }),
            Telemetry::Traces(data) => run(TracesBuilder::with_config(config)?, data, |e| {
                e.analyzer().map(|a| a.report().clone())
            }),
        }
    }

    pub fn decode(batch: &EncodedBatch) -> Result<Self> {
        let telemetry = match batch.signal() {
            SignalType::Metrics => Telemetry::Metrics(MetricsDecoder::decode(batch)?),
            SignalType::Logs => Telemetry::Logs(LogsDecoder::decode(batch)?),
            SignalType::Traces => Telemetry::Traces(TracesDecoder::decode(batch)?),
        };
        Ok(telemetry)
    }

    /// The batch as the encoder sees it: regrouped and sorted per `config`
    pub fn optimized(&self, config: &EncoderConfig) -> Self {
        match self {
            Telemetry::Metrics(data) => {
                Telemetry::Metrics(metrics::optimize(data, config.metrics.sort).to_metrics_data())
            }
            Telemetry::Logs(data) => {
                Telemetry::Logs(logs::optimize(data, config.logs.sort).to_logs_data())
            }
            Telemetry::Traces(data) => {
                Telemetry::Traces(traces::optimize(data, config.traces.sort).to_traces_data())
            }
        }
    }
}

/// Files written for one signal by `encode_to_dir`
#[derive(Debug, Clone, Serialize)]
pub struct EncodeSummary {
    pub signal: SignalType,
    pub rows: usize,
    pub files: Vec<PathBuf>,
}

/// Encode each input file and write its tables below `output`
///
/// All signals writing to the same directory share one sink from `sinks`.
pub fn encode_to_dir(
    config: &EncoderConfig,
    sinks: &SinkRegistry,
    inputs: &[(SignalType, PathBuf)],
    output: &Path,
) -> Result<Vec<EncodeSummary>> {
    if inputs.is_empty() {
        anyhow::bail!("nothing to encode: pass at least one of --metrics, --logs, --traces");
    }

    let mut summaries = Vec::with_capacity(inputs.len());
    for (signal, path) in inputs {
        let sink = sinks.get_or_add(output.to_path_buf(), || Ok(IpcDirectorySink::new(output)))?;
        sink.start()?;

        let telemetry = Telemetry::read(*signal, path)?;
        let encoded = telemetry
            .encode(config)
            .with_context(|| format!("Failed to encode {}", path.display()))?;
        if let Some(report) = &encoded.report {
            info!(signal = %signal, report = %serde_json::to_string(report)?, "encoder stats");
        }
        let rows = encoded.batch.num_rows();
        let files = sink.write(encoded.batch)?;
        info!(
            signal = %signal,
            rows,
            tables = files.len(),
            dir = %sink.signal_dir(*signal).display(),
            "encoded"
        );
        summaries.push(EncodeSummary {
            signal: *signal,
            rows,
            files,
        });
        sink.release()?;
    }
    Ok(summaries)
}

/// Read the per-table IPC files of one signal directory
pub fn read_dir(signal: SignalType, dir: &Path) -> Result<EncodedBatch> {
    let files = ipc_files(dir)?;
    if files.is_empty() {
        anyhow::bail!("no .arrow tables found in {}", dir.display());
    }
    let blobs = files
        .iter()
        .map(|path| {
            fs::read(path).with_context(|| format!("Failed to read table: {}", path.display()))
        })
        .collect::<Result<Vec<_>>>()?;
    codec::deserialize_batch(signal, &blobs)
        .with_context(|| format!("Failed to load {} tables from {}", signal, dir.display()))
}

/// Decode a signal directory back into OTLP and write it as protobuf
pub fn decode_dir(signal: SignalType, dir: &Path, output: &Path) -> Result<Telemetry> {
    let batch = read_dir(signal, dir)?;
    let telemetry = Telemetry::decode(&batch)?;
    fs::write(output, telemetry.to_protobuf())
        .with_context(|| format!("Failed to write output: {}", output.display()))?;
    info!(
        signal = %signal,
        rows = batch.num_rows(),
        output = %output.display(),
        "decoded"
    );
    Ok(telemetry)
}

/// Result of a successful round trip check
#[derive(Debug, Clone, Serialize)]
pub struct VerifyReport {
    pub signal: SignalType,
    pub rows: usize,
    pub tables: usize,
    pub ipc_bytes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<AnalyzerReport>,
}

/// Encode, serialize, deserialize and decode `telemetry`; fail unless the
/// result equals the optimized input
pub fn verify(config: &EncoderConfig, telemetry: &Telemetry) -> Result<VerifyReport> {
    let signal = telemetry.signal();
    let encoded = telemetry.encode(config)?;
    let blobs = codec::serialize_batch(&encoded.batch)?;
    let ipc_bytes = blobs.iter().map(|(_, bytes)| bytes.len()).sum();
    let bytes: Vec<Vec<u8>> = blobs.into_iter().map(|(_, bytes)| bytes).collect();

    let restored = codec::deserialize_batch(signal, &bytes)?;
    let decoded = Telemetry::decode(&restored)?;
    if decoded != telemetry.optimized(config) {
        anyhow::bail!("{signal} batch did not survive the round trip unchanged");
    }

    Ok(VerifyReport {
        signal,
        rows: restored.num_rows(),
        tables: restored.tables().len(),
        ipc_bytes,
        stats: encoded.report,
    })
}
