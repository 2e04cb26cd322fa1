use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use otlp2arrow::sink::SinkRegistry;
use otlp2arrow::{decode_dir, encode_to_dir, init_tracing, verify, Telemetry};
use otlp2arrow_core::config::LogFormat;
use otlp2arrow_core::{EncoderConfig, SignalType};
use std::path::PathBuf;

/// Transcode OTLP telemetry into correlated Arrow IPC tables
#[derive(Parser)]
#[command(name = "otlp2arrow")]
#[command(version)]
#[command(about = "Transcode OTLP telemetry into correlated Arrow IPC tables", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level: trace, debug, info, warn, error
    #[arg(short = 'v', long, value_name = "LEVEL", global = true)]
    log_level: Option<String>,

    /// Log format: text, json
    #[arg(long, value_name = "FORMAT", global = true)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Encode OTLP protobuf files into one Arrow IPC file per table
    Encode {
        /// MetricsData or ExportMetricsServiceRequest protobuf
        #[arg(long, value_name = "FILE")]
        metrics: Option<PathBuf>,

        /// LogsData or ExportLogsServiceRequest protobuf
        #[arg(long, value_name = "FILE")]
        logs: Option<PathBuf>,

        /// TracesData or ExportTraceServiceRequest protobuf
        #[arg(long, value_name = "FILE")]
        traces: Option<PathBuf>,

        /// Output directory; tables land in <DIR>/<signal>/
        #[arg(short, long, value_name = "DIR")]
        output: PathBuf,
    },

    /// Rebuild an OTLP protobuf file from a directory of encoded tables
    Decode {
        /// Signal stored in the directory: metrics, logs, traces
        #[arg(short, long)]
        signal: SignalType,

        /// Directory holding the .arrow tables of one signal
        #[arg(short, long, value_name = "DIR")]
        input: PathBuf,

        /// Protobuf file to write
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
    },

    /// Check that a protobuf file survives encode and decode unchanged
    Verify {
        /// Signal contained in the file: metrics, logs, traces
        #[arg(short, long)]
        signal: SignalType,

        /// Protobuf file to check
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Step 1: Load base configuration
    let mut config = match &cli.config {
        Some(path) => EncoderConfig::load_from_path(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => EncoderConfig::load().context("Failed to load configuration")?,
    };

    // Step 2: Apply CLI overrides (highest priority)
    if let Some(level) = &cli.log_level {
        config.log.level = level.clone();
    }
    if let Some(format) = cli.log_format {
        config.log.format = format;
    }

    init_tracing(&config.log);

    match cli.command {
        Command::Encode {
            metrics,
            logs,
            traces,
            output,
        } => {
            let inputs: Vec<(SignalType, PathBuf)> = [
                (SignalType::Metrics, metrics),
                (SignalType::Logs, logs),
                (SignalType::Traces, traces),
            ]
            .into_iter()
            .filter_map(|(signal, path)| path.map(|p| (signal, p)))
            .collect();

            let sinks = SinkRegistry::new();
            let summaries = encode_to_dir(&config, &sinks, &inputs, &output)?;
            println!("{}", serde_json::to_string_pretty(&summaries)?);
        }
        Command::Decode {
            signal,
            input,
            output,
        } => {
            decode_dir(signal, &input, &output)?;
        }
        Command::Verify { signal, input } => {
            let telemetry = Telemetry::read(signal, &input)?;
            let report = verify(&config, &telemetry)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
