// Directory sink for encoded batches
//
// Layout: <root>/<signal>/<payload>.arrow, one Arrow IPC stream per table.
// Encoders of several signals writing to the same root share one sink through
// the registry.

use anyhow::{Context, Result};
use otlp2arrow_core::codec;
use otlp2arrow_core::{EncodedBatch, SignalType};
use otlp2arrow_shared::{Component, SharedComponents};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

const IPC_EXTENSION: &str = "arrow";

pub type SinkRegistry = SharedComponents<PathBuf, IpcDirectorySink>;

#[derive(Debug)]
pub struct IpcDirectorySink {
    root: PathBuf,
    files_written: AtomicUsize,
}

impl IpcDirectorySink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            files_written: AtomicUsize::new(0),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn files_written(&self) -> usize {
        self.files_written.load(Ordering::Relaxed)
    }

    pub fn signal_dir(&self, signal: SignalType) -> PathBuf {
        self.root.join(signal.as_str())
    }

    /// Write every table of `batch`, replacing tables of an earlier run
    pub fn write(&self, batch: EncodedBatch) -> Result<Vec<PathBuf>> {
        let dir = self.signal_dir(batch.signal());
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        for stale in ipc_files(&dir)? {
            fs::remove_file(&stale)
                .with_context(|| format!("Failed to remove stale table: {}", stale.display()))?;
        }

        let tables = batch.into_tables();
        let mut written = Vec::with_capacity(tables.len());
        for (payload, table) in tables {
            let bytes = codec::serialize_table(&table)
                .with_context(|| format!("Failed to serialize {payload} table"))?;
            let path = dir.join(format!(
                "{}.{IPC_EXTENSION}",
                payload.as_str().to_lowercase()
            ));
            fs::write(&path, &bytes)
                .with_context(|| format!("Failed to write table: {}", path.display()))?;
            tracing::debug!(path = %path.display(), bytes = bytes.len(), "wrote table");
            written.push(path);
        }
        self.files_written.fetch_add(written.len(), Ordering::Relaxed);
        Ok(written)
    }
}

impl Component for IpcDirectorySink {
    fn start(&self) -> Result<()> {
        fs::create_dir_all(&self.root).with_context(|| {
            format!("Failed to create output directory: {}", self.root.display())
        })?;

        // Validate writability before any encoder hands over a batch
        let test_file = self.root.join(".otlp2arrow-write-test");
        fs::write(&test_file, b"test").with_context(|| {
            format!(
                "Output directory '{}' is not writable. Check permissions.",
                self.root.display()
            )
        })?;
        fs::remove_file(&test_file).context("Failed to remove test file")?;
        Ok(())
    }

    fn shutdown(&self) -> Result<()> {
        tracing::info!(
            root = %self.root.display(),
            files = self.files_written(),
            "closed output directory"
        );
        Ok(())
    }
}

/// IPC files of a directory in name order
pub fn ipc_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in
        fs::read_dir(dir).with_context(|| format!("Failed to read directory: {}", dir.display()))?
    {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == IPC_EXTENSION) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry_proto::tonic::logs::v1::{LogRecord, LogsData, ResourceLogs, ScopeLogs};
    use otlp2arrow_core::{LogsBuilder, SignalEncoder};
    use tempfile::TempDir;

    #[test]
    fn write_stores_one_file_per_table() {
        let temp = TempDir::new().unwrap();
        let sink = IpcDirectorySink::new(temp.path());
        let mut builder = LogsBuilder::new().unwrap();
        builder
            .append(&LogsData {
                resource_logs: vec![ResourceLogs {
                    scope_logs: vec![ScopeLogs {
                        log_records: vec![LogRecord {
                            severity_text: "INFO".into(),
                            ..Default::default()
                        }],
                        ..Default::default()
                    }],
                    ..Default::default()
                }],
            })
            .unwrap();
        let batch = builder.build().unwrap();
        let tables = batch.tables().len();

        let files = sink.write(batch).unwrap();
        assert_eq!(files.len(), tables);
        assert_eq!(sink.files_written(), tables);
        assert_eq!(files, ipc_files(&sink.signal_dir(SignalType::Logs)).unwrap());
        assert!(files[0].ends_with("logs/logs.arrow"));
    }

    #[test]
    fn start_creates_root() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("nested").join("out");
        let sink = IpcDirectorySink::new(&root);
        sink.start().unwrap();
        assert!(root.is_dir());
        assert!(ipc_files(&root).unwrap().is_empty());
    }

    #[test]
    fn ipc_files_ignores_other_entries() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("b.arrow"), b"").unwrap();
        fs::write(temp.path().join("a.arrow"), b"").unwrap();
        fs::write(temp.path().join("notes.txt"), b"").unwrap();
        fs::create_dir(temp.path().join("dir.arrow")).unwrap();

        let names: Vec<_> = ipc_files(temp.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.arrow", "b.arrow"]);
    }
}
