// Optional distribution statistics
//
// When enabled, every signal builder hands the analyzer a `BatchStats` per
// appended input batch and the row counts of every built table. Reports are
// logged through tracing and can be exported as JSON.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::batch::EncodedBatch;
use crate::schema::{PayloadType, SignalType};

/// Shape of one appended input batch after regrouping
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchStats {
    pub resource_groups: usize,
    pub scope_groups: usize,
    pub rows: usize,
    /// Row count per kind (metric type, span kind or severity)
    pub kinds: BTreeMap<String, usize>,
    /// Data points, or events plus links for spans
    pub children: usize,
    pub attributes: usize,
    /// Runs of adjacent rows sharing a name
    pub name_runs: usize,
}

impl BatchStats {
    pub fn count_kind(&mut self, kind: &str) {
        *self.kinds.entry(kind.to_string()).or_default() += 1;
    }

    /// Count name runs over rows in encode order
    pub fn count_name_runs<'a>(&mut self, names: impl IntoIterator<Item = &'a str>) {
        let mut previous: Option<&str> = None;
        for name in names {
            if previous != Some(name) {
                self.name_runs += 1;
            }
            previous = Some(name);
        }
    }

    fn merge(&mut self, other: &BatchStats) {
        self.resource_groups += other.resource_groups;
        self.scope_groups += other.scope_groups;
        self.rows += other.rows;
        self.children += other.children;
        self.attributes += other.attributes;
        self.name_runs += other.name_runs;
        for (kind, count) in &other.kinds {
            *self.kinds.entry(kind.clone()).or_default() += count;
        }
    }
}

/// Cumulative report of an analyzer
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzerReport {
    pub signal: SignalType,
    pub batches: u64,
    pub builds: u64,
    pub totals: BatchStats,
    pub table_rows: BTreeMap<PayloadType, u64>,
    /// Rows across every attribute table of all builds
    pub attribute_rows: u64,
}

/// Aggregates statistics across appends and builds
#[derive(Debug, Clone)]
pub struct Analyzer {
    report: AnalyzerReport,
}

impl Analyzer {
    pub fn new(signal: SignalType) -> Self {
        Self {
            report: AnalyzerReport {
                signal,
                batches: 0,
                builds: 0,
                totals: BatchStats::default(),
                table_rows: BTreeMap::new(),
                attribute_rows: 0,
            },
        }
    }

    /// Record the shape of one appended input batch
    pub fn observe(&mut self, stats: &BatchStats) {
        self.report.batches += 1;
        self.report.totals.merge(stats);
        tracing::debug!(
            signal = %self.report.signal,
            resource_groups = stats.resource_groups,
            scope_groups = stats.scope_groups,
            rows = stats.rows,
            children = stats.children,
            attributes = stats.attributes,
            name_runs = stats.name_runs,
            "analyzed input batch"
        );
    }

    /// Record table sizes of a finished build and log a summary
    pub fn observe_build(&mut self, batch: &EncodedBatch) {
        self.report.builds += 1;
        for (payload, table) in batch.tables() {
            let rows = table.num_rows() as u64;
            *self.report.table_rows.entry(*payload).or_default() += rows;
            if payload.is_attributes() {
                self.report.attribute_rows += rows;
            }
        }
        let tables: Vec<String> = batch
            .tables()
            .iter()
            .map(|(payload, table)| format!("{}={}", payload, table.num_rows()))
            .collect();
        tracing::info!(
            signal = %self.report.signal,
            builds = self.report.builds,
            rows = batch.num_rows(),
            attribute_rows = self.report.attribute_rows,
            tables = %tables.join(","),
            "schema stats"
        );
    }

    pub fn report(&self) -> &AnalyzerReport {
        &self.report
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.report)
    }
}
