// OTLP metrics to columnar tables
//
// One METRICS row per metric. The kind decides which aggregation columns are
// filled and which data point table receives the points; metrics without data
// (or of a kind this build cannot decode) keep null aggregation columns and
// produce no points.

use opentelemetry_proto::tonic::metrics::v1::{metric::Data, Metric, MetricsData};

use super::optimizer::optimize;
use super::related::RelatedData;
use super::MetricType;
use crate::accumulator::IdSequence;
use crate::batch::{EncodedBatch, SignalEncoder};
use crate::builder::{ColumnId, RecordBuilder, Value};
use crate::config::{EncoderConfig, MetricsSort};
use crate::error::{Error, Result};
use crate::otlp::common::grouping::Optimized;
use crate::otlp::common::resource::EnvelopeColumns;
use crate::schema::{consts, PayloadType, SignalType};
use crate::stats::{Analyzer, BatchStats};

#[derive(Debug, Clone, Copy)]
struct MetricColumns {
    id: ColumnId,
    metric_type: ColumnId,
    name: ColumnId,
    description: ColumnId,
    unit: ColumnId,
    aggregation_temporality: ColumnId,
    is_monotonic: ColumnId,
}

impl MetricColumns {
    fn new(builder: &RecordBuilder) -> Result<Self> {
        Ok(Self {
            id: builder.column(consts::ID)?,
            metric_type: builder.column(consts::METRIC_TYPE)?,
            name: builder.column(consts::NAME)?,
            description: builder.column(consts::DESCRIPTION)?,
            unit: builder.column(consts::UNIT)?,
            aggregation_temporality: builder.column(consts::AGGREGATION_TEMPORALITY)?,
            is_monotonic: builder.column(consts::IS_MONOTONIC)?,
        })
    }
}

/// Encodes `MetricsData` into METRICS and its related tables
pub struct MetricsBuilder {
    sort: MetricsSort,
    builder: RecordBuilder,
    columns: MetricColumns,
    envelope: EnvelopeColumns,
    related: RelatedData,
    ids: IdSequence,
    analyzer: Option<Analyzer>,
    released: bool,
}

impl MetricsBuilder {
    pub fn new() -> Result<Self> {
        Self::with_config(&EncoderConfig::default())
    }

    pub fn with_config(config: &EncoderConfig) -> Result<Self> {
        let mut builder = RecordBuilder::new(PayloadType::Metrics)?;
        let columns = MetricColumns::new(&builder)?;
        builder.set_max_delta(columns.id, u64::from(config.max_id_delta))?;
        Ok(Self {
            sort: config.metrics.sort,
            envelope: EnvelopeColumns::new(&builder)?,
            columns,
            builder,
            related: RelatedData::new()?,
            ids: IdSequence::default(),
            analyzer: config
                .stats
                .schema_stats
                .then(|| Analyzer::new(SignalType::Metrics)),
            released: false,
        })
    }

    /// Statistics gathered so far, when enabled in the config
    pub fn analyzer(&self) -> Option<&Analyzer> {
        self.analyzer.as_ref()
    }

    /// Metric rows pending since the last build
    pub fn len(&self) -> usize {
        self.builder.len()
    }

    pub fn is_empty(&self) -> bool {
        self.builder.is_empty()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.released {
            return Err(Error::already_released("metrics"));
        }
        Ok(())
    }

    fn append_optimized(&mut self, optimized: &Optimized<'_, Metric>) -> Result<()> {
        self.builder.reserve(optimized.row_count())?;
        self.related.envelope.reset_grouping();

        let mut scope_ordinal = 0;
        for (resource_ordinal, resource) in optimized.resources.iter().enumerate() {
            for scope in &resource.scopes {
                for metric in &scope.items {
                    let id = self.ids.next();
                    self.builder
                        .append(self.columns.id, Value::UInt(u64::from(id)))?;
                    self.envelope.append(
                        &mut self.builder,
                        &mut self.related.envelope,
                        resource_ordinal,
                        resource,
                        scope_ordinal,
                        scope,
                    )?;
                    self.append_metric(id, metric)?;
                }
                scope_ordinal += 1;
            }
        }
        Ok(())
    }

    fn append_metric(&mut self, id: u32, metric: &Metric) -> Result<()> {
        let columns = self.columns;
        let kind = MetricType::of(metric);
        self.builder
            .append(columns.metric_type, Value::UInt(u64::from(kind.code())))?;
        self.builder.append(columns.name, Value::Str(&metric.name))?;
        self.builder
            .append(columns.description, Value::non_empty_str(&metric.description))?;
        self.builder
            .append(columns.unit, Value::non_empty_str(&metric.unit))?;
        self.related.metric_attrs.append(id, &metric.metadata)?;

        let (temporality, monotonic) = match &metric.data {
            Some(Data::Gauge(gauge)) => {
                self.related.number.append(id, &gauge.data_points)?;
                (Value::Null, Value::Null)
            }
            Some(Data::Sum(sum)) => {
                self.related.number.append(id, &sum.data_points)?;
                (
                    Value::Int(i64::from(sum.aggregation_temporality)),
                    Value::Bool(sum.is_monotonic),
                )
            }
            Some(Data::Histogram(histogram)) => {
                self.related.histogram.append(id, &histogram.data_points)?;
                (
                    Value::Int(i64::from(histogram.aggregation_temporality)),
                    Value::Null,
                )
            }
            Some(Data::ExponentialHistogram(histogram)) => {
                self.related
                    .exp_histogram
                    .append(id, &histogram.data_points)?;
                (
                    Value::Int(i64::from(histogram.aggregation_temporality)),
                    Value::Null,
                )
            }
            Some(Data::Summary(summary)) => {
                self.related.summary.append(id, &summary.data_points)?;
                (Value::Null, Value::Null)
            }
            None => {
                tracing::trace!(
                    metric = %metric.name,
                    "metric has no data or an unsupported kind, aggregation columns left null"
                );
                (Value::Null, Value::Null)
            }
        };
        self.builder
            .append(columns.aggregation_temporality, temporality)?;
        self.builder.append(columns.is_monotonic, monotonic)
    }

    fn try_build(&mut self) -> Result<EncodedBatch> {
        let mut tables = vec![(PayloadType::Metrics, self.builder.build()?)];
        tables.extend(
            self.related
                .build()?
                .into_iter()
                .filter(|(_, table)| table.num_rows() > 0),
        );
        EncodedBatch::new(SignalType::Metrics, tables)
    }

    fn reset(&mut self) {
        self.ids.reset();
        self.builder.reset();
        self.related.reset();
    }
}

/// Shape of one optimized metrics batch, for the analyzer
fn batch_stats(optimized: &Optimized<'_, Metric>) -> BatchStats {
    let mut stats = BatchStats {
        resource_groups: optimized.resources.len(),
        scope_groups: optimized.scope_count(),
        rows: optimized.row_count(),
        ..Default::default()
    };
    for metric in optimized.rows() {
        stats.count_kind(MetricType::of(metric).as_str());
        stats.attributes += metric.metadata.len();
        let (points, attributes) = match &metric.data {
            Some(Data::Gauge(g)) => counts(&g.data_points, |dp| dp.attributes.len()),
            Some(Data::Sum(s)) => counts(&s.data_points, |dp| dp.attributes.len()),
            Some(Data::Histogram(h)) => counts(&h.data_points, |dp| dp.attributes.len()),
            Some(Data::ExponentialHistogram(h)) => {
                counts(&h.data_points, |dp| dp.attributes.len())
            }
            Some(Data::Summary(s)) => counts(&s.data_points, |dp| dp.attributes.len()),
            None => (0, 0),
        };
        stats.children += points;
        stats.attributes += attributes;
    }
    stats.count_name_runs(optimized.rows().map(|m| m.name.as_str()));
    stats
}

fn counts<T>(points: &[T], attributes: impl Fn(&T) -> usize) -> (usize, usize) {
    (points.len(), points.iter().map(attributes).sum())
}

impl SignalEncoder for MetricsBuilder {
    type Input = MetricsData;

    fn signal(&self) -> SignalType {
        SignalType::Metrics
    }

    fn append(&mut self, input: &MetricsData) -> Result<()> {
        self.ensure_open()?;
        let optimized = optimize(input, self.sort);
        if let Err(err) = self.append_optimized(&optimized) {
            self.reset();
            return Err(err);
        }
        if let Some(analyzer) = self.analyzer.as_mut() {
            analyzer.observe(&batch_stats(&optimized));
        }
        Ok(())
    }

    fn build(&mut self) -> Result<EncodedBatch> {
        self.ensure_open()?;
        let result = self.try_build();
        // Tables that built before a failure still hold rows
        self.reset();
        let batch = result?;
        tracing::debug!(
            metrics = batch.num_rows(),
            tables = batch.tables().len(),
            "built metrics batch"
        );
        if let Some(analyzer) = self.analyzer.as_mut() {
            analyzer.observe_build(&batch);
        }
        Ok(batch)
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.builder.release();
        self.related.release();
    }

    fn is_released(&self) -> bool {
        self.released
    }
}
