// Tables related to METRICS rows
//
// Data points of every shape are always appended (no dedup) with the owning
// metric id as parent_id. Each point gets its own id, which in turn keys its
// attributes and exemplars.

use arrow::array::RecordBatch;
use opentelemetry_proto::tonic::metrics::v1::{
    exemplar, exponential_histogram_data_point::Buckets, number_data_point, Exemplar,
    ExponentialHistogramDataPoint, HistogramDataPoint, NumberDataPoint, SummaryDataPoint,
};

use crate::accumulator::{AttributesAccumulator, IdSequence};
use crate::builder::{ColumnId, RecordBuilder, Value};
use crate::error::Result;
use crate::otlp::common::resource::EnvelopeAttributes;
use crate::schema::{consts, PayloadType};

type Tables = Vec<(PayloadType, RecordBatch)>;

/// id, parent_id and the two timestamps shared by every data point table
#[derive(Debug, Clone, Copy)]
struct PointColumns {
    id: ColumnId,
    parent_id: ColumnId,
    start_time: ColumnId,
    time: ColumnId,
}

impl PointColumns {
    fn new(builder: &RecordBuilder) -> Result<Self> {
        Ok(Self {
            id: builder.column(consts::ID)?,
            parent_id: builder.column(consts::PARENT_ID)?,
            start_time: builder.column(consts::START_TIME_UNIX_NANO)?,
            time: builder.column(consts::TIME_UNIX_NANO)?,
        })
    }

    fn append(
        &self,
        builder: &mut RecordBuilder,
        id: u32,
        parent_id: u32,
        start_time: u64,
        time: u64,
    ) -> Result<()> {
        builder.append(self.id, Value::UInt(u64::from(id)))?;
        builder.append(self.parent_id, Value::UInt(u64::from(parent_id)))?;
        builder.append(self.start_time, Value::timestamp_or_null(start_time))?;
        builder.append(self.time, Value::timestamp(time))
    }
}

pub(crate) struct ExemplarsAccumulator {
    builder: RecordBuilder,
    ids: IdSequence,
    attrs: AttributesAccumulator,
    id: ColumnId,
    parent_id: ColumnId,
    time: ColumnId,
    int_value: ColumnId,
    double_value: ColumnId,
    span_id: ColumnId,
    trace_id: ColumnId,
}

impl ExemplarsAccumulator {
    fn new(payload: PayloadType, attrs_payload: PayloadType) -> Result<Self> {
        let builder = RecordBuilder::new(payload)?;
        Ok(Self {
            id: builder.column(consts::ID)?,
            parent_id: builder.column(consts::PARENT_ID)?,
            time: builder.column(consts::TIME_UNIX_NANO)?,
            int_value: builder.column(consts::INT_VALUE)?,
            double_value: builder.column(consts::DOUBLE_VALUE)?,
            span_id: builder.column(consts::SPAN_ID)?,
            trace_id: builder.column(consts::TRACE_ID)?,
            builder,
            ids: IdSequence::default(),
            attrs: AttributesAccumulator::new(attrs_payload)?,
        })
    }

    fn append(&mut self, parent_id: u32, exemplars: &[Exemplar]) -> Result<()> {
        for ex in exemplars {
            let id = self.ids.next();
            let (int_value, double_value) = match ex.value {
                Some(exemplar::Value::AsInt(v)) => (Value::Int(v), Value::Null),
                Some(exemplar::Value::AsDouble(v)) => (Value::Null, Value::Float(v)),
                None => (Value::Null, Value::Null),
            };
            self.builder.append(self.id, Value::UInt(u64::from(id)))?;
            self.builder
                .append(self.parent_id, Value::UInt(u64::from(parent_id)))?;
            self.builder
                .append(self.time, Value::timestamp(ex.time_unix_nano))?;
            self.builder.append(self.int_value, int_value)?;
            self.builder.append(self.double_value, double_value)?;
            self.builder
                .append(self.span_id, Value::non_empty_bytes(&ex.span_id))?;
            self.builder
                .append(self.trace_id, Value::non_empty_bytes(&ex.trace_id))?;
            self.attrs.append(id, &ex.filtered_attributes)?;
        }
        Ok(())
    }

    fn build(&mut self, tables: &mut Tables) -> Result<()> {
        self.ids.reset();
        tables.push((self.builder.payload(), self.builder.build()?));
        tables.push((self.attrs.payload(), self.attrs.build()?));
        Ok(())
    }

    fn reset(&mut self) {
        self.ids.reset();
        self.builder.reset();
        self.attrs.reset();
    }

    fn release(&mut self) {
        self.builder.release();
        self.attrs.release();
    }
}

pub(crate) struct NumberDataPointsAccumulator {
    builder: RecordBuilder,
    ids: IdSequence,
    point: PointColumns,
    int_value: ColumnId,
    double_value: ColumnId,
    flags: ColumnId,
    attrs: AttributesAccumulator,
    exemplars: ExemplarsAccumulator,
}

impl NumberDataPointsAccumulator {
    fn new() -> Result<Self> {
        let builder = RecordBuilder::new(PayloadType::NumberDataPoints)?;
        Ok(Self {
            point: PointColumns::new(&builder)?,
            int_value: builder.column(consts::INT_VALUE)?,
            double_value: builder.column(consts::DOUBLE_VALUE)?,
            flags: builder.column(consts::FLAGS)?,
            builder,
            ids: IdSequence::default(),
            attrs: AttributesAccumulator::new(PayloadType::NumberDpAttrs)?,
            exemplars: ExemplarsAccumulator::new(
                PayloadType::NumberDpExemplars,
                PayloadType::NumberDpExemplarAttrs,
            )?,
        })
    }

    pub(crate) fn append(&mut self, parent_id: u32, points: &[NumberDataPoint]) -> Result<()> {
        for dp in points {
            let id = self.ids.next();
            self.point.append(
                &mut self.builder,
                id,
                parent_id,
                dp.start_time_unix_nano,
                dp.time_unix_nano,
            )?;
            let (int_value, double_value) = match dp.value {
                Some(number_data_point::Value::AsInt(v)) => (Value::Int(v), Value::Null),
                Some(number_data_point::Value::AsDouble(v)) => (Value::Null, Value::Float(v)),
                None => (Value::Null, Value::Null),
            };
            self.builder.append(self.int_value, int_value)?;
            self.builder.append(self.double_value, double_value)?;
            self.builder
                .append(self.flags, Value::non_zero(u64::from(dp.flags)))?;
            self.attrs.append(id, &dp.attributes)?;
            self.exemplars.append(id, &dp.exemplars)?;
        }
        Ok(())
    }

    fn build(&mut self, tables: &mut Tables) -> Result<()> {
        self.ids.reset();
        tables.push((PayloadType::NumberDataPoints, self.builder.build()?));
        tables.push((PayloadType::NumberDpAttrs, self.attrs.build()?));
        self.exemplars.build(tables)
    }

    fn reset(&mut self) {
        self.ids.reset();
        self.builder.reset();
        self.attrs.reset();
        self.exemplars.reset();
    }

    fn release(&mut self) {
        self.builder.release();
        self.attrs.release();
        self.exemplars.release();
    }
}

pub(crate) struct SummaryDataPointsAccumulator {
    builder: RecordBuilder,
    ids: IdSequence,
    point: PointColumns,
    count: ColumnId,
    sum: ColumnId,
    quantiles: ColumnId,
    values: ColumnId,
    flags: ColumnId,
    attrs: AttributesAccumulator,
}

impl SummaryDataPointsAccumulator {
    fn new() -> Result<Self> {
        let builder = RecordBuilder::new(PayloadType::SummaryDataPoints)?;
        Ok(Self {
            point: PointColumns::new(&builder)?,
            count: builder.column(consts::COUNT)?,
            sum: builder.column(consts::SUM)?,
            quantiles: builder.column(consts::QUANTILE_QUANTILES)?,
            values: builder.column(consts::QUANTILE_VALUES)?,
            flags: builder.column(consts::FLAGS)?,
            builder,
            ids: IdSequence::default(),
            attrs: AttributesAccumulator::new(PayloadType::SummaryDpAttrs)?,
        })
    }

    pub(crate) fn append(&mut self, parent_id: u32, points: &[SummaryDataPoint]) -> Result<()> {
        for dp in points {
            let id = self.ids.next();
            self.point.append(
                &mut self.builder,
                id,
                parent_id,
                dp.start_time_unix_nano,
                dp.time_unix_nano,
            )?;
            let quantiles: Vec<f64> = dp.quantile_values.iter().map(|q| q.quantile).collect();
            let values: Vec<f64> = dp.quantile_values.iter().map(|q| q.value).collect();
            self.builder.append(self.count, Value::UInt(dp.count))?;
            self.builder.append(self.sum, Value::Float(dp.sum))?;
            self.builder
                .append(self.quantiles, Value::Float64s(&quantiles))?;
            self.builder.append(self.values, Value::Float64s(&values))?;
            self.builder
                .append(self.flags, Value::non_zero(u64::from(dp.flags)))?;
            self.attrs.append(id, &dp.attributes)?;
        }
        Ok(())
    }

    fn build(&mut self, tables: &mut Tables) -> Result<()> {
        self.ids.reset();
        tables.push((PayloadType::SummaryDataPoints, self.builder.build()?));
        tables.push((PayloadType::SummaryDpAttrs, self.attrs.build()?));
        Ok(())
    }

    fn reset(&mut self) {
        self.ids.reset();
        self.builder.reset();
        self.attrs.reset();
    }

    fn release(&mut self) {
        self.builder.release();
        self.attrs.release();
    }
}

pub(crate) struct HistogramDataPointsAccumulator {
    builder: RecordBuilder,
    ids: IdSequence,
    point: PointColumns,
    count: ColumnId,
    sum: ColumnId,
    bucket_counts: ColumnId,
    explicit_bounds: ColumnId,
    flags: ColumnId,
    min: ColumnId,
    max: ColumnId,
    attrs: AttributesAccumulator,
    exemplars: ExemplarsAccumulator,
}

impl HistogramDataPointsAccumulator {
    fn new() -> Result<Self> {
        let builder = RecordBuilder::new(PayloadType::HistogramDataPoints)?;
        Ok(Self {
            point: PointColumns::new(&builder)?,
            count: builder.column(consts::COUNT)?,
            sum: builder.column(consts::SUM)?,
            bucket_counts: builder.column(consts::BUCKET_COUNTS)?,
            explicit_bounds: builder.column(consts::EXPLICIT_BOUNDS)?,
            flags: builder.column(consts::FLAGS)?,
            min: builder.column(consts::MIN)?,
            max: builder.column(consts::MAX)?,
            builder,
            ids: IdSequence::default(),
            attrs: AttributesAccumulator::new(PayloadType::HistogramDpAttrs)?,
            exemplars: ExemplarsAccumulator::new(
                PayloadType::HistogramDpExemplars,
                PayloadType::HistogramDpExemplarAttrs,
            )?,
        })
    }

    pub(crate) fn append(&mut self, parent_id: u32, points: &[HistogramDataPoint]) -> Result<()> {
        for dp in points {
            let id = self.ids.next();
            self.point.append(
                &mut self.builder,
                id,
                parent_id,
                dp.start_time_unix_nano,
                dp.time_unix_nano,
            )?;
            self.builder.append(self.count, Value::UInt(dp.count))?;
            self.builder
                .append(self.sum, Value::opt(dp.sum, Value::Float))?;
            self.builder
                .append(self.bucket_counts, Value::UInt64s(&dp.bucket_counts))?;
            self.builder
                .append(self.explicit_bounds, Value::Float64s(&dp.explicit_bounds))?;
            self.builder
                .append(self.flags, Value::non_zero(u64::from(dp.flags)))?;
            self.builder
                .append(self.min, Value::opt(dp.min, Value::Float))?;
            self.builder
                .append(self.max, Value::opt(dp.max, Value::Float))?;
            self.attrs.append(id, &dp.attributes)?;
            self.exemplars.append(id, &dp.exemplars)?;
        }
        Ok(())
    }

    fn build(&mut self, tables: &mut Tables) -> Result<()> {
        self.ids.reset();
        tables.push((PayloadType::HistogramDataPoints, self.builder.build()?));
        tables.push((PayloadType::HistogramDpAttrs, self.attrs.build()?));
        self.exemplars.build(tables)
    }

    fn reset(&mut self) {
        self.ids.reset();
        self.builder.reset();
        self.attrs.reset();
        self.exemplars.reset();
    }

    fn release(&mut self) {
        self.builder.release();
        self.attrs.release();
        self.exemplars.release();
    }
}

/// `positive` / `negative` struct column ids
#[derive(Debug, Clone, Copy)]
struct BucketColumns {
    buckets: ColumnId,
    offset: ColumnId,
    counts: ColumnId,
}

impl BucketColumns {
    fn new(builder: &RecordBuilder, name: &str) -> Result<Self> {
        let buckets = builder.column(name)?;
        Ok(Self {
            buckets,
            offset: builder.child(buckets, consts::OFFSET)?,
            counts: builder.child(buckets, consts::BUCKET_COUNTS)?,
        })
    }

    fn append(&self, builder: &mut RecordBuilder, buckets: Option<&Buckets>) -> Result<()> {
        let Some(buckets) = buckets else {
            return builder.append_struct(self.buckets, false);
        };
        builder.append_struct(self.buckets, true)?;
        builder.append(self.offset, Value::Int(i64::from(buckets.offset)))?;
        builder.append(self.counts, Value::UInt64s(&buckets.bucket_counts))
    }
}

pub(crate) struct ExpHistogramDataPointsAccumulator {
    builder: RecordBuilder,
    ids: IdSequence,
    point: PointColumns,
    count: ColumnId,
    sum: ColumnId,
    scale: ColumnId,
    zero_count: ColumnId,
    positive: BucketColumns,
    negative: BucketColumns,
    flags: ColumnId,
    min: ColumnId,
    max: ColumnId,
    zero_threshold: ColumnId,
    attrs: AttributesAccumulator,
    exemplars: ExemplarsAccumulator,
}

impl ExpHistogramDataPointsAccumulator {
    fn new() -> Result<Self> {
        let builder = RecordBuilder::new(PayloadType::ExpHistogramDataPoints)?;
        Ok(Self {
            point: PointColumns::new(&builder)?,
            count: builder.column(consts::COUNT)?,
            sum: builder.column(consts::SUM)?,
            scale: builder.column(consts::SCALE)?,
            zero_count: builder.column(consts::ZERO_COUNT)?,
            positive: BucketColumns::new(&builder, consts::POSITIVE)?,
            negative: BucketColumns::new(&builder, consts::NEGATIVE)?,
            flags: builder.column(consts::FLAGS)?,
            min: builder.column(consts::MIN)?,
            max: builder.column(consts::MAX)?,
            zero_threshold: builder.column(consts::ZERO_THRESHOLD)?,
            builder,
            ids: IdSequence::default(),
            attrs: AttributesAccumulator::new(PayloadType::ExpHistogramDpAttrs)?,
            exemplars: ExemplarsAccumulator::new(
                PayloadType::ExpHistogramDpExemplars,
                PayloadType::ExpHistogramDpExemplarAttrs,
            )?,
        })
    }

    pub(crate) fn append(
        &mut self,
        parent_id: u32,
        points: &[ExponentialHistogramDataPoint],
    ) -> Result<()> {
        for dp in points {
            let id = self.ids.next();
            self.point.append(
                &mut self.builder,
                id,
                parent_id,
                dp.start_time_unix_nano,
                dp.time_unix_nano,
            )?;
            self.builder.append(self.count, Value::UInt(dp.count))?;
            self.builder
                .append(self.sum, Value::opt(dp.sum, Value::Float))?;
            self.builder
                .append(self.scale, Value::Int(i64::from(dp.scale)))?;
            self.builder
                .append(self.zero_count, Value::UInt(dp.zero_count))?;
            self.positive
                .append(&mut self.builder, dp.positive.as_ref())?;
            self.negative
                .append(&mut self.builder, dp.negative.as_ref())?;
            self.builder
                .append(self.flags, Value::non_zero(u64::from(dp.flags)))?;
            self.builder
                .append(self.min, Value::opt(dp.min, Value::Float))?;
            self.builder
                .append(self.max, Value::opt(dp.max, Value::Float))?;
            self.builder
                .append(self.zero_threshold, Value::Float(dp.zero_threshold))?;
            self.attrs.append(id, &dp.attributes)?;
            self.exemplars.append(id, &dp.exemplars)?;
        }
        Ok(())
    }

    fn build(&mut self, tables: &mut Tables) -> Result<()> {
        self.ids.reset();
        tables.push((PayloadType::ExpHistogramDataPoints, self.builder.build()?));
        tables.push((PayloadType::ExpHistogramDpAttrs, self.attrs.build()?));
        self.exemplars.build(tables)
    }

    fn reset(&mut self) {
        self.ids.reset();
        self.builder.reset();
        self.attrs.reset();
        self.exemplars.reset();
    }

    fn release(&mut self) {
        self.builder.release();
        self.attrs.release();
        self.exemplars.release();
    }
}

/// Every table related to METRICS, owned by the metrics builder
pub(crate) struct RelatedData {
    pub(crate) envelope: EnvelopeAttributes,
    pub(crate) metric_attrs: AttributesAccumulator,
    pub(crate) number: NumberDataPointsAccumulator,
    pub(crate) summary: SummaryDataPointsAccumulator,
    pub(crate) histogram: HistogramDataPointsAccumulator,
    pub(crate) exp_histogram: ExpHistogramDataPointsAccumulator,
}

impl RelatedData {
    pub(crate) fn new() -> Result<Self> {
        Ok(Self {
            envelope: EnvelopeAttributes::new()?,
            metric_attrs: AttributesAccumulator::new(PayloadType::MetricAttrs)?,
            number: NumberDataPointsAccumulator::new()?,
            summary: SummaryDataPointsAccumulator::new()?,
            histogram: HistogramDataPointsAccumulator::new()?,
            exp_histogram: ExpHistogramDataPointsAccumulator::new()?,
        })
    }

    /// Build every related table, empty ones included
    pub(crate) fn build(&mut self) -> Result<Tables> {
        let mut tables = self.envelope.build()?;
        tables.push((PayloadType::MetricAttrs, self.metric_attrs.build()?));
        self.number.build(&mut tables)?;
        self.summary.build(&mut tables)?;
        self.histogram.build(&mut tables)?;
        self.exp_histogram.build(&mut tables)?;
        Ok(tables)
    }

    pub(crate) fn reset(&mut self) {
        self.envelope.reset();
        self.metric_attrs.reset();
        self.number.reset();
        self.summary.reset();
        self.histogram.reset();
        self.exp_histogram.reset();
    }

    pub(crate) fn release(&mut self) {
        self.envelope.release();
        self.metric_attrs.release();
        self.number.release();
        self.summary.release();
        self.histogram.release();
        self.exp_histogram.release();
    }
}
