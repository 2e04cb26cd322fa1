// Resource and scope columns of the primary tables
//
// Every primary row repeats its resource and scope as struct columns. The
// struct carries the resource/scope id that keys RESOURCE_ATTRS / SCOPE_ATTRS;
// the id is null when the envelope had no resource (or scope) message.

use arrow::array::RecordBatch;
use opentelemetry_proto::tonic::common::v1::InstrumentationScope;
use opentelemetry_proto::tonic::resource::v1::Resource;

use super::grouping::{ResourceGroup, ScopeGroup};
use crate::accumulator::AttributesAccumulator;
use crate::builder::{ColumnId, RecordBuilder, Value};
use crate::error::Result;
use crate::schema::{consts, PayloadType};

/// RESOURCE_ATTRS and SCOPE_ATTRS accumulators shared by all signal builders
pub(crate) struct EnvelopeAttributes {
    resource_attrs: AttributesAccumulator,
    scope_attrs: AttributesAccumulator,
}

impl EnvelopeAttributes {
    pub(crate) fn new() -> Result<Self> {
        Ok(Self {
            resource_attrs: AttributesAccumulator::new(PayloadType::ResourceAttrs)?,
            scope_attrs: AttributesAccumulator::new(PayloadType::ScopeAttrs)?,
        })
    }

    /// Start a new input batch: group ordinals restart, ids continue
    pub(crate) fn reset_grouping(&mut self) {
        self.resource_attrs.reset_grouping();
        self.scope_attrs.reset_grouping();
    }

    pub(crate) fn build(&mut self) -> Result<Vec<(PayloadType, RecordBatch)>> {
        Ok(vec![
            (PayloadType::ResourceAttrs, self.resource_attrs.build()?),
            (PayloadType::ScopeAttrs, self.scope_attrs.build()?),
        ])
    }

    pub(crate) fn reset(&mut self) {
        self.resource_attrs.reset();
        self.scope_attrs.reset();
    }

    pub(crate) fn release(&mut self) {
        self.resource_attrs.release();
        self.scope_attrs.release();
    }
}

/// Resolved ids of the resource struct, the scope struct and the scope schema URL
#[derive(Debug, Clone, Copy)]
pub(crate) struct EnvelopeColumns {
    resource: ColumnId,
    resource_id: ColumnId,
    resource_schema_url: ColumnId,
    resource_dropped: ColumnId,
    scope: ColumnId,
    scope_id: ColumnId,
    scope_name: ColumnId,
    scope_version: ColumnId,
    scope_dropped: ColumnId,
    schema_url: ColumnId,
}

impl EnvelopeColumns {
    pub(crate) fn new(builder: &RecordBuilder) -> Result<Self> {
        let resource = builder.column(consts::RESOURCE)?;
        let scope = builder.column(consts::SCOPE)?;
        Ok(Self {
            resource,
            resource_id: builder.child(resource, consts::ID)?,
            resource_schema_url: builder.child(resource, consts::SCHEMA_URL)?,
            resource_dropped: builder.child(resource, consts::DROPPED_ATTRIBUTES_COUNT)?,
            scope,
            scope_id: builder.child(scope, consts::ID)?,
            scope_name: builder.child(scope, consts::NAME)?,
            scope_version: builder.child(scope, consts::VERSION)?,
            scope_dropped: builder.child(scope, consts::DROPPED_ATTRIBUTES_COUNT)?,
            schema_url: builder.column(consts::SCHEMA_URL)?,
        })
    }

    /// Write the envelope columns of one primary row
    ///
    /// `resource_group` and `scope_group` are ordinals unique within the current
    /// input batch; the accumulators only write attributes when they change.
    pub(crate) fn append<T>(
        &self,
        builder: &mut RecordBuilder,
        attrs: &mut EnvelopeAttributes,
        resource_group: usize,
        resource: &ResourceGroup<'_, T>,
        scope_group: usize,
        scope: &ScopeGroup<'_, T>,
    ) -> Result<()> {
        let resource_id = resource
            .resource
            .map(|r| attrs.resource_attrs.append_for_group(resource_group, &r.attributes))
            .transpose()?;
        let scope_id = scope
            .scope
            .map(|s| attrs.scope_attrs.append_for_group(scope_group, &s.attributes))
            .transpose()?;

        self.append_resource(builder, resource.resource, resource_id, resource.schema_url)?;
        self.append_scope(builder, scope.scope, scope_id)?;
        builder.append(self.schema_url, Value::non_empty_str(scope.schema_url))
    }

    fn append_resource(
        &self,
        builder: &mut RecordBuilder,
        resource: Option<&Resource>,
        id: Option<u32>,
        schema_url: &str,
    ) -> Result<()> {
        // The struct is also valid for a bare schema URL; the null id marks the missing resource
        if resource.is_none() && schema_url.is_empty() {
            return builder.append_struct(self.resource, false);
        }
        builder.append_struct(self.resource, true)?;
        builder.append(
            self.resource_id,
            Value::opt(id, |id| Value::UInt(u64::from(id))),
        )?;
        builder.append(self.resource_schema_url, Value::non_empty_str(schema_url))?;
        builder.append(
            self.resource_dropped,
            Value::non_zero(u64::from(
                resource.map(|r| r.dropped_attributes_count).unwrap_or(0),
            )),
        )
    }

    fn append_scope(
        &self,
        builder: &mut RecordBuilder,
        scope: Option<&InstrumentationScope>,
        id: Option<u32>,
    ) -> Result<()> {
        let Some(scope) = scope else {
            return builder.append_struct(self.scope, false);
        };
        builder.append_struct(self.scope, true)?;
        builder.append(
            self.scope_id,
            Value::opt(id, |id| Value::UInt(u64::from(id))),
        )?;
        builder.append(self.scope_name, Value::non_empty_str(&scope.name))?;
        builder.append(self.scope_version, Value::non_empty_str(&scope.version))?;
        builder.append(
            self.scope_dropped,
            Value::non_zero(u64::from(scope.dropped_attributes_count)),
        )
    }
}
