// Pre-encode regrouping shared by all signals
//
// Resource and scope envelopes with identical content are merged so their
// attributes are written once. Groups keep the order in which their content
// first appears; the rows of each scope keep input order until a signal
// optimizer sorts them (stable sort, so ties also keep input order).

use opentelemetry_proto::tonic::common::v1::InstrumentationScope;
use opentelemetry_proto::tonic::logs::v1::{LogRecord, ResourceLogs, ScopeLogs};
use opentelemetry_proto::tonic::metrics::v1::{Metric, ResourceMetrics, ScopeMetrics};
use opentelemetry_proto::tonic::resource::v1::Resource;
use opentelemetry_proto::tonic::trace::v1::{ResourceSpans, ScopeSpans, Span};
use prost::Message;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Content digest of a resource or scope envelope
pub type GroupKey = blake3::Hash;

/// Digest of an optional proto message plus the envelope schema URL
pub fn group_key<M: Message>(message: Option<&M>, schema_url: &str) -> GroupKey {
    let mut hasher = blake3::Hasher::new();
    match message {
        Some(message) => {
            let encoded = message.encode_to_vec();
            hasher.update(&[1]);
            hasher.update(&(encoded.len() as u64).to_le_bytes());
            hasher.update(&encoded);
        }
        None => {
            hasher.update(&[0]);
        }
    }
    hasher.update(schema_url.as_bytes());
    hasher.finalize()
}

/// Resource level of an OTLP batch
pub trait ResourceEntry {
    type Scope: ScopeEntry;

    fn resource(&self) -> Option<&Resource>;
    fn schema_url(&self) -> &str;
    fn scopes(&self) -> &[Self::Scope];
}

/// Scope level of an OTLP batch
pub trait ScopeEntry {
    type Item;

    fn scope(&self) -> Option<&InstrumentationScope>;
    fn schema_url(&self) -> &str;
    fn items(&self) -> &[Self::Item];
}

macro_rules! impl_entries {
    ($resource:ty, $scope:ty, $item:ty, $scopes:ident, $items:ident) => {
        impl ResourceEntry for $resource {
            type Scope = $scope;

            fn resource(&self) -> Option<&Resource> {
                self.resource.as_ref()
            }

            fn schema_url(&self) -> &str {
                &self.schema_url
            }

            fn scopes(&self) -> &[$scope] {
                &self.$scopes
            }
        }

        impl ScopeEntry for $scope {
            type Item = $item;

            fn scope(&self) -> Option<&InstrumentationScope> {
                self.scope.as_ref()
            }

            fn schema_url(&self) -> &str {
                &self.schema_url
            }

            fn items(&self) -> &[$item] {
                &self.$items
            }
        }
    };
}

impl_entries!(ResourceMetrics, ScopeMetrics, Metric, scope_metrics, metrics);
impl_entries!(ResourceLogs, ScopeLogs, LogRecord, scope_logs, log_records);
impl_entries!(ResourceSpans, ScopeSpans, Span, scope_spans, spans);

/// One merged resource envelope and its scopes
#[derive(Debug)]
pub struct ResourceGroup<'a, T> {
    pub resource: Option<&'a Resource>,
    pub schema_url: &'a str,
    pub scopes: Vec<ScopeGroup<'a, T>>,
}

/// One merged scope envelope and its rows
#[derive(Debug)]
pub struct ScopeGroup<'a, T> {
    pub scope: Option<&'a InstrumentationScope>,
    pub schema_url: &'a str,
    pub items: Vec<&'a T>,
}

/// Reference view of a batch after regrouping and sorting
#[derive(Debug)]
pub struct Optimized<'a, T> {
    pub resources: Vec<ResourceGroup<'a, T>>,
}

impl<'a, T> Optimized<'a, T> {
    /// Total number of signal rows
    pub fn row_count(&self) -> usize {
        self.resources
            .iter()
            .flat_map(|resource| &resource.scopes)
            .map(|scope| scope.items.len())
            .sum()
    }

    pub fn scope_count(&self) -> usize {
        self.resources.iter().map(|r| r.scopes.len()).sum()
    }

    /// Iterate rows in encode order
    pub fn rows(&self) -> impl Iterator<Item = &'a T> + '_ {
        self.resources
            .iter()
            .flat_map(|resource| &resource.scopes)
            .flat_map(|scope| scope.items.iter().copied())
    }
}

/// Merge envelopes by content and stably sort the rows of each scope
///
/// Scopes without rows and resources without scopes are dropped since they
/// produce no rows in the encoded tables.
pub fn regroup<'a, R, F>(
    batch: &'a [R],
    mut compare: F,
) -> Optimized<'a, <R::Scope as ScopeEntry>::Item>
where
    R: ResourceEntry,
    F: FnMut(
        &<R::Scope as ScopeEntry>::Item,
        &<R::Scope as ScopeEntry>::Item,
    ) -> Ordering,
{
    let mut resources: Vec<ResourceGroup<'a, _>> = Vec::new();
    let mut resource_index: HashMap<GroupKey, usize> = HashMap::new();
    let mut scope_index: Vec<HashMap<GroupKey, usize>> = Vec::new();

    for entry in batch {
        let key = group_key(entry.resource(), entry.schema_url());
        for scope_entry in entry.scopes() {
            if scope_entry.items().is_empty() {
                continue;
            }
            let r = *resource_index.entry(key).or_insert_with(|| {
                resources.push(ResourceGroup {
                    resource: entry.resource(),
                    schema_url: entry.schema_url(),
                    scopes: Vec::new(),
                });
                scope_index.push(HashMap::new());
                resources.len() - 1
            });
            let group = &mut resources[r];
            let scope_key = group_key(scope_entry.scope(), scope_entry.schema_url());
            let s = *scope_index[r].entry(scope_key).or_insert_with(|| {
                group.scopes.push(ScopeGroup {
                    scope: scope_entry.scope(),
                    schema_url: scope_entry.schema_url(),
                    items: Vec::new(),
                });
                group.scopes.len() - 1
            });
            group.scopes[s].items.extend(scope_entry.items());
        }
    }

    for scope in resources.iter_mut().flat_map(|r| r.scopes.iter_mut()) {
        scope.items.sort_by(|a, b| compare(a, b));
    }

    Optimized { resources }
}
