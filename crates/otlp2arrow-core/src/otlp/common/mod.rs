pub mod grouping;
pub(crate) mod resource;

pub use grouping::{group_key, GroupKey, Optimized, ResourceGroup, ScopeGroup};
