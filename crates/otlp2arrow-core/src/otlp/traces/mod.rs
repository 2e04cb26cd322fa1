// OTLP traces <-> columnar tables

mod from_arrow;
mod optimizer;
mod related;
mod to_arrow;

pub use from_arrow::TracesDecoder;
pub use optimizer::optimize;
pub use to_arrow::TracesBuilder;
