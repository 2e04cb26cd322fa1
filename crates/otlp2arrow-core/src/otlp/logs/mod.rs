// OTLP logs <-> columnar tables

mod from_arrow;
mod optimizer;
mod to_arrow;

pub use from_arrow::LogsDecoder;
pub use optimizer::optimize;
pub use to_arrow::LogsBuilder;
