// Signal encoders and decoders
//
// Each signal module provides the pre-encode optimizer, the builder that
// turns an OTLP batch into columnar tables, and the decoder going back.

pub mod common;
pub mod logs;
pub mod metrics;
pub mod traces;
