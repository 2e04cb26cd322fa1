//! Error types for the columnar transcoding core

use arrow::error::ArrowError;
use thiserror::Error;

use crate::schema::PayloadType;

/// Errors produced while building, decoding or serializing columnar batches
#[derive(Debug, Error)]
pub enum Error {
    /// Any operation invoked on a builder after `release()`
    #[error("{builder} builder already released")]
    AlreadyReleased {
        /// Which builder rejected the call
        builder: &'static str,
    },

    /// A column builder rejected a value
    ///
    /// The row may be partially written; the whole pending batch must be treated as failed.
    #[error("Failed to append to column '{column}' of {payload} at row {row}: {reason}")]
    ColumnAppend {
        payload: PayloadType,
        column: String,
        row: usize,
        reason: String,
    },

    /// Materializing a record batch failed; the builder has already been reset
    #[error("Failed to build {payload} record batch: {source}")]
    Build {
        payload: PayloadType,
        #[source]
        source: ArrowError,
    },

    /// A builder referenced a column its schema does not declare
    #[error("Column '{column}' is not part of the {payload} schema")]
    Schema {
        payload: PayloadType,
        column: String,
    },

    /// An encoded batch could not be turned back into OTLP data
    #[error("Failed to decode {payload} table: {reason}")]
    Decode { payload: PayloadType, reason: String },

    /// Arrow IPC framing failed
    #[error("Arrow IPC codec error: {source}")]
    Codec {
        #[from]
        source: ArrowError,
    },

    /// Invalid encoder configuration
    #[error("Invalid configuration: {message}")]
    Config { message: String },
}

impl Error {
    pub fn already_released(builder: &'static str) -> Self {
        Self::AlreadyReleased { builder }
    }

    pub fn column_append(
        payload: PayloadType,
        column: impl Into<String>,
        row: usize,
        reason: impl Into<String>,
    ) -> Self {
        Self::ColumnAppend {
            payload,
            column: column.into(),
            row,
            reason: reason.into(),
        }
    }

    pub fn decode(payload: PayloadType, reason: impl Into<String>) -> Self {
        Self::Decode {
            payload,
            reason: reason.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// True for the terminal "used after release" condition
    pub fn is_already_released(&self) -> bool {
        matches!(self, Self::AlreadyReleased { .. })
    }
}

/// Result type alias for the core crate
pub type Result<T> = std::result::Result<T, Error>;
