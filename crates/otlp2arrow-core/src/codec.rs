//! Arrow IPC framing for encoded batches
//!
//! Each table travels as its own IPC stream. Columns hinted as delta encoded
//! (top-level `UInt16` / `UInt32` ids) are rewritten as wrapping differences
//! from the previous non-null value before writing and restored after reading.

use arrow::array::{ArrayRef, ArrowNativeTypeOp, AsArray, PrimitiveArray, RecordBatch};
use arrow::datatypes::{ArrowPrimitiveType, DataType, UInt16Type, UInt32Type};
use arrow::error::ArrowError;
use arrow::ipc::reader::StreamReader;
use arrow::ipc::writer::StreamWriter;
use std::cell::Cell;
use std::io::Cursor;
use std::sync::Arc;

use crate::batch::EncodedBatch;
use crate::error::Result;
use crate::schema::{payload_of, ColumnHints, PayloadType, SignalType};

/// Minimum valid Arrow IPC stream size (continuation marker + metadata length).
const MIN_IPC_HEADER_SIZE: usize = 8;

/// Arrow IPC continuation marker (0xFFFFFFFF as little-endian i32 = -1).
const IPC_CONTINUATION_MARKER: i32 = -1;

/// Validate an Arrow IPC stream header without full deserialization.
pub fn validate_ipc_header(data: &[u8]) -> std::result::Result<(), ArrowError> {
    if data.len() < MIN_IPC_HEADER_SIZE {
        return Err(ArrowError::IpcError(format!(
            "IPC data too short: {} bytes (minimum {} required)",
            data.len(),
            MIN_IPC_HEADER_SIZE
        )));
    }

    let first_word = i32::from_le_bytes([data[0], data[1], data[2], data[3]]);
    if first_word == IPC_CONTINUATION_MARKER {
        let metadata_len = i32::from_le_bytes([data[4], data[5], data[6], data[7]]);
        if metadata_len < 0 {
            return Err(ArrowError::IpcError(format!(
                "Invalid IPC metadata length: {metadata_len}. Stream may be corrupted."
            )));
        }
    } else if first_word < 0 {
        return Err(ArrowError::IpcError(format!(
            "Invalid IPC header: unexpected value 0x{:08X}. \
             Expected continuation marker (0xFFFFFFFF) or positive metadata length.",
            first_word as u32
        )));
    }
    // Non-negative first word is the legacy framing (bare metadata length)
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Encode,
    Decode,
}

fn delta<T>(array: &PrimitiveArray<T>, direction: Direction) -> PrimitiveArray<T>
where
    T: ArrowPrimitiveType,
{
    let previous = Cell::new(T::Native::default());
    array.unary_opt::<_, T>(|value| {
        let out = match direction {
            Direction::Encode => value.sub_wrapping(previous.get()),
            Direction::Decode => value.add_wrapping(previous.get()),
        };
        previous.set(match direction {
            Direction::Encode => value,
            Direction::Decode => out,
        });
        Some(out)
    })
}

/// Apply (or undo) delta encoding on every hinted column of `batch`
fn transform_deltas(
    batch: &RecordBatch,
    direction: Direction,
) -> std::result::Result<RecordBatch, ArrowError> {
    let schema = batch.schema();
    let mut changed = false;
    let columns: Vec<ArrayRef> = schema
        .fields()
        .iter()
        .zip(batch.columns())
        .map(|(field, column)| {
            if !ColumnHints::of(field).delta {
                return Arc::clone(column);
            }
            let rewritten: ArrayRef = match column.data_type() {
                DataType::UInt16 => Arc::new(delta(column.as_primitive::<UInt16Type>(), direction)),
                DataType::UInt32 => Arc::new(delta(column.as_primitive::<UInt32Type>(), direction)),
                _ => return Arc::clone(column),
            };
            changed = true;
            rewritten
        })
        .collect();
    if !changed {
        return Ok(batch.clone());
    }
    RecordBatch::try_new(schema, columns)
}

/// Serialize one table to Arrow IPC stream bytes
pub fn serialize_table(batch: &RecordBatch) -> Result<Vec<u8>> {
    let encoded = transform_deltas(batch, Direction::Encode)?;
    let mut buffer = Vec::new();
    {
        let mut writer = StreamWriter::try_new(&mut buffer, encoded.schema().as_ref())?;
        writer.write(&encoded)?;
        writer.finish()?;
    }
    Ok(buffer)
}

/// Deserialize one table; the payload type is read from the schema metadata
pub fn deserialize_table(bytes: &[u8]) -> Result<(PayloadType, RecordBatch)> {
    validate_ipc_header(bytes)?;
    let mut reader = StreamReader::try_new(Cursor::new(bytes), None)?;
    let schema = reader.schema();
    let payload = payload_of(&schema).ok_or_else(|| {
        ArrowError::IpcError("IPC schema does not carry a payload type".to_string())
    })?;
    // A stream without record batches is an empty table
    let batch = match reader.next() {
        Some(batch) => batch?,
        None => RecordBatch::new_empty(schema),
    };
    Ok((payload, transform_deltas(&batch, Direction::Decode)?))
}

/// Serialize every table of a batch, primary first
pub fn serialize_batch(batch: &EncodedBatch) -> Result<Vec<(PayloadType, Vec<u8>)>> {
    batch
        .tables()
        .iter()
        .map(|(payload, table)| Ok((*payload, serialize_table(table)?)))
        .collect()
}

/// Reassemble an encoded batch from per-table IPC streams
pub fn deserialize_batch<B: AsRef<[u8]>>(signal: SignalType, blobs: &[B]) -> Result<EncodedBatch> {
    let tables = blobs
        .iter()
        .map(|blob| deserialize_table(blob.as_ref()))
        .collect::<Result<Vec<_>>>()?;
    EncodedBatch::new(signal, tables)
}
