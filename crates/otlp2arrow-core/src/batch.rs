// Encoded batches and the signal encoder contract

use arrow::array::RecordBatch;

use crate::error::{Error, Result};
use crate::schema::{PayloadType, SignalType};

/// Output of one `build()`: the primary table followed by the non-empty related tables
#[derive(Debug, Clone)]
pub struct EncodedBatch {
    signal: SignalType,
    tables: Vec<(PayloadType, RecordBatch)>,
}

impl EncodedBatch {
    /// Assemble a batch; the primary table is moved to the front
    ///
    /// Fails when the primary table is missing or a payload appears twice.
    pub fn new(signal: SignalType, mut tables: Vec<(PayloadType, RecordBatch)>) -> Result<Self> {
        let primary = PayloadType::primary(signal);
        let Some(position) = tables.iter().position(|(payload, _)| *payload == primary) else {
            return Err(Error::decode(primary, "primary table is missing"));
        };
        let head = tables.remove(position);
        tables.insert(0, head);

        let mut seen = std::collections::HashSet::new();
        for (payload, _) in &tables {
            if !seen.insert(*payload) {
                return Err(Error::decode(*payload, "table appears more than once"));
            }
        }
        Ok(Self { signal, tables })
    }

    pub fn signal(&self) -> SignalType {
        self.signal
    }

    pub fn primary(&self) -> &RecordBatch {
        &self.tables[0].1
    }

    /// Table for a payload type, if present
    pub fn table(&self, payload: PayloadType) -> Option<&RecordBatch> {
        self.tables
            .iter()
            .find(|(p, _)| *p == payload)
            .map(|(_, batch)| batch)
    }

    pub fn tables(&self) -> &[(PayloadType, RecordBatch)] {
        &self.tables
    }

    pub fn into_tables(self) -> Vec<(PayloadType, RecordBatch)> {
        self.tables
    }

    /// Rows in the primary table
    pub fn num_rows(&self) -> usize {
        self.primary().num_rows()
    }
}

/// Contract shared by the metrics, logs and traces builders
///
/// Lifecycle: `append`* → `build` → (`append`* → `build`)* → `release`.
/// Every operation other than `release` and `is_released` fails with
/// `Error::AlreadyReleased` once the encoder has been released.
pub trait SignalEncoder {
    type Input;

    fn signal(&self) -> SignalType;

    /// Encode one input batch into the pending tables
    fn append(&mut self, input: &Self::Input) -> Result<()>;

    /// Drain the pending tables; ids restart at 0 afterwards
    fn build(&mut self) -> Result<EncodedBatch>;

    /// Free all builder memory; idempotent
    fn release(&mut self);

    fn is_released(&self) -> bool;
}
