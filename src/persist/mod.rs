/// Volatile log.
pub mod memory;
/// SQLite-backed log.
pub mod sqlite;

use thiserror::Error;

use crate::op::{
    DatebackOperation, OPERATION_FORMAT_VERSION, OperationId, StoredOperation,
    StoredOperationEnvelope,
};

/// Failures of operation log storage.
#[derive(Debug, Error)]
pub enum PersistError {
    /// SQLite failure.
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Encoding or decoding failure.
    #[error("serde: {0}")]
    Serde(#[from] serde_json::Error),
    /// Rejected or malformed record.
    #[error("{0}")]
    Message(String),
}

impl From<crate::error::DatebackError> for PersistError {
    fn from(value: crate::error::DatebackError) -> Self {
        Self::Message(format!("invalid operation record: {value}"))
    }
}

/// Result alias for log storage.
pub type PersistResult<T> = Result<T, PersistError>;

/// Append-only storage of dateback audit records.
///
/// Records come back in append order, both globally and per branch.
pub trait OperationLog: Send {
    /// Appends one record. Fails on a duplicate id.
    fn append(&mut self, op: &DatebackOperation) -> PersistResult<()>;
    /// Whether a record with `id` is stored.
    fn contains(&self, id: OperationId) -> PersistResult<bool>;
    /// Every record.
    fn all(&self) -> PersistResult<Vec<DatebackOperation>>;
    /// Records of one branch.
    fn on_branch(&self, branch: &str) -> PersistResult<Vec<DatebackOperation>>;
    /// Number of stored records.
    fn len(&self) -> PersistResult<usize>;
    /// True when no record is stored.
    fn is_empty(&self) -> PersistResult<bool> {
        Ok(self.len()? == 0)
    }
    /// Makes appended records durable.
    fn flush(&mut self) -> PersistResult<()> {
        Ok(())
    }
}

/// Serializes a record into a versioned JSON envelope.
pub fn encode_operation(op: &DatebackOperation) -> PersistResult<Vec<u8>> {
    Ok(serde_json::to_vec(&StoredOperationEnvelope::new(
        StoredOperation::from(op),
    ))?)
}

/// Decodes a versioned envelope, or a bare record written before envelopes existed, and
/// upcasts it into the live model.
pub fn decode_operation(payload: &[u8]) -> PersistResult<DatebackOperation> {
    let stored = match serde_json::from_slice::<StoredOperationEnvelope>(payload) {
        Ok(envelope) => {
            if envelope.format_version != OPERATION_FORMAT_VERSION {
                return Err(PersistError::Message(format!(
                    "unsupported operation format version: {}",
                    envelope.format_version
                )));
            }
            envelope.stored
        }
        // Backward-compatible path for payloads that stored a raw StoredOperation.
        Err(_) => serde_json::from_slice::<StoredOperation>(payload)?,
    };
    Ok(stored.into_operation()?)
}
