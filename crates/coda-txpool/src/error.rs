//! Transaction pool error types

use coda_types::CodecError;
use thiserror::Error;

/// Transaction pool errors.
///
/// The in-memory queues never fail; every fallible operation lives in the
/// journal, so all variants here are journal related.
#[derive(Debug, Error)]
pub enum TxPoolError {
    /// Insert was called while no journal file is open
    #[error("no active journal")]
    NoActiveJournal,

    /// Underlying filesystem failure
    #[error("journal io error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed transaction record in the journal
    #[error("journal decode error: {0}")]
    Decode(#[from] CodecError),

    /// Record payload did not match its length prefix
    #[error("journal record length mismatch: expected {expected}, got {got}")]
    RecordMismatch {
        /// Payload length announced by the record header
        expected: usize,
        /// Bytes actually consumed by decoding
        got: usize,
    },
}

/// Result type for transaction pool operations
pub type TxPoolResult<T> = Result<T, TxPoolError>;
