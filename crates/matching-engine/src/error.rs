//! Error taxonomy for the order book microservice, organized by effect
//! rather than by exception type: validation and not-found are non-fatal
//! (the command is acked as a no-op); WAL and recovery failures are fatal.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ObmError {
    /// Rejected before reaching the WAL: non-positive qty/price, bad side.
    #[error("invalid order: {0}")]
    InvalidOrder(String),

    /// MODIFY/CANCEL for an unknown id. Callers treat this as a no-op ack,
    /// not a propagated error, but it is surfaced for logging.
    #[error("order not found: {0}")]
    OrderNotFound(String),

    /// Durability failure during WAL append. Fatal: the command must not
    /// be acknowledged and no downstream effect may occur.
    #[error("WAL durability failure: {0}")]
    Wal(String),

    /// A WAL record in the middle of the file was malformed. Fatal:
    /// recovery refuses to proceed rather than skip, since skipping would
    /// break determinism.
    #[error("WAL corruption at LSN {lsn}: {reason}")]
    Corruption { lsn: u64, reason: String },

    /// Internal invariant violation inside the matching engine.
    #[error("internal error: {0}")]
    Internal(String),
}

pub type ObmResult<T> = std::result::Result<T, ObmError>;
