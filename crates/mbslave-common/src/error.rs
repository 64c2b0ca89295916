//! Error type shared by the slave crates.

use thiserror::Error;

/// Slave error types covering construction, framing, and transport failures.
///
/// Modbus exception responses are not errors in this sense: they are part
/// of the normal response vocabulary and never surface through this type.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SlaveError {
    /// Slave identifier outside the addressable range.
    #[error("invalid modbus slave id {0}: must be between 1 and 247")]
    InvalidSlaveId(u8),

    /// Raw bytes could not be decoded into a frame.
    #[error("frame error: {0}")]
    Frame(String),

    /// The server has been closed and no longer accepts requests.
    #[error("server closed")]
    Closed,

    /// I/O operation error.
    #[error("I/O error: {0}")]
    Io(String),

    /// Configuration or initialization error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Invalid engine state transition attempted.
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        /// Source state.
        from: String,
        /// Attempted target state.
        to: String,
    },
}

/// Convenience type alias for slave operations.
pub type SlaveResult<T> = Result<T, SlaveError>;
