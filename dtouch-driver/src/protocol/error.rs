use std::time::Duration;
use thiserror::Error;

/// Validation failure of a single response frame.
///
/// Every variant is local to the command that produced it: the scheduler
/// marks that command's registers stale and moves on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Fewer bytes than the header or the declared length require.
    #[error("Truncated frame: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    /// Structurally invalid frame or payload.
    #[error("Malformed frame: {0}")]
    Malformed(String),

    /// CRC-16/MODBUS over the frame does not match the trailing checksum.
    #[error("Checksum mismatch: expected {expected:#06X}, calculated {calculated:#06X}")]
    ChecksumFailed { expected: u16, calculated: u16 },

    /// Frame is intact but was sent by another bus address.
    #[error("Address mismatch: expected {expected}, got {actual}")]
    AddressMismatch { expected: u8, actual: u8 },
}

/// Session-level error for one request/response exchange.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// No complete response within the response timeout.
    #[error("Timeout awaiting response after {0:?}")]
    Timeout(Duration),

    /// The byte stream ended or the peer went away.
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Whether the underlying link is gone and must be reopened.
    pub fn is_transport_fault(&self) -> bool {
        matches!(self, ProtocolError::Io(_) | ProtocolError::Transport(_))
    }
}
