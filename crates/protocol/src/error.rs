//! Protocol error types

use thiserror::Error;

/// Frame encoding/decoding errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// Payload does not fit the 32-bit length field of the header
    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// Not enough bytes to hold a frame header
    #[error("Incomplete header: expected {expected} bytes, got {actual}")]
    IncompleteHeader { expected: usize, actual: usize },

    /// Header does not start with the display frame magic/command bytes
    #[error("Invalid frame header: {found:02x?}")]
    InvalidHeader { found: [u8; 4] },
}

/// Type alias for protocol results
pub type Result<T> = std::result::Result<T, ProtocolError>;
