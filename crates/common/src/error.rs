//! Common error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The USB worker thread is gone or stopped answering
    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Protocol error: {0}")]
    Protocol(#[from] protocol::ProtocolError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(payload: &[u8]) -> Result<usize> {
        Ok(protocol::encode_frame(payload)?.len())
    }

    #[test]
    fn test_protocol_error_converts() {
        assert_eq!(encode(&[0u8; 4]).unwrap(), protocol::BLOCK_SIZE);

        let err: Error = protocol::ProtocolError::IncompleteHeader {
            expected: 12,
            actual: 3,
        }
        .into();
        assert!(err.to_string().starts_with("Protocol error: Incomplete header"));
    }

    #[test]
    fn test_io_error_converts() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, Error::Io(_)));
        assert_eq!(err.to_string(), "IO error: gone");
    }
}
