//! Display frame encoding
//!
//! Every image is written to the bulk endpoint as one frame:
//!
//! ```text
//! [A5 5A][18][04][payload length: u32 (little-endian)][48 00 00 00][JPEG][zero padding]
//! ```
//!
//! The padding extends the frame to the smallest multiple of [`BLOCK_SIZE`]
//! that holds header and payload. An already aligned frame gets no padding.

use crate::error::{ProtocolError, Result};
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

/// Length of the fixed frame header
pub const HEADER_LEN: usize = 12;

/// Frames are zero-padded to a multiple of this size
pub const BLOCK_SIZE: usize = 16384;

/// Largest payload the 32-bit length field can describe
pub const MAX_PAYLOAD_LEN: usize = u32::MAX as usize;

const MAGIC: [u8; 2] = [0xa5, 0x5a];
const COMMAND: u8 = 0x18;
const SUBCOMMAND: u8 = 0x04;
const TRAILER: [u8; 4] = [0x48, 0x00, 0x00, 0x00];

/// Header preceding the JPEG payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Length of the JPEG payload in bytes
    pub payload_len: u32,
}

impl FrameHeader {
    /// Build the header for a payload of `len` bytes
    pub fn for_payload(len: usize) -> Result<Self> {
        let payload_len = u32::try_from(len).map_err(|_| ProtocolError::FrameTooLarge {
            size: len,
            max: MAX_PAYLOAD_LEN,
        })?;
        Ok(Self { payload_len })
    }

    /// Serialize to the 12 wire bytes
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut header = [0u8; HEADER_LEN];
        header[0..2].copy_from_slice(&MAGIC);
        header[2] = COMMAND;
        header[3] = SUBCOMMAND;
        header[4..8].copy_from_slice(&self.payload_len.to_le_bytes());
        header[8..12].copy_from_slice(&TRAILER);
        header
    }

    /// Parse a header from the start of an encoded frame
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(ProtocolError::IncompleteHeader {
                expected: HEADER_LEN,
                actual: bytes.len(),
            });
        }

        let prefix = [bytes[0], bytes[1], bytes[2], bytes[3]];
        if prefix[0..2] != MAGIC || prefix[2] != COMMAND || prefix[3] != SUBCOMMAND {
            return Err(ProtocolError::InvalidHeader { found: prefix });
        }

        let payload_len = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        Ok(Self { payload_len })
    }
}

impl fmt::Display for FrameHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.to_bytes().iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Number of zero bytes appended after a payload of `payload_len` bytes
pub fn padding_len(payload_len: usize) -> usize {
    (BLOCK_SIZE - (HEADER_LEN + payload_len) % BLOCK_SIZE) % BLOCK_SIZE
}

/// Total number of bytes transmitted for a payload of `payload_len` bytes
pub fn encoded_len(payload_len: usize) -> usize {
    HEADER_LEN + payload_len + padding_len(payload_len)
}

/// Encode a JPEG payload into a complete display frame
///
/// # Example
/// ```
/// use protocol::{BLOCK_SIZE, FrameHeader, encode_frame};
///
/// let frame = encode_frame(&[0xff, 0xd8, 0xff, 0xd9]).unwrap();
/// assert_eq!(frame.len(), BLOCK_SIZE);
/// assert_eq!(FrameHeader::parse(&frame).unwrap().payload_len, 4);
/// ```
pub fn encode_frame(payload: &[u8]) -> Result<Bytes> {
    let header = FrameHeader::for_payload(payload.len())?;
    let total = encoded_len(payload.len());

    let mut frame = BytesMut::with_capacity(total);
    frame.put_slice(&header.to_bytes());
    frame.put_slice(payload);
    frame.put_bytes(0, padding_len(payload.len()));

    Ok(frame.freeze())
}
