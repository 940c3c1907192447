//! Wire protocol of the USB picture frame
//!
//! This crate holds the hardware-fixed parts of the frame's protocol: the
//! vendor/product identifiers of its two operating modes, the control
//! request that switches between them, and the display frame encoding used
//! on the bulk endpoint. Nothing here touches a USB device.
//!
//! # Example
//!
//! ```
//! use protocol::{BLOCK_SIZE, FrameHeader, encode_frame};
//!
//! let jpeg = vec![0u8; 100_000];
//! let frame = encode_frame(&jpeg).unwrap();
//!
//! assert_eq!(frame.len(), 7 * BLOCK_SIZE);
//! assert_eq!(&frame[4..8], &[0xa0, 0x86, 0x01, 0x00]);
//! assert_eq!(FrameHeader::parse(&frame).unwrap().payload_len, 100_000);
//! ```

pub mod device;
pub mod error;
pub mod frame;

pub use device::{
    ControlRequest, DISPLAY_ENDPOINT, DISPLAY_HEIGHT, DISPLAY_INTERFACE, DISPLAY_WIDTH,
    DeviceMode, MODE_SWITCH, PRODUCT_ID_CUSTOM, PRODUCT_ID_STORAGE, VENDOR_ID,
};
pub use error::{ProtocolError, Result};
pub use frame::{
    BLOCK_SIZE, FrameHeader, HEADER_LEN, MAX_PAYLOAD_LEN, encode_frame, encoded_len, padding_len,
};
