//! Hardware-fixed identifiers of the picture frame
//!
//! The frame enumerates as a mass-storage device first. A single control
//! request makes it re-enumerate under a second product ID, in which it
//! accepts display frames on a bulk endpoint.

use std::fmt;

/// USB vendor ID shared by both operating modes
pub const VENDOR_ID: u16 = 0x04e8;

/// Product ID while the frame acts as a mass-storage device
pub const PRODUCT_ID_STORAGE: u16 = 0x200c;

/// Product ID once the frame accepts display frames
pub const PRODUCT_ID_CUSTOM: u16 = 0x200d;

/// Interface that must be claimed around each frame transfer
pub const DISPLAY_INTERFACE: u8 = 0;

/// Bulk OUT endpoint receiving display frames
pub const DISPLAY_ENDPOINT: u8 = 0x02;

/// Native panel width in pixels
pub const DISPLAY_WIDTH: u32 = 800;

/// Native panel height in pixels
pub const DISPLAY_HEIGHT: u32 = 600;

/// Control request that promotes a storage-mode frame to custom mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlRequest {
    pub request_type: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
    pub length: usize,
}

/// OUT | Standard | Device, request 0x06, value/index 0xfe, 254 zero bytes.
pub const MODE_SWITCH: ControlRequest = ControlRequest {
    request_type: 0x00,
    request: 0x06,
    value: 0x00fe,
    index: 0x00fe,
    length: 254,
};

impl ControlRequest {
    /// Data stage of the request (all zeroes)
    pub fn payload(&self) -> Vec<u8> {
        vec![0u8; self.length]
    }
}

/// Operating mode of the attached frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DeviceMode {
    /// No frame found, or the last open/switch attempt failed
    #[default]
    None,
    /// Frame present as mass storage, not yet switched
    StorageMode,
    /// Frame accepts display frames
    CustomMode,
}

impl DeviceMode {
    /// Mode a device with the given IDs is operating in
    pub fn from_ids(vendor_id: u16, product_id: u16) -> Self {
        match (vendor_id, product_id) {
            (VENDOR_ID, PRODUCT_ID_STORAGE) => DeviceMode::StorageMode,
            (VENDOR_ID, PRODUCT_ID_CUSTOM) => DeviceMode::CustomMode,
            _ => DeviceMode::None,
        }
    }

    /// Whether the IDs belong to the picture frame in either mode
    pub fn is_known(vendor_id: u16, product_id: u16) -> bool {
        Self::from_ids(vendor_id, product_id) != DeviceMode::None
    }
}

impl fmt::Display for DeviceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceMode::None => "none",
            DeviceMode::StorageMode => "storage",
            DeviceMode::CustomMode => "custom",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_from_ids() {
        assert_eq!(
            DeviceMode::from_ids(0x04e8, 0x200c),
            DeviceMode::StorageMode
        );
        assert_eq!(DeviceMode::from_ids(0x04e8, 0x200d), DeviceMode::CustomMode);
        assert_eq!(DeviceMode::from_ids(0x04e8, 0x1234), DeviceMode::None);
        assert_eq!(DeviceMode::from_ids(0x1234, 0x200d), DeviceMode::None);
    }

    #[test]
    fn test_mode_switch_request() {
        assert_eq!(MODE_SWITCH.request_type, 0x00);
        assert_eq!(MODE_SWITCH.request, 0x06);
        assert_eq!(MODE_SWITCH.value, 0xfe);
        assert_eq!(MODE_SWITCH.index, 0xfe);

        let payload = MODE_SWITCH.payload();
        assert_eq!(payload.len(), 254);
        assert!(payload.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_default_mode_is_none() {
        assert_eq!(DeviceMode::default(), DeviceMode::None);
        assert_eq!(DeviceMode::CustomMode.to_string(), "custom");
    }
}
