//! USB backend abstraction
//!
//! The picture frame state machine talks to hardware only through these
//! traits. [`RusbBackend`](crate::usb::rusb_backend::RusbBackend) drives
//! real devices; [`MockBackend`](crate::usb::mock::MockBackend) stands in
//! for them in tests.

use protocol::ControlRequest;
use std::sync::mpsc::Sender;
use std::time::Duration;

/// Attach/detach notification for one of the frame's vendor/product pairs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotplugEvent {
    Arrived { product_id: u16, bus: u8, address: u8 },
    Left { product_id: u16, bus: u8, address: u8 },
}

/// Open handle to a picture frame
pub trait FrameHandle: Send {
    /// Bus number and device address the handle refers to
    fn location(&self) -> (u8, u8);

    /// Product string descriptor, if readable
    fn product_string(&self) -> Option<String>;

    /// Host-to-device control transfer
    fn write_control(
        &mut self,
        request: &ControlRequest,
        data: &[u8],
        timeout: Duration,
    ) -> rusb::Result<usize>;

    fn claim_interface(&mut self, interface: u8) -> rusb::Result<()>;

    fn release_interface(&mut self, interface: u8) -> rusb::Result<()>;

    /// Bulk OUT transfer, returns the number of bytes written
    fn write_bulk(&mut self, endpoint: u8, data: &[u8], timeout: Duration) -> rusb::Result<usize>;
}

/// Source of picture frame handles and hotplug notifications
pub trait UsbBackend: Send {
    type Handle: FrameHandle;

    /// Open the first device matching the IDs
    ///
    /// Returns `Ok(None)` when no such device is attached and `Err` when one
    /// is attached but cannot be opened.
    fn open_device(&self, vendor_id: u16, product_id: u16) -> rusb::Result<Option<Self::Handle>>;

    /// Whether the platform delivers hotplug notifications
    fn has_hotplug(&self) -> bool;

    /// Deliver attach/detach events of the frame's IDs to `events`
    fn register_hotplug(&mut self, events: Sender<HotplugEvent>) -> rusb::Result<()>;

    /// Pump pending USB events, waiting at most `timeout`
    fn handle_events(&self, timeout: Duration) -> rusb::Result<()>;
}
