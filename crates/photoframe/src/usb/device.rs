//! Picture frame state machine
//!
//! Owns the single device handle and tracks the operating mode:
//!
//! ```text
//! None ──(storage frame found)──> StorageMode ──(mode switch ok)──> CustomMode
//!   ^                                  │                               │
//!   └──────(open/switch failure)───────┘                               │
//!   └──────────────────────────────(detach)────────────────────────────┘
//! ```
//!
//! Software never moves a frame from custom back to storage mode; that only
//! happens when the device re-enumerates after an unplug.

use crate::usb::backend::{FrameHandle, HotplugEvent, UsbBackend};
use common::{Diagnostic, DiagnosticSink};
use protocol::{
    DISPLAY_ENDPOINT, DISPLAY_INTERFACE, DeviceMode, FrameHeader, MODE_SWITCH, PRODUCT_ID_CUSTOM,
    PRODUCT_ID_STORAGE, VENDOR_ID, encode_frame,
};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver};
use std::time::Duration;
use tracing::debug;

/// Snapshot of the transport state published to the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceStatus {
    pub mode: DeviceMode,
    pub open: bool,
}

impl DeviceStatus {
    /// Frames can only be written to an open custom-mode device
    pub fn is_available(&self) -> bool {
        self.mode == DeviceMode::CustomMode && self.open
    }
}

/// Interface claimed for the duration of one transfer
///
/// Released on every exit path, including unwinding out of a transfer.
struct InterfaceClaim<'a, H: FrameHandle> {
    handle: &'a mut H,
    interface: u8,
    sink: &'a dyn DiagnosticSink,
}

impl<'a, H: FrameHandle> InterfaceClaim<'a, H> {
    fn claim(handle: &'a mut H, interface: u8, sink: &'a dyn DiagnosticSink) -> rusb::Result<Self> {
        handle.claim_interface(interface)?;
        Ok(Self {
            handle,
            interface,
            sink,
        })
    }

    fn write_bulk(&mut self, endpoint: u8, data: &[u8], timeout: Duration) -> rusb::Result<usize> {
        self.handle.write_bulk(endpoint, data, timeout)
    }
}

impl<H: FrameHandle> Drop for InterfaceClaim<'_, H> {
    fn drop(&mut self) {
        if let Err(e) = self.handle.release_interface(self.interface) {
            self.sink.emit(Diagnostic::InterfaceReleaseFailed {
                interface: self.interface,
                error: e.to_string(),
            });
        }
    }
}

/// The attached picture frame, if any
pub struct PhotoFrame<B: UsbBackend> {
    backend: B,
    handle: Option<B::Handle>,
    mode: DeviceMode,
    sink: Arc<dyn DiagnosticSink>,
    timeout: Duration,
    hotplug_rx: Option<Receiver<HotplugEvent>>,
}

impl<B: UsbBackend> PhotoFrame<B> {
    pub fn new(backend: B, sink: Arc<dyn DiagnosticSink>, timeout: Duration) -> Self {
        Self {
            backend,
            handle: None,
            mode: DeviceMode::None,
            sink,
            timeout,
            hotplug_rx: None,
        }
    }

    pub fn mode(&self) -> DeviceMode {
        self.mode
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    pub fn status(&self) -> DeviceStatus {
        DeviceStatus {
            mode: self.mode,
            open: self.is_open(),
        }
    }

    /// True iff a custom-mode frame is open. No side effects.
    pub fn is_available(&self) -> bool {
        self.status().is_available()
    }

    /// Discover the frame, switching it to custom mode if needed
    ///
    /// A no-op while a handle is open.
    pub fn check_devices(&mut self) -> DeviceMode {
        if self.handle.is_some() {
            self.sink.emit(Diagnostic::AlreadyOpen { mode: self.mode });
            return self.mode;
        }

        match self.backend.open_device(VENDOR_ID, PRODUCT_ID_CUSTOM) {
            Ok(Some(handle)) => {
                self.sink.emit(Diagnostic::DeviceOpened {
                    mode: DeviceMode::CustomMode,
                    product: handle.product_string(),
                });
                self.handle = Some(handle);
                self.mode = DeviceMode::CustomMode;
                return self.mode;
            }
            Ok(None) => {}
            Err(e) => {
                self.sink.emit(Diagnostic::DeviceOpenFailed {
                    mode: DeviceMode::CustomMode,
                    error: e.to_string(),
                });
                return self.reset();
            }
        }

        match self.backend.open_device(VENDOR_ID, PRODUCT_ID_STORAGE) {
            Ok(Some(mut handle)) => {
                self.mode = DeviceMode::StorageMode;
                self.sink.emit(Diagnostic::DeviceOpened {
                    mode: DeviceMode::StorageMode,
                    product: handle.product_string(),
                });

                match handle.write_control(&MODE_SWITCH, &MODE_SWITCH.payload(), self.timeout) {
                    Ok(_) => {
                        self.sink.emit(Diagnostic::ModeSwitched);
                        self.handle = Some(handle);
                        self.mode = DeviceMode::CustomMode;
                        self.mode
                    }
                    Err(e) => {
                        self.sink.emit(Diagnostic::ModeSwitchFailed {
                            error: e.to_string(),
                        });
                        self.reset()
                    }
                }
            }
            Ok(None) => {
                self.sink.emit(Diagnostic::DeviceNotFound);
                self.reset()
            }
            Err(e) => {
                self.sink.emit(Diagnostic::DeviceOpenFailed {
                    mode: DeviceMode::StorageMode,
                    error: e.to_string(),
                });
                self.reset()
            }
        }
    }

    /// Subscribe to attach/detach notifications of both operating modes
    ///
    /// Returns false when the platform cannot deliver them; discovery then
    /// has to be repeated by polling.
    pub fn register_hotplug_callbacks(&mut self) -> bool {
        if !self.backend.has_hotplug() {
            self.sink.emit(Diagnostic::HotplugUnavailable);
            return false;
        }

        let (tx, rx) = mpsc::channel();
        match self.backend.register_hotplug(tx) {
            Ok(()) => {
                self.hotplug_rx = Some(rx);
                true
            }
            Err(e) => {
                debug!("Hot-plug registration failed: {}", e);
                self.sink.emit(Diagnostic::HotplugUnavailable);
                false
            }
        }
    }

    /// Pump backend events, then act on queued hotplug notifications
    ///
    /// Returns the number of notifications handled.
    pub fn poll_events(&mut self, timeout: Duration) -> rusb::Result<usize> {
        self.backend.handle_events(timeout)?;
        Ok(self.process_hotplug_events())
    }

    /// Act on hotplug notifications queued since the last call
    pub fn process_hotplug_events(&mut self) -> usize {
        let events: Vec<HotplugEvent> = match &self.hotplug_rx {
            Some(rx) => rx.try_iter().collect(),
            None => return 0,
        };

        for event in &events {
            self.handle_hotplug(*event);
        }
        events.len()
    }

    /// Close the handle if its device left, then rediscover
    pub fn handle_hotplug(&mut self, event: HotplugEvent) {
        debug!("Hot-plug event: {:?}", event);

        if let HotplugEvent::Left { bus, address, .. } = event
            && self
                .handle
                .as_ref()
                .is_some_and(|h| h.location() == (bus, address))
        {
            self.mark_detached();
        }

        self.check_devices();
    }

    /// Encode `image` and write it to the frame
    ///
    /// Every failure is reported to the sink and surfaces only as `false`.
    pub fn display(&mut self, image: &[u8]) -> bool {
        if !self.is_available() {
            self.sink.emit(Diagnostic::DisplayUnavailable);
            return false;
        }

        let frame = match encode_frame(image) {
            Ok(frame) => frame,
            Err(e) => {
                self.sink.emit(Diagnostic::EncodeFailed {
                    error: e.to_string(),
                });
                return false;
            }
        };

        let Some(handle) = self.handle.as_mut() else {
            return false;
        };
        let sink: &dyn DiagnosticSink = &*self.sink;

        let result = match InterfaceClaim::claim(handle, DISPLAY_INTERFACE, sink) {
            Ok(mut claim) => claim
                .write_bulk(DISPLAY_ENDPOINT, &frame, self.timeout)
                .map_err(|e| {
                    sink.emit(Diagnostic::TransferFailed {
                        error: e.to_string(),
                    });
                    e
                }),
            Err(e) => {
                sink.emit(Diagnostic::InterfaceClaimFailed {
                    interface: DISPLAY_INTERFACE,
                    error: e.to_string(),
                });
                Err(e)
            }
        };

        match result {
            Ok(written) if written == frame.len() => {
                self.sink.emit(Diagnostic::FrameSent {
                    frame_len: frame.len(),
                    image_len: image.len(),
                    header: FrameHeader::parse(&frame)
                        .map(|h| h.to_string())
                        .unwrap_or_default(),
                });
                true
            }
            Ok(written) => {
                self.sink.emit(Diagnostic::TransferFailed {
                    error: format!("short write: {} of {} bytes", written, frame.len()),
                });
                false
            }
            Err(e) => {
                if e == rusb::Error::NoDevice {
                    self.mark_detached();
                }
                false
            }
        }
    }

    /// Drop the handle
    pub fn close(&mut self) {
        if self.handle.is_some() {
            self.sink.emit(Diagnostic::DeviceClosed);
        }
        self.reset();
    }

    fn mark_detached(&mut self) {
        self.sink.emit(Diagnostic::DeviceDetached { mode: self.mode });
        self.reset();
    }

    fn reset(&mut self) -> DeviceMode {
        self.handle = None;
        self.mode = DeviceMode::None;
        self.mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usb::mock::{MockBackend, MockCall};
    use common::test_utils::RecordingSink;

    fn frame_with(backend: &MockBackend) -> (PhotoFrame<MockBackend>, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::new());
        let frame = PhotoFrame::new(backend.clone(), sink.clone(), Duration::from_secs(1));
        (frame, sink)
    }

    #[test]
    fn test_status_availability() {
        let mut status = DeviceStatus::default();
        assert!(!status.is_available());

        status.mode = DeviceMode::CustomMode;
        assert!(!status.is_available());

        status.open = true;
        assert!(status.is_available());

        status.mode = DeviceMode::StorageMode;
        assert!(!status.is_available());
    }

    #[test]
    fn test_custom_device_opened_directly() {
        let backend = MockBackend::new();
        backend.attach(PRODUCT_ID_CUSTOM, 1, 4);
        let (mut frame, _sink) = frame_with(&backend);

        assert_eq!(frame.check_devices(), DeviceMode::CustomMode);
        assert!(frame.is_available());
        assert_eq!(
            backend.count(|c| matches!(c, MockCall::Control { .. })),
            0
        );
    }

    #[test]
    fn test_nothing_attached() {
        let backend = MockBackend::new();
        let (mut frame, sink) = frame_with(&backend);

        assert_eq!(frame.check_devices(), DeviceMode::None);
        assert!(!frame.is_open());
        assert!(sink.contains(&Diagnostic::DeviceNotFound));
    }

    #[test]
    fn test_open_failure_leaves_mode_none() {
        let backend = MockBackend::new();
        backend.attach(PRODUCT_ID_CUSTOM, 1, 4);
        backend.set_open_error(Some(rusb::Error::Access));
        let (mut frame, sink) = frame_with(&backend);

        assert_eq!(frame.check_devices(), DeviceMode::None);
        assert!(!frame.is_available());
        assert_eq!(
            sink.count(|e| matches!(e, Diagnostic::DeviceOpenFailed { .. })),
            1
        );
    }

    #[test]
    fn test_mode_switch_failure() {
        let backend = MockBackend::new();
        backend.attach(PRODUCT_ID_STORAGE, 1, 4);
        backend.set_control_error(Some(rusb::Error::Pipe));
        let (mut frame, sink) = frame_with(&backend);

        assert_eq!(frame.check_devices(), DeviceMode::None);
        assert!(!frame.is_open());
        assert!(sink.contains(&Diagnostic::ModeSwitchFailed {
            error: rusb::Error::Pipe.to_string()
        }));
    }

    #[test]
    fn test_display_requires_custom_mode() {
        let backend = MockBackend::new();
        let (mut frame, sink) = frame_with(&backend);

        assert!(!frame.display(&[0xff, 0xd8]));
        assert!(sink.contains(&Diagnostic::DisplayUnavailable));
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn test_display_claims_writes_releases() {
        let backend = MockBackend::new();
        backend.attach(PRODUCT_ID_CUSTOM, 1, 4);
        let (mut frame, _sink) = frame_with(&backend);
        frame.check_devices();
        backend.clear_calls();

        assert!(frame.display(&[0u8; 100]));
        assert_eq!(
            backend.calls(),
            vec![
                MockCall::Claim { interface: 0 },
                MockCall::Bulk {
                    endpoint: 2,
                    len: 16384
                },
                MockCall::Release { interface: 0 },
            ]
        );
    }

    #[test]
    fn test_claim_failure_skips_transfer() {
        let backend = MockBackend::new();
        backend.attach(PRODUCT_ID_CUSTOM, 1, 4);
        backend.set_claim_error(Some(rusb::Error::Busy));
        let (mut frame, sink) = frame_with(&backend);
        frame.check_devices();

        assert!(!frame.display(&[1, 2, 3]));
        assert_eq!(backend.count(|c| matches!(c, MockCall::Bulk { .. })), 0);
        assert_eq!(
            sink.count(|e| matches!(e, Diagnostic::InterfaceClaimFailed { .. })),
            1
        );
        assert!(frame.is_available());
    }

    #[test]
    fn test_no_device_transfer_counts_as_detach() {
        let backend = MockBackend::new();
        backend.attach(PRODUCT_ID_CUSTOM, 1, 4);
        let (mut frame, sink) = frame_with(&backend);
        frame.check_devices();
        backend.set_bulk_error(Some(rusb::Error::NoDevice));

        assert!(!frame.display(&[1, 2, 3]));
        assert_eq!(frame.mode(), DeviceMode::None);
        assert!(sink.contains(&Diagnostic::DeviceDetached {
            mode: DeviceMode::CustomMode
        }));
    }

    #[test]
    fn test_close_drops_handle() {
        let backend = MockBackend::new();
        backend.attach(PRODUCT_ID_CUSTOM, 1, 4);
        let (mut frame, sink) = frame_with(&backend);
        frame.check_devices();

        frame.close();
        assert_eq!(frame.status(), DeviceStatus::default());
        assert!(sink.contains(&Diagnostic::DeviceClosed));
    }
}
