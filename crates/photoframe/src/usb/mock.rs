//! In-memory USB backend
//!
//! Simulates the picture frame's two enumerations without hardware:
//! devices can be attached and detached at runtime, failures injected per
//! operation, and every call is recorded for assertions.
//!
//! # Example
//!
//! ```
//! use photoframe::usb::mock::MockBackend;
//! use protocol::PRODUCT_ID_CUSTOM;
//!
//! let backend = MockBackend::new();
//! backend.attach(PRODUCT_ID_CUSTOM, 1, 7);
//! assert_eq!(backend.attached().len(), 1);
//! ```

use crate::usb::backend::{FrameHandle, HotplugEvent, UsbBackend};
use protocol::{ControlRequest, MODE_SWITCH, PRODUCT_ID_CUSTOM, PRODUCT_ID_STORAGE, VENDOR_ID};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Simulated attached device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockDevice {
    pub product_id: u16,
    pub bus: u8,
    pub address: u8,
}

/// Operation recorded by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Open { product_id: u16 },
    Control { request: ControlRequest, len: usize },
    Claim { interface: u8 },
    Release { interface: u8 },
    Bulk { endpoint: u8, len: usize },
}

struct MockState {
    devices: Vec<MockDevice>,
    calls: Vec<MockCall>,
    hotplug_supported: bool,
    hotplug_tx: Option<Sender<HotplugEvent>>,
    open_error: Option<rusb::Error>,
    control_error: Option<rusb::Error>,
    claim_error: Option<rusb::Error>,
    bulk_error: Option<rusb::Error>,
    panic_on_bulk: bool,
    reenumerate_on_switch: bool,
    last_frame: Option<Vec<u8>>,
}

impl MockState {
    fn notify(&self, event: HotplugEvent) {
        if let Some(tx) = &self.hotplug_tx {
            let _ = tx.send(event);
        }
    }
}

/// Cloneable handle on the shared simulated bus
#[derive(Clone)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                devices: Vec::new(),
                calls: Vec::new(),
                hotplug_supported: true,
                hotplug_tx: None,
                open_error: None,
                control_error: None,
                claim_error: None,
                bulk_error: None,
                panic_on_bulk: false,
                reenumerate_on_switch: false,
                last_frame: None,
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Plug in a device and raise an arrival notification
    pub fn attach(&self, product_id: u16, bus: u8, address: u8) {
        let mut state = self.state();
        state.devices.push(MockDevice {
            product_id,
            bus,
            address,
        });
        state.notify(HotplugEvent::Arrived {
            product_id,
            bus,
            address,
        });
    }

    /// Unplug every device with the product ID and raise departure notifications
    pub fn detach(&self, product_id: u16) {
        let mut state = self.state();
        let (gone, kept): (Vec<_>, Vec<_>) = state
            .devices
            .drain(..)
            .partition(|d| d.product_id == product_id);
        state.devices = kept;
        for device in gone {
            state.notify(HotplugEvent::Left {
                product_id: device.product_id,
                bus: device.bus,
                address: device.address,
            });
        }
    }

    pub fn attached(&self) -> Vec<MockDevice> {
        self.state().devices.clone()
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.state().calls.clone()
    }

    /// Number of recorded calls matching a predicate
    pub fn count(&self, predicate: impl Fn(&MockCall) -> bool) -> usize {
        self.state().calls.iter().filter(|c| predicate(c)).count()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Frame bytes of the most recent successful bulk transfer
    pub fn last_frame(&self) -> Option<Vec<u8>> {
        self.state().last_frame.clone()
    }

    pub fn set_hotplug_supported(&self, supported: bool) {
        self.state().hotplug_supported = supported;
    }

    pub fn set_open_error(&self, error: Option<rusb::Error>) {
        self.state().open_error = error;
    }

    pub fn set_control_error(&self, error: Option<rusb::Error>) {
        self.state().control_error = error;
    }

    pub fn set_claim_error(&self, error: Option<rusb::Error>) {
        self.state().claim_error = error;
    }

    pub fn set_bulk_error(&self, error: Option<rusb::Error>) {
        self.state().bulk_error = error;
    }

    /// Make the next bulk transfers panic mid-write
    pub fn set_panic_on_bulk(&self, panic: bool) {
        self.state().panic_on_bulk = panic;
    }

    /// Replace the storage device by a custom-mode device once switched,
    /// the way the real frame re-enumerates
    pub fn set_reenumerate_on_switch(&self, reenumerate: bool) {
        self.state().reenumerate_on_switch = reenumerate;
    }
}

impl UsbBackend for MockBackend {
    type Handle = MockHandle;

    fn open_device(&self, vendor_id: u16, product_id: u16) -> rusb::Result<Option<Self::Handle>> {
        let mut state = self.state();
        if vendor_id != VENDOR_ID {
            return Ok(None);
        }
        let Some(device) = state
            .devices
            .iter()
            .find(|d| d.product_id == product_id)
            .copied()
        else {
            return Ok(None);
        };

        state.calls.push(MockCall::Open { product_id });
        if let Some(e) = state.open_error {
            return Err(e);
        }

        Ok(Some(MockHandle {
            state: Arc::clone(&self.state),
            device,
        }))
    }

    fn has_hotplug(&self) -> bool {
        self.state().hotplug_supported
    }

    fn register_hotplug(&mut self, events: Sender<HotplugEvent>) -> rusb::Result<()> {
        let mut state = self.state();
        if !state.hotplug_supported {
            return Err(rusb::Error::NotSupported);
        }
        state.hotplug_tx = Some(events);
        Ok(())
    }

    fn handle_events(&self, timeout: Duration) -> rusb::Result<()> {
        std::thread::sleep(timeout.min(Duration::from_millis(2)));
        Ok(())
    }
}

/// Handle on a simulated device
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
    device: MockDevice,
}

impl MockHandle {
    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn present(state: &MockState, device: &MockDevice) -> bool {
        state.devices.contains(device)
    }
}

impl FrameHandle for MockHandle {
    fn location(&self) -> (u8, u8) {
        (self.device.bus, self.device.address)
    }

    fn product_string(&self) -> Option<String> {
        let name = match self.device.product_id {
            PRODUCT_ID_CUSTOM => "SPF-87H Mini Monitor",
            PRODUCT_ID_STORAGE => "SPF-87H Digital Photo Frame",
            _ => return None,
        };
        Some(name.to_string())
    }

    fn write_control(
        &mut self,
        request: &ControlRequest,
        data: &[u8],
        _timeout: Duration,
    ) -> rusb::Result<usize> {
        let device = self.device;
        let mut state = self.state();
        state.calls.push(MockCall::Control {
            request: *request,
            len: data.len(),
        });
        if let Some(e) = state.control_error {
            return Err(e);
        }
        if !Self::present(&state, &device) {
            return Err(rusb::Error::NoDevice);
        }

        if state.reenumerate_on_switch
            && *request == MODE_SWITCH
            && device.product_id == PRODUCT_ID_STORAGE
        {
            state.devices.retain(|d| *d != device);
            state.notify(HotplugEvent::Left {
                product_id: device.product_id,
                bus: device.bus,
                address: device.address,
            });
            let custom = MockDevice {
                product_id: PRODUCT_ID_CUSTOM,
                bus: device.bus,
                address: device.address.wrapping_add(1),
            };
            state.devices.push(custom);
            state.notify(HotplugEvent::Arrived {
                product_id: custom.product_id,
                bus: custom.bus,
                address: custom.address,
            });
        }

        Ok(data.len())
    }

    fn claim_interface(&mut self, interface: u8) -> rusb::Result<()> {
        let mut state = self.state();
        state.calls.push(MockCall::Claim { interface });
        match state.claim_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn release_interface(&mut self, interface: u8) -> rusb::Result<()> {
        self.state().calls.push(MockCall::Release { interface });
        Ok(())
    }

    fn write_bulk(&mut self, endpoint: u8, data: &[u8], _timeout: Duration) -> rusb::Result<usize> {
        let device = self.device;
        let mut state = self.state();
        state.calls.push(MockCall::Bulk {
            endpoint,
            len: data.len(),
        });

        if state.panic_on_bulk {
            drop(state);
            panic!("simulated transfer panic");
        }
        if let Some(e) = state.bulk_error {
            return Err(e);
        }
        if !Self::present(&state, &device) {
            return Err(rusb::Error::NoDevice);
        }

        state.last_frame = Some(data.to_vec());
        Ok(data.len())
    }
}
