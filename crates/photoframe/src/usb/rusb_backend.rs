//! libusb-backed implementation of the USB backend

use crate::usb::backend::{FrameHandle, HotplugEvent, UsbBackend};
use protocol::{ControlRequest, DeviceMode, VENDOR_ID};
use rusb::{Context, Device, DeviceDescriptor, DeviceHandle, Hotplug, HotplugBuilder, Registration, UsbContext};
use std::sync::mpsc::Sender;
use std::time::Duration;
use tracing::{debug, warn};

/// Backend using a private libusb context
pub struct RusbBackend {
    context: Context,
    /// Kept alive for as long as notifications are wanted
    _hotplug_registration: Option<Registration<Context>>,
}

impl RusbBackend {
    pub fn new() -> rusb::Result<Self> {
        let context = Context::new()?;

        Ok(Self {
            context,
            _hotplug_registration: None,
        })
    }
}

impl UsbBackend for RusbBackend {
    type Handle = RusbFrameHandle;

    fn open_device(&self, vendor_id: u16, product_id: u16) -> rusb::Result<Option<Self::Handle>> {
        for device in self.context.devices()?.iter() {
            let descriptor = match device.device_descriptor() {
                Ok(d) => d,
                Err(e) => {
                    debug!(
                        "Skipping device without descriptor (bus={}, addr={}): {}",
                        device.bus_number(),
                        device.address(),
                        e
                    );
                    continue;
                }
            };

            if descriptor.vendor_id() != vendor_id || descriptor.product_id() != product_id {
                continue;
            }

            debug!(
                "Opening device {:04x}:{:04x} (bus={}, addr={})",
                vendor_id,
                product_id,
                device.bus_number(),
                device.address()
            );
            let handle = device.open()?;

            return Ok(Some(RusbFrameHandle {
                bus: device.bus_number(),
                address: device.address(),
                descriptor,
                handle,
                detached_interfaces: Vec::new(),
            }));
        }

        Ok(None)
    }

    fn has_hotplug(&self) -> bool {
        rusb::has_hotplug()
    }

    fn register_hotplug(&mut self, events: Sender<HotplugEvent>) -> rusb::Result<()> {
        let registration = HotplugBuilder::new()
            .vendor_id(VENDOR_ID)
            .enumerate(false)
            .register(&self.context, Box::new(HotplugCallback { events }))?;

        self._hotplug_registration = Some(registration);
        debug!("Hot-plug callbacks registered for vendor {:#06x}", VENDOR_ID);
        Ok(())
    }

    fn handle_events(&self, timeout: Duration) -> rusb::Result<()> {
        self.context.handle_events(Some(timeout))
    }
}

/// Open picture frame
pub struct RusbFrameHandle {
    bus: u8,
    address: u8,
    descriptor: DeviceDescriptor,
    handle: DeviceHandle<Context>,
    /// Interfaces we took away from a kernel driver
    detached_interfaces: Vec<u8>,
}

impl FrameHandle for RusbFrameHandle {
    fn location(&self) -> (u8, u8) {
        (self.bus, self.address)
    }

    fn product_string(&self) -> Option<String> {
        self.descriptor
            .product_string_index()
            .and_then(|idx| self.handle.read_string_descriptor_ascii(idx).ok())
    }

    fn write_control(
        &mut self,
        request: &ControlRequest,
        data: &[u8],
        timeout: Duration,
    ) -> rusb::Result<usize> {
        debug!(
            "Control transfer: request_type={:#x}, request={:#x}, value={:#x}, index={:#x}, data_len={}",
            request.request_type,
            request.request,
            request.value,
            request.index,
            data.len()
        );
        self.handle.write_control(
            request.request_type,
            request.request,
            request.value,
            request.index,
            data,
            timeout,
        )
    }

    fn claim_interface(&mut self, interface: u8) -> rusb::Result<()> {
        match self.handle.kernel_driver_active(interface) {
            Ok(true) => {
                debug!("Detaching kernel driver from interface {}", interface);
                match self.handle.detach_kernel_driver(interface) {
                    Ok(()) => {
                        if !self.detached_interfaces.contains(&interface) {
                            self.detached_interfaces.push(interface);
                        }
                    }
                    Err(e) => warn!(
                        "Failed to detach kernel driver from interface {}: {}",
                        interface, e
                    ),
                }
            }
            Ok(false) => {}
            Err(e) => debug!(
                "Could not check kernel driver status for interface {}: {}",
                interface, e
            ),
        }

        self.handle.claim_interface(interface)
    }

    fn release_interface(&mut self, interface: u8) -> rusb::Result<()> {
        self.handle.release_interface(interface)
    }

    fn write_bulk(&mut self, endpoint: u8, data: &[u8], timeout: Duration) -> rusb::Result<usize> {
        debug!(
            "Bulk transfer: endpoint={:#x}, data_len={}, timeout={}ms",
            endpoint,
            data.len(),
            timeout.as_millis()
        );
        self.handle.write_bulk(endpoint, data, timeout)
    }
}

impl Drop for RusbFrameHandle {
    fn drop(&mut self) {
        for interface in self.detached_interfaces.drain(..) {
            if let Err(e) = self.handle.attach_kernel_driver(interface) {
                debug!(
                    "Could not reattach kernel driver to interface {}: {}",
                    interface, e
                );
            }
        }
    }
}

/// Forwards libusb hotplug callbacks to the worker thread
///
/// libusb forbids synchronous I/O inside the callback, so the event is
/// only queued here and handled after `handle_events` returns.
struct HotplugCallback {
    events: Sender<HotplugEvent>,
}

impl HotplugCallback {
    fn describe<T: UsbContext>(device: &Device<T>) -> Option<(u16, u8, u8)> {
        let descriptor = device.device_descriptor().ok()?;
        if !DeviceMode::is_known(descriptor.vendor_id(), descriptor.product_id()) {
            return None;
        }
        Some((descriptor.product_id(), device.bus_number(), device.address()))
    }
}

impl<T: UsbContext> Hotplug<T> for HotplugCallback {
    fn device_arrived(&mut self, device: Device<T>) {
        if let Some((product_id, bus, address)) = Self::describe(&device) {
            debug!(
                "Hot-plug callback: device arrived (pid={:#06x}, bus={}, addr={})",
                product_id, bus, address
            );
            let _ = self.events.send(HotplugEvent::Arrived {
                product_id,
                bus,
                address,
            });
        }
    }

    fn device_left(&mut self, device: Device<T>) {
        if let Some((product_id, bus, address)) = Self::describe(&device) {
            debug!(
                "Hot-plug callback: device left (pid={:#06x}, bus={}, addr={})",
                product_id, bus, address
            );
            let _ = self.events.send(HotplugEvent::Left {
                product_id,
                bus,
                address,
            });
        }
    }
}
