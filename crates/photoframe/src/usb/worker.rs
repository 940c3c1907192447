//! USB worker thread
//!
//! Dedicated thread that owns the picture frame. It pumps libusb events so
//! hotplug callbacks fire, acts on the resulting attach/detach notifications,
//! and executes commands from the Tokio runtime one at a time, so two bulk
//! transfers can never overlap on the endpoint.

use crate::usb::backend::UsbBackend;
use crate::usb::bridge::{FrameCommand, FrameWorker};
use crate::usb::device::PhotoFrame;
use crate::usb::rusb_backend::RusbBackend;
use common::DiagnosticSink;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// How long one `handle_events` call may block
const EVENT_TIMEOUT: Duration = Duration::from_millis(100);

/// Settings for the USB thread
#[derive(Debug, Clone, Copy)]
pub struct WorkerSettings {
    /// Timeout of control and bulk transfers
    pub transfer_timeout: Duration,
    /// Discovery interval while no frame is open and hotplug is unsupported
    pub rescan_interval: Duration,
}

/// USB worker thread
pub struct FrameWorkerThread<B: UsbBackend> {
    frame: PhotoFrame<B>,
    worker: FrameWorker,
    hotplug: bool,
    rescan_interval: Duration,
    last_scan: Instant,
}

impl<B: UsbBackend> FrameWorkerThread<B> {
    /// Register hotplug callbacks and run initial discovery
    pub fn new(mut frame: PhotoFrame<B>, worker: FrameWorker, rescan_interval: Duration) -> Self {
        let hotplug = frame.register_hotplug_callbacks();
        frame.check_devices();
        worker.publish(frame.status());

        Self {
            frame,
            worker,
            hotplug,
            rescan_interval,
            last_scan: Instant::now(),
        }
    }

    /// Run the event loop until a Shutdown command arrives or the bridge is dropped
    pub fn run(mut self) {
        info!("USB worker thread started");

        loop {
            if !self.drain_commands() {
                break;
            }

            match self.frame.poll_events(EVENT_TIMEOUT) {
                Ok(0) => {}
                Ok(handled) => debug!("Handled {} hot-plug events", handled),
                Err(rusb::Error::Interrupted) => {
                    debug!("USB event handling interrupted");
                }
                Err(e) => {
                    warn!("Error handling USB events: {}", e);
                    std::thread::sleep(EVENT_TIMEOUT);
                }
            }

            if !self.hotplug
                && !self.frame.is_open()
                && self.last_scan.elapsed() >= self.rescan_interval
            {
                self.frame.check_devices();
                self.last_scan = Instant::now();
            }

            self.worker.publish(self.frame.status());
        }

        self.frame.close();
        self.worker.publish(self.frame.status());
        info!("USB worker thread stopped");
    }

    /// Execute every queued command, `false` once the thread should stop
    fn drain_commands(&mut self) -> bool {
        // Checked first so commands sent just before the close still run
        let closed = self.worker.is_closed();

        while let Some(cmd) = self.worker.try_recv_command() {
            if let FrameCommand::Shutdown = cmd {
                info!("USB worker shutting down");
                return false;
            }
            self.handle_command(cmd);
        }

        if closed {
            info!("Frame bridge dropped, USB worker shutting down");
        }
        !closed
    }

    /// Handle a command, containing any panic raised below it
    fn handle_command(&mut self, cmd: FrameCommand) {
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.handle_command_inner(cmd)
        }));

        if let Err(e) = result {
            error!("Panic in USB command handler: {:?}", e);
        }
        self.worker.publish(self.frame.status());
    }

    fn handle_command_inner(&mut self, cmd: FrameCommand) {
        match cmd {
            FrameCommand::Display { image, response } => {
                debug!("Displaying {} byte image", image.len());
                let sent = self.frame.display(&image);
                let _ = response.send(sent);
            }

            FrameCommand::CheckDevices { response } => {
                let mode = self.frame.check_devices();
                self.last_scan = Instant::now();
                let _ = response.send(mode);
            }

            FrameCommand::Shutdown => {
                // Handled in the main loop
            }
        }
    }
}

/// Spawn the USB worker thread for a backend built on that thread
pub fn spawn_worker_with<B, F>(
    worker: FrameWorker,
    settings: WorkerSettings,
    sink: Arc<dyn DiagnosticSink>,
    make_backend: F,
) -> std::io::Result<std::thread::JoinHandle<Result<(), rusb::Error>>>
where
    B: UsbBackend + 'static,
    F: FnOnce() -> rusb::Result<B> + Send + 'static,
{
    std::thread::Builder::new()
        .name("usb-worker".to_string())
        .spawn(move || {
            let backend = make_backend()?;
            let frame = PhotoFrame::new(backend, sink, settings.transfer_timeout);
            FrameWorkerThread::new(frame, worker, settings.rescan_interval).run();
            Ok(())
        })
}

/// Spawn the USB worker thread driving real hardware through libusb
pub fn spawn_frame_worker(
    worker: FrameWorker,
    settings: WorkerSettings,
    sink: Arc<dyn DiagnosticSink>,
) -> std::io::Result<std::thread::JoinHandle<Result<(), rusb::Error>>> {
    spawn_worker_with(worker, settings, sink, RusbBackend::new)
}
