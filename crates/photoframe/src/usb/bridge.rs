//! Async channel bridge between the Tokio runtime and the USB thread
//!
//! Commands travel to the worker over an `async-channel`, replies come back
//! on oneshot channels, and the worker publishes the device status on a
//! watch channel after every change so availability can be queried
//! without a round trip.

use crate::scheduler::Transport;
use crate::usb::device::DeviceStatus;
use async_channel::{Receiver, Sender, bounded};
use bytes::Bytes;
use common::{Error, Result};
use protocol::DeviceMode;
use tokio::sync::{oneshot, watch};
use tracing::warn;

/// Commands from Tokio runtime to USB thread
#[derive(Debug)]
pub enum FrameCommand {
    /// Frame and write a JPEG image
    Display {
        image: Bytes,
        response: oneshot::Sender<bool>,
    },

    /// Run device discovery now
    CheckDevices {
        response: oneshot::Sender<DeviceMode>,
    },

    /// Close the device and stop the USB thread
    Shutdown,
}

/// Handle for Tokio runtime (async)
#[derive(Clone)]
pub struct FrameBridge {
    cmd_tx: Sender<FrameCommand>,
    status_rx: watch::Receiver<DeviceStatus>,
}

impl FrameBridge {
    /// Send a command to the USB thread
    pub async fn send_command(&self, cmd: FrameCommand) -> Result<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|e| Error::Channel(e.to_string()))
    }

    /// Last status published by the USB thread
    pub fn status(&self) -> DeviceStatus {
        *self.status_rx.borrow()
    }

    /// Wait until the USB thread publishes a new status
    pub async fn status_changed(&mut self) -> Result<DeviceStatus> {
        self.status_rx
            .changed()
            .await
            .map_err(|e| Error::Channel(e.to_string()))?;
        Ok(self.status())
    }

    pub async fn check_devices(&self) -> Result<DeviceMode> {
        let (tx, rx) = oneshot::channel();
        self.send_command(FrameCommand::CheckDevices { response: tx })
            .await?;
        rx.await.map_err(|e| Error::Channel(e.to_string()))
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.send_command(FrameCommand::Shutdown).await
    }
}

impl Transport for FrameBridge {
    fn is_available(&self) -> bool {
        self.status().is_available()
    }

    async fn display(&self, image: Bytes) -> bool {
        let (tx, rx) = oneshot::channel();
        if let Err(e) = self
            .send_command(FrameCommand::Display {
                image,
                response: tx,
            })
            .await
        {
            warn!("Failed to send Display command: {}", e);
            return false;
        }

        match rx.await {
            Ok(sent) => sent,
            Err(e) => {
                warn!("No reply to Display command: {}", e);
                false
            }
        }
    }
}

/// Handle for USB thread (blocking)
pub struct FrameWorker {
    cmd_rx: Receiver<FrameCommand>,
    status_tx: watch::Sender<DeviceStatus>,
}

impl FrameWorker {
    /// Try to receive a command without blocking
    pub fn try_recv_command(&self) -> Option<FrameCommand> {
        self.cmd_rx.try_recv().ok()
    }

    /// Whether every bridge handle has been dropped
    pub fn is_closed(&self) -> bool {
        self.cmd_rx.is_closed()
    }

    /// Publish a status snapshot, waking watchers only on change
    pub fn publish(&self, status: DeviceStatus) {
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }
}

/// Create the channel bridge between Tokio and USB thread
///
/// Returns (FrameBridge for Tokio, FrameWorker for USB thread)
pub fn create_frame_bridge() -> (FrameBridge, FrameWorker) {
    let (cmd_tx, cmd_rx) = bounded(16);
    let (status_tx, status_rx) = watch::channel(DeviceStatus::default());

    (
        FrameBridge { cmd_tx, status_rx },
        FrameWorker { cmd_rx, status_tx },
    )
}
