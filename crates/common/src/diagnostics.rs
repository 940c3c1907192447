//! Structured diagnostic events
//!
//! Device and slideshow failures never propagate as errors; they are
//! reported here and the caller carries on. The default sink forwards
//! every event to `tracing`, tests substitute a recording sink.

use protocol::DeviceMode;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Notable event raised by the transport or the scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// Neither storage-mode nor custom-mode frame is attached
    DeviceNotFound,
    /// A frame was found and opened
    DeviceOpened {
        mode: DeviceMode,
        product: Option<String>,
    },
    /// A frame was found but could not be opened
    DeviceOpenFailed { mode: DeviceMode, error: String },
    /// Mode-switch control request accepted by a storage-mode frame
    ModeSwitched,
    /// Mode-switch control request failed
    ModeSwitchFailed { error: String },
    /// Discovery requested while a handle is already open
    AlreadyOpen { mode: DeviceMode },
    /// The open frame went away
    DeviceDetached { mode: DeviceMode },
    /// Device handle closed on request
    DeviceClosed,
    /// Hotplug notifications are not available on this platform
    HotplugUnavailable,
    /// Display requested without an open custom-mode frame
    DisplayUnavailable,
    /// The payload could not be framed
    EncodeFailed { error: String },
    InterfaceClaimFailed { interface: u8, error: String },
    InterfaceReleaseFailed { interface: u8, error: String },
    /// Bulk transfer of a frame failed
    TransferFailed { error: String },
    /// A frame was written completely
    FrameSent {
        frame_len: usize,
        image_len: usize,
        header: String,
    },
    /// The image producer returned nothing for a slide
    RenderFailed { slide: usize },
    /// A slide's cached image was replaced
    SlideRendered { slide: usize, image_len: usize },
    /// Show cursor moved past a slide that never produced an image
    SlideSkipped { slide: usize },
    /// The scheduler found the frame unavailable and reset its cursors
    TransportUnavailable,
}

/// Receiver of diagnostic events
pub trait DiagnosticSink: Send + Sync {
    fn emit(&self, event: Diagnostic);
}

impl<T: DiagnosticSink + ?Sized> DiagnosticSink for Arc<T> {
    fn emit(&self, event: Diagnostic) {
        (**self).emit(event)
    }
}

/// Default sink that logs every event
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn emit(&self, event: Diagnostic) {
        match event {
            Diagnostic::DeviceNotFound => error!("No picture frame found"),
            Diagnostic::DeviceOpened { mode, product } => info!(
                "Found picture frame in {} mode: {}",
                mode,
                product.as_deref().unwrap_or("Unknown Product")
            ),
            Diagnostic::DeviceOpenFailed { mode, error } => {
                error!("Error opening {} mode frame: {}", mode, error)
            }
            Diagnostic::ModeSwitched => debug!("Storage mode frame switched to custom mode"),
            Diagnostic::ModeSwitchFailed { error } => {
                error!("Error switching frame to custom mode: {}", error)
            }
            Diagnostic::AlreadyOpen { mode } => info!("Device already open ({} mode)", mode),
            Diagnostic::DeviceDetached { mode } => info!("Picture frame detached ({} mode)", mode),
            Diagnostic::DeviceClosed => info!("Closing device"),
            Diagnostic::HotplugUnavailable => {
                warn!("Hot-plug not supported on this platform, falling back to polling")
            }
            Diagnostic::DisplayUnavailable => warn!("No custom mode frame open, frame dropped"),
            Diagnostic::EncodeFailed { error } => error!("Failed to encode frame: {}", error),
            Diagnostic::InterfaceClaimFailed { interface, error } => {
                warn!("Failed to claim interface {}: {}", interface, error)
            }
            Diagnostic::InterfaceReleaseFailed { interface, error } => {
                warn!("Failed to release interface {}: {}", interface, error)
            }
            Diagnostic::TransferFailed { error } => warn!("Bulk transfer failed: {}", error),
            Diagnostic::FrameSent {
                frame_len,
                image_len,
                header,
            } => info!(
                "Sent {} bytes. Header = '{}'. Image size = {}",
                frame_len, header, image_len
            ),
            Diagnostic::RenderFailed { slide } => warn!("Slide {} produced no image", slide),
            Diagnostic::SlideRendered { slide, image_len } => {
                debug!("Slide {} rendered ({} bytes)", slide, image_len)
            }
            Diagnostic::SlideSkipped { slide } => {
                warn!("Slide {} has no image after all retries, skipping", slide)
            }
            Diagnostic::TransportUnavailable => debug!("Picture frame unavailable"),
        }
    }
}
