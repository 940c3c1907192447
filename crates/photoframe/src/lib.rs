//! Driver and slideshow for USB picture frames
//!
//! The [`usb`] module owns the frame: discovery, the storage-to-custom
//! mode switch, hotplug tracking, and framed bulk writes. The
//! [`scheduler`] cycles configured screens through it, rendering each with
//! the [`render`] module.

pub mod config;
pub mod render;
pub mod scheduler;
pub mod usb;

pub use config::FrameConfig;
pub use render::{RenderSettings, ScreenRenderer};
pub use scheduler::{ImageProducer, Scheduler, SchedulerTiming, SlideState, Transport};
pub use usb::{DeviceStatus, FrameBridge, PhotoFrame, create_frame_bridge};
