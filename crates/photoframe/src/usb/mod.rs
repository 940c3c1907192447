//! USB transport
//!
//! Everything that touches the picture frame:
//! - Backend seam over libusb, with an in-memory mock for tests
//! - Device discovery, the storage-to-custom mode switch, hotplug tracking
//! - Framed bulk writes with per-transfer interface claiming
//!
//! USB calls are blocking, so the frame lives on a dedicated worker thread
//! and the async side talks to it through [`FrameBridge`].

pub mod backend;
pub mod bridge;
pub mod device;
pub mod mock;
pub mod rusb_backend;
pub mod worker;

pub use backend::{FrameHandle, HotplugEvent, UsbBackend};
pub use bridge::{FrameBridge, FrameCommand, FrameWorker, create_frame_bridge};
pub use device::{DeviceStatus, PhotoFrame};
pub use rusb_backend::RusbBackend;
pub use worker::{FrameWorkerThread, WorkerSettings, spawn_frame_worker, spawn_worker_with};
