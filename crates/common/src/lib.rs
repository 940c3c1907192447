//! Common utilities for usb-photoframe
//!
//! Shared error type, logging setup, and the diagnostic event sink through
//! which the transport and the scheduler report failures they absorb.

pub mod diagnostics;
pub mod error;
pub mod logging;
pub mod test_utils;

pub use diagnostics::{Diagnostic, DiagnosticSink, TracingSink};
pub use error::{Error, Result};
pub use logging::setup_logging;
