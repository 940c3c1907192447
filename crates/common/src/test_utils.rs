//! Test utilities shared across crates
//!
//! # Example
//!
//! ```
//! use common::test_utils::RecordingSink;
//! use common::{Diagnostic, DiagnosticSink};
//!
//! let sink = RecordingSink::new();
//! sink.emit(Diagnostic::DeviceNotFound);
//! assert!(sink.contains(&Diagnostic::DeviceNotFound));
//! ```

use crate::diagnostics::{Diagnostic, DiagnosticSink};
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

/// Default test timeout (5 seconds)
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Sink that keeps every event for later assertions
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<Diagnostic>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all events emitted so far
    pub fn events(&self) -> Vec<Diagnostic> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Whether an identical event was emitted
    pub fn contains(&self, event: &Diagnostic) -> bool {
        self.events().iter().any(|e| e == event)
    }

    /// Number of events matching a predicate
    pub fn count(&self, predicate: impl Fn(&Diagnostic) -> bool) -> usize {
        self.events().iter().filter(|e| predicate(e)).count()
    }

    /// Forget everything recorded so far
    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

impl DiagnosticSink for RecordingSink {
    fn emit(&self, event: Diagnostic) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

/// Run a future with a timeout
pub async fn with_timeout<F, T>(duration: Duration, future: F) -> Result<T, tokio::time::error::Elapsed>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, future).await
}
