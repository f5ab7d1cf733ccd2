//! State shared between the acquisition thread and its observers.
//!
//! Everything here is written by the acquisition thread only. Observers
//! read without ever blocking the writer for longer than a short
//! uncontended lock on the write-warning text.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

/// Lifecycle of one acquisition session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionState {
    /// Device not opened yet.
    Idle,
    /// Device open, frames flowing.
    Running,
    /// Ended on request.
    Stopped,
    /// Ended on an unrecoverable error.
    Failed,
}

impl AcquisitionState {
    /// True for `Stopped` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, AcquisitionState::Stopped | AcquisitionState::Failed)
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => AcquisitionState::Idle,
            1 => AcquisitionState::Running,
            2 => AcquisitionState::Stopped,
            _ => AcquisitionState::Failed,
        }
    }
}

impl fmt::Display for AcquisitionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AcquisitionState::Idle => "idle",
            AcquisitionState::Running => "running",
            AcquisitionState::Stopped => "stopped",
            AcquisitionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Cooperative cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    /// Creates a flag with no stop requested.
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks the acquisition loop to finish at its next iteration.
    pub fn request(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// True once a stop has been requested.
    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Counters, terminal state and error text of a session.
#[derive(Debug)]
pub struct SessionStatus {
    state: AtomicU8,
    retrieved: AtomicU64,
    saved: AtomicU64,
    preview_dropped: AtomicU64,
    retrieve_timeouts: AtomicU64,
    write_failures: AtomicU64,
    fatal_error: OnceLock<String>,
    write_warning: Mutex<Option<String>>,
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self {
            state: AtomicU8::new(0),
            retrieved: AtomicU64::new(0),
            saved: AtomicU64::new(0),
            preview_dropped: AtomicU64::new(0),
            retrieve_timeouts: AtomicU64::new(0),
            write_failures: AtomicU64::new(0),
            fatal_error: OnceLock::new(),
            write_warning: Mutex::new(None),
        }
    }
}

impl SessionStatus {
    /// Creates an idle status with zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> AcquisitionState {
        AcquisitionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Frames persisted so far.
    pub fn saved_count(&self) -> u64 {
        self.saved.load(Ordering::Acquire)
    }

    /// Frames retrieved from the device so far.
    pub fn retrieved_count(&self) -> u64 {
        self.retrieved.load(Ordering::Acquire)
    }

    /// Frames the preview buffer rejected.
    pub fn preview_dropped(&self) -> u64 {
        self.preview_dropped.load(Ordering::Acquire)
    }

    /// Retrievals that timed out.
    pub fn retrieve_timeouts(&self) -> u64 {
        self.retrieve_timeouts.load(Ordering::Acquire)
    }

    /// Persistence attempts that failed.
    pub fn write_failures(&self) -> u64 {
        self.write_failures.load(Ordering::Acquire)
    }

    /// The error that ended the session, if any.
    pub fn fatal_error(&self) -> Option<&str> {
        self.fatal_error.get().map(String::as_str)
    }

    /// Most recent non-fatal persistence failure.
    pub fn write_warning(&self) -> Option<String> {
        self.write_warning
            .lock()
            .map(|w| w.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// Error text for display: empty while healthy.
    pub fn error_text(&self) -> String {
        self.fatal_error().map(str::to_string).unwrap_or_default()
    }

    pub(crate) fn mark_running(&self) -> bool {
        self.transition(AcquisitionState::Idle, AcquisitionState::Running)
    }

    pub(crate) fn mark_stopped(&self) -> bool {
        self.transition(AcquisitionState::Running, AcquisitionState::Stopped)
            || self.transition(AcquisitionState::Idle, AcquisitionState::Stopped)
    }

    /// Latches `Failed` with `message`. Later failures are ignored.
    pub(crate) fn mark_failed(&self, message: impl Into<String>) -> bool {
        let moved = self.transition(AcquisitionState::Running, AcquisitionState::Failed)
            || self.transition(AcquisitionState::Idle, AcquisitionState::Failed);
        if moved {
            let _ = self.fatal_error.set(message.into());
        }
        moved
    }

    pub(crate) fn record_retrieved(&self) {
        self.retrieved.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn record_saved(&self) {
        self.saved.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn record_preview_drop(&self) {
        self.preview_dropped.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn record_timeout(&self) {
        self.retrieve_timeouts.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn record_write_failure(&self, message: String) {
        self.write_failures.fetch_add(1, Ordering::AcqRel);
        match self.write_warning.lock() {
            Ok(mut warning) => *warning = Some(message),
            Err(poisoned) => *poisoned.into_inner() = Some(message),
        }
    }

    fn transition(&self, from: AcquisitionState, to: AcquisitionState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}
