//! Consumer-side view of a session, for whatever renders the preview.
//!
//! The presentation layer needs exactly four things from the pipeline:
//! the newest frame, the saved-frame count, the error text and a way to
//! request a stop. [`PreviewMonitor`] bundles them and never blocks.

use super::preview::PreviewReceiver;
use super::status::{AcquisitionState, SessionStatus, StopSignal};
use crate::capture::Frame;
use std::sync::Arc;
use std::time::Duration;

/// Everything a UI needs for one refresh.
#[derive(Debug, Clone)]
pub struct MonitorTick {
    /// Newest frame since the last poll.
    pub frame: Option<Frame>,
    /// Frames persisted so far.
    pub saved: u64,
    /// Session state at poll time.
    pub state: AcquisitionState,
    /// Fatal error text, empty while healthy.
    pub error: String,
    /// Line for the status area.
    pub status_line: String,
}

/// Polls a running session at the preview cadence.
#[derive(Debug)]
pub struct PreviewMonitor {
    preview: PreviewReceiver,
    status: Arc<SessionStatus>,
    stop: StopSignal,
    interval: Duration,
}

impl PreviewMonitor {
    /// Creates a monitor polling every `interval`.
    pub fn new(
        preview: PreviewReceiver,
        status: Arc<SessionStatus>,
        stop: StopSignal,
        interval: Duration,
    ) -> Self {
        Self {
            preview,
            status,
            stop,
            interval,
        }
    }

    /// Drains the preview buffer and returns the newest frame.
    pub fn latest_frame(&self) -> Option<Frame> {
        self.preview.drain_latest()
    }

    /// Frames persisted so far.
    pub fn saved_count(&self) -> u64 {
        self.status.saved_count()
    }

    /// Fatal error text, empty while healthy.
    pub fn error_text(&self) -> String {
        self.status.error_text()
    }

    /// Asks acquisition to stop. Does not wait.
    pub fn stop(&self) {
        self.stop.request();
    }

    /// Polling period derived from the configured preview rate.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Shared session status.
    pub fn status(&self) -> &Arc<SessionStatus> {
        &self.status
    }

    /// Frames waiting in the preview buffer.
    pub fn pending(&self) -> usize {
        self.preview.pending()
    }

    /// One refresh: drain, then read counters and error.
    pub fn poll(&self) -> MonitorTick {
        let frame = self.latest_frame();
        let saved = self.saved_count();
        let state = self.status.state();
        let error = self.error_text();
        let status_line = status_line(state, saved, &error, self.status.write_warning().as_deref());

        MonitorTick {
            frame,
            saved,
            state,
            error,
            status_line,
        }
    }
}

/// Formats the status-area text.
pub fn status_line(
    state: AcquisitionState,
    saved: u64,
    error: &str,
    write_warning: Option<&str>,
) -> String {
    if !error.is_empty() {
        return format!("[!] {}", error);
    }
    match (state, write_warning) {
        (AcquisitionState::Idle, _) => "Starting camera…".to_string(),
        (_, Some(warning)) => format!(
            "Streaming… {} frames saved (last write error: {})",
            saved, warning
        ),
        (_, None) => format!("Streaming… {} frames saved", saved),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::preview::{preview_buffer, PreviewSender};

    fn monitor() -> (PreviewMonitor, PreviewSender, Arc<SessionStatus>, StopSignal) {
        let (tx, rx) = preview_buffer(2);
        let status = Arc::new(SessionStatus::new());
        let stop = StopSignal::new();
        let monitor = PreviewMonitor::new(
            rx,
            Arc::clone(&status),
            stop.clone(),
            Duration::from_millis(33),
        );
        (monitor, tx, status, stop)
    }

    #[test]
    fn test_status_lines() {
        assert_eq!(status_line(AcquisitionState::Idle, 0, "", None), "Starting camera…");
        assert_eq!(
            status_line(AcquisitionState::Running, 12, "", None),
            "Streaming… 12 frames saved"
        );
        assert_eq!(
            status_line(AcquisitionState::Failed, 3, "camera failure: gone", None),
            "[!] camera failure: gone"
        );
        assert!(status_line(AcquisitionState::Running, 1, "", Some("disk full"))
            .ends_with("(last write error: disk full)"));
    }

    #[test]
    fn test_empty_poll_is_tolerated() {
        let (monitor, _tx, _status, _stop) = monitor();
        let tick = monitor.poll();
        assert!(tick.frame.is_none());
        assert_eq!(tick.saved, 0);
        assert_eq!(tick.error, "");
        assert_eq!(tick.state, AcquisitionState::Idle);
    }

    #[test]
    fn test_poll_drains_to_latest() {
        let (monitor, tx, status, _stop) = monitor();
        status.mark_running();
        tx.offer(Frame::new(vec![0u8; 4], 2, 2, 10));
        tx.offer(Frame::new(vec![0u8; 4], 2, 2, 11));

        let tick = monitor.poll();
        assert_eq!(tick.frame.map(|f| f.sequence()), Some(11));
        assert_eq!(monitor.pending(), 0);
        assert!(monitor.poll().frame.is_none());
    }

    #[test]
    fn test_failed_session_shows_error() {
        let (monitor, _tx, status, _stop) = monitor();
        status.mark_failed("camera device not found: no simulated device attached");

        let tick = monitor.poll();
        assert_eq!(tick.state, AcquisitionState::Failed);
        assert!(tick.status_line.starts_with("[!] camera device not found"));
        assert_eq!(tick.saved, 0);
    }

    #[test]
    fn test_stop_raises_signal() {
        let (monitor, _tx, _status, stop) = monitor();
        monitor.stop();
        assert!(stop.is_requested());
    }
}
