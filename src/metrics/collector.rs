//! Metrics collection and registry.

use crate::pipeline::{AcquisitionState, SessionStatus};
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use thiserror::Error;

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Registry or encoder failure.
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// A snapshot of session state for metrics update.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    /// Lifecycle state (0=idle, 1=running, 2=stopped, 3=failed).
    pub state: i64,
    /// Frames retrieved from the device.
    pub frames_retrieved: u64,
    /// Frames persisted.
    pub frames_saved: u64,
    /// Frames rejected by the preview buffer.
    pub preview_dropped: u64,
    /// Retrievals that timed out.
    pub retrieve_timeouts: u64,
    /// Failed persistence attempts.
    pub write_failures: u64,
    /// Frames waiting in the preview buffer.
    pub preview_pending: usize,
}

impl MetricsSnapshot {
    /// Reads the current counters of a session.
    pub fn from_status(status: &SessionStatus, preview_pending: usize) -> Self {
        let state = match status.state() {
            AcquisitionState::Idle => 0,
            AcquisitionState::Running => 1,
            AcquisitionState::Stopped => 2,
            AcquisitionState::Failed => 3,
        };

        Self {
            state,
            frames_retrieved: status.retrieved_count(),
            frames_saved: status.saved_count(),
            preview_dropped: status.preview_dropped(),
            retrieve_timeouts: status.retrieve_timeouts(),
            write_failures: status.write_failures(),
            preview_pending,
        }
    }
}

/// Prometheus metrics registry for acquisition monitoring.
pub struct MetricsRegistry {
    registry: Registry,

    acquisition_state: IntGauge,
    preview_pending: IntGauge,

    frames_retrieved: IntCounter,
    frames_saved: IntCounter,
    preview_dropped: IntCounter,
    retrieve_timeouts: IntCounter,
    write_failures: IntCounter,
}

impl MetricsRegistry {
    /// Creates a new registry with all pipeline metrics registered.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let acquisition_state = IntGauge::new(
            "particle_capture_acquisition_state",
            "Acquisition state (0=idle, 1=running, 2=stopped, 3=failed)",
        )?;
        let preview_pending = IntGauge::new(
            "particle_capture_preview_pending",
            "Frames waiting in the preview buffer",
        )?;

        let frames_retrieved = IntCounter::new(
            "particle_capture_frames_retrieved_total",
            "Frames retrieved from the camera",
        )?;
        let frames_saved = IntCounter::new(
            "particle_capture_frames_saved_total",
            "Frames written to the session image directory",
        )?;
        let preview_dropped = IntCounter::new(
            "particle_capture_preview_dropped_total",
            "Frames dropped because the preview buffer was full",
        )?;
        let retrieve_timeouts = IntCounter::new(
            "particle_capture_retrieve_timeouts_total",
            "Retrievals that returned no frame within the timeout",
        )?;
        let write_failures = IntCounter::new(
            "particle_capture_write_failures_total",
            "Frame writes that failed",
        )?;

        registry.register(Box::new(acquisition_state.clone()))?;
        registry.register(Box::new(preview_pending.clone()))?;
        registry.register(Box::new(frames_retrieved.clone()))?;
        registry.register(Box::new(frames_saved.clone()))?;
        registry.register(Box::new(preview_dropped.clone()))?;
        registry.register(Box::new(retrieve_timeouts.clone()))?;
        registry.register(Box::new(write_failures.clone()))?;

        Ok(Self {
            registry,
            acquisition_state,
            preview_pending,
            frames_retrieved,
            frames_saved,
            preview_dropped,
            retrieve_timeouts,
            write_failures,
        })
    }

    /// Updates all metrics from a snapshot.
    pub fn update(&self, snapshot: &MetricsSnapshot) {
        self.acquisition_state.set(snapshot.state);
        self.preview_pending.set(snapshot.preview_pending as i64);

        // Counters only move forward: add the difference.
        advance(&self.frames_retrieved, snapshot.frames_retrieved);
        advance(&self.frames_saved, snapshot.frames_saved);
        advance(&self.preview_dropped, snapshot.preview_dropped);
        advance(&self.retrieve_timeouts, snapshot.retrieve_timeouts);
        advance(&self.write_failures, snapshot.write_failures);
    }

    /// Returns the underlying Prometheus registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

fn advance(counter: &IntCounter, total: u64) {
    let current = counter.get();
    if total > current {
        counter.inc_by(total - current);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_creation() {
        assert!(MetricsRegistry::new().is_ok());
    }

    #[test]
    fn test_metrics_update() {
        let registry = MetricsRegistry::new().unwrap();

        let snapshot = MetricsSnapshot {
            state: 1,
            frames_retrieved: 100,
            frames_saved: 60,
            preview_dropped: 40,
            retrieve_timeouts: 2,
            write_failures: 0,
            preview_pending: 2,
        };
        registry.update(&snapshot);

        let output = registry.encode().unwrap();
        assert!(output.contains("particle_capture_acquisition_state 1"));
        assert!(output.contains("particle_capture_frames_saved_total 60"));
        assert!(output.contains("particle_capture_preview_dropped_total 40"));
    }

    #[test]
    fn test_counters_never_go_backwards() {
        let registry = MetricsRegistry::new().unwrap();

        registry.update(&MetricsSnapshot {
            frames_saved: 10,
            ..Default::default()
        });
        registry.update(&MetricsSnapshot {
            frames_saved: 4,
            ..Default::default()
        });

        let output = registry.encode().unwrap();
        assert!(output.contains("particle_capture_frames_saved_total 10"));
    }

    #[test]
    fn test_snapshot_from_status() {
        let status = SessionStatus::new();
        status.mark_failed("camera device not found: none");

        let snapshot = MetricsSnapshot::from_status(&status, 0);
        assert_eq!(snapshot.state, 3);
        assert_eq!(snapshot.frames_saved, 0);
    }
}
