//! Prometheus metrics for acquisition monitoring.
//!
//! Metrics are gathered into a local registry and rendered in the
//! Prometheus text format; the CLI prints them when a session ends.
//!
//! # Metrics Exposed
//!
//! ## Session
//! - `particle_capture_acquisition_state` - 0=idle, 1=running, 2=stopped, 3=failed
//! - `particle_capture_preview_pending` - Frames waiting in the preview buffer
//!
//! ## Throughput
//! - `particle_capture_frames_retrieved_total` - Frames retrieved from the camera
//! - `particle_capture_frames_saved_total` - Frames written to disk
//! - `particle_capture_preview_dropped_total` - Frames rejected by a full preview buffer
//!
//! ## Faults
//! - `particle_capture_retrieve_timeouts_total` - Retrievals with no frame in time
//! - `particle_capture_write_failures_total` - Failed frame writes
//!
//! # Example
//!
//! ```no_run
//! use particle_capture::metrics::{MetricsRegistry, MetricsSnapshot};
//! use particle_capture::pipeline::SessionStatus;
//!
//! let registry = MetricsRegistry::new().expect("Failed to create registry");
//! let status = SessionStatus::new();
//!
//! registry.update(&MetricsSnapshot::from_status(&status, 0));
//! println!("{}", registry.encode().unwrap());
//! ```

mod collector;

pub use collector::{MetricsError, MetricsRegistry, MetricsSnapshot};
