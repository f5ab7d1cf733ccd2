//! Particle Capture Library
//!
//! Real-time frame acquisition from a single imaging device, with a
//! lossy live preview and rate-governed persistence of frames to disk.
//!
//! # Architecture
//!
//! ```text
//! capture (FrameSource) → pipeline (acquisition → distribution) → { preview, storage }
//!                                        ↓
//!                              status / metrics
//! ```
//!
//! # Design Principles
//!
//! - **Never block the producer**: a full preview buffer drops the frame
//! - **Best-effort save rate**: frames are sampled greedily at the target
//!   rate; the achieved rate is bounded by the retrieval rate
//! - **Always release the device**: every exit from acquisition closes it
//! - **Errors are reported, not thrown**: failures land in shared status
//!
//! # Example
//!
//! ```no_run
//! use particle_capture::{
//!     capture::{FileConfig, SimulatedCamera},
//!     pipeline::{self, RunSession},
//! };
//!
//! let config = FileConfig::default();
//! let session = RunSession::create(&config.storage.base_dir).unwrap();
//! let camera = SimulatedCamera::new(config.simulation.clone());
//!
//! let (mut handle, monitor) = pipeline::start(camera, &config, &session).unwrap();
//!
//! for _ in 0..30 {
//!     let tick = monitor.poll();
//!     println!("{}", tick.status_line);
//!     std::thread::sleep(monitor.interval());
//! }
//!
//! handle.stop();
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod capture;
pub mod metrics;
pub mod pipeline;

// Re-export commonly used types at crate root
pub use capture::{
    CameraError, CaptureConfig, FileConfig, Frame, FrameSource, PixelFormat, SimulatedCamera,
};
pub use metrics::{MetricsRegistry, MetricsSnapshot};
pub use pipeline::{
    AcquisitionHandle, AcquisitionState, PipelineError, PreviewMonitor, RunSession,
    SessionStatus, StopSignal,
};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
