//! Camera input and frame handling.
//!
//! This module provides the frame source abstraction the acquisition
//! loop drives, the frame type it produces, and the configuration
//! values that describe a session.

mod camera;
mod config;
mod frame;
#[cfg(feature = "camera")]
mod native;

pub use camera::{CameraError, DeviceInfo, DeviceProbe, FrameSource, SimulatedCamera};
pub use config::{
    CadenceMode, CaptureConfig, ConfigError, FileConfig, FrameFileFormat, PipelineConfig,
    SimulationConfig, StorageConfig,
};
pub use frame::{Frame, PixelFormat};
#[cfg(feature = "camera")]
pub use native::NativeCamera;
