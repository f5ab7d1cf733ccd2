//! Acquisition configuration.
//!
//! Device parameters are fixed for the whole session: gain control is
//! disabled, the gain value is pinned and frames are always Mono8.
//! Everything is carried in explicit values handed to the pipeline at
//! construction.

use super::frame::PixelFormat;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for the imaging device.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Camera device index.
    pub device_index: u32,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Fixed gain value (camera-specific units). Auto gain is always off.
    pub gain: f64,
    /// Pixel encoding delivered by the device.
    pub pixel_format: PixelFormat,
    /// Upper bound on a single blocking retrieval, in milliseconds.
    ///
    /// This is also the worst-case latency for noticing a stop request.
    pub retrieve_timeout_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device_index: 0,
            width: 640,
            height: 480,
            gain: 25.0,
            pixel_format: PixelFormat::Mono8,
            retrieve_timeout_ms: 5000,
        }
    }
}

impl CaptureConfig {
    /// Creates a new configuration with the specified dimensions.
    pub fn with_dimensions(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }

    /// Retrieval timeout as a `Duration`.
    pub fn retrieve_timeout(&self) -> Duration {
        Duration::from_millis(self.retrieve_timeout_ms)
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::InvalidDimensions);
        }
        if !self.gain.is_finite() || self.gain < 0.0 {
            return Err(ConfigError::InvalidGain);
        }
        if self.retrieve_timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout);
        }
        Ok(())
    }
}

/// How the persistence sampler moves its deadline after a save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CadenceMode {
    /// Deadline advances by one interval per save, never trailing `now`.
    /// Achieved rate tracks `min(target, retrieval)`.
    #[default]
    Anchored,
    /// Deadline restarts from the save instant. Under-samples when the
    /// retrieval period does not divide the target interval.
    Reset,
}

/// Rates and buffering for the distribution stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Consumer polling cadence in Hz. Does not affect acquisition.
    pub preview_fps: u32,
    /// Target persisted frames per second.
    pub save_rate: f64,
    /// Capacity of the preview buffer.
    pub preview_capacity: usize,
    /// Save sampler behaviour.
    pub cadence: CadenceMode,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            preview_fps: 30,
            save_rate: 60.0,
            preview_capacity: 2,
            cadence: CadenceMode::Anchored,
        }
    }
}

impl PipelineConfig {
    /// Minimum spacing between two persisted frames.
    pub fn save_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.save_rate)
    }

    /// Polling period of the presentation consumer.
    pub fn preview_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.preview_fps.max(1)))
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.preview_fps == 0 || self.preview_fps > 240 {
            return Err(ConfigError::InvalidPreviewRate);
        }
        if !self.save_rate.is_finite() || self.save_rate <= 0.0 || self.save_rate > 10_000.0 {
            return Err(ConfigError::InvalidSaveRate);
        }
        if self.preview_capacity == 0 {
            return Err(ConfigError::InvalidCapacity);
        }
        Ok(())
    }
}

/// On-disk encoding for persisted frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameFileFormat {
    /// Lossy JPEG.
    #[default]
    Jpeg,
    /// Lossless PNG.
    Png,
}

impl FrameFileFormat {
    /// File extension without the leading dot.
    pub fn extension(self) -> &'static str {
        match self {
            FrameFileFormat::Jpeg => "jpg",
            FrameFileFormat::Png => "png",
        }
    }
}

/// Where and how frames are persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Parent directory for timestamped run sessions.
    pub base_dir: PathBuf,
    /// Encoding of saved frames.
    pub image_format: FrameFileFormat,
    /// JPEG quality (1-100).
    pub jpeg_quality: u8,
    /// End the session on the first failed write instead of reporting it.
    pub halt_on_write_error: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("captures"),
            image_format: FrameFileFormat::Jpeg,
            jpeg_quality: 90,
            halt_on_write_error: false,
        }
    }
}

impl StorageConfig {
    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return Err(ConfigError::InvalidJpegQuality);
        }
        Ok(())
    }
}

/// Parameters of the simulated camera.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Frames produced per second.
    pub fps: f64,
    /// Stop producing frames after this many (the device then idles).
    pub frame_limit: Option<u64>,
    /// Seed for the synthetic sensor noise.
    pub seed: u64,
    /// Report a device failure after this many frames.
    pub fail_after: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            fps: 100.0,
            frame_limit: None,
            seed: 0x5eed,
            fail_after: None,
        }
    }
}

impl SimulationConfig {
    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.fps.is_finite() || self.fps <= 0.0 || self.fps > 10_000.0 {
            return Err(ConfigError::InvalidSimulationRate);
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Width or height is zero.
    #[error("invalid frame dimensions")]
    InvalidDimensions,
    /// Gain is negative or not finite.
    #[error("invalid gain (must be finite and non-negative)")]
    InvalidGain,
    /// Retrieval timeout is zero.
    #[error("invalid retrieve timeout (must be at least 1 ms)")]
    InvalidTimeout,
    /// Preview rate outside 1-240.
    #[error("invalid preview rate (must be 1-240 fps)")]
    InvalidPreviewRate,
    /// Save rate not positive or too high.
    #[error("invalid save rate (must be positive and at most 10000 fps)")]
    InvalidSaveRate,
    /// Preview buffer capacity is zero.
    #[error("invalid preview capacity (must be at least 1)")]
    InvalidCapacity,
    /// JPEG quality outside 1-100.
    #[error("invalid JPEG quality (must be 1-100)")]
    InvalidJpegQuality,
    /// Simulated frame rate not usable.
    #[error("invalid simulated frame rate")]
    InvalidSimulationRate,
    /// Config file could not be read.
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    /// Config file is not valid TOML for this schema.
    #[error("failed to parse config file: {0}")]
    ParseError(String),
}

/// Full configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    /// Device settings.
    #[serde(default)]
    pub capture: CaptureConfig,
    /// Preview and save rates.
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// Output location and encoding.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Simulated camera settings.
    #[serde(default)]
    pub simulation: SimulationConfig,
}

impl FileConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parses and validates configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: FileConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.capture.validate()?;
        self.pipeline.validate()?;
        self.storage.validate()?;
        self.simulation.validate()
    }
}
