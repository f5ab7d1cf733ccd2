//! Camera abstraction for frame acquisition.
//!
//! This module provides a trait-based abstraction over camera hardware,
//! allowing the acquisition loop to drive either a real device or a
//! simulated one without change.

use super::{CaptureConfig, Frame, SimulationConfig};
use rand_chacha::ChaCha8Rng;
use rand_core::{RngCore, SeedableRng};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors that can occur during camera operations.
#[derive(Debug, Error)]
pub enum CameraError {
    /// No device was enumerated.
    #[error("camera device not found: {0}")]
    DeviceNotFound(String),
    /// The device exists but could not be opened.
    #[error("failed to open camera: {0}")]
    OpenFailed(String),
    /// The fixed configuration could not be applied.
    #[error("failed to configure camera: {0}")]
    ConfigFailed(String),
    /// No frame arrived within the timeout.
    #[error("timed out after {0:?} waiting for a frame")]
    RetrieveTimeout(Duration),
    /// The device stopped working while acquiring.
    #[error("camera failure: {0}")]
    DeviceFailure(String),
    /// Retrieval attempted before `open`.
    #[error("camera not initialized")]
    NotInitialized,
    /// Releasing the device reported an error.
    #[error("failed to close camera: {0}")]
    CloseFailed(String),
}

impl CameraError {
    /// True for conditions the acquisition loop retries silently.
    pub fn is_transient(&self) -> bool {
        matches!(self, CameraError::RetrieveTimeout(_))
    }
}

/// Identity of an opened device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Human-readable model name.
    pub model: String,
    /// Index the device was opened at.
    pub index: u32,
}

/// Trait for frame source implementations.
///
/// Implementations must tolerate `close` at any point: before `open`,
/// after a failed `open`, and repeatedly.
pub trait FrameSource {
    /// Opens the single device, applies the fixed configuration and
    /// starts latest-image-only acquisition.
    fn open(&mut self, config: &CaptureConfig) -> Result<DeviceInfo, CameraError>;

    /// Blocks for the next frame, at most `timeout`.
    fn retrieve(&mut self, timeout: Duration) -> Result<Frame, CameraError>;

    /// Checks if the device is currently acquiring.
    fn is_open(&self) -> bool;

    /// Stops acquisition and releases the device.
    fn close(&mut self) -> Result<(), CameraError>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn open(&mut self, config: &CaptureConfig) -> Result<DeviceInfo, CameraError> {
        (**self).open(config)
    }

    fn retrieve(&mut self, timeout: Duration) -> Result<Frame, CameraError> {
        (**self).retrieve(timeout)
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn close(&mut self) -> Result<(), CameraError> {
        (**self).close()
    }
}

/// Observes the device handle of a [`SimulatedCamera`] from another thread.
#[derive(Debug, Clone, Default)]
pub struct DeviceProbe {
    open: Arc<AtomicBool>,
    opens: Arc<AtomicU32>,
    releases: Arc<AtomicU32>,
}

impl DeviceProbe {
    /// True while the device handle is held.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Number of successful opens.
    pub fn open_count(&self) -> u32 {
        self.opens.load(Ordering::Acquire)
    }

    /// Number of times an open handle was released.
    pub fn release_count(&self) -> u32 {
        self.releases.load(Ordering::Acquire)
    }

    fn opened(&self) {
        self.opens.fetch_add(1, Ordering::AcqRel);
        self.open.store(true, Ordering::Release);
    }

    fn released(&self) {
        self.releases.fetch_add(1, Ordering::AcqRel);
        self.open.store(false, Ordering::Release);
    }
}

struct ActiveSimulation {
    width: u32,
    height: u32,
    started: Instant,
    next_index: u64,
    rng: ChaCha8Rng,
}

/// Simulated camera producing synthetic Mono8 noise frames at a fixed rate.
///
/// Exposures happen on a fixed schedule from the moment of `open`. A
/// retrieval that arrives late gets the newest exposure and the older
/// ones are discarded, like a device in latest-image-only mode.
pub struct SimulatedCamera {
    settings: SimulationConfig,
    present: bool,
    close_error: Option<String>,
    probe: DeviceProbe,
    active: Option<ActiveSimulation>,
}

impl SimulatedCamera {
    /// Creates a camera producing frames as `settings` describe.
    pub fn new(settings: SimulationConfig) -> Self {
        Self {
            settings,
            present: true,
            close_error: None,
            probe: DeviceProbe::default(),
            active: None,
        }
    }

    /// A camera whose enumeration finds no device.
    pub fn absent() -> Self {
        Self {
            present: false,
            ..Self::new(SimulationConfig::default())
        }
    }

    /// Makes `close` report an error after releasing the handle.
    pub fn with_close_error(mut self, message: impl Into<String>) -> Self {
        self.close_error = Some(message.into());
        self
    }

    /// Returns a probe sharing this camera's handle state.
    pub fn probe(&self) -> DeviceProbe {
        self.probe.clone()
    }

    fn exposure_time(&self, started: Instant, index: u64) -> Instant {
        started + Duration::from_secs_f64(index as f64 / self.settings.fps)
    }
}

impl Default for SimulatedCamera {
    fn default() -> Self {
        Self::new(SimulationConfig::default())
    }
}

impl FrameSource for SimulatedCamera {
    fn open(&mut self, config: &CaptureConfig) -> Result<DeviceInfo, CameraError> {
        if !self.present {
            return Err(CameraError::DeviceNotFound(
                "no simulated device attached".to_string(),
            ));
        }
        if self.active.is_some() {
            return Err(CameraError::OpenFailed("device already open".to_string()));
        }
        config
            .validate()
            .map_err(|e| CameraError::ConfigFailed(e.to_string()))?;
        self.settings
            .validate()
            .map_err(|e| CameraError::ConfigFailed(e.to_string()))?;

        self.active = Some(ActiveSimulation {
            width: config.width,
            height: config.height,
            started: Instant::now(),
            next_index: 0,
            rng: ChaCha8Rng::seed_from_u64(self.settings.seed),
        });
        self.probe.opened();

        tracing::info!(
            fps = self.settings.fps,
            width = config.width,
            height = config.height,
            gain = config.gain,
            "SimulatedCamera opened"
        );
        Ok(DeviceInfo {
            model: "Simulated Mono8 Camera".to_string(),
            index: config.device_index,
        })
    }

    fn retrieve(&mut self, timeout: Duration) -> Result<Frame, CameraError> {
        let (started, next_index) = match self.active.as_ref() {
            Some(active) => (active.started, active.next_index),
            None => return Err(CameraError::NotInitialized),
        };

        if let Some(limit) = self.settings.fail_after {
            if next_index >= limit {
                return Err(CameraError::DeviceFailure(format!(
                    "simulated device failure after {} exposures",
                    limit
                )));
            }
        }
        if let Some(limit) = self.settings.frame_limit {
            if next_index >= limit {
                std::thread::sleep(timeout);
                return Err(CameraError::RetrieveTimeout(timeout));
            }
        }

        let due = self.exposure_time(started, next_index);
        let now = Instant::now();
        if due > now {
            let wait = due - now;
            if wait > timeout {
                std::thread::sleep(timeout);
                return Err(CameraError::RetrieveTimeout(timeout));
            }
            std::thread::sleep(wait);
        }

        // Latest-image-only: jump to the newest completed exposure.
        let elapsed = Instant::now().saturating_duration_since(started);
        let newest = (elapsed.as_secs_f64() * self.settings.fps).floor() as u64;
        let mut index = newest.max(next_index);
        if let Some(limit) = self.settings.frame_limit {
            index = index.min(limit.saturating_sub(1));
        }
        if let Some(limit) = self.settings.fail_after {
            index = index.min(limit.saturating_sub(1));
        }
        if index > next_index {
            tracing::trace!(skipped = index - next_index, "Discarded stale exposures");
        }
        let timestamp = self.exposure_time(started, index);

        let active = self.active.as_mut().ok_or(CameraError::NotInitialized)?;
        let mut pixels = vec![0u8; (active.width as usize) * (active.height as usize)];
        active.rng.fill_bytes(&mut pixels);
        for px in pixels.iter_mut() {
            // Dim sensor floor with some read noise.
            *px = 16 + (*px >> 3);
        }
        active.next_index = index + 1;

        Ok(Frame::with_timestamp(
            pixels,
            active.width,
            active.height,
            index,
            timestamp,
        ))
    }

    fn is_open(&self) -> bool {
        self.active.is_some()
    }

    fn close(&mut self) -> Result<(), CameraError> {
        if self.active.take().is_none() {
            return Ok(());
        }
        self.probe.released();
        tracing::info!("SimulatedCamera closed");

        match &self.close_error {
            Some(message) => Err(CameraError::CloseFailed(message.clone())),
            None => Ok(()),
        }
    }
}
