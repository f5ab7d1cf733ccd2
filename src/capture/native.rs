//! UVC camera backend built on `nokhwa`.
//!
//! All `nokhwa` objects are created, driven and dropped on one reader
//! thread. The thread keeps only the newest decoded frame in a
//! single-slot channel, which gives latest-image-only behaviour for
//! backends that do not offer it natively.

use super::{CameraError, CaptureConfig, DeviceInfo, Frame, FrameSource};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use nokhwa::pixel_format::LumaFormat;
use nokhwa::utils::{
    ApiBackend, CameraFormat, CameraIndex, ControlValueSetter, FrameFormat, KnownCameraControl,
    RequestedFormat, RequestedFormatType, Resolution,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

type Delivery = Result<Frame, CameraError>;
type Ready = Result<String, CameraError>;

/// Frame rate asked for alongside the configured resolution.
const REQUESTED_FPS: u32 = 120;

struct ReaderThread {
    frames: Receiver<Delivery>,
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// The first enumerable system camera, grabbed as Mono8.
///
/// The stream format closest to the configured resolution is used. The
/// fixed gain value is applied, but nokhwa's generic controls have no
/// auto-gain switch, so drivers that default to automatic gain may keep it.
#[derive(Default)]
pub struct NativeCamera {
    reader: Option<ReaderThread>,
}

impl NativeCamera {
    /// Creates an unopened camera.
    pub fn new() -> Self {
        Self::default()
    }
}

impl FrameSource for NativeCamera {
    fn open(&mut self, config: &CaptureConfig) -> Result<DeviceInfo, CameraError> {
        if self.reader.is_some() {
            return Err(CameraError::OpenFailed("device already open".to_string()));
        }
        config
            .validate()
            .map_err(|e| CameraError::ConfigFailed(e.to_string()))?;

        let devices =
            nokhwa::query(ApiBackend::Auto).map_err(|e| CameraError::OpenFailed(e.to_string()))?;
        if devices.is_empty() {
            return Err(CameraError::DeviceNotFound("no camera enumerated".to_string()));
        }

        let (frame_tx, frame_rx) = bounded::<Delivery>(1);
        let (ready_tx, ready_rx) = bounded::<Ready>(1);
        let stop = Arc::new(AtomicBool::new(false));

        let thread_config = config.clone();
        let thread_stop = Arc::clone(&stop);
        let thread_rx = frame_rx.clone();
        let handle = std::thread::Builder::new()
            .name("uvc-reader".to_string())
            .spawn(move || {
                reader_main(thread_config, frame_tx, thread_rx, ready_tx, thread_stop)
            })
            .map_err(|e| CameraError::OpenFailed(e.to_string()))?;

        let (model, handle) =
            await_reader(&ready_rx, handle, &stop, config.retrieve_timeout())?;
        self.reader = Some(ReaderThread {
            frames: frame_rx,
            stop,
            handle,
        });
        tracing::info!(model = %model, "Camera connected");
        Ok(DeviceInfo {
            model,
            index: config.device_index,
        })
    }

    fn retrieve(&mut self, timeout: Duration) -> Result<Frame, CameraError> {
        let reader = self.reader.as_ref().ok_or(CameraError::NotInitialized)?;
        match reader.frames.recv_timeout(timeout) {
            Ok(delivery) => delivery,
            Err(RecvTimeoutError::Timeout) => Err(CameraError::RetrieveTimeout(timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(CameraError::DeviceFailure(
                "camera reader thread exited".to_string(),
            )),
        }
    }

    fn is_open(&self) -> bool {
        // A reader that exited after a failure still counts as open until
        // the failure has been retrieved.
        self.reader.is_some()
    }

    fn close(&mut self) -> Result<(), CameraError> {
        let Some(reader) = self.reader.take() else {
            return Ok(());
        };
        reader.stop.store(true, Ordering::Release);
        reader
            .handle
            .join()
            .map_err(|_| CameraError::CloseFailed("camera reader thread panicked".to_string()))
    }
}

impl Drop for NativeCamera {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "Error while releasing camera");
        }
    }
}

/// Waits at most `timeout` for the reader thread to report the outcome of `open`.
///
/// On failure the thread is told to stop. It is joined unless it never
/// answered, since a driver stuck in open would block the join as well.
fn await_reader(
    ready: &Receiver<Ready>,
    handle: JoinHandle<()>,
    stop: &AtomicBool,
    timeout: Duration,
) -> Result<(String, JoinHandle<()>), CameraError> {
    let outcome = match ready.recv_timeout(timeout) {
        Ok(Ok(model)) => return Ok((model, handle)),
        Ok(Err(e)) => Err(e),
        Err(RecvTimeoutError::Timeout) => {
            stop.store(true, Ordering::Release);
            tracing::warn!(?timeout, "Camera did not open in time, abandoning reader thread");
            return Err(CameraError::OpenFailed(format!(
                "camera did not open within {:?}",
                timeout
            )));
        }
        Err(RecvTimeoutError::Disconnected) => Err(CameraError::OpenFailed(
            "reader thread exited during open".to_string(),
        )),
    };

    stop.store(true, Ordering::Release);
    if handle.join().is_err() {
        tracing::error!("Camera reader thread panicked during open");
        return Err(CameraError::OpenFailed(
            "camera reader thread panicked".to_string(),
        ));
    }
    outcome
}

/// Stream format asked of the driver; it picks the closest one it offers.
fn requested_format(config: &CaptureConfig) -> CameraFormat {
    CameraFormat::new(
        Resolution::new(config.width, config.height),
        FrameFormat::GRAY,
        REQUESTED_FPS,
    )
}

fn reader_main(
    config: CaptureConfig,
    frames: Sender<Delivery>,
    drain: Receiver<Delivery>,
    ready: Sender<Ready>,
    stop: Arc<AtomicBool>,
) {
    let requested = RequestedFormat::new::<LumaFormat>(RequestedFormatType::Closest(
        requested_format(&config),
    ));
    let mut camera = match nokhwa::Camera::new(CameraIndex::Index(config.device_index), requested) {
        Ok(camera) => camera,
        Err(e) => {
            let _ = ready.send(Err(CameraError::OpenFailed(e.to_string())));
            return;
        }
    };

    let gain = ControlValueSetter::Integer(config.gain.round() as i64);
    if let Err(e) = camera.set_camera_control(KnownCameraControl::Gain, gain) {
        let _ = ready.send(Err(CameraError::ConfigFailed(e.to_string())));
        return;
    }
    if let Err(e) = camera.open_stream() {
        let _ = ready.send(Err(CameraError::OpenFailed(e.to_string())));
        return;
    }
    let resolution = camera.resolution();
    if resolution.width() != config.width || resolution.height() != config.height {
        tracing::warn!(
            requested_width = config.width,
            requested_height = config.height,
            width = resolution.width(),
            height = resolution.height(),
            "Camera does not offer the configured resolution, using the closest"
        );
    }
    tracing::warn!("Automatic gain cannot be disabled through the generic camera controls");
    let _ = ready.send(Ok(camera.info().human_name()));

    let mut sequence = 0u64;
    while !stop.load(Ordering::Acquire) {
        let delivery = camera
            .frame()
            .and_then(|buffer| buffer.decode_image::<LumaFormat>())
            .map(|image| {
                let (width, height) = (image.width(), image.height());
                let frame = Frame::new(image.into_raw(), width, height, sequence);
                sequence += 1;
                frame
            })
            .map_err(|e| CameraError::DeviceFailure(e.to_string()));
        let failed = delivery.is_err();

        publish_latest(&frames, &drain, delivery);
        if failed {
            break;
        }
    }

    if let Err(e) = camera.stop_stream() {
        tracing::warn!(error = %e, "Failed to stop camera stream");
    }
    tracing::debug!("Camera reader thread exiting");
}

/// Replaces whatever is pending with `delivery`.
fn publish_latest(frames: &Sender<Delivery>, drain: &Receiver<Delivery>, delivery: Delivery) {
    let mut pending = delivery;
    loop {
        match frames.try_send(pending) {
            Ok(()) | Err(TrySendError::Disconnected(_)) => return,
            Err(TrySendError::Full(rejected)) => {
                let _ = drain.try_recv();
                pending = rejected;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn spawn_reader(body: impl FnOnce() + Send + 'static) -> JoinHandle<()> {
        std::thread::spawn(body)
    }

    #[test]
    fn test_requested_format_follows_config() {
        let format = requested_format(&CaptureConfig::with_dimensions(1280, 1024));
        assert_eq!(format.resolution(), Resolution::new(1280, 1024));
        assert_eq!(format.format(), FrameFormat::GRAY);
        assert_eq!(format.frame_rate(), REQUESTED_FPS);
    }

    #[test]
    fn test_open_reports_model() {
        let (tx, rx) = bounded::<Ready>(1);
        let handle = spawn_reader(move || {
            let _ = tx.send(Ok("Mono Cam".to_string()));
        });
        let stop = AtomicBool::new(false);

        let (model, handle) =
            await_reader(&rx, handle, &stop, Duration::from_secs(1)).unwrap();
        assert_eq!(model, "Mono Cam");
        assert!(!stop.load(Ordering::Acquire));
        handle.join().unwrap();
    }

    #[test]
    fn test_hung_open_times_out() {
        let (_tx, rx) = bounded::<Ready>(1);
        let (release_tx, release_rx) = bounded::<()>(0);
        let handle = spawn_reader(move || {
            let _ = release_rx.recv();
        });
        let stop = AtomicBool::new(false);
        let started = Instant::now();

        let err = await_reader(&rx, handle, &stop, Duration::from_millis(30)).unwrap_err();
        assert!(matches!(err, CameraError::OpenFailed(_)));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(stop.load(Ordering::Acquire));
        drop(release_tx);
    }

    #[test]
    fn test_reader_panic_during_open_is_reported() {
        let (tx, rx) = bounded::<Ready>(1);
        let handle = spawn_reader(move || {
            let _keep = tx;
            panic!("driver crashed");
        });
        let stop = AtomicBool::new(false);

        let err = await_reader(&rx, handle, &stop, Duration::from_secs(1)).unwrap_err();
        assert!(err.to_string().contains("panicked"));
    }

    #[test]
    fn test_open_error_passed_through() {
        let (tx, rx) = bounded::<Ready>(1);
        let handle = spawn_reader(move || {
            let _ = tx.send(Err(CameraError::ConfigFailed("gain rejected".to_string())));
        });
        let stop = AtomicBool::new(false);

        let err = await_reader(&rx, handle, &stop, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, CameraError::ConfigFailed(_)));
    }
}
