//! The acquisition loop and the handle that owns its thread.
//!
//! The loop opens the device, retrieves frames until it is asked to stop
//! or the device fails, and hands every frame to the [`Distributor`].
//! The device is closed on every way out of the loop, including a panic
//! in the distribution stage.

use super::distributor::Distributor;
use super::status::{AcquisitionState, SessionStatus, StopSignal};
use super::PipelineError;
use crate::capture::{CaptureConfig, FrameSource};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

/// Name given to the acquisition thread.
pub const THREAD_NAME: &str = "frame-grabber";

enum Exit {
    Stopped,
    Failed(String),
}

/// Closes the wrapped source when dropped.
struct DeviceGuard<'a, S: FrameSource> {
    source: &'a mut S,
}

impl<S: FrameSource> Deref for DeviceGuard<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.source
    }
}

impl<S: FrameSource> DerefMut for DeviceGuard<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        self.source
    }
}

impl<S: FrameSource> Drop for DeviceGuard<'_, S> {
    fn drop(&mut self) {
        if let Err(e) = self.source.close() {
            tracing::warn!(error = %e, "Error while closing camera, ignored");
        }
        tracing::info!("Stopped grabbing");
    }
}

/// Runs one acquisition session to completion on the calling thread.
///
/// Never returns an error: every failure ends up in `status`. The
/// returned state is the terminal one.
pub fn run_acquisition<S: FrameSource>(
    source: &mut S,
    capture: &CaptureConfig,
    distributor: &mut Distributor,
    status: &SessionStatus,
    stop: &StopSignal,
) -> AcquisitionState {
    let exit = {
        let mut device = DeviceGuard { source };
        acquire(&mut device, capture, distributor, status, stop)
    };

    match exit {
        Exit::Stopped => {
            status.mark_stopped();
            tracing::info!(
                saved = status.saved_count(),
                retrieved = status.retrieved_count(),
                "Acquisition stopped"
            );
        }
        Exit::Failed(message) => {
            tracing::error!(error = %message, saved = status.saved_count(), "Acquisition failed");
            status.mark_failed(message);
        }
    }
    status.state()
}

fn acquire<S: FrameSource>(
    device: &mut DeviceGuard<'_, S>,
    capture: &CaptureConfig,
    distributor: &mut Distributor,
    status: &SessionStatus,
    stop: &StopSignal,
) -> Exit {
    if stop.is_requested() {
        return Exit::Stopped;
    }

    match device.open(capture) {
        Ok(info) => {
            tracing::info!(model = %info.model, index = info.index, "Camera connected");
        }
        Err(e) => return Exit::Failed(e.to_string()),
    }
    status.mark_running();

    let timeout = capture.retrieve_timeout();
    loop {
        if stop.is_requested() {
            return Exit::Stopped;
        }
        if !device.is_open() {
            return Exit::Failed("device stopped grabbing".to_string());
        }

        match device.retrieve(timeout) {
            Ok(frame) => {
                status.record_retrieved();
                if let Err(e) = distributor.distribute(frame, Instant::now()) {
                    return Exit::Failed(e.to_string());
                }
            }
            Err(e) if e.is_transient() => {
                status.record_timeout();
                tracing::trace!(error = %e, "No frame within timeout");
            }
            Err(e) => return Exit::Failed(e.to_string()),
        }
    }
}

/// Owns the acquisition thread of a running session.
///
/// Dropping the handle stops the session and waits for the device to
/// be released.
pub struct AcquisitionHandle {
    status: Arc<SessionStatus>,
    stop: StopSignal,
    thread: Option<JoinHandle<()>>,
}

impl AcquisitionHandle {
    /// Starts the acquisition loop on a dedicated thread.
    pub fn spawn<S>(
        mut source: S,
        capture: CaptureConfig,
        mut distributor: Distributor,
        status: Arc<SessionStatus>,
        stop: StopSignal,
    ) -> Result<Self, PipelineError>
    where
        S: FrameSource + Send + 'static,
    {
        let thread_status = Arc::clone(&status);
        let thread_stop = stop.clone();

        let thread = std::thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || {
                run_acquisition(
                    &mut source,
                    &capture,
                    &mut distributor,
                    &thread_status,
                    &thread_stop,
                );
            })
            .map_err(PipelineError::Spawn)?;

        Ok(Self {
            status,
            stop,
            thread: Some(thread),
        })
    }

    /// Shared status of the session.
    pub fn status(&self) -> &Arc<SessionStatus> {
        &self.status
    }

    /// A clone of the session's cancellation flag.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// True once the acquisition thread has exited.
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Requests a stop and waits for teardown. Safe to call repeatedly.
    ///
    /// Waiting is bounded by the retrieval timeout plus one frame's
    /// distribution time.
    pub fn stop(&mut self) -> AcquisitionState {
        self.stop.request();
        self.wait()
    }

    /// Waits for the session to end on its own.
    pub fn wait(&mut self) -> AcquisitionState {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("Acquisition thread panicked");
                self.status.mark_failed("acquisition thread panicked");
            }
        }
        self.status.state()
    }
}

impl Drop for AcquisitionHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
