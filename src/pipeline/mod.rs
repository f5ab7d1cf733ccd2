//! Acquisition, distribution and persistence of frames.
//!
//! ```text
//! FrameSource → acquisition loop → distributor ─┬─ preview buffer → PreviewMonitor
//!                      ▲                        └─ save cadence → FrameSink (images/)
//!                      └──────── StopSignal ◄──────────────────────── owner
//! ```
//!
//! The acquisition loop runs on its own thread. The only state it
//! shares is the preview buffer and the [`SessionStatus`].

mod acquisition;
mod cadence;
mod distributor;
mod monitor;
mod preview;
mod status;
mod storage;

pub use acquisition::{run_acquisition, AcquisitionHandle, THREAD_NAME};
pub use cadence::SaveCadence;
pub use distributor::{Distribution, Distributor};
pub use monitor::{status_line, MonitorTick, PreviewMonitor};
pub use preview::{preview_buffer, PreviewReceiver, PreviewSender};
pub use status::{AcquisitionState, SessionStatus, StopSignal};
pub use storage::{
    frame_file_name, FrameSink, ImageDirectory, RunSession, StorageError, IMAGES_DIR,
    SESSION_TIMESTAMP_FORMAT,
};

use crate::capture::{ConfigError, FileConfig, FrameSource};
use std::sync::Arc;
use thiserror::Error;

/// Errors that prevent a session from starting.
///
/// Once running, failures are reported through [`SessionStatus`].
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    /// Run session directory could not be prepared.
    #[error("failed to prepare run session: {0}")]
    Session(#[from] StorageError),
    /// The OS refused to start the acquisition thread.
    #[error("failed to spawn acquisition thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Starts acquisition from `source`, saving frames into `session`.
pub fn start<S>(
    source: S,
    config: &FileConfig,
    session: &RunSession,
) -> Result<(AcquisitionHandle, PreviewMonitor), PipelineError>
where
    S: FrameSource + Send + 'static,
{
    let sink = ImageDirectory::new(session, &config.storage);
    start_with_sink(source, config, Box::new(sink))
}

/// Starts acquisition from `source`, persisting through `sink`.
pub fn start_with_sink<S>(
    source: S,
    config: &FileConfig,
    sink: Box<dyn FrameSink>,
) -> Result<(AcquisitionHandle, PreviewMonitor), PipelineError>
where
    S: FrameSource + Send + 'static,
{
    config.validate()?;

    let status = Arc::new(SessionStatus::new());
    let stop = StopSignal::new();
    let (preview_tx, preview_rx) = preview_buffer(config.pipeline.preview_capacity);

    let cadence = SaveCadence::new(config.pipeline.save_rate, config.pipeline.cadence);
    let distributor = Distributor::new(preview_tx, cadence, sink, Arc::clone(&status))
        .halt_on_write_error(config.storage.halt_on_write_error);

    tracing::info!(
        save_rate = config.pipeline.save_rate,
        preview_fps = config.pipeline.preview_fps,
        preview_capacity = config.pipeline.preview_capacity,
        timeout_ms = config.capture.retrieve_timeout_ms,
        "Starting acquisition"
    );

    let handle = AcquisitionHandle::spawn(
        source,
        config.capture.clone(),
        distributor,
        Arc::clone(&status),
        stop.clone(),
    )?;
    let monitor = PreviewMonitor::new(
        preview_rx,
        status,
        stop,
        config.pipeline.preview_interval(),
    );

    Ok((handle, monitor))
}
