//! Fan-out of each retrieved frame to the preview and storage paths.

use super::cadence::SaveCadence;
use super::preview::PreviewSender;
use super::status::SessionStatus;
use super::storage::{FrameSink, StorageError};
use crate::capture::Frame;
use std::sync::Arc;
use std::time::Instant;

/// What happened to one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Distribution {
    /// The preview buffer accepted the frame.
    pub previewed: bool,
    /// File index the frame was persisted under.
    pub saved: Option<u64>,
}

/// Hands frames to the preview buffer and, at the save cadence, to storage.
///
/// Runs on the acquisition thread; persistence is synchronous, so a slow
/// disk slows retrieval down with it.
pub struct Distributor {
    preview: PreviewSender,
    cadence: SaveCadence,
    sink: Box<dyn FrameSink>,
    status: Arc<SessionStatus>,
    next_index: u64,
    halt_on_write_error: bool,
    last_write_error: Option<String>,
}

impl Distributor {
    /// Creates a distributor with no frames saved yet.
    pub fn new(
        preview: PreviewSender,
        cadence: SaveCadence,
        sink: Box<dyn FrameSink>,
        status: Arc<SessionStatus>,
    ) -> Self {
        Self {
            preview,
            cadence,
            sink,
            status,
            next_index: 0,
            halt_on_write_error: false,
            last_write_error: None,
        }
    }

    /// Makes a failed write end the session instead of being reported.
    pub fn halt_on_write_error(mut self, halt: bool) -> Self {
        self.halt_on_write_error = halt;
        self
    }

    /// Distributes a frame retrieved at `now`.
    ///
    /// Only returns an error when halting on write errors is enabled.
    pub fn distribute(&mut self, frame: Frame, now: Instant) -> Result<Distribution, StorageError> {
        let previewed = self.preview.offer(frame.clone());
        if !previewed {
            self.status.record_preview_drop();
        }

        let saved = if self.cadence.admit(now) {
            self.persist(&frame)?
        } else {
            None
        };

        Ok(Distribution { previewed, saved })
    }

    fn persist(&mut self, frame: &Frame) -> Result<Option<u64>, StorageError> {
        let index = self.next_index;
        match self.sink.persist(frame, index) {
            Ok(path) => {
                self.next_index += 1;
                self.status.record_saved();
                self.last_write_error = None;
                tracing::trace!(index, sequence = frame.sequence(), path = %path.display(), "Saved frame");
                Ok(Some(index))
            }
            Err(e) if self.halt_on_write_error => Err(e),
            Err(e) => {
                let message = e.to_string();
                if self.last_write_error.as_deref() != Some(message.as_str()) {
                    tracing::warn!(error = %message, index, "Frame write failed, acquisition continues");
                } else {
                    tracing::debug!(error = %message, index, "Frame write failed again");
                }
                self.status.record_write_failure(message.clone());
                self.last_write_error = Some(message);
                Ok(None)
            }
        }
    }

    /// Frames persisted by this distributor.
    pub fn saved(&self) -> u64 {
        self.next_index
    }
}
