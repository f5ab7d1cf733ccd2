//! Bounded, lossy hand-off between acquisition and live display.
//!
//! Insertion never blocks. When the buffer is full the frame being
//! offered is rejected and the pending ones are kept, so producer
//! throughput always wins over preview completeness.

use crate::capture::Frame;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

/// Creates a preview buffer holding at most `capacity` frames.
pub fn preview_buffer(capacity: usize) -> (PreviewSender, PreviewReceiver) {
    let capacity = capacity.max(1);
    let (tx, rx) = bounded(capacity);
    (
        PreviewSender { tx, capacity },
        PreviewReceiver { rx, capacity },
    )
}

/// Producer side, owned by the acquisition thread.
#[derive(Debug)]
pub struct PreviewSender {
    tx: Sender<Frame>,
    capacity: usize,
}

impl PreviewSender {
    /// Offers a frame without blocking.
    ///
    /// Returns `false` when the frame was dropped, either because the
    /// buffer is full or because the consumer has gone away.
    pub fn offer(&self, frame: Frame) -> bool {
        match self.tx.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Frames currently pending.
    pub fn pending(&self) -> usize {
        self.tx.len()
    }

    /// Maximum number of pending frames.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Consumer side, polled by the presentation layer.
#[derive(Debug)]
pub struct PreviewReceiver {
    rx: Receiver<Frame>,
    capacity: usize,
}

impl PreviewReceiver {
    /// Empties the buffer and returns the newest frame, if any.
    pub fn drain_latest(&self) -> Option<Frame> {
        self.rx.try_iter().last()
    }

    /// Removes and returns the oldest pending frame.
    pub fn try_next(&self) -> Option<Frame> {
        self.rx.try_recv().ok()
    }

    /// Frames currently pending.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    /// Maximum number of pending frames.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
