//! Greedy fixed-rate sampler for frame persistence.
//!
//! The sampler never schedules anything. Each retrieved frame is
//! either admitted or skipped depending on how much time has passed,
//! so the achieved save rate is bounded by both the target rate and
//! the rate frames actually arrive at, and spacing in the saved output
//! follows retrieval jitter.

use crate::capture::CadenceMode;
use std::time::{Duration, Instant};

/// Decides which retrieved frames get persisted.
#[derive(Debug, Clone)]
pub struct SaveCadence {
    interval: Duration,
    mode: CadenceMode,
    next_due: Option<Instant>,
}

impl SaveCadence {
    /// Creates a sampler targeting `rate` persisted frames per second.
    pub fn new(rate: f64, mode: CadenceMode) -> Self {
        Self::with_interval(Duration::from_secs_f64(1.0 / rate), mode)
    }

    /// Creates a sampler enforcing `interval` between persisted frames.
    pub fn with_interval(interval: Duration, mode: CadenceMode) -> Self {
        Self {
            interval,
            mode,
            next_due: None,
        }
    }

    /// Admits the frame seen at `now` if its slot is due.
    ///
    /// Admission consumes the slot even if the caller later fails to
    /// persist the frame.
    pub fn admit(&mut self, now: Instant) -> bool {
        if let Some(due) = self.next_due {
            if now < due {
                return false;
            }
        }
        self.next_due = Some(self.following_due(now));
        true
    }

    fn following_due(&self, now: Instant) -> Instant {
        match (self.mode, self.next_due) {
            (CadenceMode::Anchored, Some(due)) => {
                let anchored = due + self.interval;
                if anchored >= now {
                    anchored
                } else {
                    // Fell behind (slow source or stall): restart from now, no catch-up burst.
                    now + self.interval
                }
            }
            _ => now + self.interval,
        }
    }

    /// Target spacing between persisted frames.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Sampler behaviour.
    pub fn mode(&self) -> CadenceMode {
        self.mode
    }

    /// Earliest instant the next frame can be admitted.
    pub fn next_due(&self) -> Option<Instant> {
        self.next_due
    }
}
