//! Cross-task start/stop requests for a detector.
//!
//! The detector is owned by its sampling task. The state machine and the
//! watchdog only post requests here; the sampling task applies the latest
//! one at the top of its next iteration. A measurement already in progress
//! always completes first.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use crate::PresenceDetector;

const NONE: u8 = 0;
const START: u8 = 1;
const STOP: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchRequest {
    Start,
    Stop,
}

/// Shared request cell. Clones refer to the same cell; the newest request
/// replaces any request not yet applied.
#[derive(Debug, Clone, Default)]
pub struct MeasurementSwitch {
    pending: Arc<AtomicU8>,
}

impl MeasurementSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_start(&self) {
        self.pending.store(START, Ordering::Release);
    }

    pub fn request_stop(&self) {
        self.pending.store(STOP, Ordering::Release);
    }

    /// Take the pending request, leaving the cell empty.
    pub fn take(&self) -> Option<SwitchRequest> {
        match self.pending.swap(NONE, Ordering::AcqRel) {
            START => Some(SwitchRequest::Start),
            STOP => Some(SwitchRequest::Stop),
            _ => None,
        }
    }

    /// Apply the pending request, if any, to `detector`.
    pub fn apply<D: PresenceDetector + ?Sized>(&self, detector: &mut D) -> Option<SwitchRequest> {
        let request = self.take()?;
        match request {
            SwitchRequest::Start => detector.start_measurement(),
            SwitchRequest::Stop => detector.stop_measurement(),
        }
        Some(request)
    }
}
