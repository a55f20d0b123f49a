//! Millisecond clocks.
//!
//! All run timers are 32-bit wrapping millisecond counters, like the
//! controller's uptime counter. Elapsed time is always computed with
//! wrapping subtraction so a counter rollover mid-run stays correct.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Source of the current time in milliseconds.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u32;
}

/// Milliseconds elapsed from `then` to `now`, tolerant of wraparound.
pub fn elapsed_since(now: u32, then: u32) -> u32 {
    now.wrapping_sub(then)
}

/// Wall clock counting from construction.
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Clock whose zero is the moment of construction.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u32 {
        // Truncation is the wraparound.
        self.origin.elapsed().as_millis() as u32
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU32>,
}

impl ManualClock {
    /// Clock frozen at `start_ms` until advanced.
    pub fn new(start_ms: u32) -> Self {
        Self {
            now: Arc::new(AtomicU32::new(start_ms)),
        }
    }

    /// Jump to an absolute time. May move backwards.
    pub fn set(&self, now_ms: u32) {
        self.now.store(now_ms, Ordering::SeqCst);
    }

    /// Move forward by `ms`, returning the new time.
    pub fn advance(&self, ms: u32) -> u32 {
        self.now
            .fetch_add(ms, Ordering::SeqCst)
            .wrapping_add(ms)
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u32 {
        self.now.load(Ordering::SeqCst)
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now_ms(&self) -> u32 {
        (**self).now_ms()
    }
}
