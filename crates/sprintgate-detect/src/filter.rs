//! Presence filter: corroboration, noise rejection and edge emission.
//!
//! A side (near or far) only counts once every sample in the corroboration
//! window agrees. Declaring a new presence additionally needs consecutive
//! near samples to agree with each other within `max_relative_change`, so
//! a one-off short reflection cannot start a run.
//!
//! Invariant: emitted transitions strictly alternate. `Arrived` is only
//! emitted from a flag that is currently absent, `Left` only from present.

use std::collections::VecDeque;

use sprintgate_core::clock::elapsed_since;
use sprintgate_core::config::DetectorConfig;
use sprintgate_core::Event;
use tracing::{debug, trace};

use crate::source::Reading;

/// Output of one sampling cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Arrived,
    Left,
    None,
}

impl Transition {
    /// The state-machine event for this transition, if any.
    pub fn event(self) -> Option<Event> {
        match self {
            Transition::Arrived => Some(Event::ObjectArrived),
            Transition::Left => Some(Event::ObjectLeft),
            Transition::None => None,
        }
    }
}

/// A normalised reading with the time it was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    pub distance_mm: u16,
    pub at_ms: u32,
}

#[derive(Debug, Clone)]
pub struct PresenceFilter {
    threshold_mm: u16,
    far_mm: u16,
    corroboration: usize,
    max_relative_change: f32,
    epsilon_mm: u16,
    warmup_ms: u32,
    history: VecDeque<Sample>,
    /// `None` until the first corroborated side after a start.
    present: Option<bool>,
    measuring: bool,
    started_at: u32,
}

impl PresenceFilter {
    pub fn new(config: &DetectorConfig) -> Self {
        let corroboration = config.corroboration.clamp(2, 3);
        Self {
            threshold_mm: config.threshold_mm,
            far_mm: config.far_sentinel_mm(),
            corroboration,
            max_relative_change: config.max_relative_change,
            epsilon_mm: config.epsilon_mm.max(1),
            warmup_ms: config.warmup_ms,
            history: VecDeque::with_capacity(corroboration),
            present: None,
            measuring: false,
            started_at: 0,
        }
    }

    /// (Re)enter measuring at `now_ms`.
    pub fn start(&mut self, now_ms: u32) {
        self.history.clear();
        self.present = None;
        self.measuring = true;
        self.started_at = now_ms;
        debug!(threshold_mm = self.threshold_mm, "measurement started");
    }

    pub fn stop(&mut self) {
        self.measuring = false;
        debug!("measurement stopped");
    }

    pub fn is_measuring(&self) -> bool {
        self.measuring
    }

    /// Current presence flag; `None` until seeded.
    pub fn is_present(&self) -> Option<bool> {
        self.present
    }

    /// Recent samples, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &Sample> {
        self.history.iter()
    }

    /// Distance a reading counts as. Timeouts and zero readings are far.
    pub fn normalise(&self, reading: Reading) -> u16 {
        match reading {
            Reading::Distance(0) | Reading::Timeout => self.far_mm,
            Reading::Distance(mm) => mm,
        }
    }

    /// Feed one reading taken at `now_ms`.
    pub fn push(&mut self, reading: Reading, now_ms: u32) -> Transition {
        if !self.measuring {
            return Transition::None;
        }
        if elapsed_since(now_ms, self.started_at) < self.warmup_ms {
            return Transition::None;
        }

        let distance_mm = self.normalise(reading);
        if distance_mm <= self.threshold_mm {
            trace!(distance_mm, "object in range");
        }
        if self.history.len() == self.corroboration {
            self.history.pop_front();
        }
        self.history.push_back(Sample {
            distance_mm,
            at_ms: now_ms,
        });

        let Some(near) = self.corroborated_side() else {
            return Transition::None;
        };
        if near && self.present != Some(true) && !self.is_consistent() {
            debug!("unstable in-range readings rejected");
            return Transition::None;
        }

        match self.present {
            None => {
                self.present = Some(near);
                debug!(present = near, "presence seeded");
                Transition::None
            }
            Some(was) if was == near => Transition::None,
            Some(_) => {
                self.present = Some(near);
                if near {
                    Transition::Arrived
                } else {
                    Transition::Left
                }
            }
        }
    }

    /// `Some(true)` when the whole window is near, `Some(false)` when it is
    /// all far, `None` while it is mixed or not yet full.
    fn corroborated_side(&self) -> Option<bool> {
        if self.history.len() < self.corroboration {
            return None;
        }
        let near = self.history[0].distance_mm <= self.threshold_mm;
        self.history
            .iter()
            .all(|s| (s.distance_mm <= self.threshold_mm) == near)
            .then_some(near)
    }

    /// Consecutive samples differ by less than the allowed relative change.
    /// The denominator is floored at `epsilon_mm` so readings near zero
    /// cannot divide by zero.
    fn is_consistent(&self) -> bool {
        self.history
            .iter()
            .zip(self.history.iter().skip(1))
            .all(|(prev, cur)| {
                let delta = prev.distance_mm.abs_diff(cur.distance_mm) as f32;
                let base = prev.distance_mm.max(self.epsilon_mm) as f32;
                delta / base < self.max_relative_change
            })
    }
}
