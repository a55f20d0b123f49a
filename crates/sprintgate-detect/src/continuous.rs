//! Push+poll strategy for continuous-ranging sensors.
//!
//! A background sampling task calls [`ContinuousDetector::update`] on a
//! short period; it only consumes a range when the sensor reports one
//! complete. Transitions are queued and handed out one at a time by
//! [`ContinuousDetector::take_transition`], so a slow reader never loses or
//! reorders an edge.

use std::collections::VecDeque;

use sprintgate_core::config::DetectorConfig;
use sprintgate_core::Clock;

use crate::filter::{PresenceFilter, Transition};
use crate::source::DistanceSource;
use crate::PresenceDetector;

/// Edges buffered between polls. Older edges are discarded beyond this.
const PENDING_CAPACITY: usize = 8;

pub struct ContinuousDetector<S, C> {
    source: S,
    clock: C,
    filter: PresenceFilter,
    pending: VecDeque<Transition>,
}

impl<S: DistanceSource, C: Clock> ContinuousDetector<S, C> {
    pub fn new(source: S, clock: C, config: &DetectorConfig) -> Self {
        Self {
            source,
            clock,
            filter: PresenceFilter::new(config),
            pending: VecDeque::with_capacity(PENDING_CAPACITY),
        }
    }

    /// Sample once if a range is ready. Returns whether a reading was
    /// consumed.
    pub fn update(&mut self) -> bool {
        if !self.filter.is_measuring() || !self.source.ready() {
            return false;
        }
        let reading = self.source.sample();
        let transition = self.filter.push(reading, self.clock.now_ms());
        if transition != Transition::None {
            if self.pending.len() == PENDING_CAPACITY {
                // Dropping a pair keeps the queue alternating.
                self.pending.pop_front();
                self.pending.pop_front();
            }
            self.pending.push_back(transition);
        }
        true
    }

    /// Oldest edge not yet handed out.
    pub fn take_transition(&mut self) -> Transition {
        if !self.filter.is_measuring() {
            return Transition::None;
        }
        self.pending.pop_front().unwrap_or(Transition::None)
    }

    pub fn filter(&self) -> &PresenceFilter {
        &self.filter
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }
}

impl<S: DistanceSource, C: Clock> PresenceDetector for ContinuousDetector<S, C> {
    fn start_measurement(&mut self) {
        self.pending.clear();
        self.filter.start(self.clock.now_ms());
    }

    fn stop_measurement(&mut self) {
        self.pending.clear();
        self.filter.stop();
    }

    fn is_measuring(&self) -> bool {
        self.filter.is_measuring()
    }

    /// Single-task use: sample if ready, then hand out the oldest edge.
    fn read(&mut self) -> Transition {
        self.update();
        self.take_transition()
    }
}
