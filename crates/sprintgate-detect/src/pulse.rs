//! Pull strategy for pulse-echo sensors.
//!
//! Every `read()` triggers one bounded measurement on the calling task and
//! returns the resulting transition. A stop request cannot interrupt a
//! measurement already in flight; it takes effect on the next call.

use sprintgate_core::config::DetectorConfig;
use sprintgate_core::Clock;

use crate::filter::{PresenceFilter, Transition};
use crate::source::DistanceSource;
use crate::PresenceDetector;

pub struct PulseEchoDetector<S, C> {
    source: S,
    clock: C,
    filter: PresenceFilter,
}

impl<S: DistanceSource, C: Clock> PulseEchoDetector<S, C> {
    pub fn new(source: S, clock: C, config: &DetectorConfig) -> Self {
        Self {
            source,
            clock,
            filter: PresenceFilter::new(config),
        }
    }

    pub fn filter(&self) -> &PresenceFilter {
        &self.filter
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }
}

impl<S: DistanceSource, C: Clock> PresenceDetector for PulseEchoDetector<S, C> {
    fn start_measurement(&mut self) {
        self.filter.start(self.clock.now_ms());
    }

    fn stop_measurement(&mut self) {
        self.filter.stop();
    }

    fn is_measuring(&self) -> bool {
        self.filter.is_measuring()
    }

    fn read(&mut self) -> Transition {
        if !self.filter.is_measuring() {
            return Transition::None;
        }
        let reading = self.source.sample();
        self.filter.push(reading, self.clock.now_ms())
    }
}
