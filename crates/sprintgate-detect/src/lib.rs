//! Presence detection for a timing gate.
//!
//! Turns raw distance samples into discrete arrival/departure transitions:
//!
//! - [`DistanceSource`]: one raw reading per call (sensor driver seam)
//! - [`PresenceFilter`]: corroboration, noise rejection and edge emission
//! - [`PulseEchoDetector`]: pull strategy, one measurement per `read()`
//! - [`ContinuousDetector`]: push+poll strategy for continuous ranging
//! - [`MeasurementSwitch`]: start/stop requests from other tasks, applied
//!   by the detector task at its next iteration

pub mod continuous;
pub mod filter;
pub mod pulse;
pub mod source;
pub mod switch;

pub use continuous::ContinuousDetector;
pub use filter::{PresenceFilter, Sample, Transition};
pub use pulse::PulseEchoDetector;
pub use source::{DistanceSource, Reading, SensorError};
pub use switch::{MeasurementSwitch, SwitchRequest};

/// Capability shared by every sensing strategy.
pub trait PresenceDetector: Send {
    /// Re-enter measuring: clear history and start the warm-up window.
    fn start_measurement(&mut self);

    /// Stop emitting transitions until the next start.
    fn stop_measurement(&mut self);

    fn is_measuring(&self) -> bool;

    /// One sampling cycle's worth of output.
    fn read(&mut self) -> Transition;
}

impl<D: PresenceDetector + ?Sized> PresenceDetector for Box<D> {
    fn start_measurement(&mut self) {
        (**self).start_measurement();
    }

    fn stop_measurement(&mut self) {
        (**self).stop_measurement();
    }

    fn is_measuring(&self) -> bool {
        (**self).is_measuring()
    }

    fn read(&mut self) -> Transition {
        (**self).read()
    }
}
