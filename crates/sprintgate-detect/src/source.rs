/// One raw reading from the sensor driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reading {
    /// Distance in millimetres. Zero means the sensor saw nothing valid.
    Distance(u16),
    /// The measurement did not complete in time.
    Timeout,
}

#[derive(Debug, thiserror::Error)]
pub enum SensorError {
    #[error("sensor not responding: {0}")]
    NotResponding(String),

    #[error("sensor configuration rejected: {0}")]
    Configuration(String),
}

/// Driver seam for the distance sensor.
pub trait DistanceSource: Send {
    /// Bring the sensor up. Called once at boot.
    fn init(&mut self) -> Result<(), SensorError> {
        Ok(())
    }

    /// Whether a fresh range is available. Pulse-echo sensors are always
    /// ready; continuous-ranging sensors report completed measurements.
    fn ready(&mut self) -> bool {
        true
    }

    /// Take (or fetch) one reading. Must return within the sensor's own
    /// timeout.
    fn sample(&mut self) -> Reading;
}

impl<S: DistanceSource + ?Sized> DistanceSource for Box<S> {
    fn init(&mut self) -> Result<(), SensorError> {
        (**self).init()
    }

    fn ready(&mut self) -> bool {
        (**self).ready()
    }

    fn sample(&mut self) -> Reading {
        (**self).sample()
    }
}
