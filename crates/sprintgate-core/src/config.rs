//! Unit configuration: role, addressing, timing windows, detector tuning
//! and queue limits.
//!
//! Every section has a `Default`, and JSON files may omit any field.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::types::{Event, MacAddr, Role};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Complete configuration of one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub role: Role,
    /// This unit's hardware identity.
    pub address: MacAddr,
    /// The counterpart's hardware identity.
    pub peer: MacAddr,
    pub timing: TimingConfig,
    pub detector: DetectorConfig,
    pub router: RouterConfig,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            role: Role::Start,
            address: MacAddr([0x24, 0x0a, 0xc4, 0x00, 0x00, 0x01]),
            peer: MacAddr([0x24, 0x0a, 0xc4, 0x00, 0x00, 0x02]),
            timing: TimingConfig::default(),
            detector: DetectorConfig::default(),
            router: RouterConfig::default(),
        }
    }
}

impl GateConfig {
    /// Parse a configuration; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: GateConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Configuration for the counterpart unit: opposite role, swapped
    /// addresses, identical tuning.
    pub fn mirrored(&self) -> Self {
        Self {
            role: self.role.peer(),
            address: self.peer,
            peer: self.address,
            ..self.clone()
        }
    }

    /// `(START, FINISH)` configurations, one of them this one.
    pub fn pair(&self) -> (Self, Self) {
        match self.role {
            Role::Start => (self.clone(), self.mirrored()),
            Role::Finish => (self.mirrored(), self.clone()),
        }
    }

    /// Check cross-field constraints the types alone cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.address == self.peer {
            return Err(ConfigError::Invalid(format!(
                "unit address {} equals peer address",
                self.address
            )));
        }
        self.timing.validate()?;
        self.detector.validate()?;
        self.router.validate()
    }
}

// ── Timing ───────────────────────────────────────────────────────────

/// Watchdog thresholds and task cadences, all in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Quiet period after a departure before START commits to the run.
    pub confirmation_window_ms: u32,
    /// Delay after FINISH enters RUN before its detector is re-armed.
    pub rearm_delay_ms: u32,
    /// How long the final time stays on display before returning to START.
    pub display_hold_ms: u32,
    /// MESSAGE_INIT re-broadcast period while START is unpaired.
    pub handshake_interval_ms: u32,
    /// Delay before FINISH answers an INIT with MESSAGE_ACK.
    pub ack_delay_ms: u32,
    /// Watchdog polling period.
    pub watchdog_tick_ms: u32,
    /// State-machine receive timeout, used only for liveness logging.
    pub liveness_timeout_ms: u32,
    /// Reset button polling period.
    pub button_poll_ms: u32,
    /// Battery monitor period.
    pub battery_poll_ms: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            confirmation_window_ms: 200,
            rearm_delay_ms: 1_000,
            display_hold_ms: 10_000,
            handshake_interval_ms: 1_000,
            ack_delay_ms: 100,
            watchdog_tick_ms: 10,
            liveness_timeout_ms: 10_000,
            button_poll_ms: 50,
            battery_poll_ms: 5_000,
        }
    }
}

impl TimingConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.watchdog_tick_ms == 0 {
            return Err(ConfigError::Invalid("watchdog tick must be > 0".into()));
        }
        if self.handshake_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "handshake interval must be > 0".into(),
            ));
        }
        if self.liveness_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "liveness timeout must be > 0".into(),
            ));
        }
        Ok(())
    }
}

// ── Detector ─────────────────────────────────────────────────────────

/// Sensing technology of the deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorStrategy {
    /// Pulse-echo time of flight: each read performs one bounded measurement.
    PulseEcho,
    /// Continuous-ranging time of flight: background sampling, polled
    /// transitions.
    Continuous,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub strategy: DetectorStrategy,
    /// Presence threshold in millimetres (inclusive).
    pub threshold_mm: u16,
    /// Consecutive same-sided samples needed before the presence flag flips.
    pub corroboration: usize,
    /// Largest relative change between consecutive in-range samples still
    /// accepted when declaring a new presence.
    pub max_relative_change: f32,
    /// Floor for the relative-change denominator, in millimetres.
    pub epsilon_mm: u16,
    /// Timeouts and invalid reads count as `threshold × far_multiplier`.
    pub far_multiplier: u16,
    /// Samples taken within this window after a start are discarded.
    pub warmup_ms: u32,
    /// Sampling task period.
    pub sample_interval_ms: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            strategy: DetectorStrategy::Continuous,
            threshold_mm: 600,
            corroboration: 2,
            max_relative_change: 0.10,
            epsilon_mm: 10,
            far_multiplier: 5,
            warmup_ms: 60,
            sample_interval_ms: 5,
        }
    }
}

impl DetectorConfig {
    /// Distance reported for timed-out or invalid reads.
    pub fn far_sentinel_mm(&self) -> u16 {
        self.threshold_mm.saturating_mul(self.far_multiplier)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(2..=3).contains(&self.corroboration) {
            return Err(ConfigError::Invalid(format!(
                "corroboration must be 2 or 3, got {}",
                self.corroboration
            )));
        }
        if self.threshold_mm == 0 {
            return Err(ConfigError::Invalid("threshold must be > 0".into()));
        }
        if self.far_multiplier < 2 {
            return Err(ConfigError::Invalid(
                "far multiplier must be at least 2".into(),
            ));
        }
        if self.max_relative_change.is_nan() || self.max_relative_change <= 0.0 {
            return Err(ConfigError::Invalid(
                "max relative change must be positive".into(),
            ));
        }
        if self.epsilon_mm == 0 {
            return Err(ConfigError::Invalid("epsilon must be > 0".into()));
        }
        if self.sample_interval_ms == 0 {
            return Err(ConfigError::Invalid("sample interval must be > 0".into()));
        }
        Ok(())
    }
}

// ── Router ───────────────────────────────────────────────────────────

/// What to do when a queue is full.
///
/// The default drops and logs everything. Events listed in
/// `backoff_events` are retried up to `max_attempts` times, sleeping
/// `backoff_ms` between attempts, before being dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverflowPolicy {
    pub backoff_events: Vec<Event>,
    pub max_attempts: u32,
    pub backoff_ms: u32,
}

impl Default for OverflowPolicy {
    fn default() -> Self {
        Self {
            backoff_events: Vec::new(),
            max_attempts: 3,
            backoff_ms: 5,
        }
    }
}

impl OverflowPolicy {
    pub fn backs_off(&self, event: Event) -> bool {
        self.backoff_events.contains(&event)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Capacity of each of the two queues.
    pub capacity: usize,
    pub overflow: OverflowPolicy,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            capacity: 10,
            overflow: OverflowPolicy::default(),
        }
    }
}

impl RouterConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::Invalid("queue capacity must be > 0".into()));
        }
        if !self.overflow.backoff_events.is_empty() && self.overflow.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "backoff policy needs at least one attempt".into(),
            ));
        }
        Ok(())
    }
}
