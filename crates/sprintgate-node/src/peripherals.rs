//! Collaborators around the state machine: display, status LED, battery
//! gauge, reset button, and their simulated stand-ins.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sprintgate_core::clock::elapsed_since;
use sprintgate_core::Clock;
use sprintgate_detect::{DistanceSource, Reading};
use sprintgate_machine::Screen;
use tracing::{debug, info};

// ── Traits ───────────────────────────────────────────────────────────

/// Four-digit time display.
pub trait Presentation: Send {
    fn show_idle(&mut self);
    fn show_zero(&mut self);
    /// Count up from the local timestamp `start_time`.
    fn show_running_since(&mut self, start_time: u32);
    fn show_final(&mut self, measured_ms: u32);
    fn show_connecting(&mut self);
    fn show_error(&mut self);
}

/// Route a requested screen to the matching display call.
pub fn present<P: Presentation + ?Sized>(display: &mut P, screen: Screen) {
    match screen {
        Screen::Idle => display.show_idle(),
        Screen::Zero => display.show_zero(),
        Screen::RunningSince(start) => display.show_running_since(start),
        Screen::Final(ms) => display.show_final(ms),
        Screen::Connecting => display.show_connecting(),
        Screen::Error => display.show_error(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Red,
    Green,
    Yellow,
    Blue,
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Color::Red => "red",
            Color::Green => "green",
            Color::Yellow => "yellow",
            Color::Blue => "blue",
        };
        f.write_str(name)
    }
}

/// Single RGB status LED.
pub trait StatusIndicator: Send {
    fn set_solid(&mut self, color: Color, brightness: u8);
    fn set_blinking(&mut self, color: Color, brightness: u8);
}

pub trait BatteryGauge: Send {
    /// Remaining charge, 0 to 100.
    fn percentage(&mut self) -> u8;
}

pub trait ResetButton: Send {
    /// True once per debounced press.
    fn pressed(&mut self) -> bool;
}

// ── Time rendering ───────────────────────────────────────────────────

/// Format a duration for a four-digit seven-segment display: `SS.hh`
/// below one minute, `MM:SS` from there on, saturating at `99:59`.
pub fn render_time(ms: u32) -> String {
    if ms <= 59_999 {
        let hundredths = ms / 10;
        format!("{:02}.{:02}", hundredths / 100, hundredths % 100)
    } else {
        let total_secs = ms / 1000;
        let (mins, secs) = match total_secs / 60 {
            m if m > 99 => (99, 59),
            m => (m, total_secs % 60),
        };
        format!("{mins:02}:{secs:02}")
    }
}

// ── Battery monitor ──────────────────────────────────────────────────

/// LED brightness used for every status colour.
pub const STATUS_BRIGHTNESS: u8 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorCommand {
    Solid(Color),
    Blinking(Color),
}

impl IndicatorCommand {
    /// Status shown at power-on, before the first battery reading.
    pub const BOOT: IndicatorCommand = IndicatorCommand::Blinking(Color::Red);

    pub fn apply<I: StatusIndicator + ?Sized>(self, indicator: &mut I) {
        match self {
            IndicatorCommand::Solid(color) => indicator.set_solid(color, STATUS_BRIGHTNESS),
            IndicatorCommand::Blinking(color) => {
                indicator.set_blinking(color, STATUS_BRIGHTNESS)
            }
        }
    }
}

/// Maps battery charge onto the status LED. Only changes are forwarded.
#[derive(Debug, Default)]
pub struct BatteryMonitor {
    last: Option<IndicatorCommand>,
}

impl BatteryMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn command_for(percentage: u8) -> IndicatorCommand {
        match percentage {
            p if p > 50 => IndicatorCommand::Solid(Color::Green),
            p if p > 20 => IndicatorCommand::Solid(Color::Yellow),
            _ => IndicatorCommand::Blinking(Color::Red),
        }
    }

    /// Read the gauge and update the indicator if the status changed.
    /// Returns the command that was applied.
    pub fn poll<B, I>(&mut self, gauge: &mut B, indicator: &mut I) -> Option<IndicatorCommand>
    where
        B: BatteryGauge + ?Sized,
        I: StatusIndicator + ?Sized,
    {
        let percentage = gauge.percentage();
        let command = Self::command_for(percentage);
        if self.last == Some(command) {
            return None;
        }
        debug!(percentage, ?command, "battery status changed");
        command.apply(indicator);
        self.last = Some(command);
        Some(command)
    }
}

// ── Simulated display ────────────────────────────────────────────────

const CONNECTING_FRAMES: [&str; 4] = ["-   ", " -  ", "  - ", "   -"];
const CONNECTING_FRAME_MS: u32 = 350;

/// Display that logs every screen change and keeps a shared history.
#[derive(Debug, Clone)]
pub struct ConsoleDisplay {
    label: String,
    screens: Arc<Mutex<Vec<Screen>>>,
}

impl ConsoleDisplay {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            screens: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn current(&self) -> Option<Screen> {
        self.screens.lock().last().copied()
    }

    pub fn history(&self) -> Vec<Screen> {
        self.screens.lock().clone()
    }

    /// The four characters the hardware would show at `now`.
    pub fn frame(&self, now: u32) -> String {
        match self.current() {
            None | Some(Screen::Idle) => "1111".to_string(),
            Some(Screen::Zero) => render_time(0),
            Some(Screen::RunningSince(start)) => render_time(elapsed_since(now, start)),
            Some(Screen::Final(ms)) => render_time(ms),
            Some(Screen::Connecting) => {
                let idx = (now / CONNECTING_FRAME_MS) as usize % CONNECTING_FRAMES.len();
                CONNECTING_FRAMES[idx].to_string()
            }
            Some(Screen::Error) => "Err ".to_string(),
        }
    }

    fn record(&mut self, screen: Screen) {
        self.screens.lock().push(screen);
    }
}

impl Presentation for ConsoleDisplay {
    fn show_idle(&mut self) {
        debug!(unit = %self.label, "display idle");
        self.record(Screen::Idle);
    }

    fn show_zero(&mut self) {
        info!(unit = %self.label, "ready, display {}", render_time(0));
        self.record(Screen::Zero);
    }

    fn show_running_since(&mut self, start_time: u32) {
        info!(unit = %self.label, start_time, "running");
        self.record(Screen::RunningSince(start_time));
    }

    fn show_final(&mut self, measured_ms: u32) {
        info!(unit = %self.label, measured_ms, "final time {}", render_time(measured_ms));
        self.record(Screen::Final(measured_ms));
    }

    fn show_connecting(&mut self) {
        debug!(unit = %self.label, "display connecting");
        self.record(Screen::Connecting);
    }

    fn show_error(&mut self) {
        info!(unit = %self.label, "display error");
        self.record(Screen::Error);
    }
}

// ── Simulated LED, battery and button ────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct LogIndicator {
    label: String,
    last: Arc<Mutex<Option<IndicatorCommand>>>,
}

impl LogIndicator {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            last: Arc::default(),
        }
    }

    pub fn last(&self) -> Option<IndicatorCommand> {
        *self.last.lock()
    }
}

impl StatusIndicator for LogIndicator {
    fn set_solid(&mut self, color: Color, brightness: u8) {
        debug!(unit = %self.label, %color, brightness, "led solid");
        *self.last.lock() = Some(IndicatorCommand::Solid(color));
    }

    fn set_blinking(&mut self, color: Color, brightness: u8) {
        debug!(unit = %self.label, %color, brightness, "led blinking");
        *self.last.lock() = Some(IndicatorCommand::Blinking(color));
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedBattery(pub u8);

impl BatteryGauge for FixedBattery {
    fn percentage(&mut self) -> u8 {
        self.0.min(100)
    }
}

/// Button pressed programmatically. Clones share the press count.
#[derive(Debug, Clone, Default)]
pub struct SimButton {
    presses: Arc<AtomicUsize>,
}

impl SimButton {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn press(&self) {
        self.presses.fetch_add(1, Ordering::AcqRel);
    }
}

impl ResetButton for SimButton {
    fn pressed(&mut self) -> bool {
        self.presses
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }
}

// ── Scripted distance source ─────────────────────────────────────────

/// An object in front of the sensor during `[from_ms, until_ms)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Presence {
    pub from_ms: u32,
    pub until_ms: u32,
    pub distance_mm: u16,
}

/// Distance source replaying a scene against a clock, with seeded noise
/// and occasional timed-out reads.
#[derive(Debug)]
pub struct ScriptedSource<C> {
    clock: C,
    background_mm: u16,
    scene: Vec<Presence>,
    jitter_mm: u16,
    timeout_rate: f64,
    rng: ChaCha8Rng,
}

impl<C: Clock> ScriptedSource<C> {
    /// Nothing in range: every clean read returns `background_mm`.
    pub fn new(clock: C, background_mm: u16, seed: u64) -> Self {
        Self {
            clock,
            background_mm,
            scene: Vec::new(),
            jitter_mm: 0,
            timeout_rate: 0.0,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn with_presence(mut self, from_ms: u32, until_ms: u32, distance_mm: u16) -> Self {
        self.scene.push(Presence {
            from_ms,
            until_ms,
            distance_mm,
        });
        self
    }

    /// Uniform noise of up to `jitter_mm` either side of the true distance.
    pub fn with_jitter(mut self, jitter_mm: u16) -> Self {
        self.jitter_mm = jitter_mm;
        self
    }

    /// Fraction of reads that time out.
    pub fn with_timeout_rate(mut self, rate: f64) -> Self {
        self.timeout_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// True distance at `now`, ignoring noise.
    pub fn distance_at(&self, now: u32) -> u16 {
        self.scene
            .iter()
            .find(|p| now >= p.from_ms && now < p.until_ms)
            .map_or(self.background_mm, |p| p.distance_mm)
    }
}

impl<C: Clock> DistanceSource for ScriptedSource<C> {
    fn sample(&mut self) -> Reading {
        if self.timeout_rate > 0.0 && self.rng.gen_bool(self.timeout_rate) {
            return Reading::Timeout;
        }
        let distance = self.distance_at(self.clock.now_ms());
        if self.jitter_mm == 0 {
            return Reading::Distance(distance);
        }
        let jitter = i32::from(self.jitter_mm);
        let noisy = i32::from(distance) + self.rng.gen_range(-jitter..=jitter);
        Reading::Distance(noisy.clamp(1, i32::from(u16::MAX)) as u16)
    }
}
