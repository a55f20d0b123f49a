//! Deterministic lockstep simulation of a START/FINISH pair.
//!
//! No threads: both units share one [`ManualClock`] and every task runs
//! once per step in a fixed order. Frames still travel through the radio
//! medium and the wire codec, so a given seed always replays the same race.

use sprintgate_core::config::GateConfig;
use sprintgate_core::{Clock, ManualClock, Role, State};
use sprintgate_detect::{DistanceSource, MeasurementSwitch, PresenceDetector};
use sprintgate_machine::{RoleMachine, Snapshot, Watchdog};
use tracing::info;

use crate::peripherals::{ConsoleDisplay, ResetButton, ScriptedSource, SimButton};
use crate::router::{Router, RouterReceivers};
use crate::runtime::{build_detector, execute, forward, report, watch, NodeError};
use crate::transport::{Inbox, RadioLink, RadioMedium};

/// Background distance with nobody in front of a sensor.
const BACKGROUND_MM: u16 = 2_000;

/// A single sprint as both sensors see it.
#[derive(Debug, Clone)]
pub struct SprintScene {
    /// When the runner leaves the START sensor.
    pub depart_at_ms: u32,
    /// Time from departure to arrival at the FINISH sensor.
    pub sprint_ms: u32,
    /// How long the runner stays in front of the FINISH sensor.
    pub linger_ms: u32,
    pub start_distance_mm: u16,
    pub finish_distance_mm: u16,
    /// Sensor noise, either side of the true distance.
    pub jitter_mm: u16,
    /// Fraction of sensor reads that time out.
    pub timeout_rate: f64,
    /// Seed for sensor noise and link loss.
    pub seed: u64,
}

impl Default for SprintScene {
    fn default() -> Self {
        Self {
            depart_at_ms: 1_000,
            sprint_ms: 4_000,
            linger_ms: 800,
            start_distance_mm: 350,
            finish_distance_mm: 450,
            jitter_mm: 0,
            timeout_rate: 0.0,
            seed: 42,
        }
    }
}

impl SprintScene {
    pub fn arrive_at_ms(&self) -> u32 {
        self.depart_at_ms + self.sprint_ms
    }

    /// Runner standing at START until departure.
    pub fn start_source<C: Clock>(&self, clock: C) -> ScriptedSource<C> {
        ScriptedSource::new(clock, BACKGROUND_MM, self.seed)
            .with_presence(0, self.depart_at_ms, self.start_distance_mm)
            .with_jitter(self.jitter_mm)
            .with_timeout_rate(self.timeout_rate)
    }

    /// Runner crossing FINISH on arrival.
    pub fn finish_source<C: Clock>(&self, clock: C) -> ScriptedSource<C> {
        let arrive = self.arrive_at_ms();
        ScriptedSource::new(clock, BACKGROUND_MM, self.seed.wrapping_add(1))
            .with_presence(arrive, arrive + self.linger_ms, self.finish_distance_mm)
            .with_jitter(self.jitter_mm)
            .with_timeout_rate(self.timeout_rate)
    }
}

/// One unit with every task collapsed into step functions.
pub struct BenchUnit {
    machine: RoleMachine,
    watchdog: Watchdog,
    detector: Box<dyn PresenceDetector>,
    switch: MeasurementSwitch,
    router: Router,
    receivers: RouterReceivers,
    inbox: Inbox,
    link: RadioLink,
    display: ConsoleDisplay,
    button: SimButton,
}

impl BenchUnit {
    fn new(
        config: &GateConfig,
        clock: &ManualClock,
        medium: &RadioMedium,
        source: Box<dyn DistanceSource>,
    ) -> Result<Self, NodeError> {
        config.validate()?;
        let mut source = source;
        source.init()?;
        let (router, receivers) = Router::new(&config.router);
        let inbox = Inbox::new(router.clone());
        medium.register(config.address, inbox.clone());
        Ok(Self {
            machine: RoleMachine::new(config.role),
            watchdog: Watchdog::new(config.role, &config.timing),
            detector: build_detector(config.detector.strategy, source, clock.clone(), &config.detector),
            switch: MeasurementSwitch::new(),
            router,
            receivers,
            inbox,
            link: medium.link(config.address, config.peer),
            display: ConsoleDisplay::new(config.role.to_string()),
            button: SimButton::new(),
        })
    }

    fn boot(&mut self, now: u32) {
        let actions = self.machine.boot(now);
        execute(actions, &self.router, &self.switch, &mut self.display);
    }

    fn sample(&mut self) {
        self.switch.apply(&mut self.detector);
        report(self.detector.read(), &self.router);
    }

    fn poll_button(&mut self) {
        if self.button.pressed() {
            self.router.reset_both();
        }
    }

    fn poll_watchdog(&mut self, now: u32) {
        let snapshot = self.machine.snapshot();
        watch(&mut self.watchdog, &snapshot, now, &self.router, &self.switch);
    }

    fn drain_machine(&mut self, now: u32) {
        while let Ok(message) = self.receivers.input.try_recv() {
            let actions = self.machine.handle(message, now);
            execute(actions, &self.router, &self.switch, &mut self.display);
        }
    }

    fn drain_sender(&mut self) {
        while let Ok(message) = self.receivers.outbound.try_recv() {
            forward(message, &mut self.link, &self.inbox);
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        self.machine.snapshot()
    }

    pub fn display(&self) -> &ConsoleDisplay {
        &self.display
    }

    pub fn button(&self) -> &SimButton {
        &self.button
    }

    pub fn router(&self) -> &Router {
        &self.router
    }
}

/// Two units stepped together on a shared clock.
pub struct Bench {
    clock: ManualClock,
    medium: RadioMedium,
    start: BenchUnit,
    finish: BenchUnit,
    step_ms: u32,
}

impl Bench {
    /// `config` describes either unit; the other is its mirror image.
    pub fn new(
        config: &GateConfig,
        clock: ManualClock,
        medium: RadioMedium,
        start_source: Box<dyn DistanceSource>,
        finish_source: Box<dyn DistanceSource>,
    ) -> Result<Self, NodeError> {
        let (start_config, finish_config) = config.pair();
        let mut start = BenchUnit::new(&start_config, &clock, &medium, start_source)?;
        let mut finish = BenchUnit::new(&finish_config, &clock, &medium, finish_source)?;
        let now = clock.now_ms();
        start.boot(now);
        finish.boot(now);
        let step_ms = config
            .timing
            .watchdog_tick_ms
            .min(config.detector.sample_interval_ms);
        Ok(Self {
            clock,
            medium,
            start,
            finish,
            step_ms,
        })
    }

    /// Bench for one sprint: scripted sensors, seeded link loss.
    pub fn sprint(config: &GateConfig, scene: &SprintScene, loss: f64) -> Result<Self, NodeError> {
        let clock = ManualClock::new(0);
        let medium = RadioMedium::new(scene.seed, loss);
        Self::new(
            config,
            clock.clone(),
            medium,
            Box::new(scene.start_source(clock.clone())),
            Box::new(scene.finish_source(clock)),
        )
    }

    pub fn now(&self) -> u32 {
        self.clock.now_ms()
    }

    pub fn medium(&self) -> &RadioMedium {
        &self.medium
    }

    pub fn unit(&self, role: Role) -> &BenchUnit {
        match role {
            Role::Start => &self.start,
            Role::Finish => &self.finish,
        }
    }

    /// Advance one step: sensors, buttons and watchdogs first, then the
    /// machines and senders, then the machines again for frames that
    /// arrived during this step.
    pub fn step(&mut self) {
        let now = self.clock.advance(self.step_ms);
        for unit in [&mut self.start, &mut self.finish] {
            unit.sample();
            unit.poll_button();
            unit.poll_watchdog(now);
        }
        for unit in [&mut self.start, &mut self.finish] {
            unit.drain_machine(now);
            unit.drain_sender();
        }
        for unit in [&mut self.start, &mut self.finish] {
            unit.drain_machine(now);
        }
    }

    pub fn run_until(&mut self, until_ms: u32) {
        while self.now() < until_ms {
            self.step();
        }
    }

    /// Step until `role` reaches `state`. Returns the time it did, or
    /// `None` if `deadline_ms` passed first.
    pub fn run_until_state(&mut self, role: Role, state: State, deadline_ms: u32) -> Option<u32> {
        while self.now() < deadline_ms {
            self.step();
            if self.unit(role).snapshot().state == state {
                return Some(self.now());
            }
        }
        None
    }

    /// Run the race to completion and return the time START measured.
    pub fn race(&mut self, deadline_ms: u32) -> Option<u32> {
        self.run_until_state(Role::Start, State::Finish, deadline_ms)?;
        let measured = self.start.snapshot().measured_time;
        info!(measured_ms = measured, at_ms = self.now(), "race finished");
        Some(measured)
    }
}
