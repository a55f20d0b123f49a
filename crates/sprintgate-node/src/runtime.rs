//! Threaded runtime for one unit.
//!
//! Every task is a named OS thread running a long-lived loop with a fixed
//! period. The state machine thread is the only writer of state and run
//! timers; it publishes a [`Snapshot`] after each step, which the watchdog
//! reads. All other communication goes through the router queues or the
//! detector's [`MeasurementSwitch`].
//!
//! Tasks stop when the unit's stop channel closes.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, select, Receiver, RecvTimeoutError, Sender};
use parking_lot::{Mutex, RwLock};
use sprintgate_core::config::{ConfigError, DetectorConfig, DetectorStrategy, GateConfig};
use sprintgate_core::{Clock, Message, Role};
use sprintgate_detect::{
    ContinuousDetector, DistanceSource, MeasurementSwitch, PresenceDetector, PulseEchoDetector,
    SensorError, Transition,
};
use sprintgate_machine::{Action, RoleMachine, Snapshot, Watchdog, WatchdogAction};
use tracing::{debug, error, info};

use crate::peripherals::{
    present, BatteryGauge, BatteryMonitor, IndicatorCommand, Presentation, ResetButton,
    StatusIndicator,
};
use crate::router::{Router, RouterReceivers, RouterStats};
use crate::transport::{Inbox, Transport};

#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("sensor initialisation failed: {0}")]
    Sensor(#[from] SensorError),

    #[error("cannot spawn task: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("task {0} panicked")]
    TaskPanicked(String),
}

// ── Shared pieces ────────────────────────────────────────────────────

/// Latest machine snapshot, written by the machine task only.
#[derive(Debug, Clone)]
pub struct SnapshotCell(Arc<RwLock<Snapshot>>);

impl SnapshotCell {
    pub fn new(initial: Snapshot) -> Self {
        Self(Arc::new(RwLock::new(initial)))
    }

    pub fn publish(&self, snapshot: Snapshot) {
        *self.0.write() = snapshot;
    }

    pub fn load(&self) -> Snapshot {
        *self.0.read()
    }
}

/// Carry out the machine's requests in order.
pub(crate) fn execute<P: Presentation + ?Sized>(
    actions: Vec<Action>,
    router: &Router,
    switch: &MeasurementSwitch,
    display: &mut P,
) {
    for action in actions {
        match action {
            Action::Send(message) => {
                router.to_peer(message);
            }
            Action::StartMeasuring => switch.request_start(),
            Action::StopMeasuring => switch.request_stop(),
            Action::Present(screen) => present(display, screen),
        }
    }
}

/// Poll the watchdog and enqueue what it asks for. Anything the router
/// refuses is retracted so the rule fires again on a later tick.
pub(crate) fn watch(
    watchdog: &mut Watchdog,
    snapshot: &Snapshot,
    now: u32,
    router: &Router,
    switch: &MeasurementSwitch,
) {
    for action in watchdog.poll(snapshot, now) {
        let accepted = match action {
            WatchdogAction::Inject(message) => router.to_machine(message),
            WatchdogAction::Send(message) => router.to_peer(message),
            WatchdogAction::Rearm => {
                switch.request_start();
                true
            }
        };
        if !accepted {
            debug!(epoch = snapshot.epoch, ?action, "watchdog action refused, will retry");
            watchdog.retract(&action, snapshot.epoch);
        }
    }
}

/// Hand one outbound message to the transport. Failures come back to the
/// local machine as SEND_ERROR.
pub(crate) fn forward<T: Transport + ?Sized>(message: Message, transport: &mut T, inbox: &Inbox) {
    if let Err(e) = transport.send(&message) {
        error!(event = %message.event, error = %e, "send failed");
        inbox.send_failed();
    }
}

/// Report a detector edge to the machine.
pub(crate) fn report(transition: Transition, router: &Router) {
    if let Some(event) = transition.event() {
        router.to_machine(Message::new(event));
    }
}

pub(crate) fn build_detector<C>(
    strategy: DetectorStrategy,
    source: Box<dyn DistanceSource>,
    clock: C,
    config: &DetectorConfig,
) -> Box<dyn PresenceDetector>
where
    C: Clock + 'static,
{
    match strategy {
        DetectorStrategy::PulseEcho => Box::new(PulseEchoDetector::new(source, clock, config)),
        DetectorStrategy::Continuous => Box::new(ContinuousDetector::new(source, clock, config)),
    }
}

/// Run `work` every `period` until `stop` closes.
fn every(stop: &Receiver<()>, period: Duration, mut work: impl FnMut()) {
    while let Err(RecvTimeoutError::Timeout) = stop.recv_timeout(period) {
        work();
    }
}

fn millis(ms: u32) -> Duration {
    Duration::from_millis(u64::from(ms))
}

// ── Unit ─────────────────────────────────────────────────────────────

/// Hardware a unit drives.
pub struct Peripherals {
    pub source: Box<dyn DistanceSource>,
    pub transport: Box<dyn Transport>,
    pub display: Box<dyn Presentation>,
    pub indicator: Box<dyn StatusIndicator>,
    pub battery: Box<dyn BatteryGauge>,
    pub button: Box<dyn ResetButton>,
}

/// A configured unit whose queues exist but whose tasks are not running
/// yet. The inbox can be registered with a transport before spawning.
pub struct Unit {
    config: GateConfig,
    clock: Arc<dyn Clock>,
    router: Router,
    receivers: RouterReceivers,
    inbox: Inbox,
}

impl Unit {
    /// Validate `config` and create the unit's queues. Nothing runs until
    /// [`Unit::spawn`].
    pub fn new(config: GateConfig, clock: Arc<dyn Clock>) -> Result<Self, NodeError> {
        config.validate()?;
        let (router, receivers) = Router::new(&config.router);
        let inbox = Inbox::new(router.clone());
        Ok(Self {
            config,
            clock,
            router,
            receivers,
            inbox,
        })
    }

    /// Role the unit was configured with.
    pub fn role(&self) -> Role {
        self.config.role
    }

    /// Entry point for frames addressed to this unit.
    pub fn inbox(&self) -> Inbox {
        self.inbox.clone()
    }

    /// Boot the machine and start every task.
    pub fn spawn(self, peripherals: Peripherals) -> Result<UnitHandle, NodeError> {
        let Unit {
            config,
            clock,
            router,
            receivers,
            inbox,
        } = self;
        let Peripherals {
            mut source,
            transport,
            mut display,
            mut indicator,
            battery,
            button,
        } = peripherals;
        let role = config.role;
        let timing = &config.timing;

        IndicatorCommand::BOOT.apply(indicator.as_mut());
        if let Err(e) = source.init() {
            error!(%role, error = %e, "distance sensor failed to initialise");
            display.show_error();
            return Err(e.into());
        }

        let switch = MeasurementSwitch::new();
        let mut machine = RoleMachine::new(role);
        execute(machine.boot(clock.now_ms()), &router, &switch, display.as_mut());
        let cell = SnapshotCell::new(machine.snapshot());

        // Nothing is ever sent on this channel; dropping the sender stops
        // every task.
        let (stop_tx, stop_rx) = channel::bounded::<()>(0);
        let mut tasks = Vec::new();

        tasks.push(spawn_task(format!("{role}-machine"), {
            let (router, switch, cell, clock, stop) =
                (router.clone(), switch.clone(), cell.clone(), clock.clone(), stop_rx.clone());
            let input = receivers.input;
            let liveness = millis(timing.liveness_timeout_ms);
            move || loop {
                select! {
                    recv(input) -> message => {
                        let Ok(message) = message else { break };
                        let actions = machine.handle(message, clock.now_ms());
                        execute(actions, &router, &switch, display.as_mut());
                        cell.publish(machine.snapshot());
                    }
                    recv(stop) -> _ => break,
                    default(liveness) => {
                        info!(%role, state = %machine.state(), "alive, no events");
                    }
                }
            }
        })?);

        tasks.push(spawn_task(format!("{role}-sender"), {
            let (inbox, stop) = (inbox.clone(), stop_rx.clone());
            let outbound = receivers.outbound;
            let mut transport = transport;
            move || loop {
                select! {
                    recv(outbound) -> message => {
                        let Ok(message) = message else { break };
                        forward(message, transport.as_mut(), &inbox);
                    }
                    recv(stop) -> _ => break,
                }
            }
        })?);

        tasks.push(spawn_task(format!("{role}-watchdog"), {
            let mut watchdog = Watchdog::new(role, timing);
            let (router, switch, cell, clock, stop) =
                (router.clone(), switch.clone(), cell.clone(), clock.clone(), stop_rx.clone());
            let tick = millis(timing.watchdog_tick_ms);
            move || {
                every(&stop, tick, || {
                    watch(&mut watchdog, &cell.load(), clock.now_ms(), &router, &switch);
                })
            }
        })?);

        let sample_period = millis(config.detector.sample_interval_ms);
        match config.detector.strategy {
            DetectorStrategy::PulseEcho => {
                let mut detector = PulseEchoDetector::new(source, clock.clone(), &config.detector);
                let (router, switch, stop) = (router.clone(), switch.clone(), stop_rx.clone());
                tasks.push(spawn_task(format!("{role}-detector"), move || {
                    every(&stop, sample_period, || {
                        switch.apply(&mut detector);
                        report(detector.read(), &router);
                    })
                })?);
            }
            DetectorStrategy::Continuous => {
                let detector = Arc::new(Mutex::new(ContinuousDetector::new(
                    source,
                    clock.clone(),
                    &config.detector,
                )));
                tasks.push(spawn_task(format!("{role}-sampler"), {
                    let (detector, switch, stop) =
                        (Arc::clone(&detector), switch.clone(), stop_rx.clone());
                    move || {
                        every(&stop, sample_period, || {
                            let mut detector = detector.lock();
                            switch.apply(&mut *detector);
                            detector.update();
                        })
                    }
                })?);
                tasks.push(spawn_task(format!("{role}-detector"), {
                    let (router, stop) = (router.clone(), stop_rx.clone());
                    move || {
                        every(&stop, sample_period, || {
                            let transition = detector.lock().take_transition();
                            report(transition, &router);
                        })
                    }
                })?);
            }
        }

        tasks.push(spawn_task(format!("{role}-button"), {
            let (router, stop) = (router.clone(), stop_rx.clone());
            let mut button = button;
            let period = millis(timing.button_poll_ms);
            move || {
                every(&stop, period, || {
                    if button.pressed() {
                        info!(%role, "reset pressed");
                        router.reset_both();
                    }
                })
            }
        })?);

        tasks.push(spawn_task(format!("{role}-battery"), {
            let stop = stop_rx;
            let mut battery = battery;
            let period = millis(timing.battery_poll_ms);
            move || {
                let mut monitor = BatteryMonitor::new();
                monitor.poll(battery.as_mut(), indicator.as_mut());
                every(&stop, period, || {
                    monitor.poll(battery.as_mut(), indicator.as_mut());
                })
            }
        })?);

        info!(%role, address = %config.address, peer = %config.peer, "unit running");
        Ok(UnitHandle {
            role,
            cell,
            stats: router.stats(),
            inbox,
            stop: Some(stop_tx),
            tasks,
        })
    }
}

fn spawn_task<F>(name: String, task: F) -> Result<(String, JoinHandle<()>), NodeError>
where
    F: FnOnce() + Send + 'static,
{
    let handle = thread::Builder::new().name(name.clone()).spawn(task)?;
    debug!(task = %name, "task started");
    Ok((name, handle))
}

/// Running unit.
pub struct UnitHandle {
    role: Role,
    cell: SnapshotCell,
    stats: Arc<RouterStats>,
    inbox: Inbox,
    stop: Option<Sender<()>>,
    tasks: Vec<(String, JoinHandle<()>)>,
}

impl UnitHandle {
    /// Role the unit was configured with.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Latest state published by the machine thread.
    pub fn snapshot(&self) -> Snapshot {
        self.cell.load()
    }

    pub fn inbox(&self) -> Inbox {
        self.inbox.clone()
    }

    /// Router counters, live while the unit runs.
    pub fn stats(&self) -> Arc<RouterStats> {
        Arc::clone(&self.stats)
    }

    /// Poll the published snapshot until `done` holds or `timeout` passes.
    pub fn wait_for(
        &self,
        timeout: Duration,
        mut done: impl FnMut(&Snapshot) -> bool,
    ) -> Option<Snapshot> {
        let deadline = Instant::now() + timeout;
        loop {
            let snapshot = self.snapshot();
            if done(&snapshot) {
                return Some(snapshot);
            }
            if Instant::now() >= deadline {
                return None;
            }
            thread::sleep(Duration::from_millis(5));
        }
    }

    /// Stop every task and wait for it to exit.
    pub fn shutdown(mut self) -> Result<(), NodeError> {
        self.stop.take();
        for (name, handle) in std::mem::take(&mut self.tasks) {
            handle.join().map_err(|_| NodeError::TaskPanicked(name))?;
        }
        info!(role = %self.role, "unit stopped");
        Ok(())
    }
}

impl Drop for UnitHandle {
    fn drop(&mut self) {
        self.stop.take();
    }
}
