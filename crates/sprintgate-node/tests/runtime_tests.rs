use std::sync::Arc;
use std::time::Duration;

use sprintgate_core::{Clock, GateConfig, Role, State, SystemClock};
use sprintgate_detect::{DistanceSource, Reading, SensorError};
use sprintgate_machine::Screen;
use sprintgate_node::peripherals::{
    Color, ConsoleDisplay, FixedBattery, IndicatorCommand, LogIndicator, SimButton,
};
use sprintgate_node::{NodeError, Peripherals, RadioMedium, SprintScene, Unit, UnitHandle};

struct Rig {
    start: UnitHandle,
    finish: UnitHandle,
    finish_display: ConsoleDisplay,
    start_led: LogIndicator,
    start_button: SimButton,
}

fn peripherals(
    config: &GateConfig,
    medium: &RadioMedium,
    source: Box<dyn DistanceSource>,
    display: ConsoleDisplay,
    indicator: LogIndicator,
    button: SimButton,
) -> Peripherals {
    Peripherals {
        source,
        transport: Box::new(medium.link(config.address, config.peer)),
        display: Box::new(display),
        indicator: Box::new(indicator),
        battery: Box::new(FixedBattery(35)),
        button: Box::new(button),
    }
}

fn spawn_pair(scene: &SprintScene) -> Rig {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    let medium = RadioMedium::new(scene.seed, 0.0);
    let (start_config, finish_config) = GateConfig::default().pair();

    let start = Unit::new(start_config.clone(), clock.clone()).unwrap();
    let finish = Unit::new(finish_config.clone(), clock.clone()).unwrap();
    medium.register(start_config.address, start.inbox());
    medium.register(finish_config.address, finish.inbox());

    let finish_display = ConsoleDisplay::new("finish");
    let start_led = LogIndicator::new("start");
    let start_button = SimButton::new();
    let start = start
        .spawn(peripherals(
            &start_config,
            &medium,
            Box::new(scene.start_source(clock.clone())),
            ConsoleDisplay::new("start"),
            start_led.clone(),
            start_button.clone(),
        ))
        .unwrap();
    let finish = finish
        .spawn(peripherals(
            &finish_config,
            &medium,
            Box::new(scene.finish_source(clock)),
            finish_display.clone(),
            LogIndicator::new("finish"),
            SimButton::new(),
        ))
        .unwrap();

    Rig {
        start,
        finish,
        finish_display,
        start_led,
        start_button,
    }
}

#[test]
fn test_threaded_race_measures_sprint() {
    let scene = SprintScene {
        sprint_ms: 2_000,
        ..SprintScene::default()
    };
    let rig = spawn_pair(&scene);

    let done = rig
        .start
        .wait_for(Duration::from_secs(8), |s| s.state == State::Finish)
        .expect("race should finish");
    assert!(
        done.measured_time.abs_diff(2_000) <= 150,
        "measured {}",
        done.measured_time
    );

    let finish = rig
        .finish
        .wait_for(Duration::from_secs(2), |s| s.state == State::Finish)
        .expect("finish unit should show the result");
    assert_eq!(finish.measured_time, done.measured_time);
    assert_eq!(
        rig.finish_display.current(),
        Some(Screen::Final(done.measured_time))
    );

    // 35 % battery.
    assert_eq!(
        rig.start_led.last(),
        Some(IndicatorCommand::Solid(Color::Yellow))
    );

    rig.start.shutdown().unwrap();
    rig.finish.shutdown().unwrap();
}

#[test]
fn test_threaded_reset_is_relayed() {
    let rig = spawn_pair(&SprintScene::default());
    rig.finish
        .wait_for(Duration::from_secs(3), |s| s.state == State::Ready)
        .expect("units should pair");
    let epoch = rig.finish.snapshot().epoch;

    rig.start_button.press();
    let reset = rig
        .finish
        .wait_for(Duration::from_secs(3), |s| s.epoch > epoch)
        .expect("reset should reach the finish unit");
    assert!(matches!(reset.state, State::Start | State::Ready));
    assert_eq!(rig.start.role(), Role::Start);

    rig.start.shutdown().unwrap();
    rig.finish.shutdown().unwrap();
}

struct DeadSensor;

impl DistanceSource for DeadSensor {
    fn init(&mut self) -> Result<(), SensorError> {
        Err(SensorError::NotResponding("no ack on i2c".into()))
    }

    fn sample(&mut self) -> Reading {
        Reading::Timeout
    }
}

#[test]
fn test_sensor_failure_shows_error_and_refuses_to_start() {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    let medium = RadioMedium::new(1, 0.0);
    let config = GateConfig::default();
    let display = ConsoleDisplay::new("start");
    let led = LogIndicator::new("start");
    let unit = Unit::new(config.clone(), clock).unwrap();

    let result = unit.spawn(peripherals(
        &config,
        &medium,
        Box::new(DeadSensor),
        display.clone(),
        led.clone(),
        SimButton::new(),
    ));
    assert!(matches!(result, Err(NodeError::Sensor(_))));
    assert_eq!(display.current(), Some(Screen::Error));
    assert_eq!(led.last(), Some(IndicatorCommand::BOOT));
}

#[test]
fn test_invalid_config_is_rejected() {
    let mut config = GateConfig::default();
    config.peer = config.address;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    assert!(matches!(
        Unit::new(config, clock),
        Err(NodeError::Config(_))
    ));
}
