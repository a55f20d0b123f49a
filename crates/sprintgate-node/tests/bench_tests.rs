use sprintgate_core::config::DetectorStrategy;
use sprintgate_core::{GateConfig, ManualClock, Role, State};
use sprintgate_machine::Screen;
use sprintgate_node::peripherals::ScriptedSource;
use sprintgate_node::{Bench, RadioMedium, SprintScene};

fn within(value: u32, expected: u32, tolerance: u32) -> bool {
    value.abs_diff(expected) <= tolerance
}

#[test]
fn test_units_pair_after_boot() {
    let mut bench = Bench::sprint(&GateConfig::default(), &SprintScene::default(), 0.0).unwrap();
    let finish_ready = bench.run_until_state(Role::Finish, State::Ready, 1_000);
    assert!(finish_ready.is_some());
    let start_ready = bench.run_until_state(Role::Start, State::Ready, 1_000).unwrap();
    assert!(start_ready >= finish_ready.unwrap() + GateConfig::default().timing.ack_delay_ms);
    assert_eq!(
        bench.unit(Role::Start).display().current(),
        Some(Screen::Zero)
    );
}

#[test]
fn test_full_race_measures_sprint() {
    let scene = SprintScene::default();
    let mut bench = Bench::sprint(&GateConfig::default(), &scene, 0.0).unwrap();
    let measured = bench.race(10_000).expect("race should finish");
    assert!(within(measured, scene.sprint_ms, 20), "measured {measured}");

    // FINISH shows the same time once START's result arrives.
    bench.run_until(bench.now() + 50);
    let finish = bench.unit(Role::Finish);
    assert_eq!(finish.snapshot().state, State::Finish);
    assert_eq!(finish.snapshot().measured_time, measured);
    assert_eq!(finish.display().current(), Some(Screen::Final(measured)));
}

#[test]
fn test_pulse_echo_strategy_measures_sprint() {
    let mut config = GateConfig::default();
    config.detector.strategy = DetectorStrategy::PulseEcho;
    let scene = SprintScene {
        sprint_ms: 2_500,
        ..SprintScene::default()
    };
    let mut bench = Bench::sprint(&config, &scene, 0.0).unwrap();
    let measured = bench.race(10_000).expect("race should finish");
    assert!(within(measured, 2_500, 20), "measured {measured}");
}

#[test]
fn test_false_start_does_not_start_run() {
    let config = GateConfig::default();
    let clock = ManualClock::new(0);
    // The runner steps out for 100 ms, comes back, then leaves for real.
    let start = ScriptedSource::new(clock.clone(), 2_000, 1)
        .with_presence(0, 1_000, 350)
        .with_presence(1_100, 3_000, 350);
    let finish = ScriptedSource::new(clock.clone(), 2_000, 2).with_presence(6_000, 6_800, 450);
    let mut bench = Bench::new(
        &config,
        clock,
        RadioMedium::new(3, 0.0),
        Box::new(start),
        Box::new(finish),
    )
    .unwrap();

    assert!(bench
        .run_until_state(Role::Start, State::RunCheck, 1_100)
        .is_some());
    bench.run_until(2_900);
    assert_eq!(bench.unit(Role::Start).snapshot().state, State::Ready);
    assert_eq!(bench.unit(Role::Finish).snapshot().state, State::Ready);

    let measured = bench.race(10_000).expect("race should finish");
    assert!(within(measured, 3_000, 20), "measured {measured}");
}

#[test]
fn test_noisy_sensors_still_measure() {
    let scene = SprintScene {
        jitter_mm: 15,
        timeout_rate: 0.005,
        seed: 7,
        ..SprintScene::default()
    };
    let mut bench = Bench::sprint(&GateConfig::default(), &scene, 0.0).unwrap();
    let measured = bench.race(10_000).expect("race should finish");
    assert!(within(measured, scene.sprint_ms, 40), "measured {measured}");
}

#[test]
fn test_same_seed_replays_same_race() {
    let scene = SprintScene {
        jitter_mm: 20,
        timeout_rate: 0.01,
        seed: 99,
        ..SprintScene::default()
    };
    let run = || {
        let mut bench = Bench::sprint(&GateConfig::default(), &scene, 0.2).unwrap();
        bench.run_until(12_000);
        (
            bench.unit(Role::Start).snapshot(),
            bench.unit(Role::Finish).display().history(),
        )
    };
    assert_eq!(run(), run());
}

#[test]
fn test_reset_mid_run_returns_both_units_to_start() {
    let mut bench = Bench::sprint(&GateConfig::default(), &SprintScene::default(), 0.0).unwrap();
    bench.run_until_state(Role::Finish, State::Run, 3_000).unwrap();

    bench.unit(Role::Start).button().press();
    bench.step();
    assert_eq!(bench.unit(Role::Start).snapshot().state, State::Start);
    assert_eq!(bench.unit(Role::Finish).snapshot().state, State::Start);
    assert_eq!(
        bench.unit(Role::Finish).display().current(),
        Some(Screen::Idle)
    );

    // The handshake starts over on its own.
    let deadline = bench.now() + 2_000;
    assert!(bench
        .run_until_state(Role::Start, State::Ready, deadline)
        .is_some());
}

#[test]
fn test_link_failure_aborts_run_then_recovers() {
    let config = GateConfig::default();
    let mut bench = Bench::sprint(&config, &SprintScene::default(), 0.0).unwrap();
    bench.run_until_state(Role::Start, State::Ready, 1_000).unwrap();
    bench.medium().set_loss(1.0);

    let failed_at = bench
        .run_until_state(Role::Start, State::SendError, 3_000)
        .expect("confirm send should fail");
    assert_eq!(
        bench.unit(Role::Start).display().current(),
        Some(Screen::Error)
    );
    assert!(bench.unit(Role::Start).router().stats().enqueued(sprintgate_node::Queue::Input) > 0);

    let back = bench
        .run_until_state(Role::Start, State::Start, failed_at + config.timing.display_hold_ms + 50)
        .expect("display hold should end the error");
    assert!(back >= failed_at + config.timing.display_hold_ms);
}

#[test]
fn test_unpaired_start_keeps_broadcasting() {
    let mut bench = Bench::sprint(&GateConfig::default(), &SprintScene::default(), 1.0).unwrap();
    bench.run_until(3_000);
    assert_eq!(bench.unit(Role::Start).snapshot().state, State::Start);
    assert_eq!(bench.unit(Role::Finish).snapshot().state, State::Start);

    bench.medium().set_loss(0.0);
    assert!(bench
        .run_until_state(Role::Start, State::Ready, 6_000)
        .is_some());
}
