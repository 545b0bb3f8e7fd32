//! Closed-loop runs of the limiter against the simulated household.

use chrono::NaiveDate;
use std::sync::Arc;
use tokio::task::JoinSet;

use dynamic_power_limiter::config::Config;
use dynamic_power_limiter::controller::{AppState, Mode, PowerLimiterState, Status};
use dynamic_power_limiter::domain::ManualClock;

const TICK_MS: u64 = 100;
const STEP_MS: u64 = 1_000;

fn setup(hour: u32, soc_percent: f32, configure: impl FnOnce(&mut Config)) -> (Arc<ManualClock>, AppState) {
    let mut cfg = Config::default();
    cfg.power_limiter.enabled = true;
    cfg.simulation.battery_initial_soc_percent = soc_percent;
    configure(&mut cfg);

    let clock = Arc::new(ManualClock::new(
        NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(hour, 0, 0),
    ));
    let state = AppState::with_clock(cfg, clock.clone()).unwrap();
    (clock, state)
}

/// Runs the household and the limiter for `minutes` of simulated time.
fn run(clock: &ManualClock, state: &AppState, minutes: u64) {
    let ticks = minutes * 60_000 / TICK_MS;
    for i in 0..ticks {
        if (i * TICK_MS) % STEP_MS == 0 {
            state.household.lock().step();
        }
        state.limiter.lock().tick();
        clock.advance(TICK_MS);
    }
    state.household.lock().step();
}

#[test]
fn test_evening_load_is_covered_up_to_upper_limit() {
    let (clock, state) = setup(20, 60.0, |_| {});
    run(&clock, &state, 10);

    let house = state.household.lock().step();
    assert_eq!(state.handle.last_requested_power_limit(), 800);
    assert_eq!(house.inverter_ac_w, 800.0);
    assert!((house.grid_w - (house.load_w - 800.0)).abs() < 1.0);
    assert_eq!(
        state.handle.power_limiter_state(),
        PowerLimiterState::UseSolarAndBattery
    );
}

#[test]
fn test_midday_solar_zeroes_grid_draw() {
    let (clock, state) = setup(12, 45.0, |_| {});
    run(&clock, &state, 10);

    let house = state.household.lock().step();
    assert_eq!(state.handle.last_requested_power_limit(), 350);
    assert!(house.grid_w.abs() < 1.0);
}

#[test]
fn test_disabled_limiter_never_starts_inverter() {
    let (clock, state) = setup(20, 60.0, |cfg| cfg.power_limiter.enabled = false);
    run(&clock, &state, 2);

    assert_eq!(state.handle.status(), Status::DisabledByConfig);
    assert_eq!(state.handle.last_requested_power_limit(), 0);
    assert_eq!(state.household.lock().step().inverter_ac_w, 0.0);
}

#[test]
fn test_remote_disable_stops_running_inverter() {
    let (clock, state) = setup(20, 60.0, |_| {});
    run(&clock, &state, 1);
    assert!(state.household.lock().step().inverter_ac_w > 0.0);

    state.handle.set_mode(Mode::Disabled);
    run(&clock, &state, 1);

    assert_eq!(state.handle.status(), Status::DisabledByMqtt);
    assert_eq!(state.handle.power_limiter_state(), PowerLimiterState::Inactive);
    assert_eq!(state.household.lock().step().inverter_ac_w, 0.0);
}

#[test]
fn test_empty_battery_stops_discharge() {
    // 46 V + 8 V * 30 % = 48.4 V, below the 49 V stop threshold
    let (clock, state) = setup(22, 30.0, |_| {});
    run(&clock, &state, 2);

    assert_eq!(state.handle.last_requested_power_limit(), 0);
    assert_eq!(state.household.lock().step().inverter_ac_w, 0.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_mode_changes_race_with_control_loop() {
    let (clock, state) = setup(20, 60.0, |_| {});
    let mut tasks = JoinSet::new();

    for worker in 0..4u8 {
        let state = state.clone();
        let clock = clock.clone();
        tasks.spawn(async move {
            for i in 0..200u32 {
                if worker == 0 {
                    state.household.lock().step();
                    state.limiter.lock().tick();
                    clock.advance(TICK_MS);
                } else {
                    let mode = Mode::try_from((i % 3) as u8).unwrap_or_default();
                    state.handle.set_mode(mode);
                    let _ = state.handle.snapshot();
                }
                tokio::task::yield_now().await;
            }
        });
    }

    while let Some(res) = tasks.join_next().await {
        res.unwrap();
    }

    state.handle.set_mode(Mode::Normal);
    run(&clock, &state, 1);
    assert_ne!(state.handle.status(), Status::DisabledByMqtt);
    assert_eq!(state.handle.mode(), Mode::Normal);
}
