pub mod announce;
pub mod calc;
pub mod commit;
pub mod discharge;
pub mod handle;
pub mod limiter;
pub mod restart;
pub mod solar;
pub mod status;
pub mod threshold;

use anyhow::Result;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::Config;
use crate::domain::{
    AutoPowerSwitch, Clock, Inverter, SimulatedBattery, SimulatedInverter, SimulatedPowerMeter,
    SimulatedSolarCharger, SystemClock,
};
use crate::simulation::HouseholdSimulator;

pub use announce::{StatusAnnouncer, StatusSink, TracingStatusSink};
pub use handle::{LimiterHandle, LimiterSnapshot};
pub use limiter::{Collaborators, DynamicPowerLimiter};
pub use status::{Mode, PowerLimiterState, Status};

#[derive(Clone)]
pub struct AppState {
    pub handle: LimiterHandle,
    pub limiter: Arc<Mutex<DynamicPowerLimiter>>,
    pub household: Arc<Mutex<HouseholdSimulator>>,
}

impl AppState {
    /// Wires the limiter to a simulated household.
    pub fn new(cfg: Config) -> Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
        Self::with_clock(cfg, clock)
    }

    pub fn with_clock(cfg: Config, clock: Arc<dyn Clock>) -> Result<Self> {
        let sim = cfg.simulation.clone();
        anyhow::ensure!(sim.inverter_max_power_w > 0, "simulated inverter needs a max power");

        let inverter = Arc::new(SimulatedInverter::new(
            sim.inverter_serial,
            sim.inverter_max_power_w,
            sim.inverter_dc_channels,
        ));
        let meter = Arc::new(SimulatedPowerMeter::new());
        let charger = Arc::new(SimulatedSolarCharger::new(cfg.solar_charger.enabled));
        let battery = Arc::new(SimulatedBattery::new(clock.clone()));

        // the configured inverter position is resolved against this list
        let fleet: Vec<Arc<dyn Inverter>> = vec![inverter.clone() as Arc<dyn Inverter>];

        let io = Collaborators {
            inverters: Arc::new(fleet),
            power_meter: meter.clone(),
            solar_charger: charger.clone(),
            battery: battery.clone(),
            auto_power: Arc::new(AutoPowerSwitch::new(false)),
            clock: clock.clone(),
        };

        let household =
            HouseholdSimulator::new(sim, clock, inverter, meter, charger, battery);
        let handle = LimiterHandle::new(cfg);
        let limiter = DynamicPowerLimiter::new(io, handle.clone(), Arc::new(TracingStatusSink));

        Ok(Self {
            handle,
            limiter: Arc::new(Mutex::new(limiter)),
            household: Arc::new(Mutex::new(household)),
        })
    }
}

pub fn spawn_controller_tasks(state: AppState, cfg: &Config) {
    let limiter = state.limiter.clone();
    let tick_ms = cfg.controller.tick_interval_ms.max(1);
    tokio::spawn(async move {
        info!(tick_ms, "power limiter loop started");
        let mut interval = tokio::time::interval(Duration::from_millis(tick_ms));
        loop {
            interval.tick().await;
            limiter.lock().tick();
        }
    });

    let household = state.household.clone();
    let step_ms = cfg.simulation.step_ms.max(1);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(step_ms));
        loop {
            interval.tick().await;
            household.lock().step();
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ManualClock;
    use chrono::NaiveDate;

    #[test]
    fn test_simulated_household_drives_limiter() {
        let mut cfg = Config::default();
        cfg.power_limiter.enabled = true;
        cfg.power_limiter.solar_passthrough_enabled = false;
        let local = NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(20, 0, 0);
        let clock = Arc::new(ManualClock::new(local));
        let state = AppState::with_clock(cfg, clock.clone()).unwrap();

        clock.advance(10_000);
        state.household.lock().step();
        state.limiter.lock().tick();

        // evening load, charged battery: the limiter asks for power
        assert!(state.handle.last_requested_power_limit() > 0);
        assert_eq!(state.handle.power_limiter_state(), PowerLimiterState::Charging);
    }
}
