//! Deterministic household model feeding the simulated collaborators.
//!
//! Solar output follows a half sine between 06:00 and 18:00, the household
//! load a fixed time-of-day profile. The battery sits between the solar
//! charger and the inverter's DC input, so its voltage is what the inverter
//! reports on every DC channel.

use chrono::{NaiveDateTime, Timelike};
use serde::Serialize;
use std::f32::consts::PI;
use std::sync::Arc;
use tracing::debug;

use crate::config::SimulationConfig;
use crate::domain::{
    Clock, DcChannel, SimulatedBattery, SimulatedInverter, SimulatedPowerMeter,
    SimulatedSolarCharger, SolarChargerReading,
};

/// Efficiency the simulated inverter reports while producing.
const INVERTER_EFFICIENCY_PERCENT: f32 = 96.5;
const EMPTY_BATTERY_VOLTAGE: f32 = 46.0;
const FULL_BATTERY_VOLTAGE: f32 = 54.0;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct HouseholdState {
    pub solar_w: f32,
    pub load_w: f32,
    pub inverter_ac_w: f32,
    pub grid_w: f32,
    pub soc_percent: f32,
    pub battery_voltage_v: f32,
}

/// Load multiplier by hour of day, relative to the configured base load.
pub fn load_multiplier(hour: f32) -> f32 {
    if hour < 6.0 {
        0.5
    } else if hour < 9.0 {
        1.5 + (hour - 6.0) * 0.3
    } else if hour < 16.0 {
        1.0
    } else if hour < 21.0 {
        2.0 + (hour - 16.0) * 0.2
    } else {
        2.5 - (hour - 21.0) * 0.5
    }
}

/// Fraction of the solar peak available at `hour`.
pub fn solar_fraction(hour: f32) -> f32 {
    if !(6.0..18.0).contains(&hour) {
        return 0.0;
    }
    (PI * (hour - 6.0) / 12.0).sin().max(0.0)
}

fn fractional_hour(local: Option<NaiveDateTime>) -> f32 {
    local.map_or(0.0, |t| {
        t.hour() as f32 + t.minute() as f32 / 60.0 + t.second() as f32 / 3600.0
    })
}

pub struct HouseholdSimulator {
    cfg: SimulationConfig,
    clock: Arc<dyn Clock>,
    inverter: Arc<SimulatedInverter>,
    meter: Arc<SimulatedPowerMeter>,
    charger: Arc<SimulatedSolarCharger>,
    battery: Arc<SimulatedBattery>,
    soc_percent: f32,
    last_step_at: Option<u64>,
}

impl HouseholdSimulator {
    pub fn new(
        cfg: SimulationConfig,
        clock: Arc<dyn Clock>,
        inverter: Arc<SimulatedInverter>,
        meter: Arc<SimulatedPowerMeter>,
        charger: Arc<SimulatedSolarCharger>,
        battery: Arc<SimulatedBattery>,
    ) -> Self {
        let soc_percent = cfg.battery_initial_soc_percent;
        Self {
            cfg,
            clock,
            inverter,
            meter,
            charger,
            battery,
            soc_percent,
            last_step_at: None,
        }
    }

    pub fn battery_voltage(&self) -> f32 {
        EMPTY_BATTERY_VOLTAGE + (FULL_BATTERY_VOLTAGE - EMPTY_BATTERY_VOLTAGE) * self.soc_percent / 100.0
    }

    /// Advances the model to the clock's current time and publishes fresh
    /// readings on all simulated devices.
    pub fn step(&mut self) -> HouseholdState {
        let now = self.clock.millis();
        let dt_hours = self
            .last_step_at
            .map_or(0.0, |last| now.saturating_sub(last) as f32 / 3_600_000.0);
        self.last_step_at = Some(now);

        // the radio round trip completes between two steps
        self.inverter.acknowledge_commands(now);

        let hour = fractional_hour(self.clock.local_time());
        let solar_w = self.cfg.solar_peak_w * solar_fraction(hour);
        let load_w = self.cfg.household_load_w * load_multiplier(hour);

        let inverter = self.inverter.snapshot();
        let battery_empty = self.soc_percent <= 0.0 && solar_w <= 0.0;
        let inverter_ac_w = if inverter.producing && !battery_empty {
            inverter.limit_w.min(f32::from(inverter.max_power_w))
        } else {
            0.0
        };
        let inverter_dc_w = inverter_ac_w * 100.0 / INVERTER_EFFICIENCY_PERCENT;

        if self.cfg.battery_capacity_wh > 0.0 {
            let delta_wh = (solar_w - inverter_dc_w) * dt_hours;
            self.soc_percent =
                (self.soc_percent + delta_wh / self.cfg.battery_capacity_wh * 100.0).clamp(0.0, 100.0);
        }
        let voltage = self.battery_voltage();

        let channels = inverter.dc_channels.len().max(1) as f32;
        self.inverter.update(|st| {
            st.ac_power_w = inverter_ac_w;
            st.efficiency_percent = if inverter_ac_w > 0.0 {
                INVERTER_EFFICIENCY_PERCENT
            } else {
                0.0
            };
            for ch in st.dc_channels.iter_mut() {
                *ch = DcChannel {
                    voltage_v: voltage,
                    power_w: inverter_dc_w / channels,
                };
            }
            st.stats_updated_at = now;
        });

        self.charger.set_reading(SolarChargerReading {
            data_valid: true,
            voltage_v: voltage,
            current_a: solar_w / voltage,
            panel_power_w: solar_w,
        });

        let grid_w = load_w - inverter_ac_w;
        self.meter.set_reading(grid_w, now);
        self.battery.set_soc(self.soc_percent);

        let state = HouseholdState {
            solar_w,
            load_w,
            inverter_ac_w,
            grid_w,
            soc_percent: self.soc_percent,
            battery_voltage_v: voltage,
        };
        debug!(?state, "household step");
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        BatteryStats, ChannelField, ChannelType, Inverter, ManualClock, PowerLimitControlType,
        PowerMeter, SolarCharger,
    };
    use chrono::NaiveDate;

    struct Sim {
        clock: Arc<ManualClock>,
        inverter: Arc<SimulatedInverter>,
        meter: Arc<SimulatedPowerMeter>,
        charger: Arc<SimulatedSolarCharger>,
        battery: Arc<SimulatedBattery>,
        house: HouseholdSimulator,
    }

    fn sim(hour: u32) -> Sim {
        let local = NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(hour, 0, 0);
        let clock = Arc::new(ManualClock::new(local));
        let inverter = Arc::new(SimulatedInverter::new(1, 800, 2));
        let meter = Arc::new(SimulatedPowerMeter::new());
        let charger = Arc::new(SimulatedSolarCharger::new(true));
        let battery = Arc::new(SimulatedBattery::new(clock.clone()));
        let house = HouseholdSimulator::new(
            SimulationConfig::default(),
            clock.clone(),
            inverter.clone(),
            meter.clone(),
            charger.clone(),
            battery.clone(),
        );
        Sim {
            clock,
            inverter,
            meter,
            charger,
            battery,
            house,
        }
    }

    #[test]
    fn test_profiles() {
        assert_eq!(solar_fraction(3.0), 0.0);
        assert_eq!(solar_fraction(20.0), 0.0);
        assert!((solar_fraction(12.0) - 1.0).abs() < 1e-6);
        assert!(load_multiplier(18.0) > load_multiplier(12.0));
        assert!(load_multiplier(2.0) < load_multiplier(12.0));
    }

    #[test]
    fn test_night_without_inverter_draws_from_grid() {
        let mut s = sim(2);
        let state = s.house.step();

        assert_eq!(state.solar_w, 0.0);
        assert_eq!(state.grid_w, state.load_w);
        assert_eq!(s.meter.total_power(true), state.load_w);
        assert!(s.charger.is_data_valid());
        assert!(s.battery.is_valid());
    }

    #[test]
    fn test_producing_inverter_offsets_grid_draw() {
        let mut s = sim(12);
        s.inverter.send_active_power_limit(200.0, PowerLimitControlType::AbsoluteNonPersistent);
        s.inverter.send_power_on_off(true);
        let state = s.house.step();

        assert_eq!(state.inverter_ac_w, 200.0);
        assert_eq!(state.grid_w, state.load_w - 200.0);
        assert_eq!(s.inverter.last_stats_update(), s.clock.millis());
        assert!(s.inverter.channel_field(ChannelType::Dc, 1, ChannelField::Pdc) > 2.0);
    }

    #[test]
    fn test_idle_inverter_charges_battery_in_sunshine() {
        let mut s = sim(12);
        let before = s.house.step().soc_percent;
        s.clock.advance(3_600_000);
        let after = s.house.step().soc_percent;
        assert!(after > before);
        assert!(s.house.battery_voltage() > EMPTY_BATTERY_VOLTAGE);
    }
}
