//! Power limit calculation.
//!
//! | Case | discharge | solar | full passthrough | limit                       |
//! |------|-----------|-------|------------------|-----------------------------|
//! | 1    | no        | no    | any              | 0                           |
//! | 2    | no        | yes   | any              | min(meter, solar AC)        |
//! | 3    | yes       | any   | no               | meter                       |
//! | 4    | yes       | no    | yes              | meter                       |
//! | 5    | yes       | yes   | yes              | max(meter, solar AC)        |
//!
//! "meter" is the net household draw (corrected for a behind-the-meter
//! inverter) minus the target consumption.

/// Rated peak efficiency, used while the inverter does not report one.
pub const FALLBACK_INVERTER_EFFICIENCY: f32 = 0.967;

/// Inputs of a single power limit calculation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LimitInput {
    pub meter_power_w: f32,
    pub inverter_behind_meter: bool,
    pub inverter_ac_power_w: f32,
    pub target_consumption_w: i32,
    /// Solar charger power converted to inverter AC output.
    pub solar_ac_power_w: i32,
    pub solar_enabled: bool,
    pub battery_discharge_enabled: bool,
    /// Only meaningful while battery discharge is enabled.
    pub full_solar_passthrough: bool,
    pub auto_power_active: bool,
}

/// AC output the inverter produces from `dc_power_w` on its DC side.
pub fn inverter_power_dc_to_ac(dc_power_w: i32, efficiency_percent: f32, losses_percent: u8) -> i32 {
    let efficiency = if efficiency_percent > 0.0 {
        efficiency_percent / 100.0
    } else {
        FALLBACK_INVERTER_EFFICIENCY
    };
    let losses = 1.0 - f32::from(losses_percent) / 100.0;

    (dc_power_w as f32 * efficiency * losses) as i32
}

pub fn calc_power_limit(input: &LimitInput) -> i32 {
    if !input.solar_enabled && !input.battery_discharge_enabled {
        return 0;
    }

    let mut metered = input.meter_power_w;
    if input.inverter_behind_meter {
        metered += input.inverter_ac_power_w;
    }

    let mut limit = (metered.round() as i32).saturating_sub(input.target_consumption_w);

    if input.battery_discharge_enabled && input.full_solar_passthrough {
        limit = limit.max(input.solar_ac_power_w);
    } else if input.auto_power_active {
        // the auxiliary source backs off first; the inverter only takes
        // over once it stopped
        return 0;
    }

    if input.solar_enabled && !input.battery_discharge_enabled {
        limit = limit.min(input.solar_ac_power_w);
    }

    limit
}
