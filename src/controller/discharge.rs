use crate::config::{BatteryDrainStrategy, PowerLimiterConfig, CALCULATION_BACKOFF_CAP_MS};

/// Battery facts the discharge policy decides on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DischargeInputs {
    pub stop_threshold_reached: bool,
    pub start_threshold_reached: bool,
    pub direct_solar_available: bool,
}

/// Next value of the battery-discharge flag. Conditions that do not match
/// leave `current` as it is.
pub fn next_discharge_enabled(cfg: &PowerLimiterConfig, input: DischargeInputs, current: bool) -> bool {
    if input.stop_threshold_reached {
        return false;
    }

    if !cfg.solar_passthrough_enabled {
        return current || input.start_threshold_reached;
    }

    match cfg.battery_drain_strategy {
        BatteryDrainStrategy::EmptyAtNight => {
            input.start_threshold_reached || !input.direct_solar_available
        }
        BatteryDrainStrategy::EmptyWhenFull => current || input.start_threshold_reached,
    }
}

/// Poll interval of the limit calculation. Grows while nothing changes.
#[derive(Debug, Clone, Copy)]
pub struct CalculationBackoff {
    default_ms: u32,
    current_ms: u32,
}

impl CalculationBackoff {
    pub fn new(default_ms: u32) -> Self {
        let default_ms = default_ms.clamp(1, CALCULATION_BACKOFF_CAP_MS);
        Self {
            default_ms,
            current_ms: default_ms,
        }
    }

    pub fn current_ms(&self) -> u32 {
        self.current_ms
    }

    pub fn increase(&mut self) {
        self.current_ms = self
            .current_ms
            .saturating_mul(2)
            .min(CALCULATION_BACKOFF_CAP_MS);
    }

    pub fn reset(&mut self) {
        self.current_ms = self.default_ms;
    }
}
