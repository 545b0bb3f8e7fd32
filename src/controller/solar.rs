use crate::config::PowerLimiterConfig;
use crate::domain::SolarCharger;

use super::threshold::ThresholdEvaluator;

/// Panel power below which direct solar use is not worth it.
const MIN_DIRECT_SOLAR_POWER_W: f32 = 20.0;

/// Decides whether and how much solar power may be passed through directly.
pub struct SolarOracle<'a> {
    cfg: &'a PowerLimiterConfig,
    charger: &'a dyn SolarCharger,
    thresholds: &'a ThresholdEvaluator<'a>,
}

impl<'a> SolarOracle<'a> {
    pub fn new(
        cfg: &'a PowerLimiterConfig,
        charger: &'a dyn SolarCharger,
        thresholds: &'a ThresholdEvaluator<'a>,
    ) -> Self {
        Self {
            cfg,
            charger,
            thresholds,
        }
    }

    pub fn can_use_direct_solar_power(&self) -> bool {
        if !self.cfg.solar_passthrough_enabled
            || self.thresholds.is_below_stop_threshold()
            || !self.charger.is_enabled()
            || !self.charger.is_data_valid()
        {
            return false;
        }

        self.charger.panel_power() >= MIN_DIRECT_SOLAR_POWER_W
    }

    /// Charger output power in whole watts, 0 when it may not be used.
    pub fn solar_charge_power(&self) -> i32 {
        if !self.can_use_direct_solar_power() {
            return 0;
        }

        (self.charger.voltage() * self.charger.current()) as i32
    }
}

/// Sticky full-solar-passthrough flag.
///
/// Engages at the start threshold, disengages below the stop threshold and
/// keeps its value in between.
#[derive(Debug, Default, Clone, Copy)]
pub struct FullPassthroughLatch {
    engaged: bool,
}

impl FullPassthroughLatch {
    pub fn update(&mut self, cfg: &PowerLimiterConfig, thresholds: &ThresholdEvaluator<'_>) -> bool {
        if !cfg.solar_passthrough_enabled {
            return false;
        }

        if thresholds.is_full_passthrough_start_reached() {
            self.engaged = true;
        }

        if thresholds.is_below_full_passthrough_stop() {
            self.engaged = false;
        }

        self.engaged
    }
}
