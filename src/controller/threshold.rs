use tracing::error;

use crate::config::Config;
use crate::domain::{BatteryStats, ChannelField, ChannelType, Inverter};

/// Battery readings older than this fall back to the voltage thresholds.
const MAX_SOC_AGE_SECONDS: u32 = 60;

/// Compares the battery state against configured thresholds, preferring the
/// BMS state of charge over the inverter's load-corrected DC voltage.
pub struct ThresholdEvaluator<'a> {
    cfg: &'a Config,
    battery: &'a dyn BatteryStats,
    inverter: Option<&'a dyn Inverter>,
}

impl<'a> ThresholdEvaluator<'a> {
    pub fn new(
        cfg: &'a Config,
        battery: &'a dyn BatteryStats,
        inverter: Option<&'a dyn Inverter>,
    ) -> Self {
        Self {
            cfg,
            battery,
            inverter,
        }
    }

    pub fn test_threshold<F>(&self, soc_threshold: f32, volt_threshold: f32, compare: F) -> bool
    where
        F: Fn(f32, f32) -> bool,
    {
        if self.cfg.battery.enabled
            && soc_threshold > 0.0
            && self.battery.is_valid()
            && self.battery.soc_age_seconds() < MAX_SOC_AGE_SECONDS
        {
            return compare(self.battery.soc(), soc_threshold);
        }

        if volt_threshold <= 0.0 {
            return false;
        }

        compare(self.load_corrected_voltage(), volt_threshold)
    }

    /// DC voltage of the configured channel, corrected for the voltage drop
    /// caused by the current AC load.
    pub fn load_corrected_voltage(&self) -> f32 {
        let Some(inverter) = self.inverter else {
            error!("load corrected voltage requested without a bound inverter (programmer error)");
            return 0.0;
        };

        let pl = &self.cfg.power_limiter;
        let ac_power = inverter.channel_field(ChannelType::Ac, 0, ChannelField::Pac);
        let dc_voltage =
            inverter.channel_field(ChannelType::Dc, pl.inverter_channel_id, ChannelField::Udc);

        if dc_voltage <= 0.0 {
            return 0.0;
        }

        dc_voltage + ac_power * pl.voltage_load_correction_factor
    }

    pub fn is_start_threshold_reached(&self) -> bool {
        let pl = &self.cfg.power_limiter;
        self.test_threshold(
            pl.battery_soc_start_threshold as f32,
            pl.voltage_start_threshold,
            |a, b| a >= b,
        )
    }

    pub fn is_stop_threshold_reached(&self) -> bool {
        let pl = &self.cfg.power_limiter;
        self.test_threshold(
            pl.battery_soc_stop_threshold as f32,
            pl.voltage_stop_threshold,
            |a, b| a <= b,
        )
    }

    pub fn is_below_stop_threshold(&self) -> bool {
        let pl = &self.cfg.power_limiter;
        self.test_threshold(
            pl.battery_soc_stop_threshold as f32,
            pl.voltage_stop_threshold,
            |a, b| a < b,
        )
    }

    pub fn is_full_passthrough_start_reached(&self) -> bool {
        let pl = &self.cfg.power_limiter;
        self.test_threshold(
            pl.full_solar_passthrough_soc as f32,
            pl.full_solar_passthrough_start_voltage,
            |a, b| a >= b,
        )
    }

    pub fn is_below_full_passthrough_stop(&self) -> bool {
        let pl = &self.cfg.power_limiter;
        self.test_threshold(
            pl.full_solar_passthrough_soc as f32,
            pl.full_solar_passthrough_stop_voltage,
            |a, b| a < b,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MockBatteryStats, SimulatedInverter};
    use rstest::rstest;

    fn battery(valid: bool, soc: f32, age: u32) -> MockBatteryStats {
        let mut b = MockBatteryStats::new();
        b.expect_is_valid().return_const(valid);
        b.expect_soc().return_const(soc);
        b.expect_soc_age_seconds().return_const(age);
        b
    }

    fn inverter_with(dc_voltage: f32, ac_power: f32) -> SimulatedInverter {
        let inverter = SimulatedInverter::new(1, 800, 2);
        inverter.update(|st| {
            st.dc_channels[0].voltage_v = dc_voltage;
            st.ac_power_w = ac_power;
        });
        inverter
    }

    fn config(battery_enabled: bool) -> Config {
        let mut cfg = Config::default();
        cfg.battery.enabled = battery_enabled;
        cfg.power_limiter.voltage_load_correction_factor = 0.01;
        cfg
    }

    #[rstest]
    #[case(true, 30.0, 10, true)]
    #[case(true, 30.0, 60, false)]
    #[case(false, 30.0, 10, false)]
    fn test_soc_preferred_when_fresh(
        #[case] valid: bool,
        #[case] soc: f32,
        #[case] age: u32,
        #[case] uses_soc: bool,
    ) {
        let cfg = config(true);
        let b = battery(valid, soc, age);
        // 48 V + 100 W * 0.01 = 49 V
        let inv = inverter_with(48.0, 100.0);
        let eval = ThresholdEvaluator::new(&cfg, &b, Some(&inv));

        // SoC 30 >= 25 holds, voltage 49 >= 50 does not
        let reached = eval.test_threshold(25.0, 50.0, |a, b| a >= b);
        assert_eq!(reached, uses_soc);
    }

    #[test]
    fn test_soc_ignored_when_battery_integration_disabled() {
        let cfg = config(false);
        let b = battery(true, 90.0, 0);
        let inv = inverter_with(48.0, 0.0);
        let eval = ThresholdEvaluator::new(&cfg, &b, Some(&inv));
        assert!(!eval.test_threshold(80.0, 50.0, |a, b| a >= b));
    }

    #[test]
    fn test_zero_soc_threshold_falls_back_to_voltage() {
        let cfg = config(true);
        let b = battery(true, 90.0, 0);
        let inv = inverter_with(52.0, 0.0);
        let eval = ThresholdEvaluator::new(&cfg, &b, Some(&inv));
        assert!(eval.test_threshold(0.0, 50.0, |a, b| a >= b));
    }

    #[test]
    fn test_no_fallback_without_voltage_threshold() {
        let cfg = config(false);
        let b = battery(false, 0.0, 0);
        let inv = inverter_with(52.0, 0.0);
        let eval = ThresholdEvaluator::new(&cfg, &b, Some(&inv));
        // even "always true" comparisons fail without a usable threshold
        assert!(!eval.test_threshold(0.0, 0.0, |_, _| true));
    }

    #[test]
    fn test_load_corrected_voltage() {
        let cfg = config(false);
        let b = battery(false, 0.0, 0);
        let inv = inverter_with(48.0, 250.0);
        let eval = ThresholdEvaluator::new(&cfg, &b, Some(&inv));
        assert!((eval.load_corrected_voltage() - 50.5).abs() < 1e-4);
    }

    #[test]
    fn test_load_corrected_voltage_without_dc_reading() {
        let cfg = config(false);
        let b = battery(false, 0.0, 0);
        let inv = inverter_with(0.0, 250.0);
        let eval = ThresholdEvaluator::new(&cfg, &b, Some(&inv));
        assert_eq!(eval.load_corrected_voltage(), 0.0);
    }

    #[test]
    fn test_load_corrected_voltage_without_inverter() {
        let cfg = config(false);
        let b = battery(false, 0.0, 0);
        let eval = ThresholdEvaluator::new(&cfg, &b, None);
        assert_eq!(eval.load_corrected_voltage(), 0.0);
        assert!(!eval.is_start_threshold_reached());
    }

    #[test]
    fn test_stop_versus_below_stop_at_boundary() {
        let mut cfg = config(true);
        cfg.power_limiter.battery_soc_stop_threshold = 20;
        let b = battery(true, 20.0, 0);
        let eval = ThresholdEvaluator::new(&cfg, &b, None);
        assert!(eval.is_stop_threshold_reached());
        assert!(!eval.is_below_stop_threshold());
    }
}
