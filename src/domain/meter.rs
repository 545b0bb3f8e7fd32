use parking_lot::RwLock;

/// Household power meter.
#[cfg_attr(test, mockall::automock)]
pub trait PowerMeter: Send + Sync {
    /// Net power draw in watts (negative when exporting).
    fn total_power(&self, corrected_for_local_inverter: bool) -> f32;
    /// Time (ms) of the most recent reading.
    fn last_update(&self) -> u64;
}

#[derive(Debug, Default)]
pub struct SimulatedPowerMeter {
    reading: RwLock<(f32, u64)>,
}

impl SimulatedPowerMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_reading(&self, total_power_w: f32, at_ms: u64) {
        *self.reading.write() = (total_power_w, at_ms);
    }
}

impl PowerMeter for SimulatedPowerMeter {
    fn total_power(&self, _corrected_for_local_inverter: bool) -> f32 {
        self.reading.read().0
    }

    fn last_update(&self) -> u64 {
        self.reading.read().1
    }
}
