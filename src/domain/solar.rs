use parking_lot::RwLock;
use serde::Serialize;

/// MPPT solar charger readings.
#[cfg_attr(test, mockall::automock)]
pub trait SolarCharger: Send + Sync {
    fn is_enabled(&self) -> bool;
    /// Whether the last frame is complete and recent.
    fn is_data_valid(&self) -> bool;
    /// Battery-side output voltage (V).
    fn voltage(&self) -> f32;
    /// Battery-side output current (A).
    fn current(&self) -> f32;
    /// Instantaneous panel power (W).
    fn panel_power(&self) -> f32;
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SolarChargerReading {
    pub data_valid: bool,
    pub voltage_v: f32,
    pub current_a: f32,
    pub panel_power_w: f32,
}

#[derive(Debug)]
pub struct SimulatedSolarCharger {
    enabled: bool,
    reading: RwLock<SolarChargerReading>,
}

impl SimulatedSolarCharger {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            reading: RwLock::new(SolarChargerReading::default()),
        }
    }

    pub fn set_reading(&self, reading: SolarChargerReading) {
        *self.reading.write() = reading;
    }
}

impl SolarCharger for SimulatedSolarCharger {
    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn is_data_valid(&self) -> bool {
        self.reading.read().data_valid
    }

    fn voltage(&self) -> f32 {
        self.reading.read().voltage_v
    }

    fn current(&self) -> f32 {
        self.reading.read().current_a
    }

    fn panel_power(&self) -> f32 {
        self.reading.read().panel_power_w
    }
}
