use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;

use super::Clock;

/// Battery management system readings consumed by the power limiter.
#[cfg_attr(test, mockall::automock)]
pub trait BatteryStats: Send + Sync {
    fn is_valid(&self) -> bool;
    /// State of charge in percent.
    fn soc(&self) -> f32;
    /// Seconds since the state of charge was last updated.
    fn soc_age_seconds(&self) -> u32;
}

#[derive(Debug, Clone, Copy, Serialize)]
struct Reading {
    soc_percent: f32,
    updated_at: Option<u64>,
}

/// Battery fed by the simulation; readings age with the supplied clock.
pub struct SimulatedBattery {
    clock: Arc<dyn Clock>,
    reading: RwLock<Reading>,
}

impl SimulatedBattery {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            reading: RwLock::new(Reading {
                soc_percent: 0.0,
                updated_at: None,
            }),
        }
    }

    pub fn set_soc(&self, soc_percent: f32) {
        let now = self.clock.millis();
        *self.reading.write() = Reading {
            soc_percent: soc_percent.clamp(0.0, 100.0),
            updated_at: Some(now),
        };
    }
}

impl BatteryStats for SimulatedBattery {
    fn is_valid(&self) -> bool {
        self.reading.read().updated_at.is_some()
    }

    fn soc(&self) -> f32 {
        self.reading.read().soc_percent
    }

    fn soc_age_seconds(&self) -> u32 {
        match self.reading.read().updated_at {
            Some(at) => {
                let age = self.clock.millis().saturating_sub(at) / 1000;
                u32::try_from(age).unwrap_or(u32::MAX)
            }
            None => u32::MAX,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ManualClock;

    #[test]
    fn test_soc_ages_with_clock() {
        let clock = Arc::new(ManualClock::new(None));
        let battery = SimulatedBattery::new(clock.clone());
        assert!(!battery.is_valid());

        battery.set_soc(55.0);
        clock.advance(61_000);
        assert!(battery.is_valid());
        assert_eq!(battery.soc(), 55.0);
        assert_eq!(battery.soc_age_seconds(), 61);
    }

    #[test]
    fn test_soc_is_clamped() {
        let clock = Arc::new(ManualClock::new(None));
        let battery = SimulatedBattery::new(clock);
        battery.set_soc(140.0);
        assert_eq!(battery.soc(), 100.0);
    }
}
