use std::sync::atomic::{AtomicBool, Ordering};

/// Auxiliary power source (e.g. a grid-charging PSU) that takes priority
/// over battery discharge while it is in automatic mode.
#[cfg_attr(test, mockall::automock)]
pub trait AutoPowerSource: Send + Sync {
    fn is_auto_power_active(&self) -> bool;
}

/// Switchable stand-in for installations without or with a simulated PSU.
#[derive(Debug, Default)]
pub struct AutoPowerSwitch {
    active: AtomicBool,
}

impl AutoPowerSwitch {
    pub fn new(active: bool) -> Self {
        Self {
            active: AtomicBool::new(active),
        }
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }
}

impl AutoPowerSource for AutoPowerSwitch {
    fn is_auto_power_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}
