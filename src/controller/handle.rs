use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use tracing::info;
use validator::Validate;

use crate::config::{Config, ConfigError, PowerLimiterConfig};

use super::status::{Mode, PowerLimiterState, Status};

/// Point-in-time view of the limiter for status displays.
#[derive(Debug, Clone, Serialize)]
pub struct LimiterSnapshot {
    pub status: Status,
    pub status_text: &'static str,
    pub mode: Mode,
    pub mode_code: u8,
    pub power_limiter_state: PowerLimiterState,
    pub last_requested_power_limit: i32,
}

struct Shared {
    mode: RwLock<Mode>,
    status: RwLock<Status>,
    state: RwLock<PowerLimiterState>,
    last_requested_limit: AtomicI32,
    config: RwLock<Arc<Config>>,
}

/// Cloneable handle through which everything outside the control loop
/// observes and steers it.
#[derive(Clone)]
pub struct LimiterHandle {
    shared: Arc<Shared>,
}

impl LimiterHandle {
    pub fn new(cfg: Config) -> Self {
        Self {
            shared: Arc::new(Shared {
                mode: RwLock::new(Mode::default()),
                status: RwLock::new(Status::Initializing),
                state: RwLock::new(PowerLimiterState::default()),
                last_requested_limit: AtomicI32::new(0),
                config: RwLock::new(Arc::new(cfg)),
            }),
        }
    }

    pub fn mode(&self) -> Mode {
        *self.shared.mode.read()
    }

    pub fn set_mode(&self, mode: Mode) {
        let previous = std::mem::replace(&mut *self.shared.mode.write(), mode);
        if previous != mode {
            let code: &'static str = mode.into();
            info!(mode = code, "power limiter mode changed");
        }
    }

    pub fn status(&self) -> Status {
        *self.shared.status.read()
    }

    pub fn status_text(&self) -> &'static str {
        self.status().text()
    }

    pub fn power_limiter_state(&self) -> PowerLimiterState {
        *self.shared.state.read()
    }

    pub fn last_requested_power_limit(&self) -> i32 {
        self.shared.last_requested_limit.load(Ordering::Acquire)
    }

    pub fn config(&self) -> Arc<Config> {
        self.shared.config.read().clone()
    }

    /// Validates and installs new limiter settings. Like any configuration
    /// change, this puts the limiter back into normal mode.
    pub fn replace_power_limiter_config(&self, pl: PowerLimiterConfig) -> Result<(), ConfigError> {
        pl.validate()?;

        {
            let mut current = self.shared.config.write();
            let mut cfg = Config::clone(&current);
            cfg.power_limiter = pl;
            *current = Arc::new(cfg);
        }

        info!("power limiter configuration replaced");
        self.set_mode(Mode::Normal);
        Ok(())
    }

    pub fn snapshot(&self) -> LimiterSnapshot {
        let status = self.status();
        let mode = self.mode();
        LimiterSnapshot {
            status,
            status_text: status.text(),
            mode,
            mode_code: mode.into(),
            power_limiter_state: self.power_limiter_state(),
            last_requested_power_limit: self.last_requested_power_limit(),
        }
    }

    /// Publishes the loop's state after an iteration.
    pub(crate) fn publish(&self, status: Status, state: PowerLimiterState, last_requested_limit: i32) {
        *self.shared.status.write() = status;
        *self.shared.state.write() = state;
        self.shared
            .last_requested_limit
            .store(last_requested_limit, Ordering::Release);
    }
}
