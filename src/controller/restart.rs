use chrono::{NaiveDateTime, Timelike};
use tracing::{info, warn};

const MS_PER_MINUTE: u64 = 60_000;
const MINUTES_PER_DAY: u32 = 24 * 60;
/// Retry interval while the wall clock is not yet valid.
const RECHECK_INTERVAL_MS: u64 = 5_000;

/// When the bound inverter is restarted next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RestartSchedule {
    #[default]
    NotComputed,
    Disabled,
    /// Monotonic deadline in milliseconds.
    At(u64),
}

/// Computes the next restart deadline for the configured hour of day.
///
/// A negative hour disables the daily restart. Without a valid local time
/// nothing can be computed yet.
pub fn next_restart(restart_hour: i8, local: Option<NaiveDateTime>, now_ms: u64) -> RestartSchedule {
    let Ok(hour) = u32::try_from(restart_hour) else {
        return RestartSchedule::Disabled;
    };
    let Some(local) = local else {
        return RestartSchedule::NotComputed;
    };

    let day_minutes = local.hour() * 60 + local.minute();
    let target_minutes = hour * 60;
    let minutes = if hour > local.hour() {
        target_minutes - day_minutes
    } else {
        MINUTES_PER_DAY - day_minutes + target_minutes
    };

    RestartSchedule::At(now_ms.saturating_add(u64::from(minutes) * MS_PER_MINUTE))
}

/// Daily inverter restart bookkeeping.
#[derive(Debug, Default)]
pub struct RestartScheduler {
    schedule: RestartSchedule,
    next_check_at: u64,
}

impl RestartScheduler {
    pub fn schedule(&self) -> RestartSchedule {
        self.schedule
    }

    /// Recomputes the schedule, e.g. after the restart hour was reconfigured.
    pub fn recalculate(&mut self, restart_hour: i8, local: Option<NaiveDateTime>, now_ms: u64) {
        self.schedule = next_restart(restart_hour, local, now_ms);
        match self.schedule {
            RestartSchedule::Disabled => info!("daily inverter restart disabled"),
            RestartSchedule::NotComputed => warn!("local time unavailable, inverter restart not scheduled"),
            RestartSchedule::At(at) => info!(
                restart_hour,
                in_minutes = at.saturating_sub(now_ms) / MS_PER_MINUTE,
                "next inverter restart scheduled"
            ),
        }
    }

    /// Returns true if the restart is due now; the next one is scheduled
    /// right away.
    pub fn poll(&mut self, restart_hour: i8, local: Option<NaiveDateTime>, now_ms: u64) -> bool {
        let mut due = false;
        if let RestartSchedule::At(at) = self.schedule {
            if at <= now_ms {
                due = true;
                self.recalculate(restart_hour, local, now_ms);
            }
        }

        if restart_hour >= 0
            && self.schedule == RestartSchedule::NotComputed
            && self.next_check_at < now_ms
        {
            if local.is_some() {
                self.recalculate(restart_hour, local, now_ms);
            } else {
                info!("local time not ready for inverter restart calculation");
                self.next_check_at = now_ms + RECHECK_INTERVAL_MS;
            }
        }

        due
    }
}
