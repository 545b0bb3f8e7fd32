use tracing::info;

use crate::config::PowerLimiterConfig;
use crate::domain::{ChannelField, ChannelType, Inverter, PowerLimitControlType};

/// A limit is re-sent after this long even if unchanged, in case the
/// inverter missed it.
pub const LIMIT_RESEND_INTERVAL_MS: u64 = 60_000;

/// DC channels reporting more than this are considered producing.
const PRODUCING_CHANNEL_MIN_POWER_W: f32 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitDecision {
    /// Requested limit is below the lower bound; the inverter should stop.
    Shutdown,
    /// Within hysteresis of the last limit and recent enough.
    Keep { limit: i32 },
    Commit { limit: i32 },
}

/// Turns requested power targets into inverter commands and remembers the
/// last limit it sent.
#[derive(Debug, Default)]
pub struct LimitCommitter {
    last_requested_limit: i32,
    last_command_at: Option<u64>,
}

impl LimitCommitter {
    pub fn last_requested_limit(&self) -> i32 {
        self.last_requested_limit
    }

    pub fn last_command_at(&self) -> Option<u64> {
        self.last_command_at
    }

    /// Sanitizes `requested` and decides whether it must be sent.
    pub fn evaluate(
        &self,
        inverter: &dyn Inverter,
        requested: i32,
        cfg: &PowerLimiterConfig,
        now_ms: u64,
        verbose: bool,
    ) -> LimitDecision {
        if requested < cfg.lower_power_limit {
            return LimitDecision::Shutdown;
        }

        let mut limit = requested.min(cfg.upper_power_limit);

        // the inverter splits its limit evenly across all DC inputs, so
        // idle inputs would leave part of the limit unused
        let dc_channels = inverter.channels(ChannelType::Dc);
        let total = dc_channels.len();
        let producing = dc_channels
            .iter()
            .filter(|&&c| {
                inverter.channel_field(ChannelType::Dc, c, ChannelField::Pdc)
                    > PRODUCING_CHANNEL_MIN_POWER_W
            })
            .count();
        if producing > 0 && producing != total {
            info!(
                total_channels = total,
                producing_channels = producing,
                "scaling power limit"
            );
            limit = (limit as f32 * total as f32 / producing as f32).round() as i32;
        }

        limit = limit.min(i32::from(inverter.max_power()));

        let diff = (i64::from(limit) - i64::from(self.last_requested_limit)).abs();
        let hysteresis = i64::from(cfg.target_power_consumption_hysteresis);
        let age_ms = self
            .last_command_at
            .map_or(u64::MAX, |at| now_ms.saturating_sub(at));

        if diff < hysteresis && age_ms < LIMIT_RESEND_INTERVAL_MS {
            if verbose {
                info!(
                    requested,
                    last_limit = self.last_requested_limit,
                    diff,
                    hysteresis,
                    age_ms,
                    "keeping last power limit"
                );
            }
            return LimitDecision::Keep { limit };
        }

        if verbose {
            info!(requested, limit, "(re-)sending power limit");
        }
        LimitDecision::Commit { limit }
    }

    /// Sends `limit` and starts or stops the inverter around it.
    ///
    /// Stopping goes out before the limit; starting goes out after it, so the
    /// inverter never ramps up under an older, higher limit.
    pub fn commit(&mut self, inverter: &dyn Inverter, limit: i32, enable_production: bool, now_ms: u64) {
        if !enable_production && inverter.is_producing() {
            info!(serial = inverter.serial(), "stopping inverter");
            inverter.send_power_on_off(false);
        }

        inverter.send_active_power_limit(limit as f32, PowerLimitControlType::AbsoluteNonPersistent);

        self.last_requested_limit = limit;
        self.last_command_at = Some(now_ms);

        if enable_production && !inverter.is_producing() {
            info!(serial = inverter.serial(), "starting inverter");
            inverter.send_power_on_off(true);
        }
    }
}
