use std::sync::{Arc, Weak};
use tracing::info;

use crate::config::Config;
use crate::domain::{
    AutoPowerSource, BatteryStats, ChannelField, ChannelType, Clock, CommandStatus, Inverter,
    InverterRegistry, PowerMeter, SolarCharger,
};

use super::announce::{StatusAnnouncer, StatusSink};
use super::calc::{calc_power_limit, inverter_power_dc_to_ac, LimitInput};
use super::commit::{LimitCommitter, LimitDecision};
use super::discharge::{next_discharge_enabled, CalculationBackoff, DischargeInputs};
use super::handle::LimiterHandle;
use super::restart::{RestartSchedule, RestartScheduler};
use super::solar::{FullPassthroughLatch, SolarOracle};
use super::status::{Mode, PowerLimiterState, Status};
use super::threshold::ThresholdEvaluator;

/// Give up stopping an inverter after this long.
const SHUTDOWN_TIMEOUT_MS: u64 = 10_000;
/// Power meter readings older than this stop the inverter.
const POWER_METER_TIMEOUT_MS: u64 = 30_000;
/// Time after a command acknowledgment before new readings are trusted.
const SETTLING_TIME_MS: u64 = 3_000;

/// Everything the limiter reads from or commands.
#[derive(Clone)]
pub struct Collaborators {
    pub inverters: Arc<dyn InverterRegistry>,
    pub power_meter: Arc<dyn PowerMeter>,
    pub solar_charger: Arc<dyn SolarCharger>,
    pub battery: Arc<dyn BatteryStats>,
    pub auto_power: Arc<dyn AutoPowerSource>,
    pub clock: Arc<dyn Clock>,
}

/// Closed-loop controller keeping the inverter output in line with the
/// household consumption.
///
/// [`DynamicPowerLimiter::tick`] must be called repeatedly from a single
/// task. Each call walks a fixed priority chain and returns early at the
/// first condition that prevents a new power limit; the reason is kept as the
/// current [`Status`]. Inverter commands are never awaited: their completion
/// is observed on a later tick.
pub struct DynamicPowerLimiter {
    io: Collaborators,
    handle: LimiterHandle,
    announcer: StatusAnnouncer,
    cfg: Arc<Config>,
    inverter: Option<Weak<dyn Inverter>>,
    shutdown_deadline: Option<u64>,
    backoff: CalculationBackoff,
    last_calculation: Option<u64>,
    restart: RestartScheduler,
    passthrough_latch: FullPassthroughLatch,
    battery_discharge_enabled: bool,
    committer: LimitCommitter,
}

impl DynamicPowerLimiter {
    pub fn new(io: Collaborators, handle: LimiterHandle, sink: Arc<dyn StatusSink>) -> Self {
        let cfg = handle.config();
        Self {
            io,
            announcer: StatusAnnouncer::new(sink),
            backoff: CalculationBackoff::new(cfg.controller.calculation_backoff_ms),
            cfg,
            handle,
            inverter: None,
            shutdown_deadline: None,
            last_calculation: None,
            restart: RestartScheduler::default(),
            passthrough_latch: FullPassthroughLatch::default(),
            battery_discharge_enabled: false,
            committer: LimitCommitter::default(),
        }
    }

    pub fn handle(&self) -> &LimiterHandle {
        &self.handle
    }

    /// Runs one iteration and publishes the outcome on the handle.
    pub fn tick(&mut self) {
        self.refresh_config();
        self.evaluate();
        self.handle.publish(
            self.announcer.current(),
            self.power_limiter_state(),
            self.committer.last_requested_limit(),
        );
    }

    pub fn status(&self) -> Status {
        self.announcer.current()
    }

    pub fn bound_serial(&self) -> Option<u64> {
        self.bound_inverter().map(|i| i.serial())
    }

    pub fn shutdown_deadline(&self) -> Option<u64> {
        self.shutdown_deadline
    }

    pub fn backoff_ms(&self) -> u32 {
        self.backoff.current_ms()
    }

    pub fn battery_discharge_enabled(&self) -> bool {
        self.battery_discharge_enabled
    }

    pub fn restart_schedule(&self) -> RestartSchedule {
        self.restart.schedule()
    }

    pub fn last_requested_power_limit(&self) -> i32 {
        self.committer.last_requested_limit()
    }

    pub fn power_limiter_state(&self) -> PowerLimiterState {
        let Some(inverter) = self.bound_inverter() else {
            return PowerLimiterState::Inactive;
        };
        if !inverter.is_reachable() {
            return PowerLimiterState::Inactive;
        }

        match (inverter.is_producing(), self.battery_discharge_enabled) {
            (true, true) => PowerLimiterState::UseSolarAndBattery,
            (true, false) => PowerLimiterState::UseSolarOnly,
            (false, _) => PowerLimiterState::Charging,
        }
    }

    /// Stops the bound inverter, if any.
    ///
    /// Returns true while stopping is still in progress and false once the
    /// inverter is (assumed to be) stopped, at which point it is unbound.
    /// `None` keeps the current status. An inverter that does not confirm
    /// the stop within ten seconds is given up on.
    pub fn shutdown(&mut self, status: Option<Status>) -> bool {
        if let Some(status) = status {
            self.announce(status);
        }

        let now = self.io.clock.millis();
        let timed_out = self.shutdown_deadline.is_some_and(|deadline| deadline < now);
        let inverter = match self.bound_inverter() {
            Some(inverter) if inverter.is_producing() && !timed_out => inverter,
            _ => {
                self.inverter = None;
                self.shutdown_deadline = None;
                return false;
            }
        };

        if self.shutdown_deadline.is_none() {
            self.shutdown_deadline = Some(now + SHUTDOWN_TIMEOUT_MS);
        }

        // retried until the deadline passes
        if !inverter.is_reachable() {
            return true;
        }

        if inverter.last_limit_command_status() == CommandStatus::Pending
            || inverter.last_power_command_status() == CommandStatus::Pending
        {
            return true;
        }

        let lower = self.cfg.power_limiter.lower_power_limit;
        self.committer.commit(inverter.as_ref(), lower, false, now);
        true
    }

    fn bound_inverter(&self) -> Option<Arc<dyn Inverter>> {
        self.inverter.as_ref().and_then(Weak::upgrade)
    }

    fn announce(&mut self, status: Status) {
        let now = self.io.clock.millis();
        self.announcer.announce(status, now);
    }

    fn refresh_config(&mut self) {
        let latest = self.handle.config();
        if Arc::ptr_eq(&latest, &self.cfg) {
            return;
        }

        self.cfg = latest;
        self.restart.recalculate(
            self.cfg.power_limiter.inverter_restart_hour,
            self.io.clock.local_time(),
            self.io.clock.millis(),
        );
    }

    fn evaluate(&mut self) {
        let cfg = Arc::clone(&self.cfg);
        let pl = &cfg.power_limiter;
        let mode = self.handle.mode();

        // commands are not delivered without a valid wall clock, not even a stop
        if self.io.clock.local_time().is_none() {
            self.announce(Status::WaitingForValidTimestamp);
            return;
        }

        if self.shutdown_deadline.is_some() {
            self.shutdown(None);
            return;
        }

        if !pl.enabled {
            self.shutdown(Some(Status::DisabledByConfig));
            return;
        }

        if mode == Mode::Disabled {
            self.shutdown(Some(Status::DisabledByMqtt));
            return;
        }

        let Some(inverter) = self.io.inverters.inverter_by_pos(pl.inverter_id) else {
            self.shutdown(Some(Status::InverterInvalid));
            return;
        };

        // stop the previous inverter before picking up the new one
        if self
            .bound_inverter()
            .is_some_and(|bound| bound.serial() != inverter.serial())
        {
            self.shutdown(Some(Status::InverterChanged));
            return;
        }

        self.inverter = Some(Arc::downgrade(&inverter));

        if !inverter.is_reachable() {
            self.announce(Status::InverterOffline);
            return;
        }

        if !inverter.enable_commands() {
            self.announce(Status::InverterCommandsDisabled);
            return;
        }

        if inverter.last_limit_command_status() == CommandStatus::Pending {
            self.announce(Status::InverterLimitPending);
            return;
        }

        if inverter.last_power_command_status() == CommandStatus::Pending {
            self.announce(Status::InverterPowerCmdPending);
            return;
        }

        // limits are clamped to the device's max power, unknown until the
        // device information arrived
        if inverter.max_power() == 0 {
            self.announce(Status::InverterDevInfoPending);
            return;
        }

        if mode == Mode::UnconditionalFullSolarPassthrough {
            self.unconditional_solar_passthrough(&inverter);
            return;
        }

        if !cfg.power_meter.enabled {
            self.shutdown(Some(Status::PowerMeterDisabled));
            return;
        }

        let now = self.io.clock.millis();
        if now.saturating_sub(self.io.power_meter.last_update()) > POWER_METER_TIMEOUT_MS {
            self.shutdown(Some(Status::PowerMeterTimeout));
            return;
        }

        let settling_end = inverter.last_update_command_time() + SETTLING_TIME_MS;
        if now < settling_end {
            self.announce(Status::Settling);
            return;
        }

        if inverter.last_stats_update() <= settling_end {
            self.announce(Status::InverterStatsPending);
            return;
        }

        if self.io.power_meter.last_update() <= settling_end {
            self.announce(Status::PowerMeterPending);
            return;
        }

        if let Some(last) = self.last_calculation {
            if now < last + u64::from(self.backoff.current_ms()) {
                self.announce(Status::Stable);
                return;
            }
        }

        let verbose = pl.verbose_logging;
        if verbose {
            info!("power limiter iteration started");
        }

        if self
            .restart
            .poll(pl.inverter_restart_hour, self.io.clock.local_time(), now)
        {
            info!(serial = inverter.serial(), "sending daily inverter restart");
            inverter.send_restart();
        }

        let efficiency = inverter.channel_field(ChannelType::Ac, 0, ChannelField::Eff);
        let (requested, discharge) = {
            let thresholds =
                ThresholdEvaluator::new(&cfg, self.io.battery.as_ref(), Some(inverter.as_ref()));
            let oracle = SolarOracle::new(pl, self.io.solar_charger.as_ref(), &thresholds);

            let solar_enabled = oracle.can_use_direct_solar_power();
            let discharge = next_discharge_enabled(
                pl,
                DischargeInputs {
                    stop_threshold_reached: thresholds.is_stop_threshold_reached(),
                    start_threshold_reached: thresholds.is_start_threshold_reached(),
                    direct_solar_available: solar_enabled,
                },
                self.battery_discharge_enabled,
            );
            let full_solar_passthrough = discharge && self.passthrough_latch.update(pl, &thresholds);
            let meter_power_w = self.io.power_meter.total_power(true);

            if verbose {
                info!(
                    battery_enabled = cfg.battery.enabled,
                    soc = self.io.battery.soc(),
                    soc_age_s = self.io.battery.soc_age_seconds(),
                    start_soc = pl.battery_soc_start_threshold,
                    stop_soc = pl.battery_soc_stop_threshold,
                    "battery"
                );
                info!(
                    dc_voltage = inverter.channel_field(ChannelType::Dc, pl.inverter_channel_id, ChannelField::Udc),
                    load_corrected_voltage = thresholds.load_corrected_voltage(),
                    start_voltage = pl.voltage_start_threshold,
                    stop_voltage = pl.voltage_stop_threshold,
                    start_reached = thresholds.is_start_threshold_reached(),
                    stop_reached = thresholds.is_stop_threshold_reached(),
                    producing = inverter.is_producing(),
                    "thresholds"
                );
                info!(
                    solar_passthrough = pl.solar_passthrough_enabled,
                    drain_strategy = ?pl.battery_drain_strategy,
                    direct_solar = solar_enabled,
                    discharge_allowed = discharge,
                    meter_w = meter_power_w.round() as i32,
                    target_w = pl.target_power_consumption,
                    "sources"
                );
            }

            let input = LimitInput {
                meter_power_w,
                inverter_behind_meter: pl.is_inverter_behind_power_meter,
                inverter_ac_power_w: inverter.channel_field(ChannelType::Ac, 0, ChannelField::Pac),
                target_consumption_w: pl.target_power_consumption,
                solar_ac_power_w: inverter_power_dc_to_ac(
                    oracle.solar_charge_power(),
                    efficiency,
                    pl.solar_passthrough_losses,
                ),
                solar_enabled,
                battery_discharge_enabled: discharge,
                full_solar_passthrough,
                auto_power_active: self.io.auto_power.is_auto_power_active(),
            };
            (calc_power_limit(&input), discharge)
        };
        self.battery_discharge_enabled = discharge;

        let updated = self.set_new_power_limit(&inverter, requested);

        if verbose {
            info!(
                calculated_w = requested,
                requested_w = self.committer.last_requested_limit(),
                updated,
                "power limiter iteration finished"
            );
        }

        self.last_calculation = Some(now);

        if !updated {
            self.backoff.increase();
            self.announce(Status::Stable);
            return;
        }

        self.backoff.reset();
    }

    /// Feeds all solar power to the AC side regardless of the meter.
    fn unconditional_solar_passthrough(&mut self, inverter: &Arc<dyn Inverter>) {
        let charger = Arc::clone(&self.io.solar_charger);
        if !charger.is_enabled() || !charger.is_data_valid() {
            self.shutdown(Some(Status::NoVeDirect));
            return;
        }

        let solar_power = (charger.voltage() * charger.current()) as i32;
        let efficiency = inverter.channel_field(ChannelType::Ac, 0, ChannelField::Eff);
        let limit = inverter_power_dc_to_ac(
            solar_power,
            efficiency,
            self.cfg.power_limiter.solar_passthrough_losses,
        );
        self.set_new_power_limit(inverter, limit);
        self.announce(Status::UnconditionalSolarPassthrough);
    }

    /// Returns true if a new limit was committed or a shutdown is underway.
    fn set_new_power_limit(&mut self, inverter: &Arc<dyn Inverter>, requested: i32) -> bool {
        let now = self.io.clock.millis();
        let pl = &self.cfg.power_limiter;
        let decision =
            self.committer
                .evaluate(inverter.as_ref(), requested, pl, now, pl.verbose_logging);

        match decision {
            LimitDecision::Shutdown => self.shutdown(None),
            LimitDecision::Keep { .. } => false,
            LimitDecision::Commit { limit } => {
                self.committer.commit(inverter.as_ref(), limit, true, now);
                true
            }
        }
    }
}
