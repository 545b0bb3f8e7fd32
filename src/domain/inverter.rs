use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Outcome of the most recent command of a given kind, as reported by the
/// inverter transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandStatus {
    Pending,
    Ok,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelType {
    Ac,
    Dc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelField {
    /// DC voltage (V)
    Udc,
    /// DC power (W)
    Pdc,
    /// AC power (W)
    Pac,
    /// Conversion efficiency (%)
    Eff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PowerLimitControlType {
    AbsoluteNonPersistent,
    RelativeNonPersistent,
    AbsolutePersistent,
    RelativePersistent,
}

/// Microinverter as seen by the power limiter.
///
/// All reads are snapshots of the most recently received data and never
/// block. Commands are queued by the transport and their completion is
/// observed later through [`Inverter::last_limit_command_status`] and
/// [`Inverter::last_power_command_status`].
#[cfg_attr(test, mockall::automock)]
pub trait Inverter: Send + Sync {
    fn serial(&self) -> u64;
    fn is_reachable(&self) -> bool;
    fn is_producing(&self) -> bool;
    /// Whether the configuration allows sending commands to this inverter.
    fn enable_commands(&self) -> bool;
    fn last_limit_command_status(&self) -> CommandStatus;
    fn last_power_command_status(&self) -> CommandStatus;
    /// Time (ms) of the latest acknowledged limit or power command.
    fn last_update_command_time(&self) -> u64;
    /// Maximum AC power as reported by the device info; 0 while unknown.
    fn max_power(&self) -> u16;
    fn channels(&self, kind: ChannelType) -> Vec<u8>;
    fn channel_field(&self, kind: ChannelType, channel: u8, field: ChannelField) -> f32;
    /// Time (ms) of the latest statistics update.
    fn last_stats_update(&self) -> u64;
    fn send_active_power_limit(&self, watts: f32, kind: PowerLimitControlType);
    fn send_power_on_off(&self, on: bool);
    fn send_restart(&self);
}

/// Lookup of inverters by their configured position.
pub trait InverterRegistry: Send + Sync {
    fn inverter_by_pos(&self, pos: u8) -> Option<Arc<dyn Inverter>>;
}

impl InverterRegistry for Vec<Arc<dyn Inverter>> {
    fn inverter_by_pos(&self, pos: u8) -> Option<Arc<dyn Inverter>> {
        self.get(usize::from(pos)).cloned()
    }
}

/// Command as received by a [`SimulatedInverter`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum InverterCommand {
    ActivePowerLimit { watts: f32, kind: PowerLimitControlType },
    PowerOn,
    PowerOff,
    Restart,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DcChannel {
    pub voltage_v: f32,
    pub power_w: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulatedInverterState {
    pub reachable: bool,
    pub producing: bool,
    pub enable_commands: bool,
    pub max_power_w: u16,
    pub limit_w: f32,
    pub ac_power_w: f32,
    pub efficiency_percent: f32,
    pub dc_channels: Vec<DcChannel>,
    pub stats_updated_at: u64,
    pub limit_command: CommandStatus,
    pub power_command: CommandStatus,
    pub last_update_command_at: u64,
}

#[derive(Debug, Default)]
struct PendingEffects {
    limit_w: Option<f32>,
    power_on: Option<bool>,
    restart: bool,
}

/// In-memory inverter used by the simulation and by tests.
///
/// Commands are recorded and marked pending; their effect is applied once
/// [`SimulatedInverter::acknowledge_commands`] is called, mimicking the
/// radio round trip of a real device.
#[derive(Debug)]
pub struct SimulatedInverter {
    serial: u64,
    state: RwLock<SimulatedInverterState>,
    pending: Mutex<PendingEffects>,
    commands: Mutex<Vec<InverterCommand>>,
}

impl SimulatedInverter {
    pub fn new(serial: u64, max_power_w: u16, dc_channels: u8) -> Self {
        let state = SimulatedInverterState {
            reachable: true,
            producing: false,
            enable_commands: true,
            max_power_w,
            limit_w: f32::from(max_power_w),
            ac_power_w: 0.0,
            efficiency_percent: 0.0,
            dc_channels: vec![
                DcChannel {
                    voltage_v: 0.0,
                    power_w: 0.0,
                };
                usize::from(dc_channels)
            ],
            stats_updated_at: 0,
            limit_command: CommandStatus::Ok,
            power_command: CommandStatus::Ok,
            last_update_command_at: 0,
        };
        Self {
            serial,
            state: RwLock::new(state),
            pending: Mutex::new(PendingEffects::default()),
            commands: Mutex::new(Vec::new()),
        }
    }

    pub fn snapshot(&self) -> SimulatedInverterState {
        self.state.read().clone()
    }

    /// Mutates the simulated state, e.g. to inject new statistics.
    pub fn update<F: FnOnce(&mut SimulatedInverterState)>(&self, f: F) {
        f(&mut self.state.write());
    }

    /// Drains the commands received since the last call.
    pub fn take_commands(&self) -> Vec<InverterCommand> {
        std::mem::take(&mut *self.commands.lock())
    }

    /// Applies all pending commands and marks them as successful at `now_ms`.
    pub fn acknowledge_commands(&self, now_ms: u64) {
        let effects = std::mem::take(&mut *self.pending.lock());
        let mut st = self.state.write();
        let mut acknowledged = false;
        if let Some(limit) = effects.limit_w {
            st.limit_w = limit.clamp(0.0, f32::from(st.max_power_w));
            st.limit_command = CommandStatus::Ok;
            acknowledged = true;
        }
        if let Some(on) = effects.power_on {
            st.producing = on;
            if !on {
                st.ac_power_w = 0.0;
            }
            st.power_command = CommandStatus::Ok;
            acknowledged = true;
        }
        if effects.restart {
            st.power_command = CommandStatus::Ok;
            acknowledged = true;
        }
        if acknowledged {
            st.last_update_command_at = now_ms;
        }
    }
}

impl Inverter for SimulatedInverter {
    fn serial(&self) -> u64 {
        self.serial
    }

    fn is_reachable(&self) -> bool {
        self.state.read().reachable
    }

    fn is_producing(&self) -> bool {
        self.state.read().producing
    }

    fn enable_commands(&self) -> bool {
        self.state.read().enable_commands
    }

    fn last_limit_command_status(&self) -> CommandStatus {
        self.state.read().limit_command
    }

    fn last_power_command_status(&self) -> CommandStatus {
        self.state.read().power_command
    }

    fn last_update_command_time(&self) -> u64 {
        self.state.read().last_update_command_at
    }

    fn max_power(&self) -> u16 {
        self.state.read().max_power_w
    }

    fn channels(&self, kind: ChannelType) -> Vec<u8> {
        match kind {
            ChannelType::Ac => vec![0],
            ChannelType::Dc => {
                let count = self.state.read().dc_channels.len();
                (0..count).map(|c| u8::try_from(c).unwrap_or(u8::MAX)).collect()
            }
        }
    }

    fn channel_field(&self, kind: ChannelType, channel: u8, field: ChannelField) -> f32 {
        let st = self.state.read();
        match (kind, field) {
            (ChannelType::Ac, ChannelField::Pac) if channel == 0 => st.ac_power_w,
            (ChannelType::Ac, ChannelField::Eff) if channel == 0 => st.efficiency_percent,
            (ChannelType::Dc, ChannelField::Udc) => st
                .dc_channels
                .get(usize::from(channel))
                .map_or(0.0, |c| c.voltage_v),
            (ChannelType::Dc, ChannelField::Pdc) => st
                .dc_channels
                .get(usize::from(channel))
                .map_or(0.0, |c| c.power_w),
            _ => 0.0,
        }
    }

    fn last_stats_update(&self) -> u64 {
        self.state.read().stats_updated_at
    }

    fn send_active_power_limit(&self, watts: f32, kind: PowerLimitControlType) {
        self.commands
            .lock()
            .push(InverterCommand::ActivePowerLimit { watts, kind });
        self.pending.lock().limit_w = Some(watts);
        self.state.write().limit_command = CommandStatus::Pending;
    }

    fn send_power_on_off(&self, on: bool) {
        let cmd = if on {
            InverterCommand::PowerOn
        } else {
            InverterCommand::PowerOff
        };
        self.commands.lock().push(cmd);
        self.pending.lock().power_on = Some(on);
        self.state.write().power_command = CommandStatus::Pending;
    }

    fn send_restart(&self) {
        self.commands.lock().push(InverterCommand::Restart);
        self.pending.lock().restart = true;
        self.state.write().power_command = CommandStatus::Pending;
    }
}
