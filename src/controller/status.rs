use serde::{Deserialize, Serialize};
use std::fmt;
use strum::{EnumIter, EnumString, IntoStaticStr};

/// Why the power limiter did or did not act during the latest iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, IntoStaticStr, Serialize)]
pub enum Status {
    Initializing,
    DisabledByConfig,
    DisabledByMqtt,
    WaitingForValidTimestamp,
    PowerMeterDisabled,
    PowerMeterTimeout,
    PowerMeterPending,
    InverterInvalid,
    InverterChanged,
    InverterOffline,
    InverterCommandsDisabled,
    InverterLimitPending,
    InverterPowerCmdPending,
    InverterDevInfoPending,
    InverterStatsPending,
    UnconditionalSolarPassthrough,
    NoVeDirect,
    Settling,
    Stable,
}

impl Status {
    pub fn text(self) -> &'static str {
        match self {
            Status::Initializing => "initializing (should not see me)",
            Status::DisabledByConfig => "disabled by configuration",
            Status::DisabledByMqtt => "disabled by remote command",
            Status::WaitingForValidTimestamp => "waiting for valid date and time to be available",
            Status::PowerMeterDisabled => "no power meter is configured/enabled",
            Status::PowerMeterTimeout => "power meter readings are outdated",
            Status::PowerMeterPending => "waiting for sufficiently recent power meter reading",
            Status::InverterInvalid => "invalid inverter selection/configuration",
            Status::InverterChanged => "target inverter changed",
            Status::InverterOffline => "inverter is offline (polling enabled? radio okay?)",
            Status::InverterCommandsDisabled => "inverter configuration prohibits sending commands",
            Status::InverterLimitPending => "waiting for a power limit command to complete",
            Status::InverterPowerCmdPending => "waiting for a start/stop/restart command to complete",
            Status::InverterDevInfoPending => "waiting for inverter device information to be available",
            Status::InverterStatsPending => "waiting for sufficiently recent inverter data",
            Status::UnconditionalSolarPassthrough => {
                "unconditionally passing through all solar power (remote override)"
            }
            Status::NoVeDirect => "solar charger disabled, connection broken, or data outdated",
            Status::Settling => "waiting for the system to settle",
            Status::Stable => "the system is stable, the last power limit is still valid",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}

/// Operating mode, settable at runtime.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, EnumString, IntoStaticStr, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Mode {
    #[default]
    Normal,
    Disabled,
    UnconditionalFullSolarPassthrough,
}

impl TryFrom<u8> for Mode {
    type Error = u8;

    /// Numeric form used by the remote `mode` command.
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Mode::Normal),
            1 => Ok(Mode::Disabled),
            2 => Ok(Mode::UnconditionalFullSolarPassthrough),
            other => Err(other),
        }
    }
}

impl From<Mode> for u8 {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Normal => 0,
            Mode::Disabled => 1,
            Mode::UnconditionalFullSolarPassthrough => 2,
        }
    }
}

/// Coarse state for user interfaces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerLimiterState {
    #[default]
    Inactive,
    Charging,
    UseSolarOnly,
    UseSolarAndBattery,
}
