use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use thiserror::Error;
use validator::{Validate, ValidationError, ValidationErrors};

/// Upper bound of the calculation backoff, in milliseconds.
pub const CALCULATION_BACKOFF_CAP_MS: u32 = 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),
    #[error("invalid configuration: {0}")]
    Invalid(#[from] ValidationErrors),
    #[error("invalid server address: {0}")]
    Address(#[from] std::net::AddrParseError),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    #[validate(nested)]
    pub controller: ControllerConfig,
    #[validate(nested)]
    pub power_limiter: PowerLimiterConfig,
    pub battery: BatteryConfig,
    pub solar_charger: SolarChargerConfig,
    pub power_meter: PowerMeterConfig,
    #[validate(nested)]
    pub simulation: SimulationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8080,
            request_timeout_secs: 10,
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ControllerConfig {
    /// Period of the control loop task.
    #[validate(range(min = 1, max = 10000))]
    pub tick_interval_ms: u64,
    /// Calculation backoff after a committed limit; doubles up to 1024 ms while stable.
    #[validate(range(min = 1, max = 1024))]
    pub calculation_backoff_ms: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
            calculation_backoff_ms: 128,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatteryDrainStrategy {
    /// Discharge only after the battery reached the start threshold.
    #[default]
    EmptyWhenFull,
    /// Also discharge whenever no direct solar power is available.
    EmptyAtNight,
}

/// Settings of the dynamic power limiter. This is the part of the
/// configuration that can be replaced at runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_power_bounds"))]
pub struct PowerLimiterConfig {
    pub enabled: bool,
    pub verbose_logging: bool,
    pub solar_passthrough_enabled: bool,
    /// Losses between solar charger and inverter (cabling, junctions), in percent.
    #[validate(range(max = 10))]
    pub solar_passthrough_losses: u8,
    pub battery_drain_strategy: BatteryDrainStrategy,
    pub is_inverter_behind_power_meter: bool,
    /// Position of the managed inverter in the inverter list.
    pub inverter_id: u8,
    /// DC channel used for the battery voltage reading.
    pub inverter_channel_id: u8,
    pub target_power_consumption: i32,
    #[validate(range(min = 0))]
    pub target_power_consumption_hysteresis: i32,
    #[validate(range(min = 0))]
    pub lower_power_limit: i32,
    #[validate(range(min = 0))]
    pub upper_power_limit: i32,
    #[validate(range(max = 100))]
    pub battery_soc_start_threshold: u32,
    #[validate(range(max = 100))]
    pub battery_soc_stop_threshold: u32,
    pub voltage_start_threshold: f32,
    pub voltage_stop_threshold: f32,
    pub voltage_load_correction_factor: f32,
    /// Hour of the day for the daily inverter restart; negative disables it.
    #[validate(range(min = -1, max = 23))]
    pub inverter_restart_hour: i8,
    #[validate(range(max = 100))]
    pub full_solar_passthrough_soc: u32,
    pub full_solar_passthrough_start_voltage: f32,
    pub full_solar_passthrough_stop_voltage: f32,
}

impl Default for PowerLimiterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            verbose_logging: false,
            solar_passthrough_enabled: true,
            solar_passthrough_losses: 3,
            battery_drain_strategy: BatteryDrainStrategy::EmptyWhenFull,
            is_inverter_behind_power_meter: true,
            inverter_id: 0,
            inverter_channel_id: 0,
            target_power_consumption: 0,
            target_power_consumption_hysteresis: 0,
            lower_power_limit: 10,
            upper_power_limit: 800,
            battery_soc_start_threshold: 80,
            battery_soc_stop_threshold: 20,
            voltage_start_threshold: 50.0,
            voltage_stop_threshold: 49.0,
            voltage_load_correction_factor: 0.001,
            inverter_restart_hour: -1,
            full_solar_passthrough_soc: 100,
            full_solar_passthrough_start_voltage: 100.0,
            full_solar_passthrough_stop_voltage: 100.0,
        }
    }
}

fn validate_power_bounds(cfg: &PowerLimiterConfig) -> Result<(), ValidationError> {
    if cfg.upper_power_limit < cfg.lower_power_limit {
        return Err(ValidationError::new("upper_power_limit_below_lower_power_limit"));
    }
    Ok(())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BatteryConfig {
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SolarChargerConfig {
    pub enabled: bool,
}

impl Default for SolarChargerConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerMeterConfig {
    pub enabled: bool,
}

impl Default for PowerMeterConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Parameters of the simulated household the binary runs against.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct SimulationConfig {
    #[validate(range(min = 10))]
    pub step_ms: u64,
    pub inverter_serial: u64,
    pub inverter_max_power_w: u16,
    #[validate(range(min = 1, max = 6))]
    pub inverter_dc_channels: u8,
    pub household_load_w: f32,
    pub solar_peak_w: f32,
    pub battery_capacity_wh: f32,
    #[validate(range(min = 0.0, max = 100.0))]
    pub battery_initial_soc_percent: f32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            step_ms: 1000,
            inverter_serial: 116_123_456_789,
            inverter_max_power_w: 800,
            inverter_dc_channels: 2,
            household_load_w: 350.0,
            solar_peak_w: 600.0,
            battery_capacity_wh: 2400.0,
            battery_initial_soc_percent: 60.0,
        }
    }
}

impl Config {
    /// Loads `config/default.toml` on top of the built-in defaults, then
    /// applies `DPL__`-prefixed environment overrides (`DPL__POWER_LIMITER__ENABLED=true`).
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config/default.toml")
    }

    pub fn load_from(path: &str) -> Result<Self, ConfigError> {
        let figment = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("DPL__").split("__"));
        let cfg: Config = figment.extract().map_err(Box::new)?;
        cfg.validate()?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = Config::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.controller.calculation_backoff_ms, 128);
        assert_eq!(cfg.power_limiter.inverter_restart_hour, -1);
    }

    #[test]
    fn test_upper_limit_below_lower_limit_is_rejected() {
        let cfg = PowerLimiterConfig {
            lower_power_limit: 100,
            upper_power_limit: 50,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_restart_hour_range() {
        let mut cfg = PowerLimiterConfig::default();
        cfg.inverter_restart_hour = 23;
        assert!(cfg.validate().is_ok());
        cfg.inverter_restart_hour = 24;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_backoff_default_within_cap() {
        let mut cfg = Config::default();
        cfg.controller.calculation_backoff_ms = CALCULATION_BACKOFF_CAP_MS + 1;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_drain_strategy_deserializes_snake_case() {
        let s: BatteryDrainStrategy = serde_json::from_str("\"empty_at_night\"").unwrap();
        assert_eq!(s, BatteryDrainStrategy::EmptyAtNight);
    }

    #[test]
    fn test_load_from_missing_file_uses_defaults() {
        let cfg = Config::load_from("does/not/exist.toml").unwrap();
        assert_eq!(cfg.power_limiter.upper_power_limit, 800);
        assert_eq!(cfg.server.port, 8080);
    }
}
