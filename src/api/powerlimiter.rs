use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::AuthBearer;
use crate::config::PowerLimiterConfig;
use crate::controller::{AppState, LimiterSnapshot, Mode};

use super::error::ApiError;
use super::response::{success, ApiResponse};

/// Keys a config update has to carry; everything else keeps its current value.
const REQUIRED_CONFIG_KEYS: [&str; 6] = [
    "enabled",
    "lower_power_limit",
    "inverter_id",
    "inverter_channel_id",
    "target_power_consumption",
    "target_power_consumption_hysteresis",
];

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/status", get(get_status))
        .route("/config", get(get_config).post(post_config))
        .route("/mode", post(post_mode))
}

/// Mode either by name (`"disabled"`) or by its numeric code (`1`).
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ModeValue {
    Code(u8),
    Name(Mode),
}

impl TryFrom<ModeValue> for Mode {
    type Error = ApiError;

    fn try_from(value: ModeValue) -> Result<Self, Self::Error> {
        match value {
            ModeValue::Name(mode) => Ok(mode),
            ModeValue::Code(code) => Mode::try_from(code)
                .map_err(|code| ApiError::BadRequest(format!("unknown mode {code}"))),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ModeRequest {
    pub mode: ModeValue,
}

/// GET /api/powerlimiter/status
pub async fn get_status(State(state): State<AppState>) -> ApiResponse<LimiterSnapshot> {
    success(state.handle.snapshot())
}

/// GET /api/powerlimiter/config
pub async fn get_config(
    _auth: AuthBearer,
    State(state): State<AppState>,
) -> ApiResponse<PowerLimiterConfig> {
    success(state.handle.config().power_limiter.clone())
}

/// POST /api/powerlimiter/config
///
/// Updates the limiter settings. The limiter returns to normal mode.
pub async fn post_config(
    _auth: AuthBearer,
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<ApiResponse<PowerLimiterConfig>, ApiError> {
    let pl = merge_config_update(&state.handle.config().power_limiter, body)?;
    state.handle.replace_power_limiter_config(pl)?;
    Ok(success(state.handle.config().power_limiter.clone()))
}

/// Applies the keys of `update` on top of `current`.
fn merge_config_update(
    current: &PowerLimiterConfig,
    update: Value,
) -> Result<PowerLimiterConfig, ApiError> {
    let Value::Object(update) = update else {
        return Err(ApiError::BadRequest("config update must be a JSON object".to_string()));
    };

    let missing: Vec<&str> = REQUIRED_CONFIG_KEYS
        .into_iter()
        .filter(|key| !update.contains_key(*key))
        .collect();
    if !missing.is_empty() {
        return Err(ApiError::BadRequest(format!(
            "values are missing: {}",
            missing.join(", ")
        )));
    }

    let mut merged =
        serde_json::to_value(current).map_err(|e| ApiError::InternalError(e.to_string()))?;
    if let Value::Object(fields) = &mut merged {
        fields.extend(update);
    }
    serde_json::from_value(merged).map_err(|e| ApiError::BadRequest(e.to_string()))
}

/// POST /api/powerlimiter/mode
pub async fn post_mode(
    State(state): State<AppState>,
    Json(req): Json<ModeRequest>,
) -> Result<ApiResponse<LimiterSnapshot>, ApiError> {
    let mode = Mode::try_from(req.mode)?;
    state.handle.set_mode(mode);
    Ok(success(state.handle.snapshot()))
}
