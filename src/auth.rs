use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use crate::api::error::ApiError;
use crate::controller::AppState;

/// Proof that the request carried the configured bearer token.
#[derive(Debug, Clone, Copy)]
pub struct AuthBearer;

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

/// Compares without short-circuiting on the first differing byte.
fn tokens_match(given: &str, expected: &str) -> bool {
    let (given, expected) = (given.as_bytes(), expected.as_bytes());
    if given.len() != expected.len() {
        return false;
    }
    given
        .iter()
        .zip(expected)
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthBearer {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let expected = state.handle.config().auth.token.clone();
        match bearer_token(parts) {
            Some(token) if !expected.is_empty() && tokens_match(token, &expected) => Ok(Self),
            _ => {
                tracing::warn!(path = %parts.uri.path(), "rejected request without valid bearer token");
                Err(ApiError::Unauthorized)
            }
        }
    }
}
