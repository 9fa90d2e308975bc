use std::sync::Arc;

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, StatusCode},
    response::{IntoResponse, Response},
};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use zwerfmelder_common::OperatorSession;

use crate::AppState;

/// Authenticated operator. Extract this in handlers that require operator
/// access; rejects with 401 and a Basic challenge otherwise.
pub struct OperatorAuth(pub OperatorSession);

impl FromRequestParts<Arc<AppState>> for OperatorAuth {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let authorization = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("");

        if let Some(session) = verify_basic(authorization, state) {
            return Ok(OperatorAuth(session));
        }

        Err((
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, "Basic realm=\"operator\"")],
            "unauthorized",
        )
            .into_response())
    }
}

fn verify_basic(authorization: &str, state: &AppState) -> Option<OperatorSession> {
    let encoded = authorization.strip_prefix("Basic ")?;
    let decoded = BASE64.decode(encoded.trim()).ok()?;
    let credentials = String::from_utf8(decoded).ok()?;
    let (email, password) = credentials.split_once(':')?;

    if constant_time_eq(email.as_bytes(), state.operator_email.as_bytes())
        && constant_time_eq(password.as_bytes(), state.operator_password.as_bytes())
    {
        Some(OperatorSession {
            email: email.to_string(),
        })
    } else {
        None
    }
}

/// Constant-time comparison to prevent timing attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter()
        .zip(b.iter())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}
