pub mod operator;

use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use zwerfmelder_common::{CreateReportPayload, ReportError, ReportLocation, ReportSource};
use zwerfmelder_engine::identity::{build_fingerprint, derive_reporter_hash};

use crate::AppState;

const ANON_COOKIE_NAME: &str = "zwerfmelder_anon_id";
const ANON_COOKIE_MAX_AGE_SECONDS: i64 = 180 * 24 * 60 * 60;

const MAX_NOTE_LENGTH: usize = 500;
const MIN_TAG_COUNT: usize = 1;
const MAX_TAG_COUNT: usize = 10;
const MAX_LOCATION_ACCURACY_M: f64 = 3000.0;

// --- Request bodies ---

#[derive(Deserialize)]
pub struct CreateReportRequest {
    location: ReportLocation,
    tags: Vec<String>,
    note: Option<String>,
    client_ts: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
pub struct StatusQuery {
    token: Option<String>,
}

// --- Helpers ---

/// Map engine errors onto transport status codes; everything else is a 500.
pub fn error_response(err: ReportError) -> Response {
    let status = match err.code() {
        "rate_limited" => StatusCode::TOO_MANY_REQUESTS,
        "invalid_tag" | "invalid_status_transition" | "missing_token" => StatusCode::BAD_REQUEST,
        "token_mismatch" => StatusCode::FORBIDDEN,
        "report_not_found" | "canonical_not_found" | "duplicate_not_found"
        | "bike_group_not_found" => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status == StatusCode::INTERNAL_SERVER_ERROR {
        warn!(error = %err, "request failed");
    }

    (
        status,
        Json(serde_json::json!({ "error": err.to_string(), "code": err.code() })),
    )
        .into_response()
}

pub fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "error": message, "code": "invalid_request" })),
    )
        .into_response()
}

fn validate_create_request(body: &CreateReportRequest) -> Result<(), &'static str> {
    let location = &body.location;
    if !(-90.0..=90.0).contains(&location.lat) || !(-180.0..=180.0).contains(&location.lng) {
        return Err("location out of range");
    }
    if !(0.0..=MAX_LOCATION_ACCURACY_M).contains(&location.accuracy_m) {
        return Err("location accuracy out of range");
    }
    if body.tags.len() < MIN_TAG_COUNT || body.tags.len() > MAX_TAG_COUNT {
        return Err("between 1 and 10 tags required");
    }
    if body.tags.iter().any(|tag| tag.is_empty() || tag.len() > 64) {
        return Err("tag codes must be 1-64 characters");
    }
    if body.note.as_ref().is_some_and(|note| note.len() > MAX_NOTE_LENGTH) {
        return Err("note too long (max 500 characters)");
    }
    Ok(())
}

/// Parse a specific cookie from the Cookie header string.
fn parse_cookie<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    for part in header.split(';') {
        let part = part.trim();
        if let Some(value) = part.strip_prefix(name) {
            if let Some(value) = value.strip_prefix('=') {
                return Some(value);
            }
        }
    }
    None
}

/// Cookie-backed anonymous reporter id: reuse the cookie when present,
/// otherwise mint a fresh id and return the Set-Cookie value for it.
fn anonymous_reporter_id(headers: &HeaderMap) -> (String, Option<String>) {
    let cookie_header = headers
        .get(header::COOKIE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");

    if let Some(existing) = parse_cookie(cookie_header, ANON_COOKIE_NAME) {
        if !existing.is_empty() {
            return (existing.to_string(), None);
        }
    }

    let fresh = Uuid::new_v4().to_string();
    let secure = if cfg!(debug_assertions) { "" } else { "; Secure" };
    let set_cookie = format!(
        "{ANON_COOKIE_NAME}={fresh}; Path=/; HttpOnly; SameSite=Lax; Max-Age={ANON_COOKIE_MAX_AGE_SECONDS}{secure}"
    );
    (fresh, Some(set_cookie))
}

fn header_str<'a>(headers: &'a HeaderMap, name: header::HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

// --- Citizen handlers ---

pub async fn api_tags(State(state): State<Arc<AppState>>) -> Response {
    match state.service.available_tags().await {
        Ok(tags) => Json(serde_json::json!({ "tags": tags })).into_response(),
        Err(err) => error_response(err),
    }
}

pub async fn api_create_report(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<std::net::SocketAddr>,
    headers: HeaderMap,
    Json(body): Json<CreateReportRequest>,
) -> Response {
    if let Err(message) = validate_create_request(&body) {
        return bad_request(message);
    }

    let ip = addr.ip().to_string();
    let fingerprint_hash = build_fingerprint(
        &ip,
        header_str(&headers, header::USER_AGENT),
        header_str(&headers, header::ACCEPT_LANGUAGE),
    );

    let (anonymous_id, set_cookie) = anonymous_reporter_id(&headers);
    let reporter_hash = derive_reporter_hash(&anonymous_id, &state.signing_secret);

    let payload = CreateReportPayload {
        location: body.location,
        tags: body.tags,
        note: body.note,
        client_ts: body.client_ts,
        source: ReportSource::Web,
        ip,
        fingerprint_hash,
        reporter_hash,
    };

    match state.service.create_report(payload).await {
        Ok(outcome) => match set_cookie {
            Some(cookie) => {
                (StatusCode::CREATED, [(header::SET_COOKIE, cookie)], Json(outcome))
                    .into_response()
            }
            None => (StatusCode::CREATED, Json(outcome)).into_response(),
        },
        Err(err) => error_response(err),
    }
}

pub async fn api_report_status(
    State(state): State<Arc<AppState>>,
    Path(public_id): Path<String>,
    Query(query): Query<StatusQuery>,
) -> Response {
    match state
        .service
        .report_status(&public_id, query.token.as_deref())
        .await
    {
        Ok(view) => Json(view).into_response(),
        Err(err) => error_response(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(tags: Vec<&str>, note: Option<&str>, accuracy_m: f64) -> CreateReportRequest {
        CreateReportRequest {
            location: ReportLocation {
                lat: 52.37,
                lng: 4.89,
                accuracy_m,
            },
            tags: tags.into_iter().map(|tag| tag.to_string()).collect(),
            note: note.map(|note| note.to_string()),
            client_ts: None,
        }
    }

    #[test]
    fn accepts_minimal_valid_request() {
        assert!(validate_create_request(&request(vec!["rusted"], None, 5.0)).is_ok());
    }

    #[test]
    fn rejects_empty_tag_list() {
        assert!(validate_create_request(&request(vec![], None, 5.0)).is_err());
    }

    #[test]
    fn rejects_excessive_accuracy() {
        assert!(validate_create_request(&request(vec!["rusted"], None, 5000.0)).is_err());
    }

    #[test]
    fn rejects_overlong_note() {
        let note = "x".repeat(501);
        assert!(validate_create_request(&request(vec!["rusted"], Some(&note), 5.0)).is_err());
    }

    #[test]
    fn parse_cookie_finds_value_in_any_position() {
        assert_eq!(
            parse_cookie("zwerfmelder_anon_id=abc; other=x", ANON_COOKIE_NAME),
            Some("abc")
        );
        assert_eq!(
            parse_cookie("other=x; zwerfmelder_anon_id=abc", ANON_COOKIE_NAME),
            Some("abc")
        );
        assert_eq!(parse_cookie("other=x", ANON_COOKIE_NAME), None);
    }
}
