use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use zwerfmelder_common::{ExportPeriodType, OperatorReportFilters, ReportStatus};

use crate::auth::OperatorAuth;
use crate::rest::{bad_request, error_response};
use crate::AppState;

// --- Request bodies ---

#[derive(Deserialize)]
pub struct StatusUpdateRequest {
    status: ReportStatus,
}

#[derive(Deserialize)]
pub struct MergeRequest {
    canonical_report_id: Uuid,
    duplicate_report_ids: Vec<Uuid>,
}

#[derive(Deserialize)]
pub struct ExportWindowRequest {
    period_type: ExportPeriodType,
    period_start: Option<DateTime<Utc>>,
    period_end: Option<DateTime<Utc>>,
}

// --- Handlers ---

pub async fn api_list_reports(
    State(state): State<Arc<AppState>>,
    OperatorAuth(_session): OperatorAuth,
    Query(filters): Query<OperatorReportFilters>,
) -> Response {
    match state.service.list_operator_reports(&filters).await {
        Ok(reports) => Json(serde_json::json!({ "reports": reports })).into_response(),
        Err(err) => error_response(err),
    }
}

pub async fn api_report_detail(
    State(state): State<Arc<AppState>>,
    OperatorAuth(_session): OperatorAuth,
    Path(id): Path<Uuid>,
) -> Response {
    match state.service.report_details(id).await {
        Ok(details) => Json(details).into_response(),
        Err(err) => error_response(err),
    }
}

pub async fn api_update_status(
    State(state): State<Arc<AppState>>,
    OperatorAuth(session): OperatorAuth,
    Path(id): Path<Uuid>,
    Json(body): Json<StatusUpdateRequest>,
) -> Response {
    match state.service.update_status(id, body.status, &session).await {
        Ok(report) => Json(report).into_response(),
        Err(err) => error_response(err),
    }
}

pub async fn api_merge(
    State(state): State<Arc<AppState>>,
    OperatorAuth(session): OperatorAuth,
    Json(body): Json<MergeRequest>,
) -> Response {
    if body.duplicate_report_ids.is_empty() {
        return bad_request("at least one duplicate report id required");
    }

    match state
        .service
        .merge_duplicates(body.canonical_report_id, &body.duplicate_report_ids, &session)
        .await
    {
        Ok(group) => Json(group).into_response(),
        Err(err) => error_response(err),
    }
}

pub async fn api_export_window(
    State(state): State<Arc<AppState>>,
    OperatorAuth(_session): OperatorAuth,
    Json(body): Json<ExportWindowRequest>,
) -> Response {
    let explicit = match (body.period_start, body.period_end) {
        (Some(start), Some(end)) if start >= end => {
            return bad_request("period_start must precede period_end");
        }
        (Some(start), Some(end)) => Some((start, end)),
        (None, None) => None,
        _ => return bad_request("period_start and period_end must be supplied together"),
    };

    match state.service.export_window(body.period_type, explicit) {
        Ok(window) => Json(window).into_response(),
        Err(err) => error_response(err),
    }
}
