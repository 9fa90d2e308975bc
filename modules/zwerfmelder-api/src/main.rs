use std::sync::Arc;

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

use zwerfmelder_common::Config;
use zwerfmelder_engine::{MemoryRepository, ReportService, ServiceOptions};

mod auth;
mod rest;

pub struct AppState {
    pub service: ReportService,
    pub signing_secret: String,
    pub operator_email: String,
    pub operator_password: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("zwerfmelder=info".parse()?))
        .init();

    let config = Config::from_env();

    let repo = Arc::new(MemoryRepository::new());
    let service = ReportService::new(
        repo,
        ServiceOptions {
            public_base_url: config.public_base_url.clone(),
            signing_secret: config.signing_secret.clone(),
            export_timezone: config.export_timezone,
        },
    );

    let state = Arc::new(AppState {
        service,
        signing_secret: config.signing_secret,
        operator_email: config.operator_email,
        operator_password: config.operator_password,
    });

    let app = Router::new()
        // Health check
        .route("/", get(|| async { "ok" }))
        // Citizen API
        .route("/api/tags", get(rest::api_tags))
        .route("/api/reports", post(rest::api_create_report))
        .route("/api/reports/{public_id}/status", get(rest::api_report_status))
        // Operator API (basic auth)
        .route("/api/operator/reports", get(rest::operator::api_list_reports))
        .route("/api/operator/reports/{id}", get(rest::operator::api_report_detail))
        .route(
            "/api/operator/reports/{id}/status",
            post(rest::operator::api_update_status),
        )
        .route("/api/operator/merge", post(rest::operator::api_merge))
        .route(
            "/api/operator/exports/window",
            post(rest::operator::api_export_window),
        )
        .with_state(state)
        // Logging layer: method + path + status + latency only (no query params, no IP)
        .layer(
            tower_http::trace::TraceLayer::new_for_http().make_span_with(
                |request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                },
            ),
        );

    let addr = format!("{}:{}", config.web_host, config.web_port);
    info!("Zwerfmelder API starting on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}
