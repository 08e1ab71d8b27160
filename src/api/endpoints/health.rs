//! Health check endpoint.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::api::types::ApiContext;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub read_only: bool,
    pub llm: String,
}

/// `GET /health` returns liveness plus the active policy.
pub async fn check(State(ctx): State<ApiContext>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: crate::config::APP_VERSION,
        read_only: ctx.core.read_only(),
        llm: ctx.core.reports.client_description(),
    })
}
