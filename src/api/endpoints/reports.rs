//! Report endpoints.
//!
//! - `POST /reports/:discussion_id?owner_id=`: start generation (204)
//! - `GET /reports/:discussion_id`: state, progress and report
//! - `DELETE /reports/:discussion_id?owner_id=`: cancel the running job (204)

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, OwnerQuery, ReportStatusResponse};

/// Accepted requests return once `PENDING(0)` is persisted; the job runs on
/// its own thread.
pub async fn generate(
    State(ctx): State<ApiContext>,
    Path(discussion_id): Path<Uuid>,
    Query(query): Query<OwnerQuery>,
) -> Result<StatusCode, ApiError> {
    let started = ctx
        .core
        .reports
        .start_report_generation(discussion_id, query.owner_id)?;
    tracing::debug!(job_id = %started.job_id, "Report job accepted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn status(
    State(ctx): State<ApiContext>,
    Path(discussion_id): Path<Uuid>,
) -> Result<Json<ReportStatusResponse>, ApiError> {
    let status = ctx.core.reports.report_status(discussion_id)?;
    Ok(Json(status.into()))
}

pub async fn cancel(
    State(ctx): State<ApiContext>,
    Path(discussion_id): Path<Uuid>,
    Query(query): Query<OwnerQuery>,
) -> Result<StatusCode, ApiError> {
    ctx.core
        .reports
        .cancel_report_generation(discussion_id, query.owner_id)?;
    Ok(StatusCode::NO_CONTENT)
}
