//! Shared types for the API layer.

use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core_state::CoreState;
use crate::models::enums::{Category, ReportState};
use crate::models::ReportStatus;

/// Shared context for all API routes.
#[derive(Clone)]
pub struct ApiContext {
    pub core: Arc<CoreState>,
}

impl ApiContext {
    pub fn new(core: Arc<CoreState>) -> Self {
        Self { core }
    }
}

/// `?owner_id=` on mutating report routes.
#[derive(Debug, Deserialize)]
pub struct OwnerQuery {
    pub owner_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct ReportStatusResponse {
    pub state: Option<ReportState>,
    pub report_progress: Option<f64>,
    pub report: Option<serde_json::Value>,
    pub error: Option<String>,
    pub category: Option<Category>,
    pub updated_at: Option<NaiveDateTime>,
}

impl From<ReportStatus> for ReportStatusResponse {
    fn from(status: ReportStatus) -> Self {
        Self {
            state: status.state,
            report_progress: status.report_progress,
            report: status.report,
            error: status.error,
            category: status.category,
            updated_at: status.updated_at,
        }
    }
}
