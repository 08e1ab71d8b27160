//! Shared application state handed to the HTTP layer.

use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::Database;
use crate::pipeline::consensus::{ReportService, ReportStore};
use crate::pipeline::structuring::StructuredClient;

pub struct CoreState {
    pub config: AppConfig,
    pub db: Arc<Database>,
    pub reports: ReportService,
}

impl CoreState {
    pub fn new(config: AppConfig, db: Arc<Database>, client: Arc<dyn StructuredClient>) -> Self {
        let store: Arc<dyn ReportStore> = db.clone();
        let reports = ReportService::new(store, client, config.report_settings());
        Self {
            config,
            db,
            reports,
        }
    }

    pub fn read_only(&self) -> bool {
        self.config.read_only
    }
}
