//! Persistence seam for report jobs.
//!
//! The orchestrator only sees `ReportStore`, so tests can observe every
//! checkpoint without a real database behind it.

use serde_json::Value;
use uuid::Uuid;

use crate::db::{self, Database, DatabaseError};
use crate::models::enums::{Category, ReportState};
use crate::models::{Discussion, Message, ReportStatus};

/// Status text written to jobs that a restart left behind.
pub const INTERRUPTED_ERROR: &str = "interrupted by restart";

pub trait ReportStore: Send + Sync {
    fn load_discussion(&self, discussion_id: &Uuid) -> Result<Option<Discussion>, DatabaseError>;

    /// Messages in creation order.
    fn load_messages(&self, discussion_id: &Uuid) -> Result<Vec<Message>, DatabaseError>;

    /// Write `PENDING(0)` for `job_id`. `false` when rejected.
    fn begin(
        &self,
        discussion_id: &Uuid,
        job_id: &Uuid,
        reject_in_flight: bool,
    ) -> Result<bool, DatabaseError>;

    /// Guarded checkpoint. `false` when `job_id` no longer owns the row.
    fn checkpoint(
        &self,
        discussion_id: &Uuid,
        job_id: &Uuid,
        state: ReportState,
        category: Option<Category>,
        report: Option<&Value>,
    ) -> Result<bool, DatabaseError>;

    fn fail(&self, discussion_id: &Uuid, job_id: &Uuid, error: &str) -> Result<bool, DatabaseError>;

    fn status(&self, discussion_id: &Uuid) -> Result<Option<ReportStatus>, DatabaseError>;

    /// Fail every job left in progress. Returns how many were touched.
    fn recover_interrupted(&self) -> Result<usize, DatabaseError>;
}

impl ReportStore for Database {
    fn load_discussion(&self, discussion_id: &Uuid) -> Result<Option<Discussion>, DatabaseError> {
        db::get_discussion(&*self.conn()?, discussion_id)
    }

    fn load_messages(&self, discussion_id: &Uuid) -> Result<Vec<Message>, DatabaseError> {
        db::get_messages(&*self.conn()?, discussion_id)
    }

    fn begin(
        &self,
        discussion_id: &Uuid,
        job_id: &Uuid,
        reject_in_flight: bool,
    ) -> Result<bool, DatabaseError> {
        db::begin_report_job(&*self.conn()?, discussion_id, job_id, reject_in_flight)
    }

    fn checkpoint(
        &self,
        discussion_id: &Uuid,
        job_id: &Uuid,
        state: ReportState,
        category: Option<Category>,
        report: Option<&Value>,
    ) -> Result<bool, DatabaseError> {
        db::write_report_checkpoint(&*self.conn()?, discussion_id, job_id, state, category, report)
    }

    fn fail(&self, discussion_id: &Uuid, job_id: &Uuid, error: &str) -> Result<bool, DatabaseError> {
        db::fail_report_job(&*self.conn()?, discussion_id, job_id, error)
    }

    fn status(&self, discussion_id: &Uuid) -> Result<Option<ReportStatus>, DatabaseError> {
        db::get_report_status(&*self.conn()?, discussion_id)
    }

    fn recover_interrupted(&self) -> Result<usize, DatabaseError> {
        let count = db::fail_interrupted_reports(&*self.conn()?, INTERRUPTED_ERROR)?;
        if count > 0 {
            tracing::warn!(count, "Marked interrupted report jobs as failed");
        }
        Ok(count)
    }
}
