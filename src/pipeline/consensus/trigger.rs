//! Entry points used by the HTTP layer: start, cancel, inspect.
//!
//! A trigger only validates, writes `PENDING(0)` and hands the job to a
//! background thread. It never waits on the LLM.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use uuid::Uuid;

use super::control::JobControl;
use super::error::PipelineError;
use super::jobs::JobRegistry;
use super::orchestrator::{JobOutcome, ReportJob};
use super::store::ReportStore;
use crate::models::{Discussion, ReportStatus};
use crate::pipeline::structuring::StructuredClient;

/// Runtime policy threaded in from configuration.
#[derive(Debug, Clone)]
pub struct ReportSettings {
    pub read_only: bool,
    /// Reject a trigger while a job is in flight. When off, the newer
    /// trigger supersedes the running job.
    pub reject_concurrent: bool,
    pub job_deadline: Duration,
    pub concurrency: usize,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            read_only: false,
            reject_concurrent: true,
            job_deadline: Duration::from_secs(600),
            concurrency: 4,
        }
    }
}

#[derive(Debug)]
pub struct StartedJob {
    pub job_id: Uuid,
    pub handle: JoinHandle<JobOutcome>,
}

pub struct ReportService {
    store: Arc<dyn ReportStore>,
    client: Arc<dyn StructuredClient>,
    jobs: Arc<JobRegistry>,
    settings: ReportSettings,
}

impl ReportService {
    pub fn new(
        store: Arc<dyn ReportStore>,
        client: Arc<dyn StructuredClient>,
        settings: ReportSettings,
    ) -> Self {
        Self {
            store,
            client,
            jobs: Arc::new(JobRegistry::new()),
            settings,
        }
    }

    pub fn settings(&self) -> &ReportSettings {
        &self.settings
    }

    pub fn jobs(&self) -> &JobRegistry {
        &self.jobs
    }

    pub fn client_description(&self) -> String {
        self.client.describe()
    }

    fn owned_discussion(
        &self,
        discussion_id: &Uuid,
        requester: &Uuid,
    ) -> Result<Discussion, PipelineError> {
        let discussion = self
            .store
            .load_discussion(discussion_id)?
            .ok_or_else(|| PipelineError::NotFound {
                entity: "Discussion",
                id: discussion_id.to_string(),
            })?;
        if discussion.owner_id != *requester {
            return Err(PipelineError::Authorization(
                "only the discussion owner can manage its report".into(),
            ));
        }
        Ok(discussion)
    }

    /// Validate, persist `PENDING(0)` and schedule a job.
    pub fn start_report_generation(
        &self,
        discussion_id: Uuid,
        requester: Uuid,
    ) -> Result<StartedJob, PipelineError> {
        if self.settings.read_only {
            return Err(PipelineError::StateConflict(
                "the service is in read-only mode".into(),
            ));
        }
        self.owned_discussion(&discussion_id, &requester)?;

        let job_id = Uuid::new_v4();
        if !self
            .store
            .begin(&discussion_id, &job_id, self.settings.reject_concurrent)?
        {
            return Err(PipelineError::StateConflict(
                "a report is already being generated for this discussion".into(),
            ));
        }

        let job = ReportJob {
            discussion_id,
            job_id,
            control: JobControl::new(self.settings.job_deadline),
            concurrency: self.settings.concurrency,
        };
        match self
            .jobs
            .spawn(Arc::clone(&self.store), Arc::clone(&self.client), job)
        {
            Ok(handle) => {
                tracing::info!(
                    discussion_id = %discussion_id,
                    job_id = %job_id,
                    "Report generation scheduled"
                );
                Ok(StartedJob { job_id, handle })
            }
            Err(e) => {
                let detail = format!("could not start report job: {e}");
                self.store.fail(&discussion_id, &job_id, &detail)?;
                Err(PipelineError::StateConflict(detail))
            }
        }
    }

    /// Ask the live job for `discussion_id` to stop at its next check.
    pub fn cancel_report_generation(
        &self,
        discussion_id: Uuid,
        requester: Uuid,
    ) -> Result<Uuid, PipelineError> {
        self.owned_discussion(&discussion_id, &requester)?;
        let job_id = self.jobs.cancel(&discussion_id).ok_or_else(|| {
            PipelineError::StateConflict("no report job is running for this discussion".into())
        })?;
        tracing::info!(discussion_id = %discussion_id, job_id = %job_id, "Report cancellation requested");
        Ok(job_id)
    }

    pub fn report_status(&self, discussion_id: Uuid) -> Result<ReportStatus, PipelineError> {
        self.store
            .status(&discussion_id)?
            .ok_or_else(|| PipelineError::NotFound {
                entity: "Discussion",
                id: discussion_id.to_string(),
            })
    }

    /// Startup sweep; must run before any job is spawned.
    pub fn recover_interrupted(&self) -> Result<usize, PipelineError> {
        Ok(self.store.recover_interrupted()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::enums::{Category, DiscussionTemplate, ReportState};
    use crate::pipeline::consensus::testing::{echo_client, seed};

    fn service(db: &Arc<Database>, settings: ReportSettings, delay_ms: u64) -> ReportService {
        let client = echo_client(Category::BinaryProposal).with_delay(Duration::from_millis(delay_ms));
        ReportService::new(db.clone(), Arc::new(client), settings)
    }

    fn fixture(texts: &[&str]) -> (Arc<Database>, Discussion) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let d = seed(&db, Some(DiscussionTemplate::ToolAdoption), texts);
        (db, d)
    }

    #[test]
    fn accepted_trigger_runs_to_completion() {
        let (db, d) = fixture(&["yes", "no"]);
        let svc = service(&db, ReportSettings::default(), 0);

        let started = svc.start_report_generation(d.id, d.owner_id).unwrap();
        assert_eq!(started.handle.join().unwrap(), JobOutcome::Completed);

        let status = svc.report_status(d.id).unwrap();
        assert_eq!(status.state, Some(ReportState::Complete));
        assert_eq!(status.job_id, Some(started.job_id));
        assert!(svc.jobs().is_empty());
    }

    #[test]
    fn second_trigger_is_rejected_while_in_flight() {
        let (db, d) = fixture(&["a", "b", "c"]);
        let settings = ReportSettings {
            concurrency: 1,
            ..ReportSettings::default()
        };
        let svc = service(&db, settings, 40);

        let first = svc.start_report_generation(d.id, d.owner_id).unwrap();
        let second = svc.start_report_generation(d.id, d.owner_id);
        assert!(matches!(second, Err(PipelineError::StateConflict(_))));

        assert_eq!(first.handle.join().unwrap(), JobOutcome::Completed);
        assert_eq!(svc.report_status(d.id).unwrap().job_id, Some(first.job_id));

        // A finished report can be regenerated.
        let again = svc.start_report_generation(d.id, d.owner_id).unwrap();
        assert_eq!(again.handle.join().unwrap(), JobOutcome::Completed);
    }

    #[test]
    fn second_trigger_supersedes_when_concurrency_allowed() {
        let (db, d) = fixture(&["a", "b", "c"]);
        let settings = ReportSettings {
            reject_concurrent: false,
            concurrency: 1,
            ..ReportSettings::default()
        };
        let svc = service(&db, settings, 40);

        let first = svc.start_report_generation(d.id, d.owner_id).unwrap();
        let second = svc.start_report_generation(d.id, d.owner_id).unwrap();

        assert_eq!(first.handle.join().unwrap(), JobOutcome::Superseded);
        assert_eq!(second.handle.join().unwrap(), JobOutcome::Completed);

        let status = svc.report_status(d.id).unwrap();
        assert_eq!(status.state, Some(ReportState::Complete));
        assert_eq!(status.job_id, Some(second.job_id));
        assert_eq!(status.report_progress, Some(1.0));
    }

    #[test]
    fn read_only_rejects_before_any_write() {
        let (db, d) = fixture(&["a"]);
        let settings = ReportSettings {
            read_only: true,
            ..ReportSettings::default()
        };
        let svc = service(&db, settings, 0);

        let err = svc.start_report_generation(d.id, d.owner_id).unwrap_err();
        assert!(matches!(err, PipelineError::StateConflict(_)));
        let status = svc.report_status(d.id).unwrap();
        assert_eq!(status.state, None);
        assert_eq!(status.report_progress, None);
    }

    #[test]
    fn unknown_discussion_is_not_found() {
        let (db, _) = fixture(&[]);
        let svc = service(&db, ReportSettings::default(), 0);
        let err = svc
            .start_report_generation(Uuid::new_v4(), Uuid::new_v4())
            .unwrap_err();
        assert!(matches!(err, PipelineError::NotFound { .. }));
        assert!(matches!(
            svc.report_status(Uuid::new_v4()),
            Err(PipelineError::NotFound { .. })
        ));
    }

    #[test]
    fn non_owner_is_rejected() {
        let (db, d) = fixture(&["a"]);
        let svc = service(&db, ReportSettings::default(), 0);
        let err = svc.start_report_generation(d.id, Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, PipelineError::Authorization(_)));
        assert_eq!(svc.report_status(d.id).unwrap().state, None);
    }

    #[test]
    fn cancel_stops_running_job() {
        let (db, d) = fixture(&["a", "b", "c", "d"]);
        let settings = ReportSettings {
            concurrency: 1,
            ..ReportSettings::default()
        };
        let svc = service(&db, settings, 50);

        let started = svc.start_report_generation(d.id, d.owner_id).unwrap();
        assert_eq!(svc.cancel_report_generation(d.id, d.owner_id).unwrap(), started.job_id);
        assert!(matches!(started.handle.join().unwrap(), JobOutcome::Failed(_)));

        let status = svc.report_status(d.id).unwrap();
        assert_eq!(status.state, Some(ReportState::Failed));
        assert_eq!(status.error.as_deref(), Some("cancelled"));
    }

    #[test]
    fn cancel_without_running_job_conflicts() {
        let (db, d) = fixture(&["a"]);
        let svc = service(&db, ReportSettings::default(), 0);
        assert!(matches!(
            svc.cancel_report_generation(d.id, d.owner_id),
            Err(PipelineError::StateConflict(_))
        ));
        assert!(matches!(
            svc.cancel_report_generation(d.id, Uuid::new_v4()),
            Err(PipelineError::Authorization(_))
        ));
    }
}
